use super::TerminateMode;
use tokio::process::Command;

const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Puts the spawned child in its own process group so it (and anything it
/// spawns) can be torn down as a unit via `taskkill /T`.
pub fn prepare_group_leader(cmd: &mut Command) {
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

/// Tears down the process tree rooted at `pid` via `taskkill`. `/T` reaches
/// descendants; `/F` is only added for [`TerminateMode::Force`] since plain
/// `taskkill` sends a close message some consoles ignore.
pub fn terminate_group(pid: u32, mode: TerminateMode) -> std::io::Result<()> {
    let mut cmd = std::process::Command::new("taskkill");
    cmd.args(["/PID", &pid.to_string(), "/T"]);
    if mode == TerminateMode::Force {
        cmd.arg("/F");
    }
    let status = cmd.status()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("taskkill exited with {status}"),
        ))
    }
}
