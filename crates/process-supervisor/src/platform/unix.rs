use super::TerminateMode;
use tokio::process::Command;

/// Makes the spawned child a process group leader so the whole tree (the SUT
/// plus whatever it forks) can be signaled in one shot.
///
/// Safety: `setpgid` is async-signal-safe and runs after `fork` but before
/// `exec` in the child, with no other threads present yet.
pub fn prepare_group_leader(cmd: &mut Command) {
    unsafe {
        cmd.pre_exec(|| {
            libc::setpgid(0, 0);
            Ok(())
        });
    }
}

/// Sends a signal to the entire process group led by `pid`. `pid` must be
/// the group leader's pid (true for anything spawned via
/// [`prepare_group_leader`]), so the negated pid targets the group.
pub fn terminate_group(pid: u32, mode: TerminateMode) -> std::io::Result<()> {
    let signal = match mode {
        TerminateMode::Graceful => libc::SIGTERM,
        TerminateMode::Force => libc::SIGKILL,
    };
    let result = unsafe { libc::kill(-(pid as i32), signal) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminate_group_on_nonexistent_pid_reports_error() {
        let err = terminate_group(u32::MAX - 1, TerminateMode::Graceful).unwrap_err();
        assert!(err.raw_os_error().is_some());
    }
}
