//! SDK/CLI handshake version compatibility.

use std::cmp::Ordering;

/// The minimum SDK version this server accepts. Bumped alongside wire
/// protocol changes that aren't backward compatible.
pub const MIN_SDK_VERSION: &str = "1.0.0";

pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Eq)]
enum VersionRank {
    Dev,
    Semver(semver::Version),
}

impl PartialOrd for VersionRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionRank {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (VersionRank::Dev, VersionRank::Dev) => Ordering::Equal,
            (VersionRank::Dev, _) => Ordering::Greater,
            (_, VersionRank::Dev) => Ordering::Less,
            (VersionRank::Semver(a), VersionRank::Semver(b)) => a.cmp(b),
        }
    }
}

/// Parse major.minor.patch, tolerating a leading `v`/`V` and dropping a
/// `-suffix` (pre-release/build metadata isn't part of this comparison).
/// The literal `dev` (any case) ranks above every released version.
fn parse_rank(raw: &str) -> Result<VersionRank, String> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("dev") {
        return Ok(VersionRank::Dev);
    }
    let without_v = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
    let core = without_v.split('-').next().unwrap_or(without_v);
    semver::Version::parse(core)
        .map(VersionRank::Semver)
        .map_err(|err| format!("invalid version '{raw}': {err}"))
}

/// Error if `actual < minimum`.
fn require_at_least(actual: &str, minimum: &str, which: &str) -> Result<(), String> {
    let actual_rank = parse_rank(actual)?;
    let minimum_rank = parse_rank(minimum)?;
    if actual_rank < minimum_rank {
        return Err(format!("{which} version {actual} is older than the required minimum {minimum}"));
    }
    Ok(())
}

/// Check both directions of the handshake: the connecting SDK must meet
/// this server's compiled-in minimum, and this server (as "cli") must meet
/// the SDK's declared minimum.
pub fn check_handshake_compatibility(sdk_version: &str, min_cli_version: &str) -> Result<(), String> {
    require_at_least(sdk_version, MIN_SDK_VERSION, "sdk")?;
    require_at_least(CLI_VERSION, min_cli_version, "cli")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_versions() {
        assert!(check_handshake_compatibility("1.0.0", "0.0.1").is_ok());
    }

    #[test]
    fn rejects_sdk_below_minimum() {
        let err = check_handshake_compatibility("0.9.9", "0.0.1").unwrap_err();
        assert!(err.contains("sdk"));
    }

    #[test]
    fn tolerates_v_prefix_and_suffix() {
        assert!(check_handshake_compatibility("v1.2.3-beta", "0.0.1").is_ok());
    }

    #[test]
    fn dev_ranks_as_maximal() {
        assert!(check_handshake_compatibility("dev", "999.0.0").is_ok());
        assert!(check_handshake_compatibility("DEV", "999.0.0").is_ok());
    }

    #[test]
    fn rejects_cli_below_sdk_requirement() {
        let err = check_handshake_compatibility("1.0.0", "999.0.0").unwrap_err();
        assert!(err.contains("cli"));
    }
}
