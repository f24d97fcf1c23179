//! Server/tool version parity rules.

use semver::Version;

use crate::error::{ProvisionError, ProvisionResult};

/// Parse a version string as reported by a server or baked into the tool.
pub fn parse_version(version: &str) -> ProvisionResult<Version> {
    Version::parse(version)
        .map_err(|err| ProvisionError::Protocol(format!("invalid version string {:?}: {}", version, err)))
}

/// Check that two versions agree on their major.minor components.
///
/// Patch releases are wire compatible, so patch differences are ignored.
pub fn check_version_parity(local: &str, remote: &str) -> ProvisionResult<()> {
    let l = parse_version(local)?;
    let r = parse_version(remote)?;
    if l.major != r.major || l.minor != r.minor {
        return Err(ProvisionError::VersionMismatch {
            local: local.to_string(),
            remote: remote.to_string(),
        });
    }
    Ok(())
}
