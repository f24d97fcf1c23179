use crate::error::ProvisionError;
use crate::version::check_version_parity;

#[test]
fn patch_differences_are_compatible() {
    assert!(check_version_parity("2.0.3", "2.0.9").is_ok());
    assert!(check_version_parity("2.0.3", "2.0.3").is_ok());
}

#[test]
fn minor_differences_are_incompatible() {
    let err = check_version_parity("2.0.3", "2.1.0").unwrap_err();
    assert!(
        matches!(err, ProvisionError::VersionMismatch { .. }),
        "expected VersionMismatch, got {:?}",
        err
    );
}

#[test]
fn major_differences_are_incompatible() {
    assert!(check_version_parity("2.0.3", "3.0.3").is_err());
    assert!(check_version_parity("3.0.0", "2.9.9").is_err());
}

#[test]
fn malformed_versions_are_protocol_errors() {
    let err = check_version_parity("2.0.3", "two-dot-oh").unwrap_err();
    assert!(
        matches!(err, ProvisionError::Protocol(_)),
        "expected Protocol for an unparsable version, got {:?}",
        err
    );
}
