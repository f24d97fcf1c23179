//! Database name and buffer validation rules.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{ProvisionError, ProvisionResult};

/// The maximum number of databases a single server will host.
pub const MAX_DATABASES: usize = 4;

/// The default buffer size in bytes per series.
pub const DEFAULT_BUFFER_SIZE: u64 = 1024;
/// The smallest allowed buffer size, which is also the required multiple.
pub const MIN_BUFFER_SIZE: u64 = 512;
/// The largest allowed buffer size, 10MB (655295 points).
pub const MAX_BUFFER_SIZE: u64 = 10_485_760;

lazy_static! {
    /// Database name rule:
    ///  - minimum 2, maximum 20 chars
    ///  - starting with an alphabetic char
    ///  - middle chars may be alphabetic, numeric, hyphen or underscore
    ///  - ending with an alphabetic or numeric char
    static ref DBNAME: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9\-_]{0,18}[a-zA-Z0-9]$").expect("invalid dbname regex");
}

/// Validate a database name against the naming rule.
pub fn validate_dbname(name: &str) -> ProvisionResult<()> {
    if !DBNAME.is_match(name) {
        return Err(ProvisionError::InvalidInput(format!(
            "database name should be 2 to 20 characters, starting with an alphabetic and \
             ending with an alphabetic or number character, hyphens and underscores are \
             allowed in the middle, got {:?}",
            name,
        )));
    }
    Ok(())
}

/// Validate the name of a database which is about to be created on this server.
///
/// On top of the naming rule this rejects names which already exist locally and
/// refuses to go past the database capacity of the server.
pub fn validate_new_dbname(name: &str, existing: &[String], max: usize) -> ProvisionResult<()> {
    validate_dbname(name)?;
    if existing.iter().any(|have| have == name) {
        return Err(ProvisionError::InvalidInput(format!("database {:?} already exists", name)));
    }
    if existing.len() >= max {
        return Err(ProvisionError::CapacityExceeded { name: name.to_string(), max });
    }
    Ok(())
}

/// Validate a buffer size in bytes.
///
/// The buffer size must be a multiple of 512 and within the supported bounds.
pub fn validate_buffer_size(size: u64) -> ProvisionResult<()> {
    if size % MIN_BUFFER_SIZE != 0 {
        return Err(ProvisionError::InvalidInput(format!(
            "please use a multiple of 512 as a buffer size, got {}",
            size,
        )));
    }
    if size < MIN_BUFFER_SIZE || size > MAX_BUFFER_SIZE {
        return Err(ProvisionError::InvalidInput(format!(
            "expecting a buffer size between {} and {} but got {}",
            MIN_BUFFER_SIZE, MAX_BUFFER_SIZE, size,
        )));
    }
    Ok(())
}

/// Validate that an integer lies within the given inclusive bounds.
pub fn validate_range(value: i64, min: i64, max: i64, what: &str) -> ProvisionResult<()> {
    if value < min || value > max {
        return Err(ProvisionError::InvalidInput(format!(
            "expecting {} between {} and {} but got {}",
            what, min, max, value,
        )));
    }
    Ok(())
}
