//! Database descriptor persistence.
//!
//! The descriptor is the authoritative local record of a database instance.
//! It is written together with its companion text configuration into a fresh
//! directory, which makes that directory the unit of rollback: deleting it
//! wholesale undoes the local commit.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use strata_core::duration::TimePrecision;
use strata_core::{ProvisionError, ProvisionResult};

/// File name of the binary descriptor record.
pub const DESCRIPTOR_FILE: &str = "database.dat";
/// File name of the companion text configuration.
pub const CONFIG_FILE: &str = "database.conf";
/// Marker file telling the server a fresh pool still needs a reindex.
pub const REINDEX_FILE: &str = ".reindex";

/// The descriptor schema version written by this tool.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// The default timezone sentinel for timestamps without a zone.
pub const DEFAULT_TIMEZONE: &str = "NAIVE";
/// The default fraction of series a single drop may remove.
pub const DEFAULT_DROP_THRESHOLD: f64 = 1.0;

const CONFIG_TEMPLATE: &str = "\
# Strata database options.
#
# Network access is managed through query commands. By default only
# localhost has access to this database.

[buffer]
# Path used to store the buffer file for this database.
# When changing this location later, the buffer file has to be moved to the
# new location by hand.
path = {buffer_path}
";

/// The authoritative local record of a database instance.
///
/// Serialized as an ordered binary record with the schema version leading, so
/// readers can gate on the version before trusting the rest of the payload.
/// Once persisted, uuid, name and time precision are never mutated.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct DatabaseDescriptor {
    pub schema_version: u32,
    pub uuid: Uuid,
    pub dbname: String,
    pub time_precision: TimePrecision,
    pub buffer_size: u64,
    pub duration_num: u64,
    pub duration_log: u64,
    pub timezone: String,
    pub drop_threshold: f64,
}

/// Everything needed to persist a new database descriptor.
///
/// Durations are supplied as resolved tick counts. A uuid is only supplied by
/// join flows, which mint one id shared by the descriptor and the new server
/// record; otherwise a fresh uuid is generated here.
#[derive(Clone, Debug)]
pub struct DescriptorParams {
    pub dbname: String,
    pub time_precision: TimePrecision,
    pub buffer_size: u64,
    pub duration_num: u64,
    pub duration_log: u64,
    pub timezone: String,
    pub drop_threshold: f64,
    pub buffer_path: PathBuf,
    pub uuid: Option<Uuid>,
}

/// Creates and reads database descriptors.
pub struct DescriptorStore;

impl DescriptorStore {
    /// Persist a new database into `dbpath`.
    ///
    /// The target directory must not exist yet, or exist and be empty. The
    /// descriptor and its companion configuration are written together as the
    /// local commit point; every later workflow failure rolls the whole
    /// directory back.
    pub fn create(dbpath: &Path, params: DescriptorParams) -> ProvisionResult<DatabaseDescriptor> {
        ensure_empty_dir(dbpath)?;
        if params.buffer_path != dbpath {
            ensure_empty_dir(&params.buffer_path)?;
        }

        let descriptor = DatabaseDescriptor {
            schema_version: CURRENT_SCHEMA_VERSION,
            uuid: params.uuid.unwrap_or_else(Uuid::new_v4),
            dbname: params.dbname,
            time_precision: params.time_precision,
            buffer_size: params.buffer_size,
            duration_num: params.duration_num,
            duration_log: params.duration_log,
            timezone: params.timezone,
            drop_threshold: params.drop_threshold,
        };

        let config = CONFIG_TEMPLATE.replace("{buffer_path}", &params.buffer_path.display().to_string());
        fs::write(dbpath.join(CONFIG_FILE), config)
            .map_err(|err| ProvisionError::InvalidInput(format!("error writing {}: {}", CONFIG_FILE, err)))?;

        let record = bincode::serialize(&descriptor)
            .map_err(|err| ProvisionError::Protocol(format!("error encoding descriptor: {}", err)))?;
        fs::write(dbpath.join(DESCRIPTOR_FILE), record)
            .map_err(|err| ProvisionError::InvalidInput(format!("error writing {}: {}", DESCRIPTOR_FILE, err)))?;

        Ok(descriptor)
    }

    /// Read the descriptor stored in `dbpath`.
    ///
    /// Records written by a newer tool are rejected by schema version rather
    /// than decoded on a guess.
    pub fn read(dbpath: &Path) -> ProvisionResult<DatabaseDescriptor> {
        let file = dbpath.join(DESCRIPTOR_FILE);
        let bytes = fs::read(&file).map_err(|err| ProvisionError::InvalidInput(format!("error reading {:?}: {}", file, err)))?;

        // The schema version leads the record, peek it before decoding the rest.
        let schema_version: u32 = bincode::deserialize(&bytes)
            .map_err(|err| ProvisionError::Protocol(format!("error decoding descriptor version: {}", err)))?;
        if schema_version != CURRENT_SCHEMA_VERSION {
            return Err(ProvisionError::Protocol(format!(
                "unsupported descriptor schema version {} in {:?}, this tool supports version {}",
                schema_version, file, CURRENT_SCHEMA_VERSION,
            )));
        }

        bincode::deserialize(&bytes).map_err(|err| ProvisionError::Protocol(format!("error decoding descriptor: {}", err)))
    }
}

/// Ensure `path` exists and is an empty directory.
///
/// Creates the directory, parents included, when it does not exist yet.
pub fn ensure_empty_dir(path: &Path) -> ProvisionResult<()> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|err| ProvisionError::InvalidInput(format!("error creating {:?}: {}", path, err)))?;
        return Ok(());
    }
    let mut entries = fs::read_dir(path).map_err(|err| ProvisionError::InvalidInput(format!("error reading {:?}: {}", path, err)))?;
    if entries.next().is_some() {
        return Err(ProvisionError::DirectoryNotEmpty(path.to_path_buf()));
    }
    Ok(())
}
