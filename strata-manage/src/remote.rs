//! Typed wrappers over the administrative query surface.
//!
//! The admin protocol returns structured JSON documents; the helpers here
//! turn the handful of queries the provisioning workflow needs into typed
//! values and protocol errors.

use serde_json::Value;

use strata_client::AdminClient;
use strata_core::duration::TimePrecision;
use strata_core::topology::{ClusterTopology, PoolStatus};
use strata_core::version::check_version_parity;
use strata_core::{ProvisionError, ProvisionResult};

/// The access level required for provisioning operations.
pub const FULL_ACCESS: &str = "full";
/// The status every cluster member must report before registration.
pub const STATUS_RUNNING: &str = "running";

/// The database properties copied onto a joining server.
#[derive(Clone, Debug)]
pub struct DatabaseProps {
    pub dbname: String,
    pub time_precision: TimePrecision,
    pub duration_num: u64,
    pub duration_log: u64,
    pub timezone: String,
    pub drop_threshold: f64,
}

/// Fetch the cluster's pool layout.
pub async fn fetch_pools<C>(client: &mut C) -> ProvisionResult<ClusterTopology>
where
    C: AdminClient + ?Sized,
{
    let result = client.query("list pools pool, servers, series").await?;
    let mut pools = Vec::new();
    for row in rows(&result, "pools")? {
        let row = row.as_array().filter(|row| row.len() == 3);
        let pool = match row {
            Some(row) => PoolStatus {
                pool: field_u64(&row[0], "pool")? as u32,
                servers: field_u64(&row[1], "servers")? as u32,
                series: field_u64(&row[2], "series")?,
            },
            None => return Err(ProvisionError::Protocol("malformed pool row in query result".into())),
        };
        pools.push(pool);
    }
    Ok(ClusterTopology::new(pools))
}

/// Fetch the properties of the database being joined.
pub async fn fetch_db_props<C>(client: &mut C) -> ProvisionResult<DatabaseProps>
where
    C: AdminClient + ?Sized,
{
    let result = client
        .query("show timezone,time_precision,duration_log,duration_num,dbname,drop_threshold")
        .await?;
    let mut props = serde_json::Map::new();
    for entry in rows(&result, "data")? {
        if let (Some(name), Some(value)) = (entry.get("name").and_then(Value::as_str), entry.get("value")) {
            props.insert(name.to_string(), value.clone());
        }
    }

    let precision = prop_str(&props, "time_precision")?;
    Ok(DatabaseProps {
        dbname: prop_str(&props, "dbname")?.to_string(),
        time_precision: precision.parse()?,
        duration_num: prop_u64(&props, "duration_num")?,
        duration_log: prop_u64(&props, "duration_log")?,
        timezone: prop_str(&props, "timezone")?.to_string(),
        drop_threshold: props
            .get("drop_threshold")
            .and_then(Value::as_f64)
            .ok_or_else(|| missing_prop("drop_threshold"))?,
    })
}

/// Require every server in the cluster to report a running status.
pub async fn check_all_servers_running<C>(client: &mut C) -> ProvisionResult<()>
where
    C: AdminClient + ?Sized,
{
    let result = client.query("list servers name, status").await?;
    for row in rows(&result, "servers")? {
        let row = match row.as_array().filter(|row| row.len() == 2) {
            Some(row) => row,
            None => return Err(ProvisionError::Protocol("malformed server row in query result".into())),
        };
        let name = row[0].as_str().unwrap_or("<unknown>");
        let status = row[1].as_str().unwrap_or("<unknown>");
        if status != STATUS_RUNNING {
            return Err(ProvisionError::ClusterNotReady(format!(
                "all servers must have status {:?} before we can continue, at least {:?} has status {:?}",
                STATUS_RUNNING, name, status,
            )));
        }
    }
    Ok(())
}

/// Verify the connected user holds full privileges and the remote server runs
/// a compatible version.
pub async fn verify_full_access<C>(client: &mut C, user: &str, tool_version: &str) -> ProvisionResult<()>
where
    C: AdminClient + ?Sized,
{
    let result = client.query("show version").await?;
    let version = rows(&result, "data")?
        .first()
        .and_then(|entry| entry.get("value"))
        .and_then(Value::as_str)
        .ok_or_else(|| ProvisionError::Protocol("missing version in query result".into()))?;
    check_version_parity(tool_version, version)?;

    let result = client.query("list users name, access").await?;
    for row in rows(&result, "users")? {
        let row = match row.as_array().filter(|row| row.len() == 2) {
            Some(row) => row,
            None => continue,
        };
        if row[0].as_str() == Some(user) && row[1].as_str() != Some(FULL_ACCESS) {
            return Err(ProvisionError::Auth(format!("user {:?} has no {:?} privileges", user, FULL_ACCESS)));
        }
    }
    Ok(())
}

fn rows<'a>(result: &'a Value, key: &str) -> ProvisionResult<&'a Vec<Value>> {
    result
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| ProvisionError::Protocol(format!("missing {:?} in query result", key)))
}

fn field_u64(value: &Value, what: &str) -> ProvisionResult<u64> {
    value
        .as_u64()
        .ok_or_else(|| ProvisionError::Protocol(format!("expecting an unsigned integer for {:?} in query result", what)))
}

fn prop_str<'a>(props: &'a serde_json::Map<String, Value>, name: &str) -> ProvisionResult<&'a str> {
    props.get(name).and_then(Value::as_str).ok_or_else(|| missing_prop(name))
}

fn prop_u64(props: &serde_json::Map<String, Value>, name: &str) -> ProvisionResult<u64> {
    props.get(name).and_then(Value::as_u64).ok_or_else(|| missing_prop(name))
}

fn missing_prop(name: &str) -> ProvisionError {
    ProvisionError::Protocol(format!("missing database property {:?} in query result", name))
}
