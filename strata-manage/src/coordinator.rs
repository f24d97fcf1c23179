//! The provisioning workflow.
//!
//! Two flows share this module: creating a brand-new single-node database,
//! and joining an existing cluster as a new pool or as the replica of an
//! existing pool. Both walk the same sequence of steps, with the descriptor
//! write as the commit point: nothing before it needs cleanup, everything
//! after it routes through [`RollbackManager`] on failure.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use strata_client::AdminClient;
use strata_core::duration::{resolve_duration, DurationSpec, TimePrecision, DURATIONS};
use strata_core::topology::{plan_pool_assignment, ClusterTopology, JoinMode, ServerRecord};
use strata_core::validate::{validate_buffer_size, validate_new_dbname, DEFAULT_BUFFER_SIZE, MAX_DATABASES};
use strata_core::{ProvisionError, ProvisionResult};

use crate::context::ProvisioningContext;
use crate::descriptor::{DescriptorParams, DescriptorStore, DEFAULT_DROP_THRESHOLD, DEFAULT_TIMEZONE, REINDEX_FILE};
use crate::params::{not_empty, ParamSource};
use crate::remote;
use crate::rollback::RollbackManager;

/// File name of the replicated server list.
pub const SERVERS_FILE: &str = "servers.dat";
/// File name of the replicated user list.
pub const USERS_FILE: &str = "users.dat";
/// File name of the replicated group list.
pub const GROUPS_FILE: &str = "groups.dat";

/// Parameters of a create-new run.
#[derive(Clone, Debug)]
pub struct CreateSpec {
    pub dbname: String,
    pub time_precision: TimePrecision,
    pub duration_num: DurationSpec,
    pub duration_log: DurationSpec,
    pub buffer_size: u64,
    pub buffer_path: Option<PathBuf>,
}

/// Parameters of a join run.
///
/// Fields left `None` are asked through the parameter source at the matching
/// decision point; scripted runs supply everything up front.
#[derive(Clone, Debug, Default)]
pub struct JoinSpec {
    pub remote_address: Option<String>,
    pub remote_port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,
    pub mode: Option<JoinMode>,
    pub buffer_size: Option<u64>,
    pub buffer_path: Option<PathBuf>,
}

/// The result of a completed join workflow.
#[derive(Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The server joined the cluster and the database is live.
    Committed { dbname: String },
    /// The operator backed out before any state was created.
    Aborted,
}

/// Create a brand-new, single-node database on the local server.
pub async fn create_new(ctx: &ProvisioningContext, spec: CreateSpec) -> ProvisionResult<()> {
    validate_new_dbname(&spec.dbname, &ctx.local.databases, MAX_DATABASES)?;
    validate_buffer_size(spec.buffer_size)?;
    let duration_num = resolve_duration(&spec.duration_num, spec.time_precision)?;
    let duration_log = resolve_duration(&spec.duration_log, spec.time_precision)?;

    let dbpath = ctx.settings.default_db_path.join(&spec.dbname);
    let buffer_path = spec.buffer_path.clone().unwrap_or_else(|| dbpath.clone());

    // The commit point: from here on every failure rolls the directory back.
    DescriptorStore::create(
        &dbpath,
        DescriptorParams {
            dbname: spec.dbname.clone(),
            time_precision: spec.time_precision,
            buffer_size: spec.buffer_size,
            duration_num,
            duration_log,
            timezone: DEFAULT_TIMEZONE.to_string(),
            drop_threshold: DEFAULT_DROP_THRESHOLD,
            buffer_path,
            uuid: None,
        },
    )?;
    tracing::info!(dbname = %spec.dbname, "created database");

    match load_and_confirm(ctx, &dbpath, &spec.dbname).await {
        Ok(()) => {
            tracing::info!("database {:?} created successfully", spec.dbname);
            Ok(())
        }
        Err(err) => {
            RollbackManager::run(&dbpath)?;
            Err(err)
        }
    }
}

/// Join an existing cluster, as a new pool or as a replica.
pub async fn join(ctx: &ProvisioningContext, params: &mut dyn ParamSource, spec: JoinSpec) -> ProvisionResult<JoinOutcome> {
    let mut asked = AskedBefore::default();
    let (mut client, dbname) = loop {
        match acquire_remote(ctx, params, &spec, &mut asked).await {
            Ok(acquired) => break acquired,
            // Nothing is persisted yet, the operator may re-enter the remote
            // coordinates and credentials.
            Err(err) if ctx.interactive && params.can_reprompt() => {
                tracing::warn!("{}", err);
                println!("\nPlease verify your input and try again...");
                continue;
            }
            Err(err) => return Err(err),
        }
    };

    let res = join_with_client(ctx, params, client.as_mut(), &spec, &dbname).await;
    client.close().await;
    res
}

/// Remembered answers so a re-entered wizard round shows them as defaults.
#[derive(Default)]
struct AskedBefore {
    address: Option<String>,
    port: Option<u16>,
    user: Option<String>,
}

async fn acquire_remote(
    ctx: &ProvisioningContext, params: &mut dyn ParamSource, spec: &JoinSpec, asked: &mut AskedBefore,
) -> ProvisionResult<(Box<dyn AdminClient>, String)> {
    let address = match &spec.remote_address {
        Some(address) => address.clone(),
        None => params.ask_string(
            "Remote host or IP-address",
            "If your database has already more than one server you can just choose one",
            asked.address.as_deref(),
            &not_empty,
        )?,
    };
    let port = match spec.remote_port {
        Some(port) => port,
        None => {
            let default = i64::from(asked.port.unwrap_or(crate::config::DEFAULT_CLIENT_PORT));
            params.ask_int("Remote client port", "", Some(default), &|value| {
                strata_core::validate::validate_range(*value, 1, 65535, "a port")
            })? as u16
        }
    };
    asked.address = Some(address.clone());
    asked.port = Some(port);

    let remote = ctx.link.server_info(&address, port).await?;
    if remote.databases.is_empty() {
        return Err(ProvisionError::InvalidInput(format!("no databases found in {}:{}", address, port)));
    }
    if remote.version != ctx.local.version {
        return Err(ProvisionError::VersionMismatch {
            local: ctx.local.version.clone(),
            remote: remote.version,
        });
    }

    let dbname = match &spec.dbname {
        Some(name) => {
            if !remote.databases.iter().any(|have| have == name) {
                return Err(ProvisionError::InvalidInput(format!(
                    "database {:?} is not served by {}:{}",
                    name, address, port,
                )));
            }
            name.clone()
        }
        None => {
            let idx = params.choose("Database", "", &remote.databases, Some(0))?;
            remote.databases[idx].clone()
        }
    };
    if ctx.local.databases.iter().any(|have| have == &dbname) {
        return Err(ProvisionError::InvalidInput(format!("database {:?} already exists on this server", dbname)));
    }

    let user = match &spec.user {
        Some(user) => user.clone(),
        None => params.ask_string(
            "User name",
            &format!("The given user name should have {:?} privileges", remote::FULL_ACCESS),
            asked.user.as_deref(),
            &not_empty,
        )?,
    };
    asked.user = Some(user.clone());
    let password = match &spec.password {
        Some(password) => password.clone(),
        None => params.ask_password("Password")?,
    };

    let mut client = ctx.link.connect(&user, &password, &dbname, &address, port).await?;
    remote::verify_full_access(client.as_mut(), &user, &ctx.tool_version).await?;
    Ok((client, dbname))
}

async fn join_with_client(
    ctx: &ProvisioningContext, params: &mut dyn ParamSource, client: &mut dyn AdminClient, spec: &JoinSpec, dbname: &str,
) -> ProvisionResult<JoinOutcome> {
    let topology = fetch_topology(ctx, params, client).await?;

    let (mode, pool) = loop {
        let mode = match spec.mode {
            Some(mode) => mode,
            None => match choose_mode(params, &topology)? {
                Some(mode) => mode,
                None => return Ok(JoinOutcome::Aborted),
            },
        };
        let pool = plan_pool_assignment(&topology, mode)?;
        if spec.mode.is_none() {
            let action = match mode {
                JoinMode::NewPool => format!("create a new pool: {}", pool),
                JoinMode::Replica(_) => format!("create a replica for pool {}", pool),
            };
            if !params.confirm(&format!("Are you sure you want to continue and {}?", action), false)? {
                continue;
            }
        }
        break (mode, pool);
    };

    let props = remote::fetch_db_props(client).await?;
    let buffer_size = match spec.buffer_size {
        Some(size) => {
            validate_buffer_size(size)?;
            size
        }
        None => ask_buffer_size(params)?,
    };

    let dbpath = ctx.settings.default_db_path.join(dbname);
    let buffer_path = match &spec.buffer_path {
        Some(path) => path.clone(),
        None if ctx.interactive => PathBuf::from(params.ask_string(
            "Location to store the buffer file",
            "It can be useful to store the buffer file on a separate (fast) disk, \
             for example a Solid State Drive (SSD).",
            Some(&dbpath.display().to_string()),
            &not_empty,
        )?),
        None => dbpath.clone(),
    };

    // The commit point. The uuid minted here identifies both the database
    // instance and the new server record.
    let server_uuid = Uuid::new_v4();
    DescriptorStore::create(
        &dbpath,
        DescriptorParams {
            dbname: props.dbname.clone(),
            time_precision: props.time_precision,
            buffer_size,
            duration_num: props.duration_num,
            duration_log: props.duration_log,
            timezone: props.timezone.clone(),
            drop_threshold: props.drop_threshold,
            buffer_path,
            uuid: Some(server_uuid),
        },
    )?;
    tracing::info!(dbname = %props.dbname, "added database");

    let record = ServerRecord {
        uuid: server_uuid,
        address: ctx.settings.backend_host.clone(),
        port: ctx.settings.backend_port,
        pool,
    };
    match finish_join(ctx, params, client, &dbpath, dbname, &record, mode == JoinMode::NewPool).await {
        Ok(()) => {
            tracing::info!("finished joining database {:?}...", dbname);
            Ok(JoinOutcome::Committed { dbname: dbname.to_string() })
        }
        Err(err) => {
            RollbackManager::run(&dbpath)?;
            Err(err)
        }
    }
}

async fn finish_join(
    ctx: &ProvisioningContext, params: &mut dyn ParamSource, client: &mut dyn AdminClient, dbpath: &Path, dbname: &str,
    record: &ServerRecord, new_pool: bool,
) -> ProvisionResult<()> {
    replicate_metadata(client, dbpath, record, new_pool).await?;

    let (host, port) = ctx.settings.local_client_addr();
    ctx.link.load_database(dbpath, host, port).await?;
    await_ready(ctx, dbname).await?;
    tracing::info!("database loaded... now register the server");

    remote::check_all_servers_running(client).await?;
    register_with_retry(ctx, params, client, record).await
}

/// Copy the authoritative metadata files from the remote cluster and append
/// this server to the copied server list.
async fn replicate_metadata(client: &mut dyn AdminClient, dbpath: &Path, record: &ServerRecord, new_pool: bool) -> ProvisionResult<()> {
    for name in [SERVERS_FILE, USERS_FILE, GROUPS_FILE] {
        let content = client.fetch_file(name).await?;
        fs::write(dbpath.join(name), &content)
            .map_err(|err| ProvisionError::InvalidInput(format!("error writing {}: {}", name, err)))?;
    }

    let servers_file = dbpath.join(SERVERS_FILE);
    let bytes = fs::read(&servers_file)
        .map_err(|err| ProvisionError::InvalidInput(format!("error reading {}: {}", SERVERS_FILE, err)))?;
    let mut servers: Vec<ServerRecord> = bincode::deserialize(&bytes)
        .map_err(|err| ProvisionError::Protocol(format!("error decoding {}: {}", SERVERS_FILE, err)))?;
    servers.push(record.clone());
    let bytes = bincode::serialize(&servers)
        .map_err(|err| ProvisionError::Protocol(format!("error encoding {}: {}", SERVERS_FILE, err)))?;
    fs::write(&servers_file, bytes)
        .map_err(|err| ProvisionError::InvalidInput(format!("error writing {}: {}", SERVERS_FILE, err)))?;

    if new_pool {
        // A fresh pool still has to build its series index.
        fs::File::create(dbpath.join(REINDEX_FILE))
            .map_err(|err| ProvisionError::InvalidInput(format!("error writing {}: {}", REINDEX_FILE, err)))?;
    }
    Ok(())
}

/// Poll the local server until it reports the new database, within the
/// context's readiness policy.
async fn await_ready(ctx: &ProvisioningContext, dbname: &str) -> ProvisionResult<()> {
    let (host, port) = ctx.settings.local_client_addr();
    for attempt in 0..ctx.ready.attempts {
        if !ctx.ready.settle.is_zero() {
            tokio::time::sleep(ctx.ready.settle).await;
        }
        match ctx.link.server_info(host, port).await {
            Ok(info) if info.databases.iter().any(|name| name == dbname) => return Ok(()),
            Ok(_) => tracing::debug!(attempt, dbname, "database not reported yet"),
            Err(err) => tracing::debug!(attempt, error = %err, "error refreshing local server info"),
        }
    }
    Err(ProvisionError::LoadNotConfirmed(dbname.to_string()))
}

async fn fetch_topology(
    ctx: &ProvisioningContext, params: &mut dyn ParamSource, client: &mut dyn AdminClient,
) -> ProvisionResult<ClusterTopology> {
    loop {
        match remote::fetch_pools(client).await {
            Ok(topology) => return Ok(topology),
            Err(err) if ctx.interactive => {
                tracing::warn!("{}", err);
                let options = ["Retry".to_string(), "Quit".to_string()];
                match params.choose("Do you want to retry?", "", &options, Some(0))? {
                    0 => continue,
                    _ => return Err(err),
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// What the operator picked in the join wizard's mode menu.
#[derive(Clone, Copy, Debug)]
enum JoinAction {
    NewPool,
    Replica,
    ShowStatus,
    Quit,
}

impl JoinAction {
    const MENU: [(JoinAction, &'static str); 4] = [
        (JoinAction::NewPool, "Create a new pool"),
        (JoinAction::Replica, "Create a replica for an existing pool"),
        (JoinAction::ShowStatus, "Show current pools"),
        (JoinAction::Quit, "quit"),
    ];
}

/// The join wizard's mode menu. Returns `None` when the operator quits.
fn choose_mode(params: &mut dyn ParamSource, topology: &ClusterTopology) -> ProvisionResult<Option<JoinMode>> {
    let options: Vec<String> = JoinAction::MENU.iter().map(|(_, text)| text.to_string()).collect();
    loop {
        let idx = params.choose("New pool or extend an existing pool (replica)?", "", &options, None)?;
        match JoinAction::MENU[idx].0 {
            JoinAction::NewPool => return Ok(Some(JoinMode::NewPool)),
            JoinAction::Replica => {
                let candidates: Vec<_> = topology.replica_candidates().collect();
                let mut options: Vec<String> = candidates.iter().map(|pool| format!("Pool ID {}", pool.pool)).collect();
                options.push("Back".to_string());
                let description = if candidates.is_empty() { "(All available pools already have a replica)" } else { "" };
                let idx = params.choose("For which pool do you want to create a replica?", description, &options, None)?;
                if idx < candidates.len() {
                    return Ok(Some(JoinMode::Replica(candidates[idx].pool)));
                }
            }
            JoinAction::ShowStatus => show_pool_status(topology),
            JoinAction::Quit => return Ok(None),
        }
    }
}

fn show_pool_status(topology: &ClusterTopology) {
    println!("{:<10}{:<10}{}", "pool", "servers", "series");
    for pool in topology.pools() {
        println!("{:<10}{:<10}{}", pool.pool, pool.servers, pool.series);
    }
}

async fn register_with_retry(
    ctx: &ProvisioningContext, params: &mut dyn ParamSource, client: &mut dyn AdminClient, record: &ServerRecord,
) -> ProvisionResult<()> {
    loop {
        match client.register_server(record).await {
            Ok(()) => return Ok(()),
            // Registration is idempotent on the server side, resubmitting the
            // identical record is safe.
            Err(err) if ctx.interactive => {
                tracing::warn!("{}", err);
                let options = ["Retry".to_string(), "Quit".to_string()];
                match params.choose("Do you want to retry the registration?", "", &options, Some(0))? {
                    0 => continue,
                    _ => return Err(ProvisionError::Registration("registration aborted".into())),
                }
            }
            Err(err) => return Err(ProvisionError::Registration(err.to_string())),
        }
    }
}

/// Ask for a buffer size, bounded and a multiple of 512.
pub(crate) fn ask_buffer_size(params: &mut dyn ParamSource) -> ProvisionResult<u64> {
    let size = params.ask_int("Buffer size", "", Some(DEFAULT_BUFFER_SIZE as i64), &|value| {
        let size = u64::try_from(*value)
            .map_err(|_| ProvisionError::InvalidInput(format!("expecting a positive buffer size, got {}", value)))?;
        validate_buffer_size(size)
    })?;
    Ok(size as u64)
}

async fn load_and_confirm(ctx: &ProvisioningContext, dbpath: &Path, dbname: &str) -> ProvisionResult<()> {
    let (host, port) = ctx.settings.local_client_addr();
    ctx.link.load_database(dbpath, host, port).await?;
    await_ready(ctx, dbname).await
}

/// The symbolic spans offered by the wizard's duration menus.
pub(crate) fn duration_menu_options() -> Vec<String> {
    DURATIONS.iter().map(|(symbol, _, text)| format!("{} - {}", symbol, text)).collect()
}
