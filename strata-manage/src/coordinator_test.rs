use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use strata_client::{AdminClient, ClusterLink, InfoSnapshot, OpCode};
use strata_core::duration::{DurationSpec, TimePrecision};
use strata_core::topology::{JoinMode, ServerRecord};
use strata_core::{ProvisionError, ProvisionResult};

use crate::config::Settings;
use crate::context::{ProvisioningContext, ReadyPolicy};
use crate::coordinator::{self, CreateSpec, JoinOutcome, JoinSpec, GROUPS_FILE, SERVERS_FILE, USERS_FILE};
use crate::descriptor::{DescriptorStore, REINDEX_FILE};
use crate::params::ScriptedParams;

const VERSION: &str = "2.0.3";

/// A scripted stand-in for a running cluster: one local server plus one
/// remote server holding the database being joined.
#[derive(Clone)]
struct Cluster {
    inner: Arc<Mutex<ClusterState>>,
}

struct ClusterState {
    local_databases: Vec<String>,
    remote_version: String,
    remote_databases: Vec<String>,
    pools: Vec<(u64, u64, u64)>,
    servers: Vec<(String, String)>,
    users: Vec<(String, String)>,
    files: HashMap<String, Vec<u8>>,
    fail_load: bool,
    register_failures_left: u32,
    register_attempts: Vec<ServerRecord>,
    registered: Vec<ServerRecord>,
}

impl Cluster {
    fn new() -> Self {
        let seed = ServerRecord {
            uuid: Uuid::new_v4(),
            address: "db01.example.org".to_string(),
            port: 9010,
            pool: 0,
        };
        let mut files = HashMap::new();
        files.insert(SERVERS_FILE.to_string(), bincode::serialize(&vec![seed]).unwrap());
        files.insert(USERS_FILE.to_string(), b"remote user list".to_vec());
        files.insert(GROUPS_FILE.to_string(), b"remote group list".to_vec());
        Self {
            inner: Arc::new(Mutex::new(ClusterState {
                local_databases: Vec::new(),
                remote_version: VERSION.to_string(),
                remote_databases: vec!["tsdb".to_string()],
                pools: vec![(0, 2, 1234)],
                servers: vec![("server0".to_string(), "running".to_string())],
                users: vec![("iris".to_string(), "full".to_string())],
                files,
                fail_load: false,
                register_failures_left: 0,
                register_attempts: Vec::new(),
                registered: Vec::new(),
            })),
        }
    }

    fn with<F: FnOnce(&mut ClusterState)>(self, f: F) -> Self {
        f(&mut self.inner.lock().unwrap());
        self
    }

    fn state<T>(&self, f: impl FnOnce(&ClusterState) -> T) -> T {
        f(&self.inner.lock().unwrap())
    }
}

struct MockLink {
    cluster: Cluster,
}

#[async_trait]
impl ClusterLink for MockLink {
    async fn server_info(&self, host: &str, _port: u16) -> ProvisionResult<InfoSnapshot> {
        let state = self.cluster.inner.lock().unwrap();
        if host == "localhost" {
            Ok(InfoSnapshot { version: VERSION.to_string(), databases: state.local_databases.clone() })
        } else {
            Ok(InfoSnapshot { version: state.remote_version.clone(), databases: state.remote_databases.clone() })
        }
    }

    async fn load_database(&self, dbpath: &Path, _host: &str, _port: u16) -> ProvisionResult<()> {
        let mut state = self.cluster.inner.lock().unwrap();
        if state.fail_load {
            return Err(ProvisionError::Timeout("waiting for the load command ack from localhost:9000".into()));
        }
        let dbname = dbpath.file_name().expect("dbpath must name a directory").to_string_lossy().to_string();
        state.local_databases.push(dbname);
        Ok(())
    }

    async fn connect(&self, _user: &str, _password: &str, _dbname: &str, _host: &str, _port: u16) -> ProvisionResult<Box<dyn AdminClient>> {
        Ok(Box::new(MockAdmin { cluster: self.cluster.clone() }))
    }
}

struct MockAdmin {
    cluster: Cluster,
}

#[async_trait]
impl AdminClient for MockAdmin {
    async fn query(&mut self, statement: &str) -> ProvisionResult<Value> {
        let state = self.cluster.inner.lock().unwrap();
        match statement {
            "list pools pool, servers, series" => {
                let pools: Vec<Value> = state.pools.iter().map(|(p, s, n)| json!([p, s, n])).collect();
                Ok(json!({ "pools": pools }))
            }
            "show version" => Ok(json!({"data": [{"name": "version", "value": state.remote_version}]})),
            "list users name, access" => {
                let users: Vec<Value> = state.users.iter().map(|(name, access)| json!([name, access])).collect();
                Ok(json!({ "users": users }))
            }
            "list servers name, status" => {
                let servers: Vec<Value> = state.servers.iter().map(|(name, status)| json!([name, status])).collect();
                Ok(json!({ "servers": servers }))
            }
            "show timezone,time_precision,duration_log,duration_num,dbname,drop_threshold" => Ok(json!({"data": [
                {"name": "dbname", "value": "tsdb"},
                {"name": "time_precision", "value": "ms"},
                {"name": "duration_num", "value": 604_800_000u64},
                {"name": "duration_log", "value": 86_400_000u64},
                {"name": "timezone", "value": "NAIVE"},
                {"name": "drop_threshold", "value": 1.0},
            ]})),
            other => Err(ProvisionError::Query(format!("unexpected statement: {}", other))),
        }
    }

    async fn raw_command(&mut self, _opcode: OpCode, _payload: Vec<u8>, _deadline: Duration) -> ProvisionResult<()> {
        Ok(())
    }

    async fn fetch_file(&mut self, name: &str) -> ProvisionResult<Vec<u8>> {
        let state = self.cluster.inner.lock().unwrap();
        state
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| ProvisionError::Transport(format!("no such file: {}", name)))
    }

    async fn register_server(&mut self, record: &ServerRecord) -> ProvisionResult<()> {
        let mut state = self.cluster.inner.lock().unwrap();
        state.register_attempts.push(record.clone());
        if state.register_failures_left > 0 {
            state.register_failures_left -= 1;
            return Err(ProvisionError::Transport("connection reset during registration".into()));
        }
        // The cluster registers each server identity once, resubmissions of
        // the same record are absorbed.
        if !state.registered.iter().any(|have| have.uuid == record.uuid) {
            state.registered.push(record.clone());
        }
        Ok(())
    }

    async fn close(&mut self) {}
}

fn test_ctx(dir: &Path, cluster: &Cluster, interactive: bool) -> ProvisioningContext {
    let mut settings = Settings::default();
    settings.default_db_path = dir.join("dbs");
    settings.backend_host = "db02.example.org".to_string();
    settings.backend_port = 9010;
    let local = InfoSnapshot {
        version: VERSION.to_string(),
        databases: cluster.state(|s| s.local_databases.clone()),
    };
    ProvisioningContext {
        settings,
        tool_version: VERSION.to_string(),
        local,
        interactive,
        ready: ReadyPolicy { settle: Duration::from_millis(0), attempts: 2 },
        link: Box::new(MockLink { cluster: cluster.clone() }),
    }
}

fn create_spec(dbname: &str) -> CreateSpec {
    CreateSpec {
        dbname: dbname.to_string(),
        time_precision: TimePrecision::Millisecond,
        duration_num: DurationSpec::Span("1w".into()),
        duration_log: DurationSpec::Span("1d".into()),
        buffer_size: 1024,
        buffer_path: None,
    }
}

fn join_spec(mode: JoinMode) -> JoinSpec {
    JoinSpec {
        remote_address: Some("db01.example.org".to_string()),
        remote_port: Some(9000),
        user: Some("iris".to_string()),
        password: Some("siri".to_string()),
        dbname: Some("tsdb".to_string()),
        mode: Some(mode),
        buffer_size: Some(1024),
        buffer_path: None,
    }
}

#[tokio::test]
async fn create_new_persists_the_resolved_descriptor() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let cluster = Cluster::new();
    let ctx = test_ctx(tmp.path(), &cluster, false);

    coordinator::create_new(&ctx, create_spec("mydb")).await?;

    let descriptor = DescriptorStore::read(&ctx.settings.default_db_path.join("mydb"))?;
    assert_eq!(descriptor.schema_version, 1);
    assert_eq!(descriptor.dbname, "mydb");
    assert_eq!(descriptor.time_precision, TimePrecision::Millisecond);
    assert_eq!(descriptor.duration_log, 86_400_000, "1d at ms precision");
    assert_eq!(descriptor.duration_num, 604_800_000, "1w at ms precision");
    assert!(cluster.state(|s| s.local_databases.contains(&"mydb".to_string())), "the server must have loaded the database");
    Ok(())
}

#[tokio::test]
async fn create_new_rejects_duplicates_without_creating_state() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let cluster = Cluster::new().with(|s| s.local_databases.push("mydb".to_string()));
    let ctx = test_ctx(tmp.path(), &cluster, false);

    let err = coordinator::create_new(&ctx, create_spec("mydb")).await.unwrap_err();
    assert!(matches!(err, ProvisionError::InvalidInput(_)), "got {:?}", err);
    assert!(!ctx.settings.default_db_path.join("mydb").exists(), "no directory may be created");
    Ok(())
}

#[tokio::test]
async fn create_new_rolls_back_when_loading_times_out() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let cluster = Cluster::new().with(|s| s.fail_load = true);
    let ctx = test_ctx(tmp.path(), &cluster, false);

    let err = coordinator::create_new(&ctx, create_spec("mydb")).await.unwrap_err();
    assert!(matches!(err, ProvisionError::Timeout(_)), "got {:?}", err);
    assert!(
        !ctx.settings.default_db_path.join("mydb").exists(),
        "the created directory must be rolled back entirely"
    );
    Ok(())
}

#[tokio::test]
async fn create_new_rolls_back_when_the_database_never_reports() -> Result<()> {
    // The load command is accepted but the server never lists the database.
    struct SilentLink {
        cluster: Cluster,
    }

    #[async_trait]
    impl ClusterLink for SilentLink {
        async fn server_info(&self, host: &str, port: u16) -> ProvisionResult<InfoSnapshot> {
            MockLink { cluster: self.cluster.clone() }.server_info(host, port).await
        }

        async fn load_database(&self, _dbpath: &Path, _host: &str, _port: u16) -> ProvisionResult<()> {
            Ok(())
        }

        async fn connect(&self, user: &str, password: &str, dbname: &str, host: &str, port: u16) -> ProvisionResult<Box<dyn AdminClient>> {
            MockLink { cluster: self.cluster.clone() }.connect(user, password, dbname, host, port).await
        }
    }

    let tmp = tempfile::tempdir()?;
    let cluster = Cluster::new();
    let mut ctx = test_ctx(tmp.path(), &cluster, false);
    ctx.link = Box::new(SilentLink { cluster: cluster.clone() });

    let err = coordinator::create_new(&ctx, create_spec("mydb")).await.unwrap_err();
    assert!(matches!(err, ProvisionError::LoadNotConfirmed(_)), "got {:?}", err);
    assert!(!ctx.settings.default_db_path.join("mydb").exists());
    Ok(())
}

#[tokio::test]
async fn joining_a_new_pool_replicates_and_registers() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let cluster = Cluster::new();
    let ctx = test_ctx(tmp.path(), &cluster, false);
    let mut params = ScriptedParams::default();

    let outcome = coordinator::join(&ctx, &mut params, join_spec(JoinMode::NewPool)).await?;
    assert_eq!(outcome, JoinOutcome::Committed { dbname: "tsdb".to_string() });

    let dbpath = ctx.settings.default_db_path.join("tsdb");
    let descriptor = DescriptorStore::read(&dbpath)?;
    assert_eq!(descriptor.dbname, "tsdb");
    assert_eq!(descriptor.duration_num, 604_800_000, "durations are copied as raw ticks");

    // The copied server list must carry the seed server plus this one.
    let servers: Vec<ServerRecord> = bincode::deserialize(&std::fs::read(dbpath.join(SERVERS_FILE))?)?;
    assert_eq!(servers.len(), 2);
    assert_eq!(servers[1].pool, 1, "a new pool takes the next sequential id");
    assert_eq!(servers[1].address, "db02.example.org");
    assert_eq!(servers[1].port, 9010);
    assert_eq!(servers[1].uuid, descriptor.uuid, "database and server share one minted id");

    assert_eq!(std::fs::read(dbpath.join(USERS_FILE))?, b"remote user list");
    assert_eq!(std::fs::read(dbpath.join(GROUPS_FILE))?, b"remote group list");
    assert!(dbpath.join(REINDEX_FILE).exists(), "a new pool needs the reindex marker");

    let registered = cluster.state(|s| s.registered.clone());
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0], servers[1]);
    Ok(())
}

#[tokio::test]
async fn joining_as_replica_skips_the_reindex_marker() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let cluster = Cluster::new().with(|s| s.pools = vec![(0, 2, 10), (1, 1, 5)]);
    let ctx = test_ctx(tmp.path(), &cluster, false);
    let mut params = ScriptedParams::default();

    let outcome = coordinator::join(&ctx, &mut params, join_spec(JoinMode::Replica(1))).await?;
    assert_eq!(outcome, JoinOutcome::Committed { dbname: "tsdb".to_string() });

    let dbpath = ctx.settings.default_db_path.join("tsdb");
    assert!(!dbpath.join(REINDEX_FILE).exists(), "replicas mirror existing data, no reindex");

    let servers: Vec<ServerRecord> = bincode::deserialize(&std::fs::read(dbpath.join(SERVERS_FILE))?)?;
    assert_eq!(servers[1].pool, 1);
    Ok(())
}

#[tokio::test]
async fn a_full_pool_fails_planning_before_anything_is_created() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let cluster = Cluster::new();
    let ctx = test_ctx(tmp.path(), &cluster, false);
    let mut params = ScriptedParams::default();

    let err = coordinator::join(&ctx, &mut params, join_spec(JoinMode::Replica(0))).await.unwrap_err();
    assert!(matches!(err, ProvisionError::PoolNotEligible(_)), "got {:?}", err);
    assert!(!ctx.settings.default_db_path.join("tsdb").exists(), "planning failures must not create a directory");
    Ok(())
}

#[tokio::test]
async fn a_load_timeout_during_join_rolls_back() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let cluster = Cluster::new().with(|s| s.fail_load = true);
    let ctx = test_ctx(tmp.path(), &cluster, false);
    let mut params = ScriptedParams::default();

    let err = coordinator::join(&ctx, &mut params, join_spec(JoinMode::NewPool)).await.unwrap_err();
    assert!(matches!(err, ProvisionError::Timeout(_)), "got {:?}", err);
    assert!(!ctx.settings.default_db_path.join("tsdb").exists());
    assert!(cluster.state(|s| s.registered.is_empty()), "nothing may be registered after rollback");
    Ok(())
}

#[tokio::test]
async fn a_stopped_cluster_member_rolls_back() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let cluster = Cluster::new().with(|s| s.servers.push(("server1".to_string(), "synchronizing".to_string())));
    let ctx = test_ctx(tmp.path(), &cluster, false);
    let mut params = ScriptedParams::default();

    let err = coordinator::join(&ctx, &mut params, join_spec(JoinMode::NewPool)).await.unwrap_err();
    assert!(matches!(err, ProvisionError::ClusterNotReady(_)), "got {:?}", err);
    assert!(!ctx.settings.default_db_path.join("tsdb").exists());
    Ok(())
}

#[tokio::test]
async fn interactive_registration_retry_resubmits_the_identical_record() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let cluster = Cluster::new().with(|s| s.register_failures_left = 1);
    let ctx = test_ctx(tmp.path(), &cluster, true);
    // One scripted answer: retry after the first registration failure.
    let mut params = ScriptedParams::new(["0"]);

    let mut spec = join_spec(JoinMode::NewPool);
    spec.buffer_path = Some(ctx.settings.default_db_path.join("tsdb"));
    let outcome = coordinator::join(&ctx, &mut params, spec).await?;
    assert_eq!(outcome, JoinOutcome::Committed { dbname: "tsdb".to_string() });

    let attempts = cluster.state(|s| s.register_attempts.clone());
    assert_eq!(attempts.len(), 2, "the failed submission must be retried once");
    assert_eq!(attempts[0], attempts[1], "the retry must resubmit the identical record");
    assert_eq!(cluster.state(|s| s.registered.len()), 1, "no duplicate entry may appear");
    Ok(())
}

#[tokio::test]
async fn aborting_the_registration_retry_rolls_back() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let cluster = Cluster::new().with(|s| s.register_failures_left = 10);
    let ctx = test_ctx(tmp.path(), &cluster, true);
    // One scripted answer: quit instead of retrying.
    let mut params = ScriptedParams::new(["1"]);

    let mut spec = join_spec(JoinMode::NewPool);
    spec.buffer_path = Some(ctx.settings.default_db_path.join("tsdb"));
    let err = coordinator::join(&ctx, &mut params, spec).await.unwrap_err();
    assert!(matches!(err, ProvisionError::Registration(_)), "got {:?}", err);
    assert!(!ctx.settings.default_db_path.join("tsdb").exists());
    Ok(())
}

#[tokio::test]
async fn scripted_registration_failures_roll_back_immediately() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let cluster = Cluster::new().with(|s| s.register_failures_left = 10);
    let ctx = test_ctx(tmp.path(), &cluster, false);
    let mut params = ScriptedParams::default();

    let err = coordinator::join(&ctx, &mut params, join_spec(JoinMode::NewPool)).await.unwrap_err();
    assert!(matches!(err, ProvisionError::Registration(_)), "got {:?}", err);
    assert_eq!(cluster.state(|s| s.register_attempts.len()), 1, "scripted runs never retry");
    assert!(!ctx.settings.default_db_path.join("tsdb").exists());
    Ok(())
}

#[tokio::test]
async fn a_remote_version_mismatch_stops_the_join_early() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let cluster = Cluster::new().with(|s| s.remote_version = "2.1.0".to_string());
    let ctx = test_ctx(tmp.path(), &cluster, false);
    let mut params = ScriptedParams::default();

    let err = coordinator::join(&ctx, &mut params, join_spec(JoinMode::NewPool)).await.unwrap_err();
    assert!(matches!(err, ProvisionError::VersionMismatch { .. }), "got {:?}", err);
    assert!(!ctx.settings.default_db_path.join("tsdb").exists());
    Ok(())
}

#[tokio::test]
async fn a_dbname_unknown_to_the_remote_is_rejected() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let cluster = Cluster::new();
    let ctx = test_ctx(tmp.path(), &cluster, false);
    let mut params = ScriptedParams::default();

    let mut spec = join_spec(JoinMode::NewPool);
    spec.dbname = Some("elsewhere".to_string());
    let err = coordinator::join(&ctx, &mut params, spec).await.unwrap_err();
    assert!(matches!(err, ProvisionError::InvalidInput(_)), "got {:?}", err);
    Ok(())
}

#[tokio::test]
async fn a_database_already_present_locally_cannot_be_joined() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let cluster = Cluster::new().with(|s| s.local_databases.push("tsdb".to_string()));
    let ctx = test_ctx(tmp.path(), &cluster, false);
    let mut params = ScriptedParams::default();

    let err = coordinator::join(&ctx, &mut params, join_spec(JoinMode::NewPool)).await.unwrap_err();
    assert!(matches!(err, ProvisionError::InvalidInput(_)), "got {:?}", err);
    Ok(())
}

#[tokio::test]
async fn the_wizard_path_walks_every_decision_point() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let cluster = Cluster::new();
    let ctx = test_ctx(tmp.path(), &cluster, true);

    // Address, port (default), database pick, user, password, mode menu,
    // confirmation, buffer size (default), buffer path (default).
    let mut params = ScriptedParams::new(["db01.example.org", "", "0", "iris", "siri", "0", "y", "", ""]);

    let outcome = coordinator::join(&ctx, &mut params, JoinSpec::default()).await?;
    assert_eq!(outcome, JoinOutcome::Committed { dbname: "tsdb".to_string() });
    assert_eq!(cluster.state(|s| s.registered.len()), 1);
    Ok(())
}
