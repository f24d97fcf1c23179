//! The Strata server provisioning tool.

mod cmd;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod descriptor;
pub mod params;
pub mod remote;
pub mod rollback;

#[cfg(test)]
mod coordinator_test;

use std::path::PathBuf;

use anyhow::anyhow;
use structopt::StructOpt;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use strata_client::{ClusterLink, NativeLink};
use strata_core::version::check_version_parity;
use strata_core::ProvisionError;

use crate::config::Settings;
use crate::context::{ProvisioningContext, ReadyPolicy};

/// Exit code for operational failures, validation errors included.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for environment, privilege and interrupt conditions.
pub const EXIT_ENVIRONMENT: i32 = 2;

/// The Strata server provisioning tool.
///
/// Without a subcommand an interactive wizard is shown. The subcommands cover
/// the same flows for scripted use, where nothing is ever prompted and every
/// failure aborts.
#[derive(StructOpt)]
#[structopt(name = "strata-manage")]
pub struct StrataManage {
    #[structopt(subcommand)]
    action: Option<Action>,
    /// Path to the global configuration file.
    #[structopt(short = "c", long = "config", default_value = "/etc/strata/strata.conf", parse(from_os_str))]
    config: PathBuf,
    /// Allow this tool to run as another user than root.
    #[structopt(short = "n", long = "noroot")]
    noroot: bool,
    /// Set the log level.
    #[structopt(short = "l", long = "log-level", default_value = "info", possible_values(&["debug", "info", "warning", "error"]))]
    log_level: String,
    /// Print version information and exit.
    #[structopt(short = "v", long = "version")]
    version: bool,
}

#[derive(StructOpt)]
pub enum Action {
    /// Create a new Strata database.
    #[structopt(name = "create-new")]
    CreateNew(cmd::create::CreateNew),
    /// Create a new pool in a Strata cluster.
    #[structopt(name = "create-pool")]
    CreatePool(cmd::join::CreatePool),
    /// Create a new replica in a Strata cluster.
    #[structopt(name = "create-replica")]
    CreateReplica(cmd::join::CreateReplica),
}

/// Failure classes, used to derive the process exit code.
enum RunError {
    /// The environment is unusable: privileges, configuration, or an
    /// unreachable/incompatible local server. Nothing was persisted.
    Environment(anyhow::Error),
    /// The workflow itself failed. Any persisted state has been rolled back
    /// already, unless rollback itself failed, which the error then says.
    Operational(ProvisionError),
}

impl StrataManage {
    pub async fn run(self) -> i32 {
        // Initialize logging based on CLI config.
        let fmt_layer = fmt::layer().with_target(false);
        let (filter_layer, level_filter) = match self.log_level.as_str() {
            "debug" => (EnvFilter::new("debug"), LevelFilter::DEBUG),
            "warning" => (EnvFilter::new("warn"), LevelFilter::WARN),
            "error" => (EnvFilter::new("error"), LevelFilter::ERROR),
            _ => (EnvFilter::new("info"), LevelFilter::INFO),
        };
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(level_filter)
            .init();

        if self.version {
            println!("Strata Manage {}", env!("CARGO_PKG_VERSION"));
            return 0;
        }

        let workflow = self.execute();
        tokio::pin!(workflow);
        tokio::select! {
            res = &mut workflow => match res {
                Ok(()) => {
                    tracing::info!("exit manage Strata... bye!");
                    0
                }
                Err(RunError::Environment(err)) => {
                    tracing::error!("{:#}", err);
                    EXIT_ENVIRONMENT
                }
                Err(RunError::Operational(err)) => {
                    tracing::error!("{}", err);
                    EXIT_FAILURE
                }
            },
            _ = tokio::signal::ctrl_c() => {
                // No rollback from here: deleting freshly-persisted state
                // while the workflow future is being torn down would race its
                // in-flight writes. Dropping the future closes any open admin
                // connection; persisted state is left for manual cleanup.
                tracing::error!("interrupted, quitting...");
                EXIT_ENVIRONMENT
            }
        }
    }

    async fn execute(self) -> Result<(), RunError> {
        // Environment gates. Nothing is persisted before these pass.
        if !self.noroot && unsafe { libc::geteuid() } != 0 {
            return Err(RunError::Environment(anyhow!(
                "only root can run this tool, add the --noroot argument if you are sure you want to run as another user"
            )));
        }

        let settings = Settings::load(&self.config).map_err(RunError::Environment)?;
        let link = NativeLink;
        let (host, port) = settings.local_client_addr();
        let local = link.server_info(host, port).await.map_err(|err| {
            RunError::Environment(anyhow!(
                "unable to get local server info, please check whether the Strata server is running and listening on {}:{} ({})",
                host, port, err,
            ))
        })?;

        let tool_version = env!("CARGO_PKG_VERSION").to_string();
        check_version_parity(&tool_version, &local.version).map_err(|_| {
            RunError::Environment(anyhow!(
                "the Strata server (version {}) should have the same version as this manage tool (version {})",
                local.version, tool_version,
            ))
        })?;

        let ctx = ProvisioningContext {
            settings,
            tool_version,
            local,
            interactive: self.action.is_none(),
            ready: ReadyPolicy::default(),
            link: Box::new(link),
        };

        let res = match &self.action {
            None => cmd::menu::main_menu(&ctx).await,
            Some(Action::CreateNew(inner)) => inner.run(&ctx).await,
            Some(Action::CreatePool(inner)) => inner.run(&ctx).await,
            Some(Action::CreateReplica(inner)) => inner.run(&ctx).await,
        };
        res.map_err(RunError::Operational)
    }
}
