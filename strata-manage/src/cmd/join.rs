//! Join an existing Strata cluster.

use std::path::PathBuf;

use structopt::StructOpt;

use strata_core::topology::JoinMode;
use strata_core::ProvisionResult;

use crate::context::ProvisioningContext;
use crate::coordinator::{self, JoinSpec};
use crate::params::{InteractivePrompt, ParamSource, ScriptedParams};
use crate::remote::FULL_ACCESS;

/// Create a new pool in a Strata cluster.
#[derive(StructOpt)]
#[structopt(name = "create-pool")]
pub struct CreatePool {
    #[structopt(flatten)]
    common: JoinArgs,
}

impl CreatePool {
    pub async fn run(&self, ctx: &ProvisioningContext) -> ProvisionResult<()> {
        run_scripted(ctx, &self.common, JoinMode::NewPool).await
    }
}

/// Create a new replica in a Strata cluster.
#[derive(StructOpt)]
#[structopt(name = "create-replica")]
pub struct CreateReplica {
    #[structopt(flatten)]
    common: JoinArgs,
    /// Pool ID for which you want to create the replica. A pool can only have
    /// two servers, so you must choose a pool with exactly one server.
    #[structopt(long)]
    pool: u32,
}

impl CreateReplica {
    pub async fn run(&self, ctx: &ProvisioningContext) -> ProvisionResult<()> {
        run_scripted(ctx, &self.common, JoinMode::Replica(self.pool)).await
    }
}

/// Flags shared by both join commands.
#[derive(StructOpt)]
pub struct JoinArgs {
    /// Name of the database you want to join, as served by the remote
    /// cluster.
    #[structopt(long)]
    dbname: String,
    /// Remote host or IP-address of one of the servers in the Strata cluster
    /// you want to join.
    #[structopt(long)]
    remote_address: String,
    /// Remote client port of one of the servers in the Strata cluster you
    /// want to join.
    #[structopt(long, default_value = "9000")]
    remote_port: u16,
    /// User for connecting to the Strata cluster. The user should have
    /// 'full' privileges.
    #[structopt(long)]
    user: String,
    /// You will be prompted for a password when leaving this empty.
    #[structopt(long, default_value = "")]
    password: String,
    /// Alternative location for storing the buffer file.
    #[structopt(long, parse(from_os_str))]
    buffer_path: Option<PathBuf>,
    /// Size in bytes per series for storing points in memory. Use a multiple
    /// of 512 as a buffer size.
    #[structopt(long, default_value = "1024")]
    buffer_size: u64,
}

async fn run_scripted(ctx: &ProvisioningContext, args: &JoinArgs, mode: JoinMode) -> ProvisionResult<()> {
    let password = match args.password.is_empty() {
        // The password is the one flag worth prompting for even in a
        // scripted run, leaving it off the command line keeps it out of the
        // shell history.
        true => InteractivePrompt.ask_password("Password")?,
        false => args.password.clone(),
    };
    let spec = JoinSpec {
        remote_address: Some(args.remote_address.clone()),
        remote_port: Some(args.remote_port),
        user: Some(args.user.clone()),
        password: Some(password),
        dbname: Some(args.dbname.clone()),
        mode: Some(mode),
        buffer_size: Some(args.buffer_size),
        buffer_path: args.buffer_path.clone(),
    };
    tracing::debug!(user = %args.user, access = FULL_ACCESS, "joining through {}:{}", args.remote_address, args.remote_port);

    // Scripted runs never prompt, an unexpected decision point fails closed.
    let mut params = ScriptedParams::default();
    coordinator::join(ctx, &mut params, spec).await.map(|_| ())
}
