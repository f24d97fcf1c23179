//! Create a new database on the local server.

use std::path::PathBuf;

use structopt::StructOpt;

use strata_core::ProvisionResult;

use crate::context::ProvisioningContext;
use crate::coordinator::{self, CreateSpec};

/// Create a new Strata database.
#[derive(StructOpt)]
#[structopt(name = "create-new")]
pub struct CreateNew {
    /// Database name.
    #[structopt(long)]
    dbname: String,
    /// Alternative location for storing the buffer file.
    #[structopt(long, parse(from_os_str))]
    buffer_path: Option<PathBuf>,
    /// Time precision for the records in the database.
    #[structopt(long, default_value = "ms", possible_values(&["s", "ms", "us", "ns"]))]
    time_precision: String,
    /// Time span used for number (float and integer) shards.
    #[structopt(long, default_value = "1w")]
    duration_num: String,
    /// Time span used for log (string) shards.
    #[structopt(long, default_value = "1d")]
    duration_log: String,
    /// Size in bytes per series for storing points in memory. Use a multiple
    /// of 512 as a buffer size.
    #[structopt(long, default_value = "1024")]
    buffer_size: u64,
}

impl CreateNew {
    pub async fn run(&self, ctx: &ProvisioningContext) -> ProvisionResult<()> {
        let spec = CreateSpec {
            dbname: self.dbname.clone(),
            time_precision: self.time_precision.parse()?,
            duration_num: self.duration_num.parse()?,
            duration_log: self.duration_log.parse()?,
            buffer_size: self.buffer_size,
            buffer_path: self.buffer_path.clone(),
        };
        coordinator::create_new(ctx, spec).await
    }
}
