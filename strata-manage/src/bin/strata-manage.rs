//! The Strata server provisioning tool.

use std::io::Write;

use structopt::StructOpt;

use strata_manage::StrataManage;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = StrataManage::from_args();
    let code = cli.run().await;

    // Ensure any pending output is flushed.
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
    std::process::exit(code);
}
