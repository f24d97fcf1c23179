//! The interactive wizard.

use std::path::PathBuf;

use strata_core::duration::{DurationSpec, TimePrecision, DURATIONS};
use strata_core::validate::{validate_new_dbname, MAX_DATABASES};
use strata_core::ProvisionResult;

use crate::context::ProvisioningContext;
use crate::coordinator::{self, CreateSpec, JoinSpec};
use crate::params::{not_empty, InteractivePrompt, ParamSource};

/// What the operator picked in the top-level menu.
#[derive(Clone, Copy, Debug)]
enum MainAction {
    Create,
    Join,
    Quit,
}

impl MainAction {
    const MENU: [(MainAction, &'static str); 3] = [
        (MainAction::Create, "create a new database"),
        (MainAction::Join, "join an existing Strata cluster"),
        (MainAction::Quit, "quit"),
    ];
}

/// Run the top-level wizard menu.
pub async fn main_menu(ctx: &ProvisioningContext) -> ProvisionResult<()> {
    let mut params = InteractivePrompt;
    let options: Vec<String> = MainAction::MENU.iter().map(|(_, text)| text.to_string()).collect();
    let idx = params.choose("Tell me what you plan to do:", "", &options, None)?;
    match MainAction::MENU[idx].0 {
        MainAction::Create => create_wizard(ctx, &mut params).await,
        MainAction::Join => join_wizard(ctx, &mut params).await,
        MainAction::Quit => Ok(()),
    }
}

async fn create_wizard(ctx: &ProvisioningContext, params: &mut dyn ParamSource) -> ProvisionResult<()> {
    let local = ctx.local.databases.clone();
    let dbname = params.ask_string(
        "Type a name for the new database",
        "Note: this value cannot be changed after the database has been created",
        None,
        &|name| validate_new_dbname(name, &local, MAX_DATABASES),
    )?;
    let dbpath = ctx.settings.default_db_path.join(&dbname);

    let buffer_path = params.ask_string(
        "Location to store the buffer file",
        "It can be useful to store the buffer file on a separate (fast) disk, \
         for example a Solid State Drive (SSD).",
        Some(&dbpath.display().to_string()),
        &not_empty,
    )?;

    let precisions = TimePrecision::all();
    let options: Vec<String> = precisions.iter().map(|p| p.description().to_string()).collect();
    let idx = params.choose("Time precision", "", &options, Some(1))?;
    let time_precision = precisions[idx];

    let durations = coordinator::duration_menu_options();
    let num_idx = params.choose("Number (float and integer) sharding duration", "", &durations, Some(7))?;
    let log_idx = params.choose("Log (string) sharding duration", "", &durations, Some(4))?;

    let buffer_size = coordinator::ask_buffer_size(params)?;

    let spec = CreateSpec {
        dbname,
        time_precision,
        duration_num: DurationSpec::Span(DURATIONS[num_idx].0.to_string()),
        duration_log: DurationSpec::Span(DURATIONS[log_idx].0.to_string()),
        buffer_size,
        buffer_path: Some(PathBuf::from(buffer_path)),
    };
    coordinator::create_new(ctx, spec).await
}

async fn join_wizard(ctx: &ProvisioningContext, params: &mut dyn ParamSource) -> ProvisionResult<()> {
    // Every decision point is asked interactively.
    coordinator::join(ctx, params, JoinSpec::default()).await.map(|_| ())
}
