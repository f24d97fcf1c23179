//! Workflow context.

use std::time::Duration;

use strata_client::{ClusterLink, InfoSnapshot};

use crate::config::Settings;

/// How long to wait for a freshly-loaded database to be reported by the
/// local server.
///
/// Loading is asynchronous on the server side, so the workflow polls the
/// server's info snapshot instead of expecting a push notification. The
/// policy is explicit so tests can run without delays.
#[derive(Clone, Copy, Debug)]
pub struct ReadyPolicy {
    /// The pause before each poll attempt.
    pub settle: Duration,
    /// The maximum number of poll attempts.
    pub attempts: u32,
}

impl Default for ReadyPolicy {
    fn default() -> Self {
        Self { settle: Duration::from_secs(1), attempts: 2 }
    }
}

/// Everything a provisioning run needs, passed explicitly through every
/// operation.
pub struct ProvisioningContext {
    /// Server-wide settings from the global configuration file.
    pub settings: Settings,
    /// The version baked into this tool.
    pub tool_version: String,
    /// The local server's info snapshot, taken once at startup.
    pub local: InfoSnapshot,
    /// Whether decision points may prompt. Scripted runs never prompt and
    /// fail closed instead.
    pub interactive: bool,
    /// The readiness confirmation policy.
    pub ready: ReadyPolicy,
    /// The client capability used for every server interaction.
    pub link: Box<dyn ClusterLink>,
}
