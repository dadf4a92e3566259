//! The capability trait the upgrader programs against.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::channel::Channel;
use crate::errors::JujuResult;
use crate::status::FullStatus;

/// What a wait-for-idle call covers
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdleScope {
    /// One application and its units
    Application(String),
    /// Every application in the model
    Model,
}

impl fmt::Display for IdleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdleScope::Application(app) => write!(f, "application {app}"),
            IdleScope::Model => write!(f, "the model"),
        }
    }
}

/// The outcome of a controller action run on one unit
#[derive(Clone, Debug, Default)]
pub struct ActionResult {
    /// The action's final status, e.g. `completed` or `failed`
    pub status: String,
    /// The action's result map, verbatim
    pub results: BTreeMap<String, Value>,
}

impl ActionResult {
    /// Whether the action completed successfully.
    pub fn completed(&self) -> bool {
        self.status == "completed"
    }

    /// A string-valued result field, if present.
    pub fn result_str(&self, key: &str) -> Option<&str> {
        self.results.get(key).and_then(Value::as_str)
    }
}

/// The outcome of a raw command executed on one unit
#[derive(Clone, Debug, Default)]
pub struct ExecOutput {
    /// Captured standard output
    pub stdout: String,
    /// The command's exit code
    pub code: i32,
}

/// The narrow capability set the upgrader needs from a controller.
///
/// All calls are asynchronous and cancellable; all failures come back
/// classified as [`crate::JujuError`][]. The retryability policy belongs to
/// the caller.
#[async_trait]
pub trait JujuClient: Send + Sync {
    /// Fetch one full status snapshot of the model.
    async fn status(&self) -> JujuResult<FullStatus>;

    /// Read an application's effective configuration.
    async fn get_config(&self, app: &str) -> JujuResult<BTreeMap<String, Value>>;

    /// Set one configuration option on an application.
    async fn set_config(&self, app: &str, key: &str, value: &str) -> JujuResult<()>;

    /// Refresh an application's charm to the latest revision of its current
    /// channel. This is distinct from a channel switch.
    async fn refresh_charm(&self, app: &str) -> JujuResult<()>;

    /// Switch an application's charm to a different channel.
    async fn set_channel(&self, app: &str, channel: &Channel) -> JujuResult<()>;

    /// Invoke a charm action on one unit and wait for its result.
    async fn run_action(
        &self,
        unit: &str,
        action: &str,
        params: &BTreeMap<String, Value>,
    ) -> JujuResult<ActionResult>;

    /// Execute a raw shell command on one unit.
    async fn run_on_unit(&self, unit: &str, command: &str) -> JujuResult<ExecOutput>;

    /// Block until the scope settles into an idle state or the timeout
    /// expires.
    async fn wait_for_idle(&self, scope: &IdleScope, timeout: Duration) -> JujuResult<()>;
}
