//! The stock [`JujuClient`][] implementation, a thin wrapper over the `juju`
//! binary.
//!
//! Every call shells out to `juju` with `--format=json` where output is
//! consumed, classifies failures from the process's stderr, and never caches
//! anything. Anything smarter than that belongs above the trait.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::channel::Channel;
use crate::client::{ActionResult, ExecOutput, IdleScope, JujuClient};
use crate::errors::{JujuError, JujuResult};
use crate::status::FullStatus;

/// A [`JujuClient`][] that drives the locally installed `juju` binary.
///
/// Credentials come from the ambient `$JUJU_DATA` directory (see
/// [`crate::home::juju_data_dir`][]); the binary reads it directly.
#[derive(Clone, Debug, Default)]
pub struct CliJuju {
    model: Option<String>,
}

impl CliJuju {
    /// A client for the given model, or the currently selected one.
    pub fn new(model: Option<String>) -> Self {
        CliJuju { model }
    }

    fn command(&self, sub: &str) -> Command {
        let mut cmd = Command::new("juju");
        cmd.arg(sub);
        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command, what: &str) -> JujuResult<String> {
        debug!(target: "cou::juju", "running {cmd:?}");
        let output = cmd.output().await.map_err(|err| JujuError::Other {
            message: format!("failed to spawn juju: {err}"),
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        Err(classify(what, stderr.trim()))
    }

    /// The model `juju` would act on, resolving the ambient selection when no
    /// `--model` was given.
    async fn current_model(&self) -> JujuResult<String> {
        if let Some(model) = &self.model {
            return Ok(model.clone());
        }
        let mut cmd = Command::new("juju");
        cmd.arg("switch");
        let out = self.run(cmd, "the current model").await?;
        let out = out.trim();
        let model = out.rsplit(':').next().unwrap_or(out);
        if model.is_empty() {
            return Err(JujuError::Other {
                message: "no model is currently selected".to_owned(),
            });
        }
        Ok(model.to_owned())
    }
}

/// Map a failed `juju` invocation onto the error taxonomy.
fn classify(what: &str, stderr: &str) -> JujuError {
    let lower = stderr.to_lowercase();
    const TRANSIENT: &[&str] = &[
        "connection refused",
        "connection reset",
        "connection is shut down",
        "no route to host",
        "cannot connect",
        "i/o timeout",
        "unexpected eof",
        "timed out",
    ];
    if TRANSIENT.iter().any(|needle| lower.contains(needle)) {
        return JujuError::TransientConnection {
            message: stderr.to_owned(),
        };
    }
    if lower.contains("permission denied")
        || lower.contains("unauthorized")
        || lower.contains("invalid entity name or password")
    {
        return JujuError::Permission {
            message: stderr.to_owned(),
        };
    }
    if lower.contains("not found") {
        return JujuError::NotFound {
            entity: what.to_owned(),
        };
    }
    JujuError::Other {
        message: stderr.to_owned(),
    }
}

/// Render an action parameter the way `juju run` expects it on argv.
fn param_arg(key: &str, value: &Value) -> String {
    match value {
        Value::String(s) => format!("{key}={s}"),
        other => format!("{key}={other}"),
    }
}

#[async_trait]
impl JujuClient for CliJuju {
    async fn status(&self) -> JujuResult<FullStatus> {
        let mut cmd = self.command("status");
        cmd.arg("--format=json");
        let out = self.run(cmd, "the model status").await?;
        serde_json::from_str(&out).map_err(|err| JujuError::Other {
            message: format!("unparseable status response: {err}"),
        })
    }

    async fn get_config(&self, app: &str) -> JujuResult<BTreeMap<String, Value>> {
        let mut cmd = self.command("config");
        cmd.arg(app).arg("--format=json");
        let out = self.run(cmd, &format!("application {app}")).await?;
        let doc: Value = serde_json::from_str(&out).map_err(|err| JujuError::Other {
            message: format!("unparseable config response for {app}: {err}"),
        })?;
        // `juju config` nests each option as {"value": ..., "source": ...}.
        let mut config = BTreeMap::new();
        if let Some(settings) = doc.get("settings").and_then(Value::as_object) {
            for (key, entry) in settings {
                let value = entry.get("value").cloned().unwrap_or(Value::Null);
                config.insert(key.clone(), value);
            }
        }
        Ok(config)
    }

    async fn set_config(&self, app: &str, key: &str, value: &str) -> JujuResult<()> {
        let mut cmd = self.command("config");
        cmd.arg(app).arg(format!("{key}={value}"));
        self.run(cmd, &format!("application {app}")).await?;
        Ok(())
    }

    async fn refresh_charm(&self, app: &str) -> JujuResult<()> {
        let mut cmd = self.command("refresh");
        cmd.arg(app);
        match self.run(cmd, &format!("application {app}")).await {
            Ok(_) => Ok(()),
            // Being on the newest revision already is a success for us.
            Err(JujuError::Other { message }) if message.contains("already running") => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn set_channel(&self, app: &str, channel: &Channel) -> JujuResult<()> {
        let mut cmd = self.command("refresh");
        cmd.arg(app).arg("--channel").arg(channel.to_string());
        match self.run(cmd, &format!("application {app}")).await {
            Ok(_) => Ok(()),
            Err(JujuError::Other { message }) if message.contains("already running") => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn run_action(
        &self,
        unit: &str,
        action: &str,
        params: &BTreeMap<String, Value>,
    ) -> JujuResult<ActionResult> {
        let mut cmd = self.command("run");
        cmd.arg(unit).arg(action).arg("--format=json");
        for (key, value) in params {
            cmd.arg(param_arg(key, value));
        }
        let out = self.run(cmd, &format!("unit {unit}")).await?;
        let doc: Value = serde_json::from_str(&out).map_err(|err| JujuError::Other {
            message: format!("unparseable action response from {unit}: {err}"),
        })?;
        // The document is keyed by unit name; we only ever target one unit.
        let entry = doc
            .as_object()
            .and_then(|map| map.values().next())
            .cloned()
            .unwrap_or(Value::Null);
        let status = entry
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned();
        let results = entry
            .get("results")
            .and_then(Value::as_object)
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let result = ActionResult { status, results };
        if !result.completed() {
            return Err(JujuError::UnitError {
                unit: unit.to_owned(),
                operation: action.to_owned(),
                message: serde_json::to_string(&entry).unwrap_or_else(|_| result.status.clone()),
            });
        }
        Ok(result)
    }

    async fn run_on_unit(&self, unit: &str, command: &str) -> JujuResult<ExecOutput> {
        let mut cmd = self.command("exec");
        cmd.arg("--unit").arg(unit).arg("--").arg(command);
        debug!(target: "cou::juju", "running {cmd:?}");
        let output = cmd.output().await.map_err(|err| JujuError::Other {
            message: format!("failed to spawn juju: {err}"),
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(ExecOutput { stdout, code: 0 });
        }
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        match classify(&format!("unit {unit}"), stderr.trim()) {
            // The command itself failed on the unit; hand the caller the rc.
            JujuError::Other { .. } => Ok(ExecOutput {
                stdout,
                code: output.status.code().unwrap_or(1),
            }),
            err => Err(err),
        }
    }

    async fn wait_for_idle(&self, scope: &IdleScope, timeout: Duration) -> JujuResult<()> {
        // `wait-for` is a command family; the noun must follow it directly.
        let mut cmd = Command::new("juju");
        cmd.arg("wait-for");
        cmd.kill_on_drop(true);
        match scope {
            IdleScope::Application(app) => {
                cmd.arg("application").arg(app);
                if let Some(model) = &self.model {
                    cmd.arg("--model").arg(model);
                }
            }
            IdleScope::Model => {
                cmd.arg("model").arg(self.current_model().await?);
            }
        }
        cmd.arg(format!("--timeout={}s", timeout.as_secs()));
        match self.run(cmd, &scope.to_string()).await {
            Ok(_) => Ok(()),
            Err(JujuError::TransientConnection { message }) if message.contains("timed out") => {
                Err(JujuError::Timeout {
                    what: scope.to_string(),
                    seconds: timeout.as_secs(),
                })
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_classification() {
        assert!(matches!(
            classify("the model status", "ERROR connection refused"),
            JujuError::TransientConnection { .. }
        ));
        assert!(matches!(
            classify("application keystone", "ERROR permission denied"),
            JujuError::Permission { .. }
        ));
        assert!(matches!(
            classify("application nope", "ERROR application \"nope\" not found"),
            JujuError::NotFound { .. }
        ));
        assert!(matches!(
            classify("application keystone", "ERROR something odd"),
            JujuError::Other { .. }
        ));
    }

    #[test]
    fn action_params_render_as_argv_pairs() {
        assert_eq!(param_arg("batch-size", &Value::from(1000)), "batch-size=1000");
        assert_eq!(
            param_arg("before", &Value::from("2024-01-01")),
            "before=2024-01-01"
        );
    }
}
