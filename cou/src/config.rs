//! Invocation options and environment tunables.
//!
//! One [`Config`][] is built from the CLI per invocation and threaded through
//! analysis, planning and execution; [`Tunables`][] carries the environment
//! knobs. Neither is ever mutated after construction.

use std::time::Duration;

use chrono::NaiveDateTime;

use crate::errors::{CouError, CouResult};

/// Applications the operator is allowed to skip with `--skip-apps`.
pub const SKIPPABLE_APPS: &[&str] = &["vault"];

/// Which part of the cloud an invocation covers
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum UpgradeGroup {
    /// Everything, in control-plane → data-plane order
    #[default]
    Whole,
    /// Control-plane applications only
    ControlPlane,
    /// Data-plane applications only (hypervisors included)
    DataPlane,
    /// Hypervisor machines only
    Hypervisors,
}

impl UpgradeGroup {
    /// Whether this invocation includes the control-plane phases.
    pub fn includes_control_plane(self) -> bool {
        matches!(self, UpgradeGroup::Whole | UpgradeGroup::ControlPlane)
    }

    /// Whether this invocation includes the hypervisor phase.
    pub fn includes_hypervisors(self) -> bool {
        matches!(
            self,
            UpgradeGroup::Whole | UpgradeGroup::DataPlane | UpgradeGroup::Hypervisors
        )
    }

    /// Whether this invocation includes the non-hypervisor data-plane phases.
    pub fn includes_data_plane(self) -> bool {
        matches!(self, UpgradeGroup::Whole | UpgradeGroup::DataPlane)
    }
}

/// Options for one `cou plan` / `cou upgrade` invocation
#[derive(Clone, Debug)]
pub struct Config {
    /// The model to operate on; the ambient selection when unset
    pub model: Option<String>,
    /// Which part of the cloud to cover
    pub group: UpgradeGroup,
    /// Back up the MySQL databases before upgrading (default on)
    pub backup: bool,
    /// Archive deleted database rows before upgrading (default on)
    pub archive: bool,
    /// Rows per archive-data batch
    pub archive_batch_size: u32,
    /// Purge shadow tables before upgrading
    pub purge: bool,
    /// Only purge data older than this timestamp
    pub purge_before: Option<NaiveDateTime>,
    /// Upgrade hypervisors even when they host running VMs
    pub force: bool,
    /// Restrict the hypervisor phase to these machine ids
    pub machines: Vec<String>,
    /// Restrict the hypervisor phase to these availability zones
    pub availability_zones: Vec<String>,
    /// Applications to leave untouched (allow-listed)
    pub skip_apps: Vec<String>,
    /// Skip the interactive confirmation gates
    pub auto_approve: bool,
}

impl Default for Config {
    /// The CLI defaults: backup and archive on, everything else off.
    fn default() -> Self {
        Config {
            model: None,
            group: UpgradeGroup::Whole,
            backup: true,
            archive: true,
            archive_batch_size: 1000,
            purge: false,
            purge_before: None,
            force: false,
            machines: Vec::new(),
            availability_zones: Vec::new(),
            skip_apps: Vec::new(),
            auto_approve: false,
        }
    }
}

impl Config {
    /// Reject option combinations the planner cannot honour.
    pub fn validate(&self) -> CouResult<()> {
        if !self.machines.is_empty() && !self.availability_zones.is_empty() {
            return Err(CouError::ExclusiveFilters);
        }
        for app in &self.skip_apps {
            if !SKIPPABLE_APPS.contains(&app.as_str()) {
                return Err(CouError::SkipAppNotAllowed {
                    app: app.clone(),
                    allowed: SKIPPABLE_APPS.join(", "),
                });
            }
        }
        Ok(())
    }

    /// Whether the operator asked to skip this application.
    pub fn skips(&self, app: &str) -> bool {
        self.skip_apps.iter().any(|skipped| skipped == app)
    }
}

/// Parse a `--purge-before-date` value.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:mm` and `YYYY-MM-DD HH:mm:ss`.
pub fn parse_purge_before(value: &str) -> CouResult<NaiveDateTime> {
    const FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
    for format in FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed);
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight);
        }
    }
    Err(CouError::BadPurgeDate {
        value: value.to_owned(),
    })
}

/// Environment knobs, read once at startup
#[derive(Copy, Clone, Debug)]
pub struct Tunables {
    /// Deadline for quick controller calls before they count as flaky
    pub call_timeout: Duration,
    /// How often a transient controller failure is retried
    pub model_retries: u32,
    /// Base of the linear retry backoff (`backoff × attempt`)
    pub retry_backoff: Duration,
    /// Idle wait deadline for ordinary applications
    pub standard_idle_timeout: Duration,
    /// Idle wait deadline for slow-settling applications
    pub long_idle_timeout: Duration,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            call_timeout: Duration::from_secs(10),
            model_retries: 5,
            retry_backoff: Duration::from_secs(2),
            standard_idle_timeout: Duration::from_secs(300),
            long_idle_timeout: Duration::from_secs(2400),
        }
    }
}

impl Tunables {
    /// Read the tunables from the environment, falling back to the defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Tunables::default();
        Tunables {
            call_timeout: env_secs("COU_TIMEOUT", defaults.call_timeout),
            model_retries: env_u32("COU_MODEL_RETRIES", defaults.model_retries),
            retry_backoff: env_secs("COU_MODEL_RETRY_BACKOFF", defaults.retry_backoff),
            standard_idle_timeout: env_secs(
                "COU_STANDARD_IDLE_TIMEOUT",
                defaults.standard_idle_timeout,
            ),
            long_idle_timeout: env_secs("COU_LONG_IDLE_TIMEOUT", defaults.long_idle_timeout),
        }
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    match std::env::var(name) {
        Ok(value) => match value.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                tracing::warn!("ignoring unparseable ${name}={value}");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_u32(name: &str, default: u32) -> u32 {
    match std::env::var(name) {
        Ok(value) => match value.parse::<u32>() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!("ignoring unparseable ${name}={value}");
                default
            }
        },
        Err(_) => default,
    }
}
