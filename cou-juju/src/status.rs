//! The raw shape of one full status fetch.
//!
//! These types mirror the controller's `status --format=json` document
//! closely enough for the upgrader's needs; everything is optional-with-
//! defaults here, and the topology builder decides which absences are fatal.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One full status response from the controller
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullStatus {
    /// The model the status describes
    #[serde(default)]
    pub model: ModelStatus,
    /// All machines in the model, keyed by machine id
    #[serde(default)]
    pub machines: BTreeMap<String, MachineStatus>,
    /// All applications in the model, keyed by application name
    #[serde(default)]
    pub applications: BTreeMap<String, ApplicationStatus>,
}

/// Model-level fields of a status response
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelStatus {
    /// The model name
    #[serde(default)]
    pub name: String,
    /// The controller agent version
    #[serde(default)]
    pub version: String,
}

/// One machine in a status response
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MachineStatus {
    /// The provider hardware line, e.g.
    /// `arch=amd64 cores=8 mem=32768M availability-zone=az-0`
    #[serde(default)]
    pub hardware: String,
    /// The machine's base series, when reported
    #[serde(default)]
    pub series: String,
}

impl MachineStatus {
    /// The availability zone named in the hardware line, if any.
    pub fn availability_zone(&self) -> Option<&str> {
        self.hardware
            .split_whitespace()
            .find_map(|kv| kv.strip_prefix("availability-zone="))
            .filter(|zone| !zone.is_empty())
    }
}

/// One application in a status response
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApplicationStatus {
    /// The full charm URL, e.g. `ch:amd64/focal/keystone-638`
    #[serde(default)]
    pub charm: String,
    /// The bare charm name, when the controller reports it separately
    #[serde(default, rename = "charm-name")]
    pub charm_name: String,
    /// The channel the charm was deployed from, e.g. `ussuri/stable`
    #[serde(default, rename = "charm-channel")]
    pub charm_channel: String,
    /// Where the charm came from (charmhub, local, ...)
    #[serde(default, rename = "charm-origin")]
    pub charm_origin: String,
    /// The base series the application runs on
    #[serde(default)]
    pub series: String,
    /// Principals this application is subordinate to; empty for principals
    #[serde(default, rename = "subordinate-to")]
    pub subordinate_to: Vec<String>,
    /// The application's units, keyed by unit name; empty for subordinates
    #[serde(default)]
    pub units: BTreeMap<String, UnitStatus>,
    /// The workload version the application reports as a whole
    #[serde(default, rename = "workload-version")]
    pub workload_version: String,
}

impl ApplicationStatus {
    /// The charm name, from `charm-name` when present or stripped out of the
    /// charm URL otherwise (`ch:amd64/focal/keystone-638` → `keystone`).
    pub fn resolved_charm_name(&self) -> &str {
        if !self.charm_name.is_empty() {
            return &self.charm_name;
        }
        let tail = self.charm.rsplit('/').next().unwrap_or(&self.charm);
        let tail = tail.strip_prefix("ch:").unwrap_or(tail);
        let tail = tail.strip_prefix("cs:").unwrap_or(tail);
        match tail.rsplit_once('-') {
            Some((name, rev)) if rev.chars().all(|c| c.is_ascii_digit()) && !rev.is_empty() => name,
            _ => tail,
        }
    }
}

/// One unit in a status response
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UnitStatus {
    /// The machine id hosting this unit
    #[serde(default)]
    pub machine: String,
    /// The workload version this unit reports
    #[serde(default, rename = "workload-version")]
    pub workload_version: String,
    /// Subordinate units attached to this one, keyed by unit name
    #[serde(default)]
    pub subordinates: BTreeMap<String, UnitStatus>,
    /// Whether this unit holds application leadership
    #[serde(default)]
    pub leader: bool,
}
