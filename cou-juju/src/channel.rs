//! Charm channel identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::JujuError;

/// Risk component of a charm channel.
///
/// The upgrader only ever switches tracks; the risk is carried along so a
/// deployment pinned to e.g. `candidate` keeps its risk across the switch.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Risk {
    /// The default channel risk
    #[default]
    Stable,
    /// Release candidates
    Candidate,
    /// Beta quality
    Beta,
    /// Bleeding edge
    Edge,
}

impl Risk {
    fn as_str(self) -> &'static str {
        match self {
            Risk::Stable => "stable",
            Risk::Candidate => "candidate",
            Risk::Beta => "beta",
            Risk::Edge => "edge",
        }
    }
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// A `(track, risk)` pair identifying a charm revision stream
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Channel {
    /// The first component, typically a release codename or charm version
    pub track: String,
    /// The second component; defaults to stable when absent
    pub risk: Risk,
}

impl Channel {
    /// A `<track>/stable` channel.
    pub fn stable(track: impl Into<String>) -> Self {
        Channel {
            track: track.into(),
            risk: Risk::Stable,
        }
    }

    /// The same track at a different risk.
    pub fn with_risk(&self, risk: Risk) -> Self {
        Channel {
            track: self.track.clone(),
            risk,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.track, self.risk)
    }
}

impl FromStr for Channel {
    type Err = JujuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || JujuError::InvalidChannel {
            value: s.to_owned(),
        };
        let mut parts = s.split('/');
        let track = parts.next().filter(|t| !t.is_empty()).ok_or_else(invalid)?;
        let risk = match parts.next() {
            None => Risk::Stable,
            Some("stable") => Risk::Stable,
            Some("candidate") => Risk::Candidate,
            Some("beta") => Risk::Beta,
            Some("edge") => Risk::Edge,
            Some(_) => return Err(invalid()),
        };
        // Branch channels (track/risk/branch) are not something we switch to.
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Channel {
            track: track.to_owned(),
            risk,
        })
    }
}
