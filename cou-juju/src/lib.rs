#![deny(missing_docs)]

//! Narrow capability surface over a Juju controller.
//!
//! Everything the upgrader needs from the controller fits in the
//! [`JujuClient`][] trait: one status fetch, config get/set, charm refresh,
//! channel switch, action invocation, raw unit commands, and wait-for-idle.
//! All failures are classified into the small [`JujuError`][] taxonomy so the
//! caller can decide what is retryable without inspecting message strings.
//!
//! [`CliJuju`][] is the stock implementation, a thin wrapper over the `juju`
//! binary. Callers that want to plan against canned clouds (tests, dry runs)
//! implement the trait themselves.

pub mod channel;
pub mod cli;
pub mod client;
pub mod errors;
pub mod home;
pub mod status;

pub use channel::{Channel, Risk};
pub use cli::CliJuju;
pub use client::{ActionResult, ExecOutput, IdleScope, JujuClient};
pub use errors::{JujuError, JujuResult};
pub use status::FullStatus;
