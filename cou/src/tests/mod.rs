//! Unit tests and the mock world they run against.

mod analyze;
mod catalog;
mod mock;
