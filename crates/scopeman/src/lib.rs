// lib.rs - Scope coordinator between an editor and an out-of-process
// JavaScript analysis engine.
//
// The binary in main.rs serves these modules over LSP; tests and embedders
// can drive the coordinator directly.

pub mod backend;
pub mod channel;
pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod correlator;
pub mod documents;
pub mod engine_process;
pub mod environment;
pub mod error;
pub mod file_cache;
pub mod file_state;
pub mod path_key;
pub mod perf;
pub mod protocol;
// test_utils is available in test builds and when the `test-support` feature is enabled.
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

#[cfg(test)]
mod integration_tests;

pub use coordinator::{HintSession, ScopeCoordinator};
pub use error::HintError;
