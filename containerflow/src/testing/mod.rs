//! Testing utilities for containerflow pipelines.
//!
//! This module provides:
//! - A scripted dispatcher that records calls
//! - A stub stage service for remote dispatch tests and smoke runs

mod mocks;
mod stub_server;

pub use mocks::ScriptedDispatcher;
pub use stub_server::{StubReply, StubStageServer};
