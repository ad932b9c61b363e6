//! Gateway endpoint — persistent-connection client that serves gateway jobs
//! against a local chat backend.

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod session;
pub mod supervisor;
