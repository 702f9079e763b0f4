//! Editor session layer for documentation projects.
//!
//! Speaks JSON-RPC over a byte stream, tracks which documents the editor has
//! open, forwards their text to a [`Project`], and publishes the diagnostics
//! the project reports back. Analysis itself lives behind the [`Project`]
//! trait; [`LocalProject`] is the built-in filesystem implementation.

pub mod codec;
pub mod config;
pub mod debounce;
pub mod diagnostics;
pub mod error;
pub mod local;
pub mod project;
pub mod protocol;
pub mod resolver;
pub mod server;
pub mod session;
pub mod types;
pub mod watchdog;
pub mod workspace;

#[cfg(test)]
mod testing;

pub use config::SessionConfig;
pub use error::SessionError;
pub use local::{LocalProject, LocalProjectFactory};
pub use project::{DiagnosticsSink, Project, ProjectConfig, ProjectError, ProjectFactory, ProjectSlot};
pub use server::serve;
pub use session::{Lifecycle, Session};
pub use types::{Diagnostic, DiagnosticSeverity, FileId, Position, Range};
