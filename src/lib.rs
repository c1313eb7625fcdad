//! Backend orchestration core for a multi-tenant code-indexing server.
//!
//! This crate implements the components described in the server design:
//! a scoped resource manager (§4.A), a prioritized background job engine
//! (§4.B), golden and activated repository managers (§4.C/§4.D), a
//! sandboxed file CRUD service (§4.E), a git operations service with a
//! confirmation-token protocol for destructive commands (§4.F), and a
//! read-only repository listing service (component G). The HTTP/CLI
//! adaptor layer and the indexing/search backends themselves are out of
//! scope; this crate owns orchestration, not indexing.

pub mod activated_repo;
pub mod config;
pub mod error;
pub mod file_crud;
pub mod git_ops;
pub mod golden_repo;
pub mod jobs;
pub mod listing;
pub mod resource;
pub mod server;
pub mod subprocess;
pub mod validation;

pub use error::{ServerError, StatusHint};
pub use server::Server;
