//! Quarry Services Layer
//!
//! Request handlers sit on top of this crate; it turns tool calls into pooled
//! engine statements.
//!
//! # Architecture
//!
//! ```text
//! Server (quarry-cli)
//!     ↓
//! Service Layer (quarry-services) ← This crate
//!     ↓
//! Connection Layer (quarry-connection)
//!     ↓
//! Infrastructure Layer (quarry-core, quarry-drivers)
//! ```
//!
//! # Services
//!
//! - [`QueryService`] - acquire a pooled connection, run one statement, release it
//! - [`tools`] - the tool catalogue and argument dispatch
//!
//! Every handler returns a view model that serializes straight to the JSON
//! payload handed back to the client.

mod error;
mod query_service;
pub mod tools;
mod view_models;

#[cfg(test)]
mod test_support;

pub use error::{ServiceError, ServiceResult};
pub use query_service::{DEFAULT_ROW_LIMIT, QueryService};
pub use tools::{ToolDefinition, catalogue, dispatch};
pub use view_models::{HealthSummary, QueryOutput, TableDescription, TableList};
