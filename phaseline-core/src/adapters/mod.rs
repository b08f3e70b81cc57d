//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - sqlx PostgreSQL connection for the SqlExecutor and Connector ports
//! - axum HTTP transport in front of the migration service

pub mod http;
pub mod postgres;
