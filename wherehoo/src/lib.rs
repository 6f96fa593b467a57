//! Wherehoo - location-indexed record server.
//!
//! Clients attach small payloads to geographic areas and later find them by
//! searching around a position. Everything happens over a line protocol on
//! TCP: a session collects commands, validates them against the declared
//! action and runs one insert, query, count or delete against a [`Store`].
//!
//! - [`geo`]: bearings, distances, projection and wrap-aware polygons
//! - [`protocol`]: the session state machine and request validation
//! - [`operation`]: the four operations and their wire output
//! - [`store`]: the storage trait and an in-memory implementation
//! - [`server`]: the TCP accept loop
//!
//! [`Store`]: store::Store

pub mod config;
pub mod geo;
pub mod logging;
pub mod operation;
pub mod protocol;
pub mod server;
pub mod store;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
