//! Glue between [axum], [sqlx] and the [faststack_di] container.
//!
//! The crate wires the container lifecycle into the application lifecycle:
//!
//! * [settings] - environment-driven, validated settings
//! * [ioc] - default container with settings, database engine, sessions and the current request
//! * [app] - application builder publishing every request in a container context and tearing the
//!   container down on shutdown
//! * [orm] - generic repositories which know their entity type from the declaration
//! * [healthcheck] - health endpoint and a probe used by the `faststack-healthcheck` binary
//!
//! ### Features
//!
//! * `derive` - `#[derive(Repository)]` (enabled by default)

extern crate self as faststack;

pub mod app;
pub mod config;
pub mod db;
pub mod healthcheck;
pub mod ioc;
pub mod logging;
pub mod orm;
pub mod settings;

pub use faststack_di as di;
