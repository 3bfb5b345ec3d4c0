//! Beacon Gateway is an analytics event ingestion gateway.
//!
//! It accepts GA4-style events on `/g/collect`, matches the event name
//! against configured routes, authenticates each matched route, reshapes
//! the payload through a JSON template (or passes it through), and POSTs
//! the result to the route's target.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, validate, health).
//! - [`config`] -- Route config loading, `${VAR}` interpolation, and validation.
//! - [`template`] -- Path resolution, token expressions, and the template store.
//! - [`gateway`] -- HTTP handlers plus routing, auth, normalization, forwarding,
//!   and the [`Dispatcher`](gateway::dispatch::Dispatcher).
//! - [`debug`] -- Recent outcome records and request statistics for `GET /debug`.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`server`] -- Gateway assembly, shared state, HTTP client, and graceful
//!   shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML route config support |
//! | `toml` | TOML route config support |
//! | `file-backends` | All route config formats |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod debug;
pub mod error;
pub mod gateway;
pub mod health;
pub mod logging;
pub mod server;
pub mod template;
