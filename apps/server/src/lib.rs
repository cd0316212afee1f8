//! Vellum - hierarchical content server
//!
//! Content lives in containers inside named databases and is addressed by
//! path. Requests are resolved by traversal to a context object and a named
//! view; the `@batch` endpoint runs a list of such requests inside one call,
//! either sharing a single transaction or committing each one eagerly.

#![allow(
    clippy::too_many_arguments,      // Handlers take many extractors
    clippy::type_complexity,
)]

pub mod api;
pub mod auth;
pub mod batch;
pub mod config;
pub mod db;
pub mod error;
pub mod layers;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod request;
pub mod request_context;
pub mod security;
pub mod state;
pub mod traversal;
pub mod views;

pub use config::Config;
pub use error::{Error, Result};
pub use state::AppState;
