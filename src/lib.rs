//! Live head-count telemetry for networked vision sensors.
//!
//! Each displayed sensor gets a [`session::SensorSession`] that polls its
//! telemetry endpoint, tracks connectivity and tolerates transient failures.
//! The [`registry::StreamRegistry`] merges the fixed sensor catalog with
//! operator-added streams, and [`export`] renders CSV time series.

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod registry;
pub mod service;
pub mod session;
pub mod telemetry;
pub mod ui;

pub use error::{AppError, Result};
