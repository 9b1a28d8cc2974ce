//! Infrastructure: configuration, Postgres adapters and service wiring.

pub mod config;
pub mod postgres;
pub mod services;

mod integration_tests;

pub use config::{ConfigError, DatabaseConfig, InfraConfig};
pub use services::{Services, Stores, bootstrap, build};
