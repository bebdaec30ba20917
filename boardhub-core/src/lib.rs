//! Boardhub core library: board configuration types, normalization, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes and configuration structs
//! - [`error`]: [`ConfigError`]
//! - [`config`]: board entry filtering, id resolution, load / save / init

pub mod config;
pub mod error;
pub mod types;

pub use error::ConfigError;
pub use types::{BoardDefinition, BoardId, BrokerConfig, HubConfig};
