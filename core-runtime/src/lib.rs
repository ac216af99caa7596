//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the transfer engine:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus for progress reporting
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the other crates depend on. It
//! establishes the logging conventions, the configuration builder and the
//! event broadcasting used throughout the workspace.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, TransferSettings};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream, TransferEvent};
