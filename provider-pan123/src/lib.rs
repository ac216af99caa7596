//! # 123pan Provider
//!
//! Implements `RemoteStore` over the 123pan web API.
//!
//! ## Overview
//!
//! This module provides:
//! - Paginated folder listing with throttle back-off
//! - Folder lookup-or-create
//! - The multipart upload protocol (declare, part URLs, complete, close)
//! - Trash-based deletion
//! - Ranged and streamed downloads of resolved URLs
//!
//! Credentials and request signing are supplied by the host: the store takes
//! a bearer token and an optional [`RequestSigner`].

pub mod connector;
pub mod error;
pub mod signer;
pub mod types;

pub use connector::{Pan123Config, Pan123Store, CONFLICT_CODE};
pub use error::{PanError, Result};
pub use signer::{NoopSigner, RequestSigner};
