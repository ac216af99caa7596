//! # Desktop Bridge
//!
//! Native collaborators for running transfers on macOS, Windows and Linux:
//!
//! - [`TokioFileSystem`]: `LocalFilesystem` over `tokio::fs`
//! - [`ReqwestHttpClient`]: `HttpClient` over `reqwest`, handed to a provider
//!   such as `provider-pan123`
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, TokioFileSystem};
//! use provider_pan123::{Pan123Config, Pan123Store};
//!
//! let http = Arc::new(ReqwestHttpClient::new()?);
//! let store = Arc::new(Pan123Store::new(http, Pan123Config::new(token)));
//! let config = CoreConfig::builder()
//!     .remote_store(store)
//!     .file_system(Arc::new(TokioFileSystem::new()))
//!     .build()?;
//! ```

mod filesystem;
mod http;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
