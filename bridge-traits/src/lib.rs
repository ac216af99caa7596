//! # Host Bridge Traits
//!
//! Collaborator contracts the transfer engine is written against.
//!
//! ## Overview
//!
//! The engine itself performs no direct network or disk I/O. Everything it
//! needs from the outside world is expressed here as a trait, implemented by
//! a host crate (`bridge-desktop`) or a provider crate (`provider-pan123`).
//!
//! ## Traits
//!
//! ### Remote side
//! - [`RemoteStore`](remote::RemoteStore) - Folder listing, upload sessions, ranged reads
//! - [`HttpClient`](http::HttpClient) - Async HTTP used by provider adapters
//!
//! ### Local side
//! - [`LocalFilesystem`](storage::LocalFilesystem) - Metadata, directory listing, streamed I/O
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should distinguish transport failures (`OperationFailed`) from remote
//! rejections (`Rejected`) because the engine treats them differently.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single instance can be shared
//! by every worker of a transfer run.

pub mod error;
pub mod http;
pub mod logging;
pub mod remote;
pub mod storage;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use logging::{LogEntry, LogLevel, LoggerSink};
pub use remote::{
    BeginUpload, ByteStream, DuplicateMode, RemoteEntry, RemoteStore, UploadCoordinates,
    UploadDeclaration,
};
pub use storage::{FileMetadata, LocalFilesystem, ReadStream, WriteStream};
