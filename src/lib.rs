//! Workspace facade crate.
//!
//! Re-exports the transfer engine together with its collaborators so host
//! applications can depend on `pan-mirror-workspace` and enable the documented
//! features without wiring each crate individually.
//!
//! - `desktop-shims` (default): native filesystem and HTTP adapters.
//! - `pan123` (default): the 123pan `RemoteStore` adapter.

pub use bridge_traits;
pub use core_runtime;
pub use core_transfer;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;

#[cfg(feature = "pan123")]
pub use provider_pan123;

pub use core_transfer::{
    ConflictPolicy, DownloadRequest, MirrorRequest, TransferEngine, TransferError, TransferReport,
};
