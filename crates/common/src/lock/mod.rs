//! Exclusive server-side folder locks
//!
//! Rewriting a folder's metadata requires holding the folder's lock. The server
//! hands out an opaque token ("folder token") that has to accompany every
//! metadata upload and the final unlock. Locks time out server-side, which is
//! why a failed release is never fatal.

mod controller;
pub mod memory;

pub use controller::{FolderLockController, LockError, LockToken, LockTransport, LockTransportError};
