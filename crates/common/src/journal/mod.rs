//! Sync journal boundary
//!
//! The sync journal is the client's persistent record of every synced path. The
//! folder users jobs only need two things from it: the record id for a remote
//! path, and a way to mark a record's encryption status once its folder's
//! metadata has been durably rewritten.

pub mod memory;
mod provider;

pub use provider::{EncryptionStatus, JournalError, SyncJournal, SyncRecordId};
