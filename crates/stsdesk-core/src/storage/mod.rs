//! # Persistent Storage
//!
//! redb-backed implementation of [`RecordStore`](crate::store::RecordStore).

mod redb_store;

pub use redb_store::RedbStore;
