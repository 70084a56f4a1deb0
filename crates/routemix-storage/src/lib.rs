//! RouteMix Storage - persisted rule-set groups.
//!
//! Named, user-curated aliases for sets of rule-set names, stored as a flat
//! `name → [rule-set, ...]` JSON document. The store is deliberately
//! forgiving on the read side (a missing or malformed file yields an empty
//! store) and strict on the write side (a failed save is surfaced while the
//! in-memory state keeps the mutation, so the caller can retry).
//!
//! # Example
//!
//! ```no_run
//! use routemix_storage::GroupStore;
//!
//! let store = GroupStore::open("groups.json");
//! store.create("streaming", vec!["Netflix".into(), "YouTube".into()]).unwrap();
//! assert_eq!(store.members("streaming").unwrap(), ["Netflix", "YouTube"]);
//! ```

mod error;
mod groups;

pub use error::{Result, StorageError};
pub use groups::GroupStore;
