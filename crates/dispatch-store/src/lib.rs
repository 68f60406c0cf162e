//! Persistent store for Lightning Dispatch: key/value backends plus the typed stores built
//! on top of them (marketplace users/jobs and the assignment ledger).

mod document;
mod json_file;
mod ledger;
mod marketplace;
mod memory_kv;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use dispatch_types::{
    DispatchStore, KvStore, KvStoreError, MarketplaceStore, StoreError, TransitionOutcome,
};
pub use json_file::JsonFileKvStore;
pub use ledger::KvDispatchStore;
pub use marketplace::KvMarketplaceStore;
pub use memory_kv::InMemoryKvStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteKvStore;

/// Document keys shared with the marketplace clients.
pub mod keys {
    pub const USERS: &str = "users";
    pub const JOBS: &str = "jobs";
    pub const JOB_ASSIGNMENTS: &str = "job-assignments";
    pub const DISPATCH_HISTORY: &str = "dispatch-history";
    pub const CONTRACTOR_PUSH_TOKENS: &str = "contractor-push-tokens";
}
