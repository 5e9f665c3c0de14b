//! # gatehouse-engine: Visit Authorization & Credential Engine
//!
//! - **`RecordStore`** (`store.rs`): per-record locks with bounded waits.
//! - **`Directory`** (`directory.rs`): the port to the external visitor and
//!   unit directory, plus an in-memory implementation.
//! - **`PresenceLedger`** (`ledger.rs`): derived index of visits on site.
//! - **`VisitEngine`** (`visits.rs`): credential issuer, credential
//!   validator, exit registrar, cancel, expiry sweep, ledger reconcile.
//! - **`CustodyService`** (`custody.rs`): correspondence receipt and hand-off.
//!
//! The engine is synchronous. Callers on an async runtime invoke it directly;
//! no engine lock is ever held across an `.await`.

pub mod custody;
pub mod directory;
pub mod error;
pub mod ledger;
pub mod store;
pub mod visits;

pub use custody::{CustodyService, UnitBacklog};
pub use directory::{
    Directory, DirectoryError, DirectorySeed, InMemoryDirectory, UnitRecord, VisitorRecord,
};
pub use error::{EngineError, SecurityReason};
pub use ledger::{PresenceEntry, PresenceLedger};
pub use store::{RecordStore, StoreError};
pub use visits::{
    CreateVisitRequest, CreatedVisit, EngineConfig, ExitRecord, IssuedCredential, PresenceView,
    ReconcileReport, Transitioned, VisitEngine, MAX_VALIDITY_HOURS, MIN_VALIDITY_HOURS,
};
