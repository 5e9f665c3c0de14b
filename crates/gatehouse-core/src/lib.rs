//! # gatehouse-core: Foundational Types for the Gatehouse
//!
//! Every other crate in the workspace depends on `gatehouse-core`; it depends
//! on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `VisitId`, `VisitorId`, `UnitId`
//!    and `CorrespondenceId` are distinct types. Directory keys are validated
//!    at construction; UUID identifiers are valid by construction.
//!
//! 2. **`CanonicalBytes` newtype.** Anything that is signed or digested goes
//!    through `CanonicalBytes::new()` first, so the byte sequence a tag covers
//!    is deterministic.
//!
//! 3. **UTC-only timestamps.** `Timestamp` is UTC with seconds precision.
//!
//! 4. **Injected clocks.** Components that compare against "now" take a
//!    [`TimeSource`], so expiry can be tested without sleeping.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `gatehouse-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod clock;
pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;

pub use canonical::CanonicalBytes;
pub use clock::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use digest::{sha256_digest, sha256_raw, ContentDigest};
pub use error::{CanonicalizationError, ValidationError};
pub use identity::{CorrespondenceId, UnitId, VisitId, VisitorId};
pub use temporal::Timestamp;
