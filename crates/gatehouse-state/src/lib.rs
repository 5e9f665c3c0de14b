//! # gatehouse-state: Lifecycle State Machines
//!
//! - **Visit** (`visit.rs`):
//!   `Pending → Authorized → Admitted → Closed`, with `Denied` and `Canceled`
//!   branches. The only way to change a visit's status is through its
//!   transition methods, each of which checks the edge against
//!   [`VisitStatus::can_transition_to`] before touching the record.
//!
//! - **Correspondence** (`correspondence.rs`): `AwaitingPickup` followed by
//!   exactly one of `Delivered`, `Returned` or `NotCollected`.
//!
//! A rejected transition returns an error and leaves the record exactly as
//! it was. Every accepted transition appends a [`TransitionRecord`].
//!
//! Transition methods take the current instant as an argument; the engine
//! reads it from its `TimeSource`.

pub mod correspondence;
pub mod transition;
pub mod visit;

pub use correspondence::{
    Correspondence, CorrespondenceError, CorrespondenceKind, CorrespondenceStatus, Delivery,
    NewCorrespondence, MAX_SIGNATURE_BLOB_BYTES,
};
pub use transition::{ParseStatusError, TransitionRecord};
pub use visit::{NewVisit, Visit, VisitError, VisitKind, VisitStatus};
