//! # Background Reconciler
//!
//! Every `PRESENCE_REFRESH_SECS` the reconciler cancels authorized visits
//! whose credentials lapsed unused, writes those cancellations through, and
//! corrects the presence ledger against the visit store.

use std::time::Duration;

use gatehouse_engine::ReconcileReport;

use crate::error::AppError;
use crate::state::AppState;

/// Outcome of one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Visits canceled because their credential expired unused.
    pub expired: usize,
    pub ledger: ReconcileReport,
}

/// Run one expiry sweep and ledger reconcile.
///
/// Each lapsed visit is canceled through its write gate like any request,
/// so a cancellation the database did not take is rolled back and picked
/// up again on the next pass.
pub async fn sweep_once(state: &AppState) -> SweepReport {
    let mut expired = 0;
    for id in state.engine.lapsed_visit_ids() {
        match state.commit_visit(id, |engine| engine.expire_if_lapsed(id)).await {
            Ok(Some(_)) => expired += 1,
            Ok(None) | Err(AppError::NotFound(_)) => {}
            Err(e) => tracing::warn!(visit_id = %id, error = %e, "expiry cancellation deferred to next pass"),
        }
    }

    let ledger = state.engine.reconcile_presence();
    if ledger != ReconcileReport::default() {
        tracing::warn!(
            added = ledger.added,
            removed = ledger.removed,
            "presence ledger drifted from visit store; corrected"
        );
    }

    let report = SweepReport { expired, ledger };
    tracing::debug!(expired = report.expired, on_site = state.engine.visits_inside(), "reconcile pass complete");
    report
}

/// Run [`sweep_once`] forever at `interval`.
pub async fn run(state: AppState, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        sweep_once(&state).await;
    }
}
