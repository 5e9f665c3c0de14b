//! # Application State
//!
//! [`AppState`] is shared by every handler: the visit engine, the custody
//! service, the directory they read from, and the optional Postgres pool.
//!
//! The engine answers reads. When a pool is configured every mutation goes
//! through [`AppState::commit_visit`] or [`AppState::commit_correspondence`]:
//! the record's write gate is held across the engine transition and its
//! database write, and a write that fails rolls the transition back before
//! the caller sees the error. Memory and storage agree whenever no gate is
//! held.

use std::future::Future;
use std::sync::Arc;

use sqlx::PgPool;

use gatehouse_core::{CorrespondenceId, TimeSource, VisitId};
use gatehouse_crypto::CredentialKey;
use gatehouse_engine::{
    CreateVisitRequest, CreatedVisit, CustodyService, EngineError, ExitRecord, InMemoryDirectory,
    Transitioned, VisitEngine,
};
use gatehouse_state::{Correspondence, NewCorrespondence, Visit};

use crate::config::AppConfig;
use crate::db;
use crate::error::AppError;
use crate::middleware::metrics::ApiMetrics;
use crate::write_gate::WriteGates;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<VisitEngine>,
    pub custody: Arc<CustodyService>,
    /// Visitor and unit directory the engine reads from.
    pub directory: Arc<InMemoryDirectory>,
    pub config: Arc<AppConfig>,
    pub metrics: ApiMetrics,
    /// Postgres pool. `None` runs in-memory only.
    pub db_pool: Option<PgPool>,
    /// Per-record gates held across a transition and its write.
    pub gates: WriteGates,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .field("db_pool", &self.db_pool.as_ref().map(|_| "[connected]"))
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Assemble state from its parts.
    pub fn from_parts(
        config: AppConfig,
        directory: Arc<InMemoryDirectory>,
        key: CredentialKey,
        clock: Arc<dyn TimeSource>,
        db_pool: Option<PgPool>,
    ) -> Self {
        let engine = VisitEngine::new(
            directory.clone(),
            key,
            clock.clone(),
            config.engine_config(),
        );
        let custody = CustodyService::new(directory.clone(), clock.clone(), config.lock_timeout);
        Self {
            engine: Arc::new(engine),
            custody: Arc::new(custody),
            directory,
            config: Arc::new(config),
            metrics: ApiMetrics::new(),
            db_pool,
            gates: WriteGates::new(),
        }
    }

    // ── Write-through ───────────────────────────────────────────────

    /// Create a visit and write it through. A visit the database did not
    /// take is discarded, so no token is ever handed out for a visit that a
    /// restart would forget.
    pub async fn create_visit(&self, req: CreateVisitRequest) -> Result<CreatedVisit, AppError> {
        let created = self.engine.create_visit(req)?;
        let Some(pool) = &self.db_pool else {
            return Ok(created);
        };
        let id = created.visit.id;
        if let Err(e) = self
            .bounded("visit", &id.to_string(), db::visits::insert(pool, &created.visit))
            .await
        {
            self.engine.discard(id);
            return Err(e);
        }
        Ok(created)
    }

    /// Run one engine transition on a visit and write its result through
    /// while the visit's write gate is held.
    ///
    /// A failed write reverts the transition in memory and the caller gets
    /// a retryable error, so memory never runs ahead of storage. A refused
    /// operation that still moved the visit (a late scan cancels it) has
    /// that move written through too.
    pub async fn commit_visit<T: VisitChange>(
        &self,
        visit_id: VisitId,
        op: impl FnOnce(&VisitEngine) -> Result<T, EngineError>,
    ) -> Result<T, AppError> {
        let Some(pool) = &self.db_pool else {
            return op(&*self.engine).map_err(AppError::from);
        };
        let _gate = self
            .gates
            .acquire(*visit_id.as_uuid(), self.config.lock_timeout)
            .await
            .map_err(|_| gate_busy("visit", &visit_id.to_string()))?;

        let before = match self.engine.get_visit(visit_id) {
            Ok(v) => v,
            // Nothing stored under that id; the operation cannot change anything.
            Err(EngineError::NotFound { .. }) => return op(&*self.engine).map_err(AppError::from),
            Err(e) => return Err(e.into()),
        };
        let outcome = op(&*self.engine);
        let after = match &outcome {
            Ok(done) => done.changed().cloned(),
            Err(_) => self
                .engine
                .get_visit(visit_id)
                .ok()
                .filter(|v| v.status() != before.status()),
        };
        let Some(after) = after else {
            return outcome.map_err(AppError::from);
        };

        let id = visit_id.to_string();
        let written = self
            .bounded("visit", &id, db::visits::update_state(pool, &after, before.status()))
            .await;
        let failure = match written {
            Ok(true) => return outcome.map_err(AppError::from),
            Ok(false) => {
                tracing::warn!(visit_id = %visit_id, expected = before.status().as_str(), "stored visit was not in the expected status");
                self.adopt_stored_visit(pool, &before, &after).await;
                AppError::Unavailable(format!("visit {id} changed in storage; retry"))
            }
            Err(e) => {
                self.revert_visit(&before, &after);
                e
            }
        };
        match outcome {
            Ok(_) => Err(failure),
            Err(refused) => Err(refused.into()),
        }
    }

    fn revert_visit(&self, before: &Visit, after: &Visit) {
        if let Err(e) = self.engine.revert_to(before, after.status()) {
            tracing::error!(visit_id = %before.id, error = %e, "could not revert unpersisted visit transition");
        }
    }

    /// The stored row moved somewhere this process did not put it. Take the
    /// stored row as truth; without one, fall back to `before`.
    async fn adopt_stored_visit(&self, pool: &PgPool, before: &Visit, after: &Visit) {
        let stored = self
            .bounded("visit", &before.id.to_string(), db::visits::load(pool, before.id.as_uuid()))
            .await;
        match stored {
            Ok(Some(stored)) => {
                if let Err(e) = self.engine.reinstate(stored) {
                    tracing::error!(visit_id = %before.id, error = %e, "could not reinstate stored visit");
                }
            }
            Ok(None) | Err(_) => self.revert_visit(before, after),
        }
    }

    /// Receive a correspondence item and write it through, discarding it
    /// again when the database did not take it.
    pub async fn receive_correspondence(&self, req: NewCorrespondence) -> Result<Correspondence, AppError> {
        let item = self.custody.receive(req)?;
        let Some(pool) = &self.db_pool else {
            return Ok(item);
        };
        if let Err(e) = self
            .bounded("correspondence", &item.id.to_string(), db::correspondence::insert(pool, &item))
            .await
        {
            self.custody.discard(item.id);
            return Err(e);
        }
        Ok(item)
    }

    /// [`Self::commit_visit`] for correspondence.
    pub async fn commit_correspondence(
        &self,
        item_id: CorrespondenceId,
        op: impl FnOnce(&CustodyService) -> Result<Correspondence, EngineError>,
    ) -> Result<Correspondence, AppError> {
        let Some(pool) = &self.db_pool else {
            return op(&*self.custody).map_err(AppError::from);
        };
        let id = item_id.to_string();
        let _gate = self
            .gates
            .acquire(*item_id.as_uuid(), self.config.lock_timeout)
            .await
            .map_err(|_| gate_busy("correspondence", &id))?;

        let before = self.custody.get(item_id)?;
        let after = op(&*self.custody)?;
        let written = self
            .bounded(
                "correspondence",
                &id,
                db::correspondence::update_state(pool, &after, before.status()),
            )
            .await;
        let failure = match written {
            Ok(true) => return Ok(after),
            Ok(false) => {
                let stored = self
                    .bounded("correspondence", &id, db::correspondence::load(pool, item_id.as_uuid()))
                    .await;
                match stored {
                    Ok(Some(stored)) => {
                        if let Err(e) = self.custody.reinstate(stored) {
                            tracing::error!(correspondence_id = %id, error = %e, "could not reinstate stored correspondence");
                        }
                    }
                    Ok(None) | Err(_) => self.revert_correspondence(&before, &after),
                }
                AppError::Unavailable(format!("correspondence {id} changed in storage; retry"))
            }
            Err(e) => {
                self.revert_correspondence(&before, &after);
                e
            }
        };
        Err(failure)
    }

    fn revert_correspondence(&self, before: &Correspondence, after: &Correspondence) {
        if let Err(e) = self.custody.revert_to(before, after.status()) {
            tracing::error!(correspondence_id = %before.id, error = %e, "could not revert unpersisted correspondence transition");
        }
    }

    /// Await one database call under the storage timeout.
    ///
    /// Connection trouble and timeouts are retryable (503); anything else
    /// is an internal error.
    async fn bounded<T>(
        &self,
        kind: &'static str,
        id: &str,
        write: impl Future<Output = Result<T, sqlx::Error>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.config.lock_timeout, write).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if is_transient(&e) => {
                tracing::warn!(kind, id, error = %e, "database unreachable");
                Err(AppError::Unavailable(format!("{kind} {id}: storage unreachable; retry")))
            }
            Ok(Err(e)) => {
                tracing::error!(kind, id, error = %e, "database write failed");
                Err(AppError::Internal(format!("{kind} {id}: database write failed")))
            }
            Err(_) => Err(storage_timeout(kind, id)),
        }
    }

    // ── Startup ─────────────────────────────────────────────────────

    /// Load persisted visits and correspondence into memory and rebuild
    /// the presence ledger. No-op without a pool.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        let pool = match &self.db_pool {
            Some(pool) => pool,
            None => return Ok(()),
        };

        let visits = db::visits::load_all(pool)
            .await
            .map_err(|e| format!("failed to load visits: {e}"))?;
        let visit_count = self.engine.restore(visits);

        let items = db::correspondence::load_all(pool)
            .await
            .map_err(|e| format!("failed to load correspondence: {e}"))?;
        let item_count = self.custody.restore(items);

        tracing::info!(
            visits = visit_count,
            on_site = self.engine.visits_inside(),
            correspondence = item_count,
            "hydrated in-memory stores from database"
        );
        Ok(())
    }
}

/// An engine result that may carry a visit to write through.
pub trait VisitChange {
    fn changed(&self) -> Option<&Visit>;
}

impl VisitChange for Transitioned {
    fn changed(&self) -> Option<&Visit> {
        Some(&self.visit)
    }
}

impl VisitChange for Option<Transitioned> {
    fn changed(&self) -> Option<&Visit> {
        self.as_ref().map(|t| &t.visit)
    }
}

impl VisitChange for (ExitRecord, Visit) {
    fn changed(&self) -> Option<&Visit> {
        Some(&self.1)
    }
}

fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed
    )
}

fn gate_busy(kind: &str, id: &str) -> AppError {
    tracing::warn!(kind, id, "write gate not acquired in time");
    AppError::Unavailable(format!("{kind} {id} is busy; retry"))
}

fn storage_timeout(kind: &str, id: &str) -> AppError {
    tracing::warn!(kind, id, "database write timed out");
    AppError::Unavailable(format!("{kind} {id}: storage did not answer in time; retry"))
}
