//! Transactional status writes with at most one write in flight per court.

use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::court::CourtStatus;
use crate::error::{CourtError, Result};
use crate::now_ms;
use crate::occupancy::StatusBoard;
use crate::session::SessionEvent;
use crate::storage::{CourtStore, TransactionOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A write was started; the court is pending until its completion arrives.
    Accepted,
    RejectedPending,
    RejectedUnchanged,
}

/// Result of one store transaction, delivered back to the board owner.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateCompletion {
    pub court: String,
    pub desired: CourtStatus,
    pub result: Result<TransactionOutcome>,
}

pub struct StatusUpdater {
    store: Arc<dyn CourtStore>,
    complex_id: String,
    events: Sender<SessionEvent>,
}

impl StatusUpdater {
    pub fn new(
        store: Arc<dyn CourtStore>,
        complex_id: impl Into<String>,
        events: Sender<SessionEvent>,
    ) -> Self {
        Self {
            store,
            complex_id: complex_id.into(),
            events,
        }
    }

    /// Start a status write for `court` unless one is in flight or the
    /// cached status already matches.
    pub fn request(
        &self,
        board: &mut StatusBoard,
        court: &str,
        desired: CourtStatus,
    ) -> RequestOutcome {
        if board.is_pending(court) {
            log::debug!("update for {} already in flight", court);
            return RequestOutcome::RejectedPending;
        }
        if board.status(court) == Some(desired) {
            return RequestOutcome::RejectedUnchanged;
        }
        board.mark_pending(court);
        log::info!("requesting status {} for {}", desired, court);

        let store = Arc::clone(&self.store);
        let complex_id = self.complex_id.clone();
        let court_name = court.to_string();
        let events = self.events.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("status-{}", court))
            .spawn(move || {
                let result =
                    store.update_court_status(&complex_id, &court_name, desired, now_ms());
                // The session may already be gone.
                let _ = events.send(SessionEvent::Completion(UpdateCompletion {
                    court: court_name,
                    desired,
                    result,
                }));
            });

        if let Err(e) = spawned {
            let _ = self.events.send(SessionEvent::Completion(UpdateCompletion {
                court: court.to_string(),
                desired,
                result: Err(CourtError::network(format!(
                    "failed to start status writer: {}",
                    e
                ))),
            }));
        }
        RequestOutcome::Accepted
    }

    /// Apply a completion to the board. Returns the new cached status on
    /// success; on failure the cached status is left untouched.
    pub fn complete(
        &self,
        board: &mut StatusBoard,
        completion: UpdateCompletion,
    ) -> Result<CourtStatus> {
        board.clear_pending(&completion.court);
        match completion.result {
            Ok(outcome) => {
                board.set_status(&completion.court, completion.desired);
                match outcome {
                    TransactionOutcome::Written => log::info!(
                        "{} is now {}",
                        completion.court,
                        completion.desired
                    ),
                    TransactionOutcome::NoOp => log::info!(
                        "{} was already {} in the store",
                        completion.court,
                        completion.desired
                    ),
                }
                Ok(completion.desired)
            }
            Err(e) => {
                match &e {
                    CourtError::RecordNotFound(_) => {
                        log::error!("status update for {} failed: {}", completion.court, e)
                    }
                    _ => log::warn!(
                        "status update for {} failed, will re-evaluate: {}",
                        completion.court,
                        e
                    ),
                }
                Err(e)
            }
        }
    }
}
