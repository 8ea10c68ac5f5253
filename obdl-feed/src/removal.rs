//! User-initiated event removal
//!
//! Removal is local first: the card, its cached view entry, its key in the
//! differ and both overrides are dropped synchronously, then the backend is
//! asked to forget the event in a spawned task. The caller never waits for
//! that request. Its outcome (after bounded retries, each attempt bounded by
//! a timeout) is reported on a channel instead of being swallowed, so drift
//! between local and remote state is at least visible.

use crate::client::FeedClient;
use crate::error::FeedResult;
use crate::label_edit::LabelEditor;
use crate::overrides::Overrides;
use crate::reconcile::EventDiffer;
use crate::retry::RetryPolicy;
use crate::view::{CardStateStore, Effect};
use obdl_common::EventKey;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Final result of one remote delete request
#[derive(Debug)]
pub struct RemovalOutcome {
    pub key: EventKey,
    pub result: FeedResult<()>,
}

impl RemovalOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Local state a removal purges
pub struct LocalState<'a> {
    pub cards: &'a mut CardStateStore,
    pub differ: &'a mut EventDiffer,
    pub overrides: &'a mut Overrides,
    pub labels: &'a mut LabelEditor,
}

/// Performs local removal and issues the remote delete
pub struct RemovalCoordinator {
    client: Arc<dyn FeedClient>,
    policy: RetryPolicy,
    outcomes: mpsc::UnboundedSender<RemovalOutcome>,
}

impl RemovalCoordinator {
    /// Create a coordinator and the receiver its outcomes are reported on
    pub fn new(
        client: Arc<dyn FeedClient>,
        policy: RetryPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<RemovalOutcome>) {
        let (outcomes, rx) = mpsc::unbounded_channel();
        (
            Self {
                client,
                policy,
                outcomes,
            },
            rx,
        )
    }

    /// Remove `key` locally and fire the remote delete
    ///
    /// Returns false (and sends nothing) when no card is displayed for
    /// `key`, so repeated removals of the same key are no-ops.
    pub fn remove(&self, key: &EventKey, state: LocalState<'_>, effects: &mut Vec<Effect>) -> bool {
        if !state.cards.remove(key, effects) {
            debug!(key = %key, "Ignoring removal of a card that is not displayed");
            return false;
        }

        state.differ.forget(key);
        state.labels.forget(key);
        state.overrides.purge(key);
        info!(key = %key, "Removed event locally, requesting backend delete");

        self.spawn_delete(key.clone());
        true
    }

    /// Issue the delete without waiting for it
    pub fn spawn_delete(&self, key: EventKey) -> JoinHandle<()> {
        let client = self.client.clone();
        let policy = self.policy.clone();
        let outcomes = self.outcomes.clone();

        tokio::spawn(async move {
            let result = policy
                .run("delete event", || {
                    let client = client.clone();
                    let key = key.clone();
                    async move { client.delete_event(&key).await }
                })
                .await;

            if let Err(e) = &result {
                warn!(key = %key, error = %e, "Backend delete failed; event may still exist remotely");
            }

            // Receiver gone means the runtime is shutting down
            let _ = outcomes.send(RemovalOutcome { key, result });
        })
    }
}
