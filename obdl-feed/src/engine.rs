//! Feed engine: the single owner of all view and override state
//!
//! [`FeedEngine`] ties the differ, the card cache, the overrides, the label
//! editor and the removal coordinator together and forwards every batch of
//! effects to its renderer. All mutation goes through `&mut self`, so the
//! owner (the runtime task) serializes polls and user actions without locks.
//!
//! **Poll ordering:** every fetch gets a sequence number when it is issued.
//! A response whose number is not greater than the last applied one is
//! stale and discarded, so an earlier fetch that completes late can never
//! roll the view back.
//!
//! **Removal vs. in-flight polls:** a removed key is tombstoned. While its
//! delete request is pending, the key is stripped from every snapshot. Once
//! the backend confirms, snapshots issued before the confirmation are still
//! stripped; the first snapshot issued after it ends the tombstone. If the
//! delete fails, the tombstone is dropped immediately and the card comes
//! back on the next poll that still reports it.

use crate::label_edit::{LabelEditor, LabelMode};
use crate::overrides::Overrides;
use crate::reconcile::{EventDiffer, Reconciliation};
use crate::removal::{LocalState, RemovalCoordinator, RemovalOutcome};
use crate::render::Renderer;
use crate::view::CardStateStore;
use obdl_common::{EventKey, Snapshot};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// What happened to a polled snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(Reconciliation),
    /// Discarded: a newer (or the same) poll was already applied
    Stale { seq: u64, last_applied: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tombstone {
    /// Delete request still running
    Pending,
    /// Backend confirmed; polls issued up to `through_seq` may predate that
    Confirmed { through_seq: u64 },
}

/// Reconciliation engine bound to a renderer
pub struct FeedEngine<R: Renderer> {
    differ: EventDiffer,
    cards: CardStateStore,
    overrides: Overrides,
    labels: LabelEditor,
    removal: RemovalCoordinator,
    renderer: R,
    issued_seq: u64,
    applied_seq: u64,
    tombstones: HashMap<EventKey, Tombstone>,
}

impl<R: Renderer> FeedEngine<R> {
    pub fn new(overrides: Overrides, removal: RemovalCoordinator, renderer: R) -> Self {
        Self {
            differ: EventDiffer::new(),
            cards: CardStateStore::new(),
            overrides,
            labels: LabelEditor::new(),
            removal,
            renderer,
            issued_seq: 0,
            applied_seq: 0,
            tombstones: HashMap::new(),
        }
    }

    pub fn cards(&self) -> &CardStateStore {
        &self.cards
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn label_mode(&self, key: &EventKey) -> LabelMode {
        self.labels.mode(key)
    }

    pub fn is_displayed(&self, key: &EventKey) -> bool {
        self.cards.contains(key)
    }

    /// Sequence number of the last applied snapshot (0 before the first)
    pub fn last_applied_seq(&self) -> u64 {
        self.applied_seq
    }

    /// Reserve the sequence number for a fetch about to be issued
    pub fn next_poll_seq(&mut self) -> u64 {
        self.issued_seq += 1;
        self.issued_seq
    }

    /// Resolve a user-supplied card reference: exact key, else 1-based
    /// position in display order
    pub fn resolve_card(&self, reference: &str) -> Option<EventKey> {
        let key = EventKey::from(reference);
        if self.cards.contains(&key) {
            return Some(key);
        }
        let index: usize = reference.parse().ok()?;
        self.cards.keys_sorted().into_iter().nth(index.checked_sub(1)?)
    }

    /// Reconcile the snapshot fetched by poll `seq` and render the result
    pub fn apply_snapshot(&mut self, seq: u64, mut snapshot: Snapshot) -> ApplyOutcome {
        if seq <= self.applied_seq {
            debug!(seq, last_applied = self.applied_seq, "Discarding stale snapshot");
            return ApplyOutcome::Stale {
                seq,
                last_applied: self.applied_seq,
            };
        }
        self.applied_seq = seq;

        self.tombstones.retain(|key, tombstone| match *tombstone {
            Tombstone::Pending => {
                snapshot.remove(key);
                true
            }
            Tombstone::Confirmed { through_seq } if seq <= through_seq => {
                snapshot.remove(key);
                true
            }
            Tombstone::Confirmed { .. } => {
                if snapshot.contains_key(key) {
                    warn!(key = %key, "Feed still reports an event whose removal was confirmed");
                }
                false
            }
        });

        let reconciliation = self
            .differ
            .reconcile(&snapshot, &mut self.cards, &self.overrides);
        self.renderer.apply(&reconciliation.effects);

        if !reconciliation.is_noop() {
            debug!(
                seq,
                effects = reconciliation.effects.len(),
                new = reconciliation.newly_added.len(),
                "Applied snapshot"
            );
        }
        ApplyOutcome::Applied(reconciliation)
    }

    /// Flip a card's expansion; `None` if the card is not displayed
    ///
    /// The flag is stored even for cards without an artifact section yet,
    /// so it seeds the section once the event is done.
    pub fn toggle_expanded(&mut self, key: &EventKey) -> Option<bool> {
        if !self.cards.contains(key) {
            return None;
        }
        let expanded = self.overrides.toggle_expanded(key);
        let mut effects = Vec::new();
        self.cards.set_expanded(key, expanded, &mut effects);
        self.renderer.apply(&effects);
        Some(expanded)
    }

    /// Set a card's expansion explicitly; false if the card is not displayed
    pub fn set_expanded(&mut self, key: &EventKey, expanded: bool) -> bool {
        if !self.cards.contains(key) {
            return false;
        }
        self.overrides.set_expanded(key, expanded);
        let mut effects = Vec::new();
        self.cards.set_expanded(key, expanded, &mut effects);
        self.renderer.apply(&effects);
        true
    }

    pub fn begin_label_edit(&mut self, key: &EventKey) -> bool {
        let mut effects = Vec::new();
        let started = self.labels.begin(key, &self.cards, &mut effects);
        self.renderer.apply(&effects);
        started
    }

    pub fn update_label_draft(&mut self, key: &EventKey, draft: impl Into<String>) -> bool {
        self.labels.update_draft(key, draft)
    }

    /// Commit `input` as the label of `key`; returns the label now shown
    pub fn commit_label(&mut self, key: &EventKey, input: &str) -> Option<String> {
        let mut effects = Vec::new();
        let label = self
            .labels
            .commit(key, input, &mut self.cards, &mut self.overrides, &mut effects);
        self.renderer.apply(&effects);
        label
    }

    /// Commit the in-progress draft of `key`
    pub fn commit_label_draft(&mut self, key: &EventKey) -> Option<String> {
        let mut effects = Vec::new();
        let label = self
            .labels
            .commit_draft(key, &mut self.cards, &mut self.overrides, &mut effects);
        self.renderer.apply(&effects);
        label
    }

    pub fn cancel_label_edit(&mut self, key: &EventKey) -> bool {
        let mut effects = Vec::new();
        let cancelled = self.labels.cancel(key, &self.cards, &mut effects);
        self.renderer.apply(&effects);
        cancelled
    }

    /// Remove a card locally and fire the backend delete
    ///
    /// Must be called from within a tokio runtime (the delete is spawned).
    pub fn remove(&mut self, key: &EventKey) -> bool {
        let mut effects = Vec::new();
        let removed = self.removal.remove(
            key,
            LocalState {
                cards: &mut self.cards,
                differ: &mut self.differ,
                overrides: &mut self.overrides,
                labels: &mut self.labels,
            },
            &mut effects,
        );
        if removed {
            self.tombstones.insert(key.clone(), Tombstone::Pending);
        }
        self.renderer.apply(&effects);
        removed
    }

    /// Record the result of a backend delete
    pub fn on_removal_outcome(&mut self, outcome: &RemovalOutcome) {
        match &outcome.result {
            Ok(()) => {
                info!(key = %outcome.key, "Backend confirmed event removal");
                self.tombstones.insert(
                    outcome.key.clone(),
                    Tombstone::Confirmed {
                        through_seq: self.issued_seq,
                    },
                );
            }
            Err(e) => {
                warn!(
                    key = %outcome.key,
                    error = %e,
                    "Event removal not confirmed; it will reappear if the feed still reports it"
                );
                self.tombstones.remove(&outcome.key);
            }
        }
        self.renderer.removal_reported(outcome);
    }

    /// Ask the renderer to draw the full current state
    pub fn redraw(&mut self) {
        self.renderer.redraw();
    }
}
