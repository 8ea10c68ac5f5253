//! Snapshot reconciliation
//!
//! [`EventDiffer`] compares each polled [`Snapshot`] with the key set of the
//! previous poll and drives [`CardStateStore`] so that only real changes
//! produce effects. Keys that disappear from the feed are left on screen:
//! the feed is authoritative for what it reports, not for what it omits.

use crate::overrides::Overrides;
use crate::view::{CardStateStore, Effect};
use obdl_common::{EventKey, Snapshot};
use std::collections::BTreeSet;

/// Result of reconciling one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// View mutations in display order; a scroll action, if any, comes last
    pub effects: Vec<Effect>,
    /// Keys present now but absent from the previous poll, ascending
    pub newly_added: Vec<EventKey>,
    /// Card that received the scroll-into-view action
    pub focus: Option<EventKey>,
}

impl Reconciliation {
    /// True when nothing on screen needs to change
    pub fn is_noop(&self) -> bool {
        self.effects.is_empty()
    }
}

/// Tracks the previous poll's key set (one generation only)
#[derive(Debug, Default)]
pub struct EventDiffer {
    known: BTreeSet<EventKey>,
}

impl EventDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_known(&self, key: &EventKey) -> bool {
        self.known.contains(key)
    }

    pub fn known_len(&self) -> usize {
        self.known.len()
    }

    /// Forget a key so that a later reappearance counts as new
    pub fn forget(&mut self, key: &EventKey) -> bool {
        self.known.remove(key)
    }

    /// Reconcile `snapshot` against the cards currently displayed
    ///
    /// Keys are visited in ascending order. Unknown cards are created, known
    /// ones updated only if their status changed. At most one card is
    /// focused: the smallest newly added key whose status is done.
    pub fn reconcile(
        &mut self,
        snapshot: &Snapshot,
        cards: &mut CardStateStore,
        overrides: &Overrides,
    ) -> Reconciliation {
        let mut effects = Vec::new();
        let mut newly_added = Vec::new();

        for (key, record) in snapshot.iter() {
            if !self.known.contains(key) {
                newly_added.push(key.clone());
            }

            if cards.contains(key) {
                cards.update_if_changed(key, record, overrides, &mut effects);
            } else {
                cards.ensure_created(key, record, overrides, &mut effects);
            }
        }

        self.known = snapshot.keys().cloned().collect();

        // newly_added is ascending, so the first match is the tie-break winner
        let focus = newly_added
            .iter()
            .find(|key| snapshot.get(key).is_some_and(|r| r.status.is_done()))
            .cloned();

        if let Some(key) = &focus {
            if let Some(entry) = cards.get(key) {
                effects.push(Effect::ScrollIntoView {
                    handle: entry.handle,
                    key: key.clone(),
                });
            }
        }

        Reconciliation {
            effects,
            newly_added,
            focus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obdl_common::EventStatus;

    const K1: &str = "2025-05-21T08-00-00-000001";
    const K2: &str = "2025-05-21T09-30-00-000002";
    const K3: &str = "2025-05-21T10-45-00-000003";

    struct Harness {
        differ: EventDiffer,
        cards: CardStateStore,
        overrides: Overrides,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                differ: EventDiffer::new(),
                cards: CardStateStore::new(),
                overrides: Overrides::in_memory(),
            }
        }

        fn apply(&mut self, snapshot: &Snapshot) -> Reconciliation {
            self.differ.reconcile(snapshot, &mut self.cards, &self.overrides)
        }
    }

    fn scrolls(rec: &Reconciliation) -> Vec<&EventKey> {
        rec.effects
            .iter()
            .filter(|e| matches!(e, Effect::ScrollIntoView { .. }))
            .map(Effect::key)
            .collect()
    }

    #[test]
    fn test_first_poll_creates_in_ascending_order() {
        let mut h = Harness::new();
        let snapshot = Snapshot::new()
            .with(K3, EventStatus::Started)
            .with(K1, EventStatus::Processed)
            .with(K2, EventStatus::Started);

        let rec = h.apply(&snapshot);

        let created: Vec<&str> = rec
            .effects
            .iter()
            .filter(|e| matches!(e, Effect::Create(_)))
            .map(|e| e.key().as_str())
            .collect();
        assert_eq!(created, vec![K1, K2, K3]);
        assert_eq!(rec.newly_added.len(), 3);
        assert_eq!(rec.focus, None);
    }

    #[test]
    fn test_single_status_change_touches_only_that_key() {
        let mut h = Harness::new();
        let s1 = Snapshot::new()
            .with(K1, EventStatus::Started)
            .with(K2, EventStatus::Started)
            .with(K3, EventStatus::Done);
        h.apply(&s1);

        let s2 = Snapshot::new()
            .with(K1, EventStatus::Started)
            .with(K2, EventStatus::Processed)
            .with(K3, EventStatus::Done);
        let rec = h.apply(&s2);

        assert_eq!(rec.effects.len(), 1);
        assert!(rec.effects.iter().all(|e| e.key().as_str() == K2));
        assert!(matches!(rec.effects[0], Effect::UpdateStatus { .. }));
        assert!(rec.newly_added.is_empty());
    }

    #[test]
    fn test_same_snapshot_twice_is_noop() {
        let mut h = Harness::new();
        let snapshot = Snapshot::new()
            .with(K1, EventStatus::Done)
            .with(K2, EventStatus::Processed);

        let first = h.apply(&snapshot);
        assert!(!first.is_noop());

        let second = h.apply(&snapshot);
        assert!(second.is_noop());
        assert!(second.newly_added.is_empty());
        assert_eq!(second.focus, None);
    }

    #[test]
    fn test_focus_tie_break_picks_smallest_done_key() {
        let mut h = Harness::new();
        h.apply(&Snapshot::new().with(K1, EventStatus::Started));

        let rec = h.apply(
            &Snapshot::new()
                .with(K1, EventStatus::Done)
                .with(K3, EventStatus::Done)
                .with(K2, EventStatus::Done),
        );

        // K1 turned done but was already known; K2 < K3 are both new and done
        assert_eq!(rec.focus.as_ref().map(EventKey::as_str), Some(K2));
        assert_eq!(scrolls(&rec), vec![&EventKey::from(K2)]);
        assert!(matches!(rec.effects.last(), Some(Effect::ScrollIntoView { .. })));
    }

    #[test]
    fn test_no_focus_for_new_key_that_is_not_done() {
        let mut h = Harness::new();
        let rec = h.apply(
            &Snapshot::new()
                .with(K1, EventStatus::Started)
                .with(K2, EventStatus::Processed),
        );
        assert_eq!(rec.focus, None);
        assert!(scrolls(&rec).is_empty());
    }

    #[test]
    fn test_known_key_becoming_done_is_not_focused() {
        let mut h = Harness::new();
        h.apply(&Snapshot::new().with(K1, EventStatus::Processed));
        let rec = h.apply(&Snapshot::new().with(K1, EventStatus::Done));
        assert_eq!(rec.focus, None);
    }

    #[test]
    fn test_missing_keys_are_kept_on_screen() {
        let mut h = Harness::new();
        h.apply(
            &Snapshot::new()
                .with(K1, EventStatus::Done)
                .with(K2, EventStatus::Done),
        );

        let rec = h.apply(&Snapshot::new().with(K2, EventStatus::Done));
        assert!(rec.is_noop());
        assert!(h.cards.contains(&EventKey::from(K1)));
        // Only one generation of history is kept
        assert!(!h.differ.is_known(&EventKey::from(K1)));
    }

    #[test]
    fn test_status_regression_is_rendered() {
        let mut h = Harness::new();
        h.apply(&Snapshot::new().with(K1, EventStatus::Done));
        let rec = h.apply(&Snapshot::new().with(K1, EventStatus::Started));

        assert_eq!(rec.effects.len(), 1);
        let Effect::UpdateStatus { badge, .. } = &rec.effects[0] else {
            panic!("expected UpdateStatus");
        };
        assert_eq!(badge.text, "Started");
    }

    #[test]
    fn test_forgotten_key_counts_as_new_again() {
        let mut h = Harness::new();
        let snapshot = Snapshot::new().with(K1, EventStatus::Done);
        h.apply(&snapshot);

        let mut effects = Vec::new();
        h.cards.remove(&EventKey::from(K1), &mut effects);
        h.differ.forget(&EventKey::from(K1));

        let rec = h.apply(&snapshot);
        assert_eq!(rec.newly_added, vec![EventKey::from(K1)]);
        assert_eq!(rec.focus, Some(EventKey::from(K1)));
    }
}
