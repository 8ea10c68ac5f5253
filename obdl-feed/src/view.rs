//! Card view model and the per-key view cache
//!
//! Each displayed event is a card: a label, a status badge and, once the
//! event is done, an artifact section (heatmap + trend plots) that can be
//! expanded or collapsed. [`CardStateStore`] remembers what was last rendered
//! for every card so that reconciliation only emits [`Effect`]s for real
//! changes. Nothing here draws anything; renderers consume the effects.

use crate::overrides::Overrides;
use obdl_common::timestamp::{self, ArtifactKind};
use obdl_common::{EventKey, EventRecord, EventStatus};
use std::collections::HashMap;
use std::fmt;

/// Opaque identity of one rendered card element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewHandle(u64);

impl ViewHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "card-{}", self.0)
    }
}

/// Semantic badge color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusColor {
    /// Started: needs attention, processing pending
    Attention,
    /// Processed: pipeline done, artifacts pending
    Progress,
    /// Done: artifacts available
    Completion,
    /// Unrecognized status string
    Neutral,
}

/// Status text and color shown on a card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBadge {
    pub text: String,
    pub color: StatusColor,
}

impl StatusBadge {
    pub fn for_status(status: &EventStatus) -> Self {
        let (text, color) = match status {
            EventStatus::Started => ("Started", StatusColor::Attention),
            EventStatus::Processed => ("Processed", StatusColor::Progress),
            EventStatus::Done => ("Done", StatusColor::Completion),
            EventStatus::Unknown(_) => ("Unknown status", StatusColor::Neutral),
        };
        Self {
            text: text.to_string(),
            color,
        }
    }
}

/// Artifact references of a done card plus its visibility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSection {
    /// Server path of the heatmap image
    pub heatmap: String,
    /// Server path of the trend image
    pub trend: String,
    pub expanded: bool,
}

impl ArtifactSection {
    pub fn for_key(key: &EventKey, expanded: bool) -> Self {
        Self {
            heatmap: timestamp::artifact_path(ArtifactKind::Heatmap, key.as_str()),
            trend: timestamp::artifact_path(ArtifactKind::Trend, key.as_str()),
            expanded,
        }
    }
}

/// Everything a renderer needs to draw a new card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardView {
    pub handle: ViewHandle,
    pub key: EventKey,
    pub label: String,
    pub badge: StatusBadge,
    pub artifacts: Option<ArtifactSection>,
}

/// One view mutation for a renderer to apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Insert a new card (display position follows key order)
    Create(CardView),
    /// Replace the status badge of an existing card
    UpdateStatus {
        handle: ViewHandle,
        key: EventKey,
        badge: StatusBadge,
    },
    /// Add the artifact section to a card that just became done
    AttachArtifacts {
        handle: ViewHandle,
        key: EventKey,
        section: ArtifactSection,
    },
    /// Show or hide the artifact section
    SetExpanded {
        handle: ViewHandle,
        key: EventKey,
        expanded: bool,
    },
    /// Switch the label into an editable field seeded with `draft`
    BeginLabelEdit {
        handle: ViewHandle,
        key: EventKey,
        draft: String,
    },
    /// Show `label` read-only (ends any edit in progress)
    SetLabel {
        handle: ViewHandle,
        key: EventKey,
        label: String,
    },
    /// Leave edit mode without changing the label
    CancelLabelEdit { handle: ViewHandle, key: EventKey },
    /// Detach the card
    Remove { handle: ViewHandle, key: EventKey },
    /// Animated scroll to bring the card into view
    ScrollIntoView { handle: ViewHandle, key: EventKey },
}

impl Effect {
    pub fn key(&self) -> &EventKey {
        match self {
            Effect::Create(card) => &card.key,
            Effect::UpdateStatus { key, .. }
            | Effect::AttachArtifacts { key, .. }
            | Effect::SetExpanded { key, .. }
            | Effect::BeginLabelEdit { key, .. }
            | Effect::SetLabel { key, .. }
            | Effect::CancelLabelEdit { key, .. }
            | Effect::Remove { key, .. }
            | Effect::ScrollIntoView { key, .. } => key,
        }
    }

    pub fn handle(&self) -> ViewHandle {
        match self {
            Effect::Create(card) => card.handle,
            Effect::UpdateStatus { handle, .. }
            | Effect::AttachArtifacts { handle, .. }
            | Effect::SetExpanded { handle, .. }
            | Effect::BeginLabelEdit { handle, .. }
            | Effect::SetLabel { handle, .. }
            | Effect::CancelLabelEdit { handle, .. }
            | Effect::Remove { handle, .. }
            | Effect::ScrollIntoView { handle, .. } => *handle,
        }
    }
}

/// Cached state of one displayed card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewEntry {
    pub handle: ViewHandle,
    pub last_rendered_status: EventStatus,
    pub has_artifact_section: bool,
    /// Label currently shown (override or decoded key)
    pub label: String,
}

/// Per-key cache of rendered cards
#[derive(Debug, Default)]
pub struct CardStateStore {
    entries: HashMap<EventKey, ViewEntry>,
    next_handle: u64,
}

impl CardStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &EventKey) -> Option<&ViewEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Displayed keys in display (ascending) order
    pub fn keys_sorted(&self) -> Vec<EventKey> {
        let mut keys: Vec<EventKey> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Return the card for `key`, creating it if needed
    ///
    /// Creation emits exactly one [`Effect::Create`]. The label comes from the
    /// label override when present, else from the decoded key. Done cards are
    /// created with their artifact section, collapsed unless the stored
    /// expansion flag says otherwise.
    pub fn ensure_created(
        &mut self,
        key: &EventKey,
        record: &EventRecord,
        overrides: &Overrides,
        effects: &mut Vec<Effect>,
    ) -> ViewHandle {
        if let Some(entry) = self.entries.get(key) {
            return entry.handle;
        }

        self.next_handle += 1;
        let handle = ViewHandle(self.next_handle);

        let label = overrides
            .label(key)
            .map(str::to_string)
            .unwrap_or_else(|| timestamp::decode(key.as_str()));
        let artifacts = record
            .status
            .is_done()
            .then(|| ArtifactSection::for_key(key, overrides.is_expanded(key)));

        self.entries.insert(
            key.clone(),
            ViewEntry {
                handle,
                last_rendered_status: record.status.clone(),
                has_artifact_section: artifacts.is_some(),
                label: label.clone(),
            },
        );

        effects.push(Effect::Create(CardView {
            handle,
            key: key.clone(),
            label,
            badge: StatusBadge::for_status(&record.status),
            artifacts,
        }));
        handle
    }

    /// Bring an existing card in line with `record`
    ///
    /// Returns whether any effect was emitted. An unchanged status (or an
    /// unknown key) emits nothing. When the status becomes done the artifact
    /// section is attached once; it is never attached twice and never
    /// detached, even if the status later regresses.
    pub fn update_if_changed(
        &mut self,
        key: &EventKey,
        record: &EventRecord,
        overrides: &Overrides,
        effects: &mut Vec<Effect>,
    ) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        if entry.last_rendered_status == record.status {
            return false;
        }

        entry.last_rendered_status = record.status.clone();
        effects.push(Effect::UpdateStatus {
            handle: entry.handle,
            key: key.clone(),
            badge: StatusBadge::for_status(&record.status),
        });

        if record.status.is_done() && !entry.has_artifact_section {
            entry.has_artifact_section = true;
            effects.push(Effect::AttachArtifacts {
                handle: entry.handle,
                key: key.clone(),
                section: ArtifactSection::for_key(key, overrides.is_expanded(key)),
            });
        }
        true
    }

    /// Show a new read-only label
    pub fn set_label(&mut self, key: &EventKey, label: String, effects: &mut Vec<Effect>) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        entry.label = label.clone();
        effects.push(Effect::SetLabel {
            handle: entry.handle,
            key: key.clone(),
            label,
        });
        true
    }

    /// Show or hide the artifact section; no-op for cards without one
    pub fn set_expanded(&mut self, key: &EventKey, expanded: bool, effects: &mut Vec<Effect>) -> bool {
        match self.entries.get(key) {
            Some(entry) if entry.has_artifact_section => {
                effects.push(Effect::SetExpanded {
                    handle: entry.handle,
                    key: key.clone(),
                    expanded,
                });
                true
            }
            _ => false,
        }
    }

    /// Detach a card and drop its cache entry; no-op for unknown keys
    pub fn remove(&mut self, key: &EventKey, effects: &mut Vec<Effect>) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                effects.push(Effect::Remove {
                    handle: entry.handle,
                    key: key.clone(),
                });
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "2025-05-21T19-50-13-708146";

    fn record(status: EventStatus) -> EventRecord {
        EventRecord::new(status)
    }

    #[test]
    fn test_badges() {
        assert_eq!(StatusBadge::for_status(&EventStatus::Started).color, StatusColor::Attention);
        assert_eq!(StatusBadge::for_status(&EventStatus::Processed).color, StatusColor::Progress);
        assert_eq!(StatusBadge::for_status(&EventStatus::Done).color, StatusColor::Completion);

        let unknown = StatusBadge::for_status(&EventStatus::Unknown("queued".into()));
        assert_eq!(unknown.color, StatusColor::Neutral);
        assert_eq!(unknown.text, "Unknown status");
    }

    #[test]
    fn test_create_uses_decoded_label() {
        let mut store = CardStateStore::new();
        let mut effects = Vec::new();
        let key = EventKey::from(KEY);

        store.ensure_created(&key, &record(EventStatus::Started), &Overrides::in_memory(), &mut effects);

        assert_eq!(effects.len(), 1);
        let Effect::Create(card) = &effects[0] else {
            panic!("expected Create, got {:?}", effects[0]);
        };
        assert_eq!(card.label, "19:50 21/05/2025");
        assert_eq!(card.badge.text, "Started");
        assert!(card.artifacts.is_none());
    }

    #[test]
    fn test_create_prefers_label_override_and_seeds_expansion() {
        let mut overrides = Overrides::in_memory();
        let key = EventKey::from(KEY);
        overrides.set_label(&key, "Morning commute");
        overrides.set_expanded(&key, true);

        let mut store = CardStateStore::new();
        let mut effects = Vec::new();
        store.ensure_created(&key, &record(EventStatus::Done), &overrides, &mut effects);

        let Effect::Create(card) = &effects[0] else {
            panic!("expected Create");
        };
        assert_eq!(card.label, "Morning commute");
        let section = card.artifacts.as_ref().unwrap();
        assert!(section.expanded);
        assert_eq!(section.heatmap, format!("/plots/heatmap_{}.png", KEY));
        assert!(store.get(&key).unwrap().has_artifact_section);
    }

    #[test]
    fn test_ensure_created_is_idempotent() {
        let mut store = CardStateStore::new();
        let mut effects = Vec::new();
        let key = EventKey::from(KEY);
        let overrides = Overrides::in_memory();

        let first = store.ensure_created(&key, &record(EventStatus::Started), &overrides, &mut effects);
        let second = store.ensure_created(&key, &record(EventStatus::Done), &overrides, &mut effects);

        assert_eq!(first, second);
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn test_update_same_status_is_noop() {
        let mut store = CardStateStore::new();
        let mut effects = Vec::new();
        let key = EventKey::from(KEY);
        let overrides = Overrides::in_memory();
        store.ensure_created(&key, &record(EventStatus::Processed), &overrides, &mut effects);
        effects.clear();

        assert!(!store.update_if_changed(&key, &record(EventStatus::Processed), &overrides, &mut effects));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_update_to_done_attaches_artifacts_once() {
        let mut store = CardStateStore::new();
        let mut effects = Vec::new();
        let key = EventKey::from(KEY);
        let overrides = Overrides::in_memory();
        store.ensure_created(&key, &record(EventStatus::Started), &overrides, &mut effects);
        effects.clear();

        assert!(store.update_if_changed(&key, &record(EventStatus::Done), &overrides, &mut effects));
        assert_eq!(effects.len(), 2);
        assert!(matches!(effects[0], Effect::UpdateStatus { .. }));
        assert!(matches!(effects[1], Effect::AttachArtifacts { .. }));
        effects.clear();

        // Regress and come back: status changes render, section is not duplicated
        assert!(store.update_if_changed(&key, &record(EventStatus::Started), &overrides, &mut effects));
        assert!(store.update_if_changed(&key, &record(EventStatus::Done), &overrides, &mut effects));
        assert_eq!(effects.len(), 2);
        assert!(effects.iter().all(|e| matches!(e, Effect::UpdateStatus { .. })));
    }

    #[test]
    fn test_update_unknown_key_is_noop() {
        let mut store = CardStateStore::new();
        let mut effects = Vec::new();
        let changed = store.update_if_changed(
            &EventKey::from(KEY),
            &record(EventStatus::Done),
            &Overrides::in_memory(),
            &mut effects,
        );
        assert!(!changed);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_set_expanded_requires_artifact_section() {
        let mut store = CardStateStore::new();
        let mut effects = Vec::new();
        let key = EventKey::from(KEY);
        store.ensure_created(&key, &record(EventStatus::Started), &Overrides::in_memory(), &mut effects);
        effects.clear();

        assert!(!store.set_expanded(&key, true, &mut effects));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_remove_unknown_key_is_silent() {
        let mut store = CardStateStore::new();
        let mut effects = Vec::new();
        assert!(!store.remove(&EventKey::from(KEY), &mut effects));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_handles_are_not_reused() {
        let mut store = CardStateStore::new();
        let mut effects = Vec::new();
        let key = EventKey::from(KEY);
        let overrides = Overrides::in_memory();

        let first = store.ensure_created(&key, &record(EventStatus::Done), &overrides, &mut effects);
        store.remove(&key, &mut effects);
        let second = store.ensure_created(&key, &record(EventStatus::Done), &overrides, &mut effects);
        assert_ne!(first, second);
    }
}
