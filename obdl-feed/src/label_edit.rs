//! Per-card label edit mode
//!
//! A card label is either read-only or being edited. Committing trims the
//! input: an empty result restores the decoded timestamp label and drops
//! the stored override, anything else becomes the persisted override.

use crate::overrides::Overrides;
use crate::view::{CardStateStore, Effect};
use obdl_common::timestamp;
use obdl_common::EventKey;
use std::collections::HashMap;

/// Label state of one card
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelMode {
    ReadOnly,
    Editing { draft: String },
}

/// Edit state for all cards currently being edited
#[derive(Debug, Default)]
pub struct LabelEditor {
    editing: HashMap<EventKey, String>,
}

impl LabelEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self, key: &EventKey) -> LabelMode {
        match self.editing.get(key) {
            Some(draft) => LabelMode::Editing {
                draft: draft.clone(),
            },
            None => LabelMode::ReadOnly,
        }
    }

    /// Enter edit mode seeded with the label currently shown
    ///
    /// Returns false for unknown cards or cards already being edited.
    pub fn begin(&mut self, key: &EventKey, cards: &CardStateStore, effects: &mut Vec<Effect>) -> bool {
        let Some(entry) = cards.get(key) else {
            return false;
        };
        if self.editing.contains_key(key) {
            return false;
        }

        self.editing.insert(key.clone(), entry.label.clone());
        effects.push(Effect::BeginLabelEdit {
            handle: entry.handle,
            key: key.clone(),
            draft: entry.label.clone(),
        });
        true
    }

    /// Replace the in-progress draft (keystrokes in the edit field)
    pub fn update_draft(&mut self, key: &EventKey, draft: impl Into<String>) -> bool {
        match self.editing.get_mut(key) {
            Some(current) => {
                *current = draft.into();
                true
            }
            None => false,
        }
    }

    /// Commit `input` as the card's label and leave edit mode
    ///
    /// Works whether or not edit mode was entered first. Returns the label
    /// now displayed, or `None` if the card does not exist.
    pub fn commit(
        &mut self,
        key: &EventKey,
        input: &str,
        cards: &mut CardStateStore,
        overrides: &mut Overrides,
        effects: &mut Vec<Effect>,
    ) -> Option<String> {
        if !cards.contains(key) {
            return None;
        }
        self.editing.remove(key);

        let trimmed = input.trim();
        let label = if trimmed.is_empty() {
            overrides.clear_label(key);
            timestamp::decode(key.as_str())
        } else {
            overrides.set_label(key, trimmed);
            trimmed.to_string()
        };

        cards.set_label(key, label.clone(), effects);
        Some(label)
    }

    /// Commit the current draft
    pub fn commit_draft(
        &mut self,
        key: &EventKey,
        cards: &mut CardStateStore,
        overrides: &mut Overrides,
        effects: &mut Vec<Effect>,
    ) -> Option<String> {
        let draft = self.editing.get(key)?.clone();
        self.commit(key, &draft, cards, overrides, effects)
    }

    /// Leave edit mode without touching the label
    pub fn cancel(&mut self, key: &EventKey, cards: &CardStateStore, effects: &mut Vec<Effect>) -> bool {
        if self.editing.remove(key).is_none() {
            return false;
        }
        if let Some(entry) = cards.get(key) {
            effects.push(Effect::CancelLabelEdit {
                handle: entry.handle,
                key: key.clone(),
            });
        }
        true
    }

    /// Drop edit state for a removed card
    pub fn forget(&mut self, key: &EventKey) {
        self.editing.remove(key);
    }
}
