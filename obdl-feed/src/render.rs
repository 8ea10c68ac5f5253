//! Renderers consuming view effects
//!
//! Reconciliation only describes changes; a [`Renderer`] applies them to an
//! actual surface. [`TerminalRenderer`] writes a line-oriented card feed,
//! [`MemoryRenderer`] records effects for inspection in tests.

use crate::removal::RemovalOutcome;
use crate::view::{ArtifactSection, CardView, Effect, StatusBadge, StatusColor};
use obdl_common::EventKey;
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// Surface that applies view effects
pub trait Renderer: Send {
    /// Apply one batch of effects, in order
    fn apply(&mut self, effects: &[Effect]);

    /// A remote delete finished (successfully or not)
    fn removal_reported(&mut self, _outcome: &RemovalOutcome) {}

    /// Draw the full current state again
    fn redraw(&mut self) {}
}

/// Records every effect; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct MemoryRenderer {
    log: Arc<Mutex<MemoryLog>>,
}

#[derive(Debug, Default)]
struct MemoryLog {
    effects: Vec<Effect>,
    batches: usize,
    removals: Vec<(EventKey, bool)>,
    redraws: usize,
}

impl MemoryRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All effects applied so far
    pub fn effects(&self) -> Vec<Effect> {
        self.lock().effects.clone()
    }

    /// Drain the recorded effects
    pub fn take_effects(&self) -> Vec<Effect> {
        std::mem::take(&mut self.lock().effects)
    }

    /// Number of non-empty batches applied
    pub fn batch_count(&self) -> usize {
        self.lock().batches
    }

    /// Reported removal outcomes as (key, succeeded)
    pub fn removals(&self) -> Vec<(EventKey, bool)> {
        self.lock().removals.clone()
    }

    pub fn redraw_count(&self) -> usize {
        self.lock().redraws
    }
}

impl Renderer for MemoryRenderer {
    fn apply(&mut self, effects: &[Effect]) {
        if effects.is_empty() {
            return;
        }
        let mut log = self.lock();
        log.batches += 1;
        log.effects.extend_from_slice(effects);
    }

    fn removal_reported(&mut self, outcome: &RemovalOutcome) {
        self.lock()
            .removals
            .push((outcome.key.clone(), outcome.is_success()));
    }

    fn redraw(&mut self) {
        self.lock().redraws += 1;
    }
}

/// Line-oriented card feed written to any `Write` sink (stdout in the CLI)
pub struct TerminalRenderer<W: Write + Send> {
    out: W,
    base_url: String,
    color: bool,
    cards: BTreeMap<EventKey, CardView>,
    editing: HashSet<EventKey>,
}

impl<W: Write + Send> TerminalRenderer<W> {
    /// `base_url` is prepended to artifact paths when printing them
    pub fn new(out: W, base_url: impl Into<String>) -> Self {
        Self {
            out,
            base_url: base_url.into(),
            color: false,
            cards: BTreeMap::new(),
            editing: HashSet::new(),
        }
    }

    /// Enable ANSI colors for status badges
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn badge(&self, badge: &StatusBadge) -> String {
        if !self.color {
            return format!("[{}]", badge.text);
        }
        let code = match badge.color {
            StatusColor::Attention => "33",
            StatusColor::Progress => "34",
            StatusColor::Completion => "32",
            StatusColor::Neutral => "90",
        };
        format!("\x1b[{}m[{}]\x1b[0m", code, badge.text)
    }

    fn line(&mut self, text: String) {
        if let Err(e) = writeln!(self.out, "{}", text) {
            warn!(error = %e, "Failed to write to terminal");
        }
    }

    fn artifact_lines(&mut self, section: &ArtifactSection) {
        let heatmap = format!("    heatmap: {}{}", self.base_url, section.heatmap);
        let trend = format!("    trend:   {}{}", self.base_url, section.trend);
        self.line(heatmap);
        self.line(trend);
    }

    fn label_of(&self, key: &EventKey) -> String {
        self.cards
            .get(key)
            .map(|c| c.label.clone())
            .unwrap_or_else(|| key.to_string())
    }

    fn apply_one(&mut self, effect: &Effect) {
        match effect {
            Effect::Create(card) => {
                let text = format!("+ {}  {}  ({})", card.label, self.badge(&card.badge), card.key);
                self.line(text);
                if let Some(section) = card.artifacts.as_ref().filter(|s| s.expanded) {
                    self.artifact_lines(section);
                }
                self.cards.insert(card.key.clone(), card.clone());
            }
            Effect::UpdateStatus { key, badge, .. } => {
                let text = format!("~ {}  {}", self.label_of(key), self.badge(badge));
                self.line(text);
                if let Some(card) = self.cards.get_mut(key) {
                    card.badge = badge.clone();
                }
            }
            Effect::AttachArtifacts { key, section, .. } => {
                let text = format!("  {}: plots available", self.label_of(key));
                self.line(text);
                if section.expanded {
                    self.artifact_lines(section);
                }
                if let Some(card) = self.cards.get_mut(key) {
                    card.artifacts = Some(section.clone());
                }
            }
            Effect::SetExpanded { key, expanded, .. } => {
                let section = self.cards.get_mut(key).and_then(|card| {
                    let section = card.artifacts.as_mut()?;
                    section.expanded = *expanded;
                    Some(section.clone())
                });
                match section {
                    Some(section) if *expanded => {
                        let text = format!("  {}:", self.label_of(key));
                        self.line(text);
                        self.artifact_lines(&section);
                    }
                    _ => {
                        let text = format!("  {}: plots hidden", self.label_of(key));
                        self.line(text);
                    }
                }
            }
            Effect::BeginLabelEdit { key, draft, .. } => {
                self.editing.insert(key.clone());
                self.line(format!(
                    "  editing label of {} (current: \"{}\"), use: label {} <text>",
                    key, draft, key
                ));
            }
            Effect::SetLabel { key, label, .. } => {
                self.editing.remove(key);
                if let Some(card) = self.cards.get_mut(key) {
                    card.label = label.clone();
                }
                self.line(format!("  {} is now \"{}\"", key, label));
            }
            Effect::CancelLabelEdit { key, .. } => {
                self.editing.remove(key);
                self.line(format!("  label edit of {} cancelled", key));
            }
            Effect::Remove { key, .. } => {
                let text = format!("- {} removed", self.label_of(key));
                self.line(text);
                self.cards.remove(key);
                self.editing.remove(key);
            }
            Effect::ScrollIntoView { key, .. } => {
                let text = format!("> {} finished processing", self.label_of(key));
                self.line(text);
            }
        }
    }
}

impl<W: Write + Send> Renderer for TerminalRenderer<W> {
    fn apply(&mut self, effects: &[Effect]) {
        for effect in effects {
            self.apply_one(effect);
        }
        if let Err(e) = self.out.flush() {
            warn!(error = %e, "Failed to flush terminal");
        }
    }

    fn removal_reported(&mut self, outcome: &RemovalOutcome) {
        if let Err(e) = &outcome.result {
            self.line(format!(
                "! backend did not confirm removal of {}: {}",
                outcome.key, e
            ));
        }
    }

    fn redraw(&mut self) {
        if self.cards.is_empty() {
            self.line("(no events)".to_string());
            return;
        }
        let cards: Vec<CardView> = self.cards.values().cloned().collect();
        for card in cards {
            let marker = if self.editing.contains(&card.key) { "*" } else { " " };
            let text = format!("{} {}  {}  ({})", marker, card.label, self.badge(&card.badge), card.key);
            self.line(text);
            if let Some(section) = card.artifacts.as_ref().filter(|s| s.expanded) {
                self.artifact_lines(section);
            }
        }
    }
}
