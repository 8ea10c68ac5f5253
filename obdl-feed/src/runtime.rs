//! Polling runtime
//!
//! [`FeedRuntime`] is the single task that owns the [`FeedEngine`]. Fetches,
//! remote deletes and artifact downloads run as spawned tasks and report
//! back over channels, so the engine is only ever touched from one place:
//!
//! ```text
//! ticker ──tick──▶ issue_poll ──spawn──▶ fetch_snapshot ──PollResponse──┐
//! stdin ──Command──▶ handle_command ──remove──▶ delete_event ──Outcome──┤
//!                                                                       ▼
//!                                                        select! loop → engine
//! ```
//!
//! A failed fetch is logged and reported on the event channel; the view
//! keeps its last good state and the next tick tries again.

use crate::client::FeedClient;
use crate::commands::Command;
use crate::engine::{ApplyOutcome, FeedEngine};
use crate::error::{FeedError, FeedResult};
use crate::overrides::Overrides;
use crate::removal::{RemovalCoordinator, RemovalOutcome};
use crate::render::Renderer;
use crate::retry::RetryPolicy;
use crate::ticker::TickSource;
use obdl_common::config::FeedSettings;
use obdl_common::timestamp::{to_artifact_ref, ArtifactKind};
use obdl_common::{EventKey, Snapshot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the runtime event channel
pub const EVENT_CAPACITY: usize = 256;

/// Notifications published by the runtime
///
/// Subscribers that fall behind lose the oldest events; nothing in the
/// runtime waits on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// A snapshot was reconciled into the view
    PollApplied {
        seq: u64,
        effects: usize,
        focus: Option<EventKey>,
    },
    /// A snapshot arrived after a newer one and was discarded
    PollStale { seq: u64, last_applied: u64 },
    /// Fetching the snapshot failed; the view is unchanged
    PollFailed { seq: u64, error: String },
    /// The backend answered (or gave up on) a delete
    RemovalReported { key: EventKey, success: bool },
    ArtifactsSaved { key: EventKey, paths: Vec<PathBuf> },
    ArtifactsFailed { key: EventKey, error: String },
    /// A command could not be carried out
    CommandRejected { command: String, reason: String },
}

/// Request policies and paths for a runtime
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub fetch_policy: RetryPolicy,
    pub delete_policy: RetryPolicy,
    /// Where `fetch` stores artifact images; `None` disables downloads
    pub artifact_dir: Option<PathBuf>,
}

impl RuntimeOptions {
    pub fn from_settings(settings: &FeedSettings) -> Self {
        Self {
            fetch_policy: RetryPolicy::new(&settings.retry, settings.request_timeout),
            delete_policy: RetryPolicy::new(&settings.retry, settings.delete_timeout),
            artifact_dir: Some(settings.artifact_dir.clone()),
        }
    }
}

#[derive(Debug)]
struct PollResponse {
    seq: u64,
    result: FeedResult<Snapshot>,
}

/// Owner of the engine and driver of the poll loop
pub struct FeedRuntime<R: Renderer> {
    engine: FeedEngine<R>,
    client: Arc<dyn FeedClient>,
    fetch_policy: RetryPolicy,
    artifact_dir: Option<PathBuf>,
    poll_tx: mpsc::UnboundedSender<PollResponse>,
    poll_rx: mpsc::UnboundedReceiver<PollResponse>,
    removal_rx: mpsc::UnboundedReceiver<RemovalOutcome>,
    events: broadcast::Sender<RuntimeEvent>,
}

impl<R: Renderer> FeedRuntime<R> {
    pub fn new(
        client: Arc<dyn FeedClient>,
        overrides: Overrides,
        renderer: R,
        options: RuntimeOptions,
    ) -> Self {
        let (removal, removal_rx) = RemovalCoordinator::new(client.clone(), options.delete_policy);
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            engine: FeedEngine::new(overrides, removal, renderer),
            client,
            fetch_policy: options.fetch_policy,
            artifact_dir: options.artifact_dir,
            poll_tx,
            poll_rx,
            removal_rx,
            events,
        }
    }

    /// Subscribe to runtime notifications
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events.subscribe()
    }

    pub fn engine(&self) -> &FeedEngine<R> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut FeedEngine<R> {
        &mut self.engine
    }

    fn emit(&self, event: RuntimeEvent) {
        // No subscribers is fine
        self.events.send(event).ok();
    }

    /// Start a fetch without waiting for it; returns its sequence number
    pub fn issue_poll(&mut self) -> u64 {
        let seq = self.engine.next_poll_seq();
        let client = self.client.clone();
        let policy = self.fetch_policy.clone();
        let tx = self.poll_tx.clone();

        debug!(seq, "Issuing poll");
        tokio::spawn(async move {
            let result = fetch_snapshot(client, &policy).await;
            // Receiver gone means the runtime has stopped
            tx.send(PollResponse { seq, result }).ok();
        });
        seq
    }

    /// Fetch and apply one snapshot inline
    pub async fn poll_once(&mut self) -> FeedResult<ApplyOutcome> {
        let seq = self.engine.next_poll_seq();
        let result = fetch_snapshot(self.client.clone(), &self.fetch_policy).await;
        match result {
            Ok(snapshot) => Ok(self.apply(seq, snapshot)),
            Err(e) => {
                self.report_poll_failure(seq, &e);
                Err(e)
            }
        }
    }

    fn handle_poll_response(&mut self, response: PollResponse) {
        match response.result {
            Ok(snapshot) => {
                self.apply(response.seq, snapshot);
            }
            Err(e) => self.report_poll_failure(response.seq, &e),
        }
    }

    fn apply(&mut self, seq: u64, snapshot: Snapshot) -> ApplyOutcome {
        let outcome = self.engine.apply_snapshot(seq, snapshot);
        let event = match &outcome {
            ApplyOutcome::Applied(reconciliation) => RuntimeEvent::PollApplied {
                seq,
                effects: reconciliation.effects.len(),
                focus: reconciliation.focus.clone(),
            },
            ApplyOutcome::Stale { seq, last_applied } => RuntimeEvent::PollStale {
                seq: *seq,
                last_applied: *last_applied,
            },
        };
        self.emit(event);
        outcome
    }

    fn report_poll_failure(&self, seq: u64, error: &FeedError) {
        warn!(seq, error = %error, "Poll failed, keeping last known view");
        self.emit(RuntimeEvent::PollFailed {
            seq,
            error: error.to_string(),
        });
    }

    fn handle_removal_outcome(&mut self, outcome: RemovalOutcome) {
        self.engine.on_removal_outcome(&outcome);
        self.emit(RuntimeEvent::RemovalReported {
            success: outcome.is_success(),
            key: outcome.key,
        });
    }

    fn reject(&self, command: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(command, reason = %reason, "Command rejected");
        self.emit(RuntimeEvent::CommandRejected {
            command: command.to_string(),
            reason,
        });
    }

    /// Resolve a card reference or report why it could not be
    fn card(&self, command: &str, reference: &str) -> Option<EventKey> {
        let key = self.engine.resolve_card(reference);
        if key.is_none() {
            self.reject(command, format!("no card matches '{}'", reference));
        }
        key
    }

    /// Carry out one user command; false means quit
    pub fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Quit => return false,
            Command::Help => {}
            Command::List => self.engine.redraw(),
            Command::Expand(card) => {
                if let Some(key) = self.card("expand", &card) {
                    self.engine.set_expanded(&key, true);
                }
            }
            Command::Collapse(card) => {
                if let Some(key) = self.card("collapse", &card) {
                    self.engine.set_expanded(&key, false);
                }
            }
            Command::Toggle(card) => {
                if let Some(key) = self.card("toggle", &card) {
                    self.engine.toggle_expanded(&key);
                }
            }
            Command::Edit(card) => {
                if let Some(key) = self.card("edit", &card) {
                    if !self.engine.begin_label_edit(&key) {
                        self.reject("edit", format!("{} is already being edited", key));
                    }
                }
            }
            Command::Label(card, text) => {
                if let Some(key) = self.card("label", &card) {
                    self.engine.commit_label(&key, &text);
                }
            }
            Command::Cancel(card) => {
                if let Some(key) = self.card("cancel", &card) {
                    if !self.engine.cancel_label_edit(&key) {
                        self.reject("cancel", format!("{} is not being edited", key));
                    }
                }
            }
            Command::Remove(card) => {
                if let Some(key) = self.card("remove", &card) {
                    self.engine.remove(&key);
                }
            }
            Command::Fetch(card) => {
                if let Some(key) = self.card("fetch", &card) {
                    self.spawn_artifact_download(key);
                }
            }
        }
        true
    }

    fn spawn_artifact_download(&self, key: EventKey) {
        let has_artifacts = self
            .engine
            .cards()
            .get(&key)
            .map(|entry| entry.has_artifact_section)
            .unwrap_or(false);
        if !has_artifacts {
            self.reject("fetch", format!("{} has no plots yet", key));
            return;
        }
        let Some(dir) = self.artifact_dir.clone() else {
            self.reject("fetch", "artifact downloads are disabled");
            return;
        };

        let client = self.client.clone();
        let policy = self.fetch_policy.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match download_artifacts(client, &policy, &dir, &key).await {
                Ok(paths) => {
                    info!(key = %key, count = paths.len(), "Saved artifact images");
                    RuntimeEvent::ArtifactsSaved { key, paths }
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Artifact download failed");
                    RuntimeEvent::ArtifactsFailed {
                        key,
                        error: e.to_string(),
                    }
                }
            };
            events.send(event).ok();
        });
    }

    /// Drive the loop until shutdown, the ticker stops, or `quit`
    ///
    /// Returns the engine so callers can inspect the final state.
    pub async fn run<T: TickSource>(
        mut self,
        mut ticker: T,
        mut commands: mpsc::UnboundedReceiver<Command>,
        shutdown: CancellationToken,
    ) -> FeedEngine<R> {
        let mut commands_open = true;
        info!("Feed runtime started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping feed runtime");
                    break;
                }
                ticked = ticker.tick() => {
                    if !ticked {
                        info!("Ticker stopped, stopping feed runtime");
                        break;
                    }
                    self.issue_poll();
                }
                Some(response) = self.poll_rx.recv() => {
                    self.handle_poll_response(response);
                }
                Some(outcome) = self.removal_rx.recv() => {
                    self.handle_removal_outcome(outcome);
                }
                command = commands.recv(), if commands_open => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            info!("Quit requested, stopping feed runtime");
                            break;
                        }
                    }
                    None => {
                        debug!("Command input closed");
                        commands_open = false;
                    }
                },
            }
        }

        self.engine
    }
}

async fn fetch_snapshot(client: Arc<dyn FeedClient>, policy: &RetryPolicy) -> FeedResult<Snapshot> {
    policy
        .run("fetch events", || {
            let client = client.clone();
            async move { client.fetch_snapshot().await }
        })
        .await
}

async fn download_artifacts(
    client: Arc<dyn FeedClient>,
    policy: &RetryPolicy,
    dir: &Path,
    key: &EventKey,
) -> FeedResult<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(obdl_common::Error::from)?;

    let mut paths = Vec::with_capacity(ArtifactKind::ALL.len());
    for kind in ArtifactKind::ALL {
        let bytes = policy
            .run("fetch artifact", || {
                let client = client.clone();
                let key = key.clone();
                async move { client.fetch_artifact(kind, &key).await }
            })
            .await?;

        let path = dir.join(format!("{}_{}.png", kind.prefix(), to_artifact_ref(key.as_str())));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(obdl_common::Error::from)?;
        paths.push(path);
    }
    Ok(paths)
}
