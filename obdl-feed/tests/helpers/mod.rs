//! Shared test utilities for obdl-feed integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use obdl_common::timestamp::ArtifactKind;
use obdl_common::{EventKey, EventStatus, Snapshot};
use obdl_feed::client::FeedClient;
use obdl_feed::error::{FeedError, FeedResult};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const K1: &str = "2025-05-21T19-50-13-708146";
pub const K2: &str = "2025-05-22T07-15-00-000001";
pub const K3: &str = "2025-05-23T12-00-00-000000";

/// Upper bound for waiting on spawned work in tests
pub const WAIT: Duration = Duration::from_secs(5);

pub fn key(raw: &str) -> EventKey {
    EventKey::from(raw)
}

pub fn snapshot(entries: &[(&str, EventStatus)]) -> Snapshot {
    entries
        .iter()
        .fold(Snapshot::new(), |s, (k, status)| s.with(*k, status.clone()))
}

#[derive(Default)]
struct Script {
    current: Snapshot,
    queued_fetch_errors: VecDeque<u16>,
    fetches: usize,
    deletes: Vec<EventKey>,
    fail_deletes: bool,
    delete_gate: Option<Arc<Semaphore>>,
}

/// Scripted in-process backend
///
/// Serves whatever snapshot was last set, can fail fetches or deletes on
/// demand and can hold deletes until released. Records every delete.
#[derive(Default)]
pub struct ScriptedClient {
    script: Mutex<Script>,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn set_snapshot(&self, snapshot: Snapshot) {
        self.lock().current = snapshot;
    }

    /// Make the next fetch fail with `status`
    pub fn fail_next_fetch(&self, status: u16) {
        self.lock().queued_fetch_errors.push_back(status);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.lock().fail_deletes = fail;
    }

    /// Hold deletes until [`release_deletes`](Self::release_deletes)
    pub fn hold_deletes(&self) {
        self.lock().delete_gate = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_deletes(&self) {
        if let Some(gate) = self.lock().delete_gate.take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn deletes(&self) -> Vec<EventKey> {
        self.lock().deletes.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }
}

#[async_trait]
impl FeedClient for ScriptedClient {
    async fn fetch_snapshot(&self) -> FeedResult<Snapshot> {
        let mut script = self.lock();
        script.fetches += 1;
        if let Some(status) = script.queued_fetch_errors.pop_front() {
            return Err(FeedError::Status {
                status,
                url: "scripted:/events".to_string(),
            });
        }
        Ok(script.current.clone())
    }

    async fn delete_event(&self, key: &EventKey) -> FeedResult<()> {
        let (gate, fail) = {
            let mut script = self.lock();
            script.deletes.push(key.clone());
            (script.delete_gate.clone(), script.fail_deletes)
        };
        if let Some(gate) = gate {
            gate.acquire().await.map_err(|_| FeedError::Decode("gate closed".into()))?.forget();
        }
        if fail {
            return Err(FeedError::Status {
                status: 404,
                url: format!("scripted:/events/remove/{}", key),
            });
        }
        Ok(())
    }

    async fn fetch_artifact(&self, kind: ArtifactKind, key: &EventKey) -> FeedResult<Vec<u8>> {
        Ok(format!("{}:{}", kind.prefix(), key).into_bytes())
    }

    async fn health(&self) -> FeedResult<()> {
        Ok(())
    }
}
