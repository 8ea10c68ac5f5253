//! Poll scheduling
//!
//! The runtime pulls ticks from a [`TickSource`]. [`Ticker`] produces them
//! on a fixed period until stopped through its cancellation token;
//! [`ManualTicker`] produces one tick per [`ManualTickHandle::step`] so tests
//! can single-step polls without wall-clock delays.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Source of poll ticks
#[async_trait]
pub trait TickSource: Send {
    /// Wait for the next tick; `false` once the source is stopped
    async fn tick(&mut self) -> bool;
}

/// Fixed-period ticker with explicit start/stop
///
/// The first tick fires immediately after start so the feed is loaded
/// without waiting a full period.
pub struct Ticker {
    period: Duration,
    token: CancellationToken,
    interval: Option<Interval>,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            token: CancellationToken::new(),
            interval: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// (Re)start ticking; a stopped ticker gets a fresh token
    pub fn start(&mut self) {
        if self.token.is_cancelled() {
            self.token = CancellationToken::new();
        }
        let mut timer = interval(self.period);
        // A slow host should not cause a burst of catch-up polls
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(timer);
        debug!(period_ms = self.period.as_millis() as u64, "Ticker started");
    }

    /// Stop ticking; pending and future `tick` calls return false
    pub fn stop(&mut self) {
        self.token.cancel();
        self.interval = None;
        debug!("Ticker stopped");
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some() && !self.token.is_cancelled()
    }

    /// Token that stops this ticker when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[async_trait]
impl TickSource for Ticker {
    async fn tick(&mut self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        if self.interval.is_none() {
            self.start();
        }
        let token = self.token.clone();
        let Some(timer) = self.interval.as_mut() else {
            return false;
        };

        tokio::select! {
            _ = token.cancelled() => false,
            _ = timer.tick() => true,
        }
    }
}

/// Tick source driven by explicit steps
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<()>,
}

/// Sends ticks to a [`ManualTicker`]; dropping every handle stops it
#[derive(Clone)]
pub struct ManualTickHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualTicker {
    pub fn new() -> (Self, ManualTickHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, ManualTickHandle { tx })
    }
}

impl ManualTickHandle {
    /// Queue one tick; false if the ticker is gone
    pub fn step(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

#[async_trait]
impl TickSource for ManualTicker {
    async fn tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_tick_is_immediate() {
        let mut ticker = Ticker::new(Duration::from_secs(3600));
        let ticked = tokio::time::timeout(Duration::from_millis(500), ticker.tick())
            .await
            .expect("first tick should not wait a full period");
        assert!(ticked);
        assert!(ticker.is_running());
    }

    #[tokio::test]
    async fn test_ticks_repeat_at_period() {
        let mut ticker = Ticker::new(Duration::from_millis(10));
        let start = tokio::time::Instant::now();
        for _ in 0..3 {
            assert!(ticker.tick().await);
        }
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_stop_via_token_ends_pending_tick() {
        let mut ticker = Ticker::new(Duration::from_secs(3600));
        assert!(ticker.tick().await);

        let token = ticker.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let ticked = tokio::time::timeout(Duration::from_secs(2), ticker.tick())
            .await
            .expect("cancellation should end the wait");
        assert!(!ticked);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let mut ticker = Ticker::new(Duration::from_millis(5));
        ticker.stop();
        assert!(!ticker.tick().await);
        assert!(!ticker.is_running());

        ticker.start();
        assert!(ticker.tick().await);
    }

    #[tokio::test]
    async fn test_manual_ticker_single_steps() {
        let (mut ticker, handle) = ManualTicker::new();
        assert!(handle.step());
        assert!(handle.step());
        assert!(ticker.tick().await);
        assert!(ticker.tick().await);

        drop(handle);
        assert!(!ticker.tick().await);
    }
}
