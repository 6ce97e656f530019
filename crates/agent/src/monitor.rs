//! Per-session idle watchdog.
//!
//! Runs as its own task next to the turn loop, polling a shared activity
//! marker. After `idle_timeout` of silence it sends the fixed farewell,
//! waits a short grace period for delivery, disconnects the transport,
//! and reports. Every await races the shutdown signal so an explicit
//! disconnect never leaves the farewell half-awaited.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use guichet_core::config::DialogueConfig;
use guichet_core::messages;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::transport::TransportAdapter;

/// Last-activity marker shared between the turn loop and the monitor.
///
/// The turn loop calls `touch` whenever user input is successfully
/// received; the monitor only reads.
#[derive(Clone)]
pub struct ActivityTracker {
    last_activity: Arc<Mutex<Instant>>,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self { last_activity: Arc::new(Mutex::new(Instant::now())) }
    }
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&self) {
        let mut last = self.last_activity.lock().expect("activity lock poisoned");
        *last = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().expect("activity lock poisoned").elapsed()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MonitorSettings {
    pub idle_timeout: Duration,
    pub poll_interval: Duration,
    pub farewell_grace: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            farewell_grace: Duration::from_secs(2),
        }
    }
}

impl MonitorSettings {
    pub fn from_config(dialogue: &DialogueConfig) -> Self {
        Self {
            idle_timeout: Duration::from_secs(dialogue.idle_timeout_secs),
            poll_interval: Duration::from_secs(dialogue.idle_poll_secs),
            farewell_grace: Duration::from_secs(dialogue.farewell_grace_secs),
        }
    }
}

/// How the monitor ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// Silence exceeded the timeout; farewell sent, transport released.
    TimedOut,
    /// The shutdown signal fired first; nothing was sent.
    Shutdown,
}

pub struct IdleMonitor {
    settings: MonitorSettings,
    tracker: ActivityTracker,
    transport: Arc<dyn TransportAdapter>,
    shutdown: watch::Receiver<bool>,
}

impl IdleMonitor {
    pub fn new(
        settings: MonitorSettings,
        tracker: ActivityTracker,
        transport: Arc<dyn TransportAdapter>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self { settings, tracker, transport, shutdown }
    }

    /// Watch the session until it times out or shutdown is signalled.
    ///
    /// The farewell and the disconnect each happen at most once, in that
    /// order; a failed farewell send still releases the transport.
    pub async fn run(mut self) -> MonitorOutcome {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {
                    if self.tracker.idle_for() > self.settings.idle_timeout {
                        break;
                    }
                }
                _ = self.shutdown.wait_for(|stop| *stop) => {
                    return MonitorOutcome::Shutdown;
                }
            }
        }

        info!(
            event_name = "dialogue.monitor.idle_timeout",
            idle_timeout_secs = self.settings.idle_timeout.as_secs(),
            "session idle, sending farewell"
        );

        tokio::select! {
            sent = self.transport.send_text(messages::IDLE_FAREWELL) => {
                if let Err(error) = sent {
                    warn!(
                        event_name = "dialogue.monitor.farewell_failed",
                        error = %error,
                        "farewell could not be delivered"
                    );
                }
            }
            _ = self.shutdown.wait_for(|stop| *stop) => {
                return MonitorOutcome::Shutdown;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(self.settings.farewell_grace) => {}
            _ = self.shutdown.wait_for(|stop| *stop) => {
                return MonitorOutcome::Shutdown;
            }
        }

        if let Err(error) = self.transport.disconnect().await {
            warn!(
                event_name = "dialogue.monitor.disconnect_failed",
                error = %error,
                "transport disconnect failed"
            );
        }
        info!(event_name = "dialogue.monitor.terminated", "idle session terminated");
        MonitorOutcome::TimedOut
    }
}
