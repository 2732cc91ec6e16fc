use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cyrest::ReachabilityCheck;
use crate::domain::HEARTBEAT_INTERVAL;
use crate::events::{EventSink, SearchEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityState {
    pub is_available: bool,
    pub is_polling: bool,
}

struct Heartbeat {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Periodically probes a local service and reports whether it answered.
pub struct AvailabilityMonitor<C> {
    check: Arc<C>,
    sink: Arc<dyn EventSink>,
    interval: Duration,
    state: Arc<watch::Sender<AvailabilityState>>,
    heartbeat: Option<Heartbeat>,
}

impl<C: ReachabilityCheck + 'static> AvailabilityMonitor<C> {
    pub fn new(check: Arc<C>, sink: Arc<dyn EventSink>) -> Self {
        let (state, _) = watch::channel(AvailabilityState::default());
        Self {
            check,
            sink,
            interval: HEARTBEAT_INTERVAL,
            state: Arc::new(state),
            heartbeat: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn state(&self) -> AvailabilityState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AvailabilityState> {
        self.state.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.heartbeat.is_some()
    }

    /// Spawns the heartbeat task. Returns `false` when one is already running.
    pub fn start(&mut self) -> bool {
        if self.heartbeat.is_some() {
            return false;
        }
        let (stop, stopped) = oneshot::channel();
        let check = Arc::clone(&self.check);
        let sink = Arc::clone(&self.sink);
        let state = Arc::clone(&self.state);
        let interval = self.interval;

        self.state.send_modify(|current| current.is_polling = true);
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = stopped => debug!("heartbeat stopped"),
                _ = heartbeat(check, sink, state, interval) => {}
            }
        });
        info!(interval_ms = interval.as_millis() as u64, "availability monitor started");
        self.heartbeat = Some(Heartbeat { stop, handle });
        true
    }

    /// Signals the heartbeat task and waits for it to exit.
    pub async fn stop(&mut self) {
        let Some(Heartbeat { stop, handle }) = self.heartbeat.take() else {
            return;
        };
        let _ = stop.send(());
        let _ = handle.await;
        self.state.send_modify(|current| current.is_polling = false);
        info!("availability monitor stopped");
    }
}

async fn heartbeat<C: ReachabilityCheck>(
    check: Arc<C>,
    sink: Arc<dyn EventSink>,
    state: Arc<watch::Sender<AvailabilityState>>,
    interval: Duration,
) {
    loop {
        let is_available = match check.check().await {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "reachability check failed");
                false
            }
        };
        state.send_modify(|current| current.is_available = is_available);
        sink.publish(SearchEvent::AvailabilityChanged { is_available });
        tokio::time::sleep(interval).await;
    }
}
