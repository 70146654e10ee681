use chrono::{DateTime, Utc};
use log::warn;
use tokio::sync::broadcast;
use tokio::time::{timeout, Duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEventType {
    Added,
    Removed,
}

#[derive(Debug, Clone)]
pub struct DeviceEvent {
    pub event_type: DeviceEventType,
    pub device_path: String,
    pub size_bytes: i64,
    pub timestamp: DateTime<Utc>,
}

/// Process-wide, single-reader event source for host block device hotplug
/// events (spec §4.2). The monitor itself only fans events out; a consumer
/// must `subscribe` before it starts an operation that might race incoming
/// events, so nothing published between subscribe and the first `recv` is
/// missed.
#[derive(Clone)]
pub struct DeviceMonitor {
    sender: broadcast::Sender<DeviceEvent>,
}

impl DeviceMonitor {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Called by the udev/hotplug listener (outside this module's scope) to
    /// publish an observed device event.
    pub fn publish(&self, event: DeviceEvent) {
        let _ = self.sender.send(event);
    }

    /// Opens a subscription. Callers should do this *before* issuing the
    /// cloud attach call so no event is missed while the call is in flight.
    pub fn subscribe(&self) -> DeviceEventReceiver {
        DeviceEventReceiver(self.sender.subscribe())
    }
}

impl Default for DeviceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DeviceEventReceiver(broadcast::Receiver<DeviceEvent>);

impl DeviceEventReceiver {
    /// Blocks until a fresh `added` event with a wall-clock timestamp no
    /// older than five seconds before `correlation_start` arrives, or
    /// `overall_timeout` elapses. Staleness and `removed` filtering is the
    /// consumer's job per spec §4.2, not the producer's.
    pub async fn wait_for_device(
        &mut self,
        correlation_start: DateTime<Utc>,
        overall_timeout: Duration,
    ) -> Option<DeviceEvent> {
        let deadline = tokio::time::Instant::now() + overall_timeout;
        let stale_before = correlation_start - chrono::Duration::seconds(5);

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let inner_timeout = remaining.min(Duration::from_secs(5));

            match timeout(inner_timeout, self.0.recv()).await {
                Ok(Ok(event)) => {
                    if event.event_type != DeviceEventType::Added {
                        continue;
                    }
                    if event.timestamp < stale_before {
                        continue;
                    }
                    return Some(event);
                }
                Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                    warn!("device monitor: consumer lagged, dropped {} events", n);
                    continue;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                Err(_) => continue,
            }
        }
    }

    /// Drains any events still pending for up to one second after a
    /// successful correlation, per spec §4.2.
    pub async fn drain_for(&mut self, duration: Duration) {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return;
            }
            if timeout(remaining, self.0.recv()).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn skips_stale_events_and_returns_fresh_one() {
        let monitor = DeviceMonitor::new();
        let mut receiver = monitor.subscribe();
        let start = Utc::now();

        monitor.publish(DeviceEvent {
            event_type: DeviceEventType::Added,
            device_path: "/dev/vdc".to_string(),
            size_bytes: 1024,
            timestamp: start - chrono::Duration::seconds(10),
        });
        monitor.publish(DeviceEvent {
            event_type: DeviceEventType::Added,
            device_path: "/dev/vdd".to_string(),
            size_bytes: 2048,
            timestamp: start + chrono::Duration::seconds(4),
        });

        let event = receiver
            .wait_for_device(start, Duration::from_secs(1))
            .await
            .expect("expected a fresh event");
        assert_eq!(event.device_path, "/dev/vdd");
    }
}
