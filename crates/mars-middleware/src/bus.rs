//! Broadcast bridge for asynchronous consumers.
//!
//! The observer registry runs synchronously inside the pose update.  Anything
//! that should not run on that path (rendering, UI, recorders) subscribes to
//! a [`LocationBus`] instead and receives the same [`Notification`]s over a
//! [`tokio::sync::broadcast`] channel.  Register a [`BusObserver`] with the
//! session to feed the bus.
//!
//! | Subscription | Yields |
//! |---|---|
//! | [`LocationBus::subscribe`] | every notification |
//! | [`LocationBus::subscribe_kinds`] | only the listed [`EventKind`]s |

use std::collections::HashSet;

use mars_types::MarsError;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::events::{EventKind, Notification};
use crate::observer::{Delivery, LocationObserver};

/// Default channel capacity (number of buffered notifications before old ones
/// are dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Shared notification bus. Clone it cheaply – all clones share the same
/// underlying broadcast channel.
#[derive(Clone, Debug)]
pub struct LocationBus {
    sender: broadcast::Sender<Notification>,
}

impl LocationBus {
    /// Create a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a notification.
    ///
    /// Returns the number of receivers that were handed it, or
    /// [`MarsError::Channel`] when nobody is subscribed.
    pub fn publish(&self, notification: Notification) -> Result<usize, MarsError> {
        self.sender
            .send(notification)
            .map_err(|e| MarsError::Channel(format!("location bus send error: {e}")))
    }

    /// Subscribe to every notification.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Subscribe to the given event kinds only.
    pub fn subscribe_kinds(&self, kinds: &[EventKind]) -> KindSubscriber {
        KindSubscriber {
            kinds: kinds.iter().copied().collect(),
            receiver: self.sender.subscribe(),
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Filtered subscriber
// ---------------------------------------------------------------------------

/// A subscriber that only delivers notifications of selected kinds.
pub struct KindSubscriber {
    kinds: HashSet<EventKind>,
    receiver: broadcast::Receiver<Notification>,
}

impl KindSubscriber {
    /// Wait for the next matching notification.
    ///
    /// Returns `None` when the bus is closed and nothing more will arrive.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(n) if self.kinds.contains(&n.kind()) => return Some(n),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "KindSubscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Observer bridge
// ---------------------------------------------------------------------------

/// Observer that republishes every notification onto a [`LocationBus`].
#[derive(Clone, Debug)]
pub struct BusObserver {
    bus: LocationBus,
}

impl BusObserver {
    pub fn new(bus: LocationBus) -> Self {
        Self { bus }
    }
}

impl LocationObserver for BusObserver {
    fn on_notification(
        &mut self,
        notification: &Notification,
        _delivery: &mut Delivery<'_>,
    ) -> Result<(), MarsError> {
        // Nobody listening is normal between subscriptions.
        if self.bus.receiver_count() == 0 {
            debug!(kind = ?notification.kind(), "location bus has no subscribers");
            return Ok(());
        }
        self.bus.publish(notification.clone()).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LocationEvent;
    use crate::observer::{ObserverId, ObserverRegistry};
    use mars_types::IntegrityWarning;
    use uuid::Uuid;

    fn room_changed() -> Notification {
        Notification::new(
            Uuid::new_v4(),
            LocationEvent::RoomChanged {
                floor: "F1".into(),
                from: "Hall".into(),
                to: "Kitchen".into(),
            },
        )
    }

    fn warning() -> Notification {
        Notification::new(
            Uuid::new_v4(),
            LocationEvent::Warning(IntegrityWarning::NoConnections { floor: "F1".into() }),
        )
    }

    #[tokio::test]
    async fn publish_and_receive() -> Result<(), Box<dyn std::error::Error>> {
        let bus = LocationBus::default();
        let mut rx = bus.subscribe();

        let n = room_changed();
        bus.publish(n.clone())?;

        let received = rx.recv().await?;
        assert_eq!(received.id, n.id);
        Ok(())
    }

    #[test]
    fn publish_no_subscribers_returns_error() {
        let bus = LocationBus::default();
        assert!(bus.publish(room_changed()).is_err());
    }

    #[tokio::test]
    async fn kind_subscriber_filters() -> Result<(), Box<dyn std::error::Error>> {
        let bus = LocationBus::default();
        let mut sub = bus.subscribe_kinds(&[EventKind::RoomChanged]);

        bus.publish(warning())?;
        let good = room_changed();
        bus.publish(good.clone())?;

        let received = sub.recv().await.ok_or("No notification received")?;
        assert_eq!(received.id, good.id);
        Ok(())
    }

    #[tokio::test]
    async fn kind_subscriber_times_out_on_other_kinds() {
        let bus = LocationBus::default();
        let mut sub = bus.subscribe_kinds(&[EventKind::FloorChanged]);
        let _ = bus.publish(warning());

        let result = tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv()).await;
        assert!(result.is_err(), "FloorChanged subscriber must not see a warning");
    }

    #[tokio::test]
    async fn lag_on_slow_subscriber() {
        let bus = LocationBus::new(16);
        let mut slow = bus.subscribe();
        for _ in 0..1_000 {
            let _ = bus.publish(warning());
        }
        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }

    #[tokio::test]
    async fn bus_observer_forwards_registry_notifications() -> Result<(), Box<dyn std::error::Error>> {
        let bus = LocationBus::default();
        let mut rx = bus.subscribe();
        let mut registry = ObserverRegistry::new();
        registry.register(ObserverId::new(), Box::new(BusObserver::new(bus.clone())))?;

        let n = room_changed();
        let report = registry.notify(&n);
        assert_eq!(report.delivered, 1);
        assert_eq!(rx.recv().await?.id, n.id);
        Ok(())
    }

    #[test]
    fn bus_observer_without_subscribers_is_ok() {
        let mut registry = ObserverRegistry::new();
        registry
            .register(ObserverId::new(), Box::new(BusObserver::new(LocationBus::default())))
            .unwrap();
        assert_eq!(registry.notify(&warning()).failed, 0);
    }
}
