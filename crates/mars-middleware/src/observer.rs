//! Observer registry: synchronous, ordered fan-out of [`Notification`]s.
//!
//! Observers are keyed by a stable [`ObserverId`].  Delivery follows
//! registration order, and each observer is isolated from the others: an
//! error or a panic inside one observer is logged and the pass continues.
//!
//! An observer can drop itself (or another observer) mid-pass through the
//! [`Delivery`] handle it receives; anything removed that way gets nothing
//! more in the current pass.
//!
//! ```rust
//! use mars_middleware::events::{LocationEvent, Notification};
//! use mars_middleware::observer::{observer_fn, ObserverId, ObserverRegistry};
//! use mars_types::IntegrityWarning;
//! use uuid::Uuid;
//!
//! let mut registry = ObserverRegistry::new();
//! let id = ObserverId::new();
//! registry
//!     .register(id, observer_fn(|n: &Notification, _| {
//!         println!("{:?}", n.event);
//!         Ok(())
//!     }))
//!     .unwrap();
//!
//! let warning = IntegrityWarning::NoConnections { floor: "F1".into() };
//! let report = registry.notify(&Notification::new(Uuid::new_v4(), LocationEvent::Warning(warning)));
//! assert_eq!(report.delivered, 1);
//! ```

use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};

use mars_types::MarsError;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::events::Notification;

/// Stable identifier of a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObserverId(Uuid);

impl ObserverId {
    /// A fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Observer trait
// ────────────────────────────────────────────────────────────────────────────

/// Receives location notifications synchronously, on the thread that fed the
/// pose sample.
pub trait LocationObserver: Send {
    fn on_notification(
        &mut self,
        notification: &Notification,
        delivery: &mut Delivery<'_>,
    ) -> Result<(), MarsError>;
}

/// Per-call handle given to an observer during a notification pass.
pub struct Delivery<'a> {
    current: ObserverId,
    removals: &'a mut HashSet<ObserverId>,
}

impl Delivery<'_> {
    /// Identifier of the observer being called.
    pub fn observer_id(&self) -> ObserverId {
        self.current
    }

    /// Unregister `id` once the pass ends; it receives nothing more in the
    /// current pass.
    pub fn unregister(&mut self, id: ObserverId) {
        self.removals.insert(id);
    }

    /// Unregister the observer being called.
    pub fn unregister_self(&mut self) {
        let id = self.current;
        self.unregister(id);
    }
}

/// Adapter turning a closure into a [`LocationObserver`].
pub struct FnObserver<F>(F);

/// Wrap a closure as an observer.
pub fn observer_fn<F>(f: F) -> Box<dyn LocationObserver>
where
    F: FnMut(&Notification, &mut Delivery<'_>) -> Result<(), MarsError> + Send + 'static,
{
    Box::new(FnObserver(f))
}

impl<F> LocationObserver for FnObserver<F>
where
    F: FnMut(&Notification, &mut Delivery<'_>) -> Result<(), MarsError> + Send,
{
    fn on_notification(
        &mut self,
        notification: &Notification,
        delivery: &mut Delivery<'_>,
    ) -> Result<(), MarsError> {
        (self.0)(notification, delivery)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Registry
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of one [`ObserverRegistry::notify`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Observers that returned `Ok`.
    pub delivered: usize,
    /// Observers that returned an error or panicked.
    pub failed: usize,
}

/// Ordered collection of observers.
#[derive(Default)]
pub struct ObserverRegistry {
    entries: Vec<(ObserverId, Box<dyn LocationObserver>)>,
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.ids())
            .finish()
    }
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer under `id`.  An id can only be registered once.
    pub fn register(
        &mut self,
        id: ObserverId,
        observer: Box<dyn LocationObserver>,
    ) -> Result<(), MarsError> {
        if self.contains(id) {
            return Err(MarsError::Observer(format!("observer {id} is already registered")));
        }
        self.entries.push((id, observer));
        Ok(())
    }

    /// Remove `id`.  Returns whether it was registered; removing an unknown
    /// id is a no-op.
    pub fn unregister(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub fn contains(&self, id: ObserverId) -> bool {
        self.entries.iter().any(|(entry, _)| *entry == id)
    }

    /// Registered ids in delivery order.
    pub fn ids(&self) -> Vec<ObserverId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deliver `notification` to every observer in registration order.
    pub fn notify(&mut self, notification: &Notification) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut removals = HashSet::new();

        for (id, observer) in self.entries.iter_mut() {
            if removals.contains(id) {
                continue;
            }
            let mut delivery = Delivery {
                current: *id,
                removals: &mut removals,
            };
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                observer.on_notification(notification, &mut delivery)
            }));
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(observer = %id, kind = ?notification.kind(), error = %e, "observer failed");
                }
                Err(_) => {
                    report.failed += 1;
                    error!(observer = %id, kind = ?notification.kind(), "observer panicked");
                }
            }
        }

        if !removals.is_empty() {
            self.entries.retain(|(id, _)| !removals.contains(id));
        }
        report
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
