//! `mars-middleware` – notification fabric.
//!
//! Carries what a localization session decided to the parts of an
//! application that care, without the session knowing who they are.
//!
//! # Modules
//!
//! - [`events`] – [`LocationEvent`] payloads and the [`Notification`]
//!   envelope.
//! - [`observer`] – [`ObserverRegistry`]: ordered, isolated, synchronous
//!   delivery keyed by [`ObserverId`].
//! - [`bus`] – [`LocationBus`]: broadcast bridge for async consumers, fed by
//!   a [`BusObserver`].

pub mod bus;
pub mod events;
pub mod observer;

pub use bus::{BusObserver, KindSubscriber, LocationBus};
pub use events::{EventKind, LocationEvent, Notification};
pub use observer::{
    Delivery, DeliveryReport, LocationObserver, ObserverId, ObserverRegistry, observer_fn,
};
