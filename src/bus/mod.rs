//! Integration Event Bus
//!
//! Typed publish/subscribe for integration lifecycle and alert events.
//! Every event is an [`IntegrationEvent`] variant; subscribers register for
//! one [`EventKind`] and receive only events of that kind.
//!
//! Delivery is synchronous fan-out in subscription order. A subscriber that
//! panics is logged and skipped; the emitter and the remaining subscribers
//! are unaffected.
//!
//! # Example
//!
//! ```
//! use zeptogate::bus::{EventBus, EventKind, IntegrationEvent};
//!
//! let bus = EventBus::new();
//! let id = bus.subscribe(EventKind::Suspended, |event| {
//!     println!("suspended: {}", event.integration_id());
//! });
//! bus.emit(&IntegrationEvent::Suspended {
//!     integration_id: "abc".into(),
//!     name: "redis".into(),
//!     reason: Some("maintenance".into()),
//! });
//! bus.unsubscribe(id);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::integrations::Integration;
use crate::monitor::ResourceAlert;
use crate::scanner::SecurityScanResult;

/// The kinds of event a subscriber can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Registered,
    Activated,
    Suspended,
    Error,
    SecurityAlert,
    ResourceAlert,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Registered,
        EventKind::Activated,
        EventKind::Suspended,
        EventKind::Error,
        EventKind::SecurityAlert,
        EventKind::ResourceAlert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Registered => "registered",
            EventKind::Activated => "activated",
            EventKind::Suspended => "suspended",
            EventKind::Error => "error",
            EventKind::SecurityAlert => "security-alert",
            EventKind::ResourceAlert => "resource-alert",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event published by the integration manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum IntegrationEvent {
    /// A new integration passed admission. Carries the stored record.
    Registered { integration: Box<Integration> },
    Activated { integration_id: String, name: String },
    Suspended {
        integration_id: String,
        name: String,
        reason: Option<String>,
    },
    /// Activation (or another lifecycle step) failed.
    Error {
        integration_id: String,
        name: String,
        error: String,
    },
    /// A re-scan of an existing integration failed.
    SecurityAlert {
        integration_id: String,
        name: String,
        scan: Box<SecurityScanResult>,
    },
    ResourceAlert {
        integration_id: String,
        alert: ResourceAlert,
    },
}

impl IntegrationEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            IntegrationEvent::Registered { .. } => EventKind::Registered,
            IntegrationEvent::Activated { .. } => EventKind::Activated,
            IntegrationEvent::Suspended { .. } => EventKind::Suspended,
            IntegrationEvent::Error { .. } => EventKind::Error,
            IntegrationEvent::SecurityAlert { .. } => EventKind::SecurityAlert,
            IntegrationEvent::ResourceAlert { .. } => EventKind::ResourceAlert,
        }
    }

    /// Id of the integration the event is about.
    pub fn integration_id(&self) -> &str {
        match self {
            IntegrationEvent::Registered { integration } => &integration.id,
            IntegrationEvent::Activated { integration_id, .. }
            | IntegrationEvent::Suspended { integration_id, .. }
            | IntegrationEvent::Error { integration_id, .. }
            | IntegrationEvent::SecurityAlert { integration_id, .. }
            | IntegrationEvent::ResourceAlert { integration_id, .. } => integration_id,
        }
    }
}

/// Token returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&IntegrationEvent) + Send + Sync>;

/// Fan-out event bus keyed by [`EventKind`].
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `handler` for every event of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&IntegrationEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let mut removed = false;
        for list in handlers.values_mut() {
            let before = list.len();
            list.retain(|(sid, _)| *sid != id);
            removed |= list.len() != before;
        }
        removed
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to every subscriber of its kind.
    ///
    /// Returns the number of subscribers that handled it without panicking.
    pub fn emit(&self, event: &IntegrationEvent) -> usize {
        let kind = event.kind();
        // Snapshot so handlers may subscribe or unsubscribe re-entrantly.
        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        debug!(
            component = "bus",
            event = %kind,
            integration_id = event.integration_id(),
            subscribers = handlers.len(),
            "Emitting event"
        );

        let mut delivered = 0;
        for handler in handlers {
            match std::panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(
                    component = "bus",
                    event = %kind,
                    integration_id = event.integration_id(),
                    "Event subscriber panicked"
                ),
            }
        }
        delivered
    }
}
