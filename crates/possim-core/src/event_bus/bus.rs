//! Event Bus implementation.
//!
//! Each connection owns one EventBus. The poller publishes the events of a
//! cycle in order, on its own thread, so handlers observe them in cycle
//! order and never interleaved with another cycle.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::events::{DeviceEvent, EventCategory};

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Which events a handler sees
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    #[default]
    All,
    /// Only events of these categories
    Categories(Vec<EventCategory>),
}

impl EventFilter {
    /// Whether `event` passes the filter
    pub fn matches(&self, event: &DeviceEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(categories) => categories.contains(&event.category()),
        }
    }
}

type Handler = Arc<dyn Fn(&DeviceEvent) + Send + Sync>;

/// Event bus sizing
#[derive(Debug, Clone, Copy)]
pub struct EventBusConfig {
    /// Events buffered per async receiver before it lags
    pub capacity: usize,
    /// Most recent events kept for [`EventBus::history`], 0 keeps none
    pub history: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            history: 0,
        }
    }
}

/// Per-connection event distribution
pub struct EventBus {
    sender: broadcast::Sender<DeviceEvent>,
    handlers: RwLock<HashMap<SubscriptionId, (EventFilter, Handler)>>,
    recent: Mutex<VecDeque<DeviceEvent>>,
    config: EventBusConfig,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.capacity.max(1));
        Self {
            sender,
            handlers: RwLock::new(HashMap::new()),
            recent: Mutex::new(VecDeque::with_capacity(config.history)),
            config,
        }
    }

    /// Publish one event.
    ///
    /// Handlers run on the calling thread without the handler lock held,
    /// so a handler may subscribe or unsubscribe. Returns the number of
    /// handlers and receivers the event reached.
    pub fn publish(&self, event: DeviceEvent) -> usize {
        if self.config.history > 0 {
            let mut recent = self.recent.lock();
            if recent.len() == self.config.history {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }

        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .values()
            .filter(|(filter, _)| filter.matches(&event))
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in &handlers {
            handler(&event);
        }

        // send fails only when no receiver exists
        handlers.len() + self.sender.send(event).unwrap_or(0)
    }

    /// Publish a cycle's events in order
    pub fn publish_all(&self, events: impl IntoIterator<Item = DeviceEvent>) {
        for event in events {
            tracing::debug!("Event: {}", event);
            self.publish(event);
        }
    }

    /// Register a synchronous handler.
    ///
    /// The handler runs on the poller thread and should return quickly.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.handlers.write().insert(id, (filter, Arc::new(handler)));
        tracing::trace!("Subscription {} added", id);
        id
    }

    /// Receiver for async consumers
    pub fn receiver(&self) -> broadcast::Receiver<DeviceEvent> {
        self.sender.subscribe()
    }

    /// Remove a handler; false if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.handlers.write().remove(&id).is_some();
        if removed {
            tracing::trace!("Subscription {} removed", id);
        }
        removed
    }

    /// Number of synchronous handlers
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Retained events, oldest first
    pub fn history(&self) -> Vec<DeviceEvent> {
        self.recent.lock().iter().cloned().collect()
    }

    pub fn clear_history(&self) {
        self.recent.lock().clear();
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.subscriber_count())
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PowerState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn online() -> DeviceEvent {
        DeviceEvent::Power {
            state: PowerState::Online,
        }
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let bus = EventBus::new();

        let id = bus.subscribe(EventFilter::All, |_| {});
        assert_eq!(bus.subscriber_count(), 1);

        assert!(bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(online()), 0);
    }

    #[test]
    fn test_event_filtering() {
        let bus = EventBus::new();
        let power_count = Arc::new(AtomicUsize::new(0));
        let drawer_count = Arc::new(AtomicUsize::new(0));

        let pc = power_count.clone();
        bus.subscribe(
            EventFilter::Categories(vec![EventCategory::Power]),
            move |_| {
                pc.fetch_add(1, Ordering::SeqCst);
            },
        );
        let dc = drawer_count.clone();
        bus.subscribe(
            EventFilter::Categories(vec![EventCategory::Drawer]),
            move |_| {
                dc.fetch_add(1, Ordering::SeqCst);
            },
        );

        bus.publish(online());
        bus.publish(DeviceEvent::Drawer { open: true });
        bus.publish(DeviceEvent::Drawer { open: false });

        assert_eq!(power_count.load(Ordering::SeqCst), 1);
        assert_eq!(drawer_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_publish_all_keeps_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(EventFilter::All, move |e| sink.lock().push(e.clone()));

        bus.publish_all(vec![
            online(),
            DeviceEvent::Drawer { open: true },
            DeviceEvent::Power {
                state: PowerState::Offline,
            },
        ]);

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], online());
        assert_eq!(seen[1], DeviceEvent::Drawer { open: true });
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let inner_bus = bus.clone();
        let inner_slot = slot.clone();
        let id = bus.subscribe(EventFilter::All, move |_| {
            if let Some(id) = inner_slot.lock().take() {
                inner_bus.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        bus.publish(online());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_history_keeps_latest() {
        let bus = EventBus::with_config(EventBusConfig {
            history: 3,
            ..Default::default()
        });

        for i in 0..6 {
            bus.publish(DeviceEvent::Drawer { open: i % 2 == 0 });
        }
        let history = bus.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2], DeviceEvent::Drawer { open: false });

        bus.clear_history();
        assert!(bus.history().is_empty());
        assert!(EventBus::new().history().is_empty());
    }

    #[tokio::test]
    async fn test_async_receiver() {
        let bus = EventBus::new();
        let mut receiver = bus.receiver();

        bus.publish(DeviceEvent::Cover { open: true });

        let received = receiver.recv().await.unwrap();
        assert_eq!(received, DeviceEvent::Cover { open: true });
    }
}
