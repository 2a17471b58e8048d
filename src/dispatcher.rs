//! Typed event dispatch.
//!
//! Turns decoded frames into [`InboundEvent`]s and fans them out to
//! listeners registered per event kind. Listeners run synchronously on the
//! connection's read task, in subscription order; a listener that needs a
//! different execution context must hand the event off itself.
//!
//! ```rust
//! use studio_link::dispatcher::EventDispatcher;
//!
//! let dispatcher = EventDispatcher::new();
//! let id = dispatcher.on_entity_position(|pos| {
//!     println!("entity {} at {}, {}, {}", pos.uid, pos.x, pos.y, pos.z);
//! });
//! dispatcher.unsubscribe(id);
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::ProtocolError;
use crate::protocol::events::{
    ComponentProperties, EntityPosition, EntitySelected, InboundEvent, LogMessage,
};
use crate::protocol::framing::FrameView;

/// Handle returned by the `on_*` methods, used to unsubscribe.
pub type SubscriptionId = u64;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// The notification kinds a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`EntitySelected`].
    EntitySelected,
    /// [`ComponentProperties`].
    ComponentProperties,
    /// [`EntityPosition`].
    EntityPosition,
    /// [`LogMessage`].
    LogMessage,
    /// [`ConnectionLost`].
    ConnectionLost,
}

/// Why the engine connection stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionLost {
    /// The engine closed the socket.
    PeerClosed,
    /// The engine sent a corrupt stream.
    Protocol(ProtocolError),
    /// Socket I/O failed.
    Io(String),
    /// The editor closed the connection.
    Closed,
}

impl fmt::Display for ConnectionLost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => f.write_str("engine closed the connection"),
            Self::Closed => f.write_str("connection closed locally"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

struct Listeners<T: ?Sized> {
    entries: Vec<(SubscriptionId, Listener<T>)>,
}

impl<T: ?Sized> Default for Listeners<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T: ?Sized> Listeners<T> {
    fn push(&mut self, id: SubscriptionId, listener: Listener<T>) {
        self.entries.push((id, listener));
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    fn snapshot(&self) -> Vec<Listener<T>> {
        self.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Default)]
struct Registry {
    entity_selected: Listeners<EntitySelected>,
    component_properties: Listeners<ComponentProperties>,
    entity_position: Listeners<EntityPosition>,
    log_message: Listeners<LogMessage>,
    connection_lost: Listeners<ConnectionLost>,
    next_id: SubscriptionId,
}

impl Registry {
    fn allocate_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        self.next_id
    }
}

/// Per-event-kind observer lists plus the decode step that feeds them.
///
/// Listeners may subscribe or unsubscribe at any time, including from inside
/// a listener: each notification iterates over a snapshot taken before the
/// first listener runs, and no lock is held while listeners execute.
#[derive(Default)]
pub struct EventDispatcher {
    registry: Mutex<Registry>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry();
        f.debug_struct("EventDispatcher")
            .field("entity_selected", &registry.entity_selected.len())
            .field("component_properties", &registry.component_properties.len())
            .field("entity_position", &registry.entity_position.len())
            .field("log_message", &registry.log_message.len())
            .field("connection_lost", &registry.connection_lost.len())
            .finish()
    }
}

fn fire<T: ?Sized>(listeners: Vec<Listener<T>>, value: &T) {
    for listener in &listeners {
        listener(value);
    }
}

impl EventDispatcher {
    /// Create a dispatcher with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // Listeners never run under the lock, so a poisoned registry is still consistent.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Listen for selection changes.
    pub fn on_entity_selected<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&EntitySelected) + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        let id = registry.allocate_id();
        registry.entity_selected.push(id, Arc::new(listener));
        log::debug!("[Dispatch] subscription {id} -> entity_selected");
        id
    }

    /// Listen for component property dumps.
    pub fn on_component_properties<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ComponentProperties) + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        let id = registry.allocate_id();
        registry.component_properties.push(id, Arc::new(listener));
        log::debug!("[Dispatch] subscription {id} -> component_properties");
        id
    }

    /// Listen for entity positions.
    pub fn on_entity_position<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&EntityPosition) + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        let id = registry.allocate_id();
        registry.entity_position.push(id, Arc::new(listener));
        log::debug!("[Dispatch] subscription {id} -> entity_position");
        id
    }

    /// Listen for engine log lines.
    pub fn on_log_message<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&LogMessage) + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        let id = registry.allocate_id();
        registry.log_message.push(id, Arc::new(listener));
        log::debug!("[Dispatch] subscription {id} -> log_message");
        id
    }

    /// Listen for the connection going away. Fires at most once per connection.
    pub fn on_connection_lost<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ConnectionLost) + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        let id = registry.allocate_id();
        registry.connection_lost.push(id, Arc::new(listener));
        log::debug!("[Dispatch] subscription {id} -> connection_lost");
        id
    }

    /// Remove a listener. Returns `false` if the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry();
        let removed = registry.entity_selected.remove(id)
            || registry.component_properties.remove(id)
            || registry.entity_position.remove(id)
            || registry.log_message.remove(id)
            || registry.connection_lost.remove(id);
        if removed {
            log::debug!("[Dispatch] subscription {id} removed");
        }
        removed
    }

    /// Number of listeners for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        let registry = self.registry();
        match kind {
            EventKind::EntitySelected => registry.entity_selected.len(),
            EventKind::ComponentProperties => registry.component_properties.len(),
            EventKind::EntityPosition => registry.entity_position.len(),
            EventKind::LogMessage => registry.log_message.len(),
            EventKind::ConnectionLost => registry.connection_lost.len(),
        }
    }

    /// Decode a frame and notify the matching listeners.
    ///
    /// Returns the kind that was dispatched, or `None` when the type code is
    /// unknown (dropped with a warning).
    ///
    /// # Errors
    ///
    /// A payload that does not match its type's layout.
    pub fn dispatch(
        &self,
        type_code: i32,
        payload: &[u8],
    ) -> Result<Option<EventKind>, ProtocolError> {
        let Some(event) = InboundEvent::decode(type_code, payload)? else {
            log::warn!(
                "[Dispatch] dropping message with unknown type {type_code} ({} payload bytes)",
                payload.len()
            );
            return Ok(None);
        };
        Ok(Some(self.notify(&event)))
    }

    /// [`Self::dispatch`] for a reassembled frame.
    pub fn dispatch_frame(&self, frame: FrameView<'_>) -> Result<Option<EventKind>, ProtocolError> {
        self.dispatch(frame.type_code, frame.payload)
    }

    /// Notify listeners of an already-decoded event.
    pub fn notify(&self, event: &InboundEvent) -> EventKind {
        match event {
            InboundEvent::EntitySelected(e) => {
                let listeners = self.registry().entity_selected.snapshot();
                fire(listeners, e);
                EventKind::EntitySelected
            }
            InboundEvent::ComponentProperties(e) => {
                let listeners = self.registry().component_properties.snapshot();
                fire(listeners, e);
                EventKind::ComponentProperties
            }
            InboundEvent::EntityPosition(e) => {
                let listeners = self.registry().entity_position.snapshot();
                fire(listeners, e);
                EventKind::EntityPosition
            }
            InboundEvent::LogMessage(e) => {
                let listeners = self.registry().log_message.snapshot();
                fire(listeners, e);
                EventKind::LogMessage
            }
        }
    }

    /// Tell every connection-lost listener why the link went down.
    pub fn notify_connection_lost(&self, reason: &ConnectionLost) {
        let listeners = self.registry().connection_lost.snapshot();
        fire(listeners, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::events::ComponentType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn position_payload(uid: i32) -> Vec<u8> {
        let mut payload = uid.to_le_bytes().to_vec();
        for v in [1.0f32, 2.0, 3.0] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        payload
    }

    #[test]
    fn test_listeners_called_in_subscription_order() {
        let dispatcher = EventDispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            dispatcher.on_entity_position(move |_| order.lock().unwrap().push(tag));
        }
        let kind = dispatcher.dispatch(3, &position_payload(1)).unwrap();
        assert_eq!(kind, Some(EventKind::EntityPosition));
        assert_eq!(*order.lock().unwrap(), ["first", "second", "third"]);
    }

    #[test]
    fn test_listeners_receive_decoded_fields() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        dispatcher.on_entity_position(move |pos| *sink.lock().unwrap() = Some(*pos));
        dispatcher.dispatch(3, &position_payload(12)).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            Some(EntityPosition { uid: 12, x: 1.0, y: 2.0, z: 3.0 })
        );
    }

    #[test]
    fn test_only_matching_kind_is_notified() {
        let dispatcher = EventDispatcher::new();
        let selected = Arc::new(AtomicUsize::new(0));
        let logs = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&selected);
        dispatcher.on_entity_selected(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        let l = Arc::clone(&logs);
        dispatcher.on_log_message(move |_| {
            l.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(1, &(-1i32).to_le_bytes()).unwrap();
        assert_eq!(selected.load(Ordering::SeqCst), 1);
        assert_eq!(logs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let dispatcher = EventDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let id = dispatcher.on_entity_position(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(dispatcher.subscriber_count(EventKind::EntityPosition), 1);
        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id), "second removal is a no-op");
        dispatcher.dispatch(3, &position_payload(1)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.subscriber_count(EventKind::EntityPosition), 0);
    }

    #[test]
    fn test_listener_may_unsubscribe_itself_during_dispatch() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let own_id = Arc::new(Mutex::new(None::<SubscriptionId>));

        let d = Arc::clone(&dispatcher);
        let c = Arc::clone(&calls);
        let slot = Arc::clone(&own_id);
        let id = dispatcher.on_entity_selected(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *slot.lock().unwrap() {
                d.unsubscribe(id);
            }
        });
        *own_id.lock().unwrap() = Some(id);

        let after = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&after);
        dispatcher.on_entity_selected(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(1, &(-1i32).to_le_bytes()).unwrap();
        dispatcher.dispatch(1, &(-1i32).to_le_bytes()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(after.load(Ordering::SeqCst), 2, "snapshot still reaches later listeners");
    }

    #[test]
    fn test_listener_added_during_dispatch_sees_next_event_only() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let late_calls = Arc::new(AtomicUsize::new(0));

        let d = Arc::clone(&dispatcher);
        let late = Arc::clone(&late_calls);
        let added = Arc::new(std::sync::atomic::AtomicBool::new(false));
        dispatcher.on_log_message(move |_| {
            if !added.swap(true, Ordering::SeqCst) {
                let late = Arc::clone(&late);
                d.on_log_message(move |_| {
                    late.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        let event = InboundEvent::LogMessage(LogMessage {
            severity: crate::protocol::events::LogSeverity::Info,
            system: "core".into(),
            message: "hello".into(),
        });
        dispatcher.notify(&event);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        dispatcher.notify(&event);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_type_dropped_without_error() {
        let dispatcher = EventDispatcher::new();
        assert_eq!(dispatcher.dispatch(42, b"whatever").unwrap(), None);
    }

    #[test]
    fn test_corrupt_payload_is_error() {
        let dispatcher = EventDispatcher::new();
        let mut payload = 0i32.to_le_bytes().to_vec();
        payload.extend_from_slice(&0u32.to_le_bytes());
        // count 0 is fine; a string length past the end is not.
        let mut bad = 1i32.to_le_bytes().to_vec();
        bad.extend_from_slice(&0u32.to_le_bytes());
        bad.extend_from_slice(&1000i32.to_le_bytes());
        bad.extend_from_slice(&[0; 8]);

        assert_eq!(dispatcher.dispatch(2, &payload).unwrap(), Some(EventKind::ComponentProperties));
        assert!(dispatcher.dispatch(2, &bad).is_err());
    }

    #[test]
    fn test_sentinel_and_empty_list_reach_listeners_distinctly() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher.on_entity_selected(move |e| sink.lock().unwrap().push(e.clone()));

        dispatcher.dispatch(1, &(-1i32).to_le_bytes()).unwrap();
        let mut payload = 4i32.to_le_bytes().to_vec();
        payload.extend_from_slice(&0i32.to_le_bytes());
        dispatcher.dispatch(1, &payload).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            [
                EntitySelected::Cleared,
                EntitySelected::Entity { uid: 4, components: Vec::<ComponentType>::new() },
            ]
        );
    }

    #[test]
    fn test_connection_lost_notification() {
        let dispatcher = EventDispatcher::new();
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reasons);
        dispatcher.on_connection_lost(move |r| sink.lock().unwrap().push(r.clone()));
        dispatcher.notify_connection_lost(&ConnectionLost::PeerClosed);
        assert_eq!(*reasons.lock().unwrap(), [ConnectionLost::PeerClosed]);
        assert_eq!(ConnectionLost::PeerClosed.to_string(), "engine closed the connection");
    }
}
