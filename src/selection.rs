//! Editor-side view of the current selection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::dispatcher::{EventDispatcher, SubscriptionId};
use crate::protocol::events::{ComponentType, EntitySelected};

/// The entity the engine last reported as selected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    current: Option<Selected>,
}

/// A selected entity and its components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected {
    /// Entity uid.
    pub uid: i32,
    /// Components attached to it, in engine order.
    pub components: Vec<ComponentType>,
}

impl SelectionState {
    /// No selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in a selection event.
    pub fn apply(&mut self, event: &EntitySelected) {
        self.current = match event {
            EntitySelected::Cleared => None,
            EntitySelected::Entity { uid, components } => Some(Selected {
                uid: *uid,
                components: components.clone(),
            }),
        };
    }

    /// The current selection, if any.
    pub fn selected(&self) -> Option<&Selected> {
        self.current.as_ref()
    }

    /// Whether the selected entity carries `component`.
    pub fn has_component(&self, component: ComponentType) -> bool {
        self.current
            .as_ref()
            .is_some_and(|s| s.components.contains(&component))
    }

    /// Forget the selection.
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Keep a shared selection in sync with `dispatcher` until
    /// [`SelectionTracker::untrack`] is called.
    ///
    /// The selection is cleared when the connection is lost.
    pub fn track(dispatcher: &EventDispatcher) -> SelectionTracker {
        let state = Arc::new(Mutex::new(SelectionState::new()));

        let on_select = Arc::clone(&state);
        let selected_id = dispatcher.on_entity_selected(move |event| {
            on_select
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .apply(event);
        });

        let on_lost = Arc::clone(&state);
        let lost_id = dispatcher.on_connection_lost(move |_| {
            on_lost.lock().unwrap_or_else(PoisonError::into_inner).clear();
        });

        SelectionTracker {
            state,
            subscriptions: [selected_id, lost_id],
        }
    }
}

/// A [`SelectionState`] attached to a dispatcher.
#[derive(Debug)]
pub struct SelectionTracker {
    state: Arc<Mutex<SelectionState>>,
    subscriptions: [SubscriptionId; 2],
}

impl SelectionTracker {
    /// Lock the tracked state.
    pub fn lock(&self) -> MutexGuard<'_, SelectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The shared state, for holders that outlive the tracker.
    pub fn state(&self) -> &Arc<Mutex<SelectionState>> {
        &self.state
    }

    /// Detach from `dispatcher`. The state keeps its last value.
    ///
    /// Returns false if the listeners were already gone.
    pub fn untrack(&self, dispatcher: &EventDispatcher) -> bool {
        self.subscriptions
            .iter()
            .fold(false, |removed, id| dispatcher.unsubscribe(*id) | removed)
    }
}
