//! Typed editor events and the observer bus.
//!
//! The engine never reaches into host UI; it announces what happened and
//! hosts (toolbars, palettes, detail popups) subscribe. Events fire after
//! the state they describe is already applied — an `ItemAdded` observer can
//! always look the item up.

use crate::gateway::EntitySummary;
use sm_core::ItemId;

/// The one item a canvas can have selected at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectedItem {
    Node(ItemId),
    Connector(ItemId),
}

impl SelectedItem {
    pub fn id(&self) -> ItemId {
        match self {
            SelectedItem::Node(id) | SelectedItem::Connector(id) => *id,
        }
    }
}

/// High-level events raised by the canvas controller.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// A node or connector was created (placement, drop, or connect gesture).
    ItemAdded { item: SelectedItem },
    /// A node or connector was deleted.
    ItemRemoved { item: SelectedItem },
    /// A node finished moving (one event per completed drag, not per frame).
    ItemMoved { id: ItemId },
    /// The exclusive selection changed. `None` means nothing is selected.
    SelectionChanged { selected: Option<SelectedItem> },
    /// Placement mode engaged; hosts disable the other palette tools.
    PlacementStarted { kind: String },
    /// Placement or area draw was cancelled; hosts re-enable the palette.
    PlacementCancelled,
    /// Undo/redo availability changed.
    HistoryChanged { can_undo: bool, can_redo: bool },
    /// Deleting this node would lose typed content or an entity link; the
    /// host must confirm via `confirm_delete`.
    DeleteConfirmationRequested { id: ItemId },
    /// The delayed hover lookup resolved an entity for a node.
    HoverInfo { id: ItemId, entity: EntitySummary },
    /// A debounced save failed; edits are retained and will be retried.
    PersistenceFailed { message: String },
}

/// A plain observer list. Subscribers run in subscription order, on the
/// interaction thread, synchronously.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Box<dyn FnMut(&EditorEvent)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, f: impl FnMut(&EditorEvent) + 'static) {
        self.subscribers.push(Box::new(f));
    }

    pub fn emit(&mut self, event: &EditorEvent) {
        log::trace!("event: {event:?}");
        for sub in &mut self.subscribers {
            sub(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn subscribers_see_events_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();

        let sink = seen.clone();
        bus.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        bus.emit(&EditorEvent::PlacementStarted {
            kind: "note".into(),
        });
        bus.emit(&EditorEvent::PlacementCancelled);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], EditorEvent::PlacementCancelled);
    }
}
