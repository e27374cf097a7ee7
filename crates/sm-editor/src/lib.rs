//! Storymap editor engine.
//!
//! The interactive half of the system: a `CanvasController` interprets
//! normalized input against its placement/drag state machine, mutates the
//! `sm-core` document, records every edit on a bounded undo stack, and
//! announces changes through typed events. Hosts plug in their persistence,
//! entity registry, and image store at construction.

pub mod commands;
pub mod controller;
pub mod events;
pub mod gateway;
pub mod input;
pub mod schedule;
pub mod shortcuts;

pub use commands::{Apply, Command, CommandStack, Edit};
pub use controller::{CanvasController, DeleteOutcome, PlaceKind, PlacementSpec, Preview};
pub use events::{EditorEvent, EventBus, SelectedItem};
pub use gateway::{
    EmptyRegistry, EngineError, EntityRegistry, EntitySummary, ImageStore, NoImages,
    PersistenceGateway,
};
pub use input::{InputEvent, Modifiers, PointerButton};
pub use schedule::{Debounce, OneShot};
pub use shortcuts::{ShortcutAction, ShortcutMap};
