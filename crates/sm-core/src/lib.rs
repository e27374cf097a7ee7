//! Storymap core: the persisted diagram document model.
//!
//! Everything the canvas engine durably knows lives here — item ids,
//! geometry primitives, the `Diagram`/`Node`/`Connector` document, the
//! relation catalog, and engine configuration. The interactive layers
//! (`sm-render`, `sm-editor`) build on these types and never hold the
//! only copy of persisted state.

pub mod config;
pub mod geometry;
pub mod id;
pub mod model;
pub mod relations;

pub use config::EngineConfig;
pub use geometry::{Point, Rect};
pub use id::ItemId;
pub use model::{Color, Connector, Diagram, ImageData, Node, NodeKind};
pub use relations::{RelationCategory, RelationKind};
