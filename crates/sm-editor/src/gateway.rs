//! Contracts with the surrounding application.
//!
//! The engine owns the interaction and the document; everything else —
//! where documents live, what a `char-42` reference means, how images get
//! on disk — belongs to the host and is reached through these traits.
//! They are injected at construction, never looked up globally.

use sm_core::model::{Diagram, ImageData};
use thiserror::Error;

/// Failures that cross the engine boundary. Interaction-local issues
/// (missed hits, cancelled gestures) never become errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("malformed document: {0}")]
    MalformedDocument(String),
}

/// What the domain registry knows about a referenced entity, enough for
/// hover popups and labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySummary {
    pub id: String,
    pub name: String,
    pub detail: Option<String>,
}

/// Read-only lookup into the domain registry (characters, locations, …).
///
/// Total: an unknown id is `None`, never an error — the engine relies on
/// that to self-heal stale references.
pub trait EntityRegistry {
    fn resolve_ref(&self, id: &str) -> Option<EntitySummary>;
}

/// Loads and stores diagram documents. Synchronous from the engine's
/// perspective; async hosts block or queue internally.
pub trait PersistenceGateway {
    fn load_diagram(&mut self, id: &str) -> Result<Diagram, EngineError>;
    fn save_diagram(&mut self, id: &str, diagram: &Diagram) -> Result<(), EngineError>;
}

/// Image upload/resolution. `upload_image` runs the host's picker flow and
/// returns a reference, or `None` when the user bails out.
pub trait ImageStore {
    fn upload_image(&mut self) -> Option<String>;
    fn load_image(&mut self, image_ref: &str) -> Option<ImageData>;
}

/// A registry that resolves nothing. Useful for canvases without domain
/// links (plain mind-maps) and for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyRegistry;

impl EntityRegistry for EmptyRegistry {
    fn resolve_ref(&self, _id: &str) -> Option<EntitySummary> {
        None
    }
}

/// An image store with no images.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImages;

impl ImageStore for NoImages {
    fn upload_image(&mut self) -> Option<String> {
        None
    }

    fn load_image(&mut self, _image_ref: &str) -> Option<ImageData> {
        None
    }
}
