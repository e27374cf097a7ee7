//! Shared test doubles for controller integration tests.

use sm_core::model::{Diagram, ImageData};
use sm_core::EngineConfig;
use sm_editor::{
    CanvasController, EditorEvent, EngineError, EntityRegistry, EntitySummary, ImageStore,
    PersistenceGateway,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Default)]
pub struct GatewayState {
    /// Every successful save, in order.
    pub saved: Vec<Diagram>,
    /// Document returned by `load_diagram`.
    pub stored: Option<Diagram>,
    /// When set, saves fail until cleared.
    pub failing: bool,
}

/// A persistence gateway whose state the test keeps a handle to.
#[derive(Clone, Default)]
pub struct RecordingGateway(pub Rc<RefCell<GatewayState>>);

impl PersistenceGateway for RecordingGateway {
    fn load_diagram(&mut self, _id: &str) -> Result<Diagram, EngineError> {
        Ok(self.0.borrow().stored.clone().unwrap_or_default())
    }

    fn save_diagram(&mut self, _id: &str, diagram: &Diagram) -> Result<(), EngineError> {
        let mut state = self.0.borrow_mut();
        if state.failing {
            return Err(EngineError::Persistence("disk unavailable".into()));
        }
        state.saved.push(diagram.clone());
        Ok(())
    }
}

/// An entity registry backed by a plain map.
#[derive(Clone, Default)]
pub struct StaticRegistry(pub Rc<RefCell<HashMap<String, EntitySummary>>>);

impl StaticRegistry {
    pub fn with_entity(id: &str, name: &str) -> Self {
        let reg = Self::default();
        reg.0.borrow_mut().insert(
            id.to_string(),
            EntitySummary {
                id: id.to_string(),
                name: name.to_string(),
                detail: None,
            },
        );
        reg
    }
}

impl EntityRegistry for StaticRegistry {
    fn resolve_ref(&self, id: &str) -> Option<EntitySummary> {
        self.0.borrow().get(id).cloned()
    }
}

/// An image store with preset uploads and pixels.
#[derive(Clone, Default)]
pub struct StaticImages {
    pub upload_result: Option<String>,
    pub images: Rc<RefCell<HashMap<String, ImageData>>>,
}

impl ImageStore for StaticImages {
    fn upload_image(&mut self) -> Option<String> {
        self.upload_result.clone()
    }

    fn load_image(&mut self, image_ref: &str) -> Option<ImageData> {
        self.images.borrow().get(image_ref).cloned()
    }
}

/// Controller over an in-memory document with recording collaborators.
pub fn controller_with(
    doc: Diagram,
    registry: StaticRegistry,
    gateway: RecordingGateway,
) -> CanvasController {
    CanvasController::new(
        "test-diagram",
        doc,
        Box::new(registry),
        Box::new(gateway),
        Box::new(StaticImages::default()),
        EngineConfig::default(),
    )
}

/// Subscribe a vec-sink to the controller's events.
pub fn record_events(controller: &mut CanvasController) -> Rc<RefCell<Vec<EditorEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    controller.subscribe(move |e| sink.borrow_mut().push(e.clone()));
    events
}
