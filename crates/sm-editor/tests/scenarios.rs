//! Integration tests: end-to-end interaction scenarios.
//!
//! Each test drives the controller the way a host canvas would — pointer
//! events with a millisecond clock, `tick` from a frame loop — and checks
//! the externally observable contract: documents written, events raised,
//! commands recorded.

mod common;

use common::{
    controller_with, record_events, RecordingGateway, StaticImages, StaticRegistry,
};
use pretty_assertions::assert_eq;
use sm_core::geometry::Point;
use sm_core::model::{Color, Diagram, ImageData, Node, NodeKind, MARKER_SIZE, NOTE_SIZE};
use sm_core::{EngineConfig, ItemId, RelationKind};
use sm_editor::{
    CanvasController, DeleteOutcome, EditorEvent, InputEvent, Modifiers, PlaceKind,
    PlacementSpec, SelectedItem,
};

fn marker(id: &str, x: f32, y: f32) -> Node {
    Node::new(
        ItemId::intern(id),
        NodeKind::MapMarker {
            icon: "flag".into(),
            color: Color::rgb8(179, 51, 51),
            size: MARKER_SIZE,
        },
        x,
        y,
    )
}

fn click(c: &mut CanvasController, p: Point, now: u64) {
    c.handle(&InputEvent::pointer_down(p.x, p.y), now);
    c.handle(&InputEvent::pointer_up(p.x, p.y), now + 1);
}

// ─── Scenario A: single-click placement ─────────────────────────────────

#[test]
fn marker_placement_lands_anchor_under_cursor() {
    let mut c = controller_with(
        Diagram::new(),
        StaticRegistry::default(),
        RecordingGateway::default(),
    );
    let events = record_events(&mut c);

    c.start_placement(PlacementSpec::new(PlaceKind::MapMarker));
    click(&mut c, Point::new(120.0, 80.0), 0);

    let doc = c.document();
    assert_eq!(doc.nodes.len(), 1);
    let node = &doc.nodes[0];
    assert!(matches!(node.kind, NodeKind::MapMarker { .. }));
    // The marker hangs from its tip: position = click − anchor
    let anchor = node.kind.anchor();
    assert_eq!(node.position(), Point::new(120.0 - anchor.x, 80.0 - anchor.y));

    let added: Vec<_> = events
        .borrow()
        .iter()
        .filter(|e| matches!(e, EditorEvent::ItemAdded { .. }))
        .cloned()
        .collect();
    assert_eq!(added, vec![EditorEvent::ItemAdded {
        item: SelectedItem::Node(node.id),
    }]);
}

// ─── Scenario B: drag → one command, one debounced write ────────────────

#[test]
fn drag_coalesces_into_one_command_and_one_write() {
    let gateway = RecordingGateway::default();
    let mut doc = Diagram::new();
    doc.add_node(Node::new(
        ItemId::intern("card"),
        NodeKind::Note {
            text: String::new(),
            width: NOTE_SIZE.0,
            height: NOTE_SIZE.1,
        },
        10.0,
        10.0,
    ));
    let mut c = controller_with(doc, StaticRegistry::default(), gateway.clone());
    let id = ItemId::intern("card");

    let center = c.document().node(id).unwrap().bounds().center();
    c.handle(&InputEvent::pointer_down(center.x, center.y), 0);
    // A flurry of move events, all inside the debounce window
    for i in 1..=20 {
        c.handle(
            &InputEvent::pointer_move(center.x + 2.0 * i as f32, center.y + 2.0 * i as f32),
            i,
        );
    }
    c.handle(&InputEvent::pointer_up(center.x + 40.0, center.y + 40.0), 25);

    assert_eq!(c.document().node(id).unwrap().position(), Point::new(50.0, 50.0));

    // Exactly one command for the whole gesture
    assert!(c.can_undo());

    // No write until the quiet period elapses
    c.tick(500);
    assert_eq!(gateway.0.borrow().saved.len(), 0);
    c.tick(1100);
    c.tick(2000);
    {
        let state = gateway.0.borrow();
        assert_eq!(state.saved.len(), 1, "exactly one write");
        assert_eq!(
            state.saved[0].node(id).unwrap().position(),
            Point::new(50.0, 50.0)
        );
    }

    c.undo(3000);
    assert!(!c.can_undo(), "the drag was a single command");
    assert_eq!(c.document().node(id).unwrap().position(), Point::new(10.0, 10.0));
}

// ─── Scenario C: connector lifecycle ────────────────────────────────────

#[test]
fn connector_drag_and_cascade_delete() {
    let mut doc = Diagram::new();
    doc.add_node(marker("a", 0.0, 0.0));
    doc.add_node(marker("b", 100.0, 0.0));
    let mut c = controller_with(doc, StaticRegistry::default(), RecordingGateway::default());
    let a = ItemId::intern("a");
    let b = ItemId::intern("b");

    // Select A, then drag from its handle onto B
    let a_bounds = c.document().node(a).unwrap().bounds();
    click(&mut c, a_bounds.center(), 0);
    assert_eq!(c.selection(), Some(SelectedItem::Node(a)));

    let handle = sm_render::handle_anchor(&a_bounds);
    let b_center = c.document().node(b).unwrap().bounds().center();
    c.handle(&InputEvent::pointer_down(handle.x, handle.y), 10);
    c.handle(&InputEvent::pointer_move(60.0, 20.0), 11);
    c.handle(&InputEvent::pointer_up(b_center.x, b_center.y), 12);

    assert_eq!(c.document().connectors.len(), 1);
    let connector = &c.document().connectors[0];
    assert_eq!(connector.source, a);
    assert_eq!(connector.target, b);
    // The fresh connector is selected, ready for the relation editor
    assert_eq!(c.selection(), Some(SelectedItem::Connector(connector.id)));

    // Deleting A takes the connector with it, as one undoable command
    click(&mut c, a_bounds.center(), 20);
    assert_eq!(c.request_delete_selection(30), DeleteOutcome::Deleted);
    assert!(c.document().node(a).is_none());
    assert!(c.document().connectors.is_empty());

    c.undo(40);
    assert!(c.document().node(a).is_some());
    assert_eq!(c.document().connectors.len(), 1);
}

#[test]
fn connector_drag_to_nowhere_cancels_silently() {
    let mut doc = Diagram::new();
    doc.add_node(marker("a", 0.0, 0.0));
    let mut c = controller_with(doc, StaticRegistry::default(), RecordingGateway::default());
    let a = ItemId::intern("a");

    let a_bounds = c.document().node(a).unwrap().bounds();
    click(&mut c, a_bounds.center(), 0);
    let events = record_events(&mut c);

    let handle = sm_render::handle_anchor(&a_bounds);
    // Release over empty canvas
    c.handle(&InputEvent::pointer_down(handle.x, handle.y), 10);
    c.handle(&InputEvent::pointer_up(400.0, 400.0), 11);
    // Release over the source itself
    c.handle(&InputEvent::pointer_down(handle.x, handle.y), 20);
    c.handle(&InputEvent::pointer_up(a_bounds.center().x, a_bounds.center().y), 21);

    assert!(c.document().connectors.is_empty());
    assert!(!c.can_undo());
    assert!(events.borrow().is_empty(), "no side effects at all");
}

// ─── Scenario D lives in undo_redo.rs ───────────────────────────────────

// ─── Scenario E: broken reference self-healing ──────────────────────────

#[test]
fn stale_entity_ref_clears_once_on_hover() {
    let mut doc = Diagram::new();
    let mut pin = marker("pin", 50.0, 50.0);
    pin.entity_ref = Some("ghost-entity".into());
    doc.add_node(pin);
    // Registry knows nothing about ghost-entity
    let mut c = controller_with(doc, StaticRegistry::default(), RecordingGateway::default());
    let id = ItemId::intern("pin");
    let events = record_events(&mut c);

    let center = c.document().node(id).unwrap().bounds().center();
    c.handle(&InputEvent::pointer_move(center.x, center.y), 0);
    c.tick(100); // before the hover delay — nothing yet
    assert!(c.document().node(id).unwrap().entity_ref.is_some());

    c.tick(300);
    let node = c.document().node(id).unwrap();
    assert_eq!(node.entity_ref, None, "stale ref cleared");
    assert!(node.ref_broken, "renderer de-emphasizes the node");
    assert!(events.borrow().is_empty(), "recovery is not surfaced");

    // Idempotent: hovering again does nothing further
    c.handle(&InputEvent::pointer_move(0.0, 0.0), 400);
    c.handle(&InputEvent::pointer_move(center.x, center.y), 500);
    c.tick(1000);
    assert_eq!(c.document().node(id).unwrap().entity_ref, None);
}

#[test]
fn hover_resolves_entity_after_delay() {
    let mut doc = Diagram::new();
    let mut pin = marker("pin", 50.0, 50.0);
    pin.entity_ref = Some("loc-1".into());
    doc.add_node(pin);
    let registry = StaticRegistry::with_entity("loc-1", "The Sunken City");
    let mut c = controller_with(doc, registry, RecordingGateway::default());
    let events = record_events(&mut c);

    let center = c
        .document()
        .node(ItemId::intern("pin"))
        .unwrap()
        .bounds()
        .center();
    c.handle(&InputEvent::pointer_move(center.x, center.y), 0);
    c.tick(300);

    let infos: Vec<_> = events
        .borrow()
        .iter()
        .filter_map(|e| match e {
            EditorEvent::HoverInfo { entity, .. } => Some(entity.name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(infos, vec!["The Sunken City".to_string()]);
}

#[test]
fn hover_popup_cancelled_when_pointer_leaves() {
    let mut doc = Diagram::new();
    let mut pin = marker("pin", 50.0, 50.0);
    pin.entity_ref = Some("loc-1".into());
    doc.add_node(pin);
    let registry = StaticRegistry::with_entity("loc-1", "The Sunken City");
    let mut c = controller_with(doc, registry, RecordingGateway::default());
    let events = record_events(&mut c);

    let center = c
        .document()
        .node(ItemId::intern("pin"))
        .unwrap()
        .bounds()
        .center();
    c.handle(&InputEvent::pointer_move(center.x, center.y), 0);
    // Pointer leaves before the delay elapses
    c.handle(&InputEvent::pointer_move(400.0, 400.0), 100);
    c.tick(1000);

    assert!(events.borrow().is_empty(), "no popup after fast travel");
}

// ─── Area drawing ───────────────────────────────────────────────────────

#[test]
fn freeform_path_points_respect_threshold() {
    let mut c = controller_with(
        Diagram::new(),
        StaticRegistry::default(),
        RecordingGateway::default(),
    );
    let threshold = c.config().path_point_threshold;

    c.start_placement(PlacementSpec::new(PlaceKind::AreaPath));
    c.handle(&InputEvent::pointer_down(100.0, 100.0), 0);
    // Jittery hand: most moves are sub-threshold
    for (i, x) in [101.0, 102.0, 110.0, 112.0, 120.0].iter().enumerate() {
        c.handle(&InputEvent::pointer_move(*x, 100.0), i as u64 + 1);
    }
    c.handle(&InputEvent::pointer_move(120.0, 112.0), 10);
    c.handle(&InputEvent::pointer_up(120.0, 112.0), 11);

    let doc = c.document();
    assert_eq!(doc.nodes.len(), 1);
    let node = &doc.nodes[0];
    assert_eq!(node.position(), Point::new(100.0, 100.0));
    let NodeKind::AreaPath { points, .. } = &node.kind else {
        panic!("expected AreaPath, got {:?}", node.kind);
    };
    assert!(points.len() >= 3);
    for pair in points.windows(2) {
        assert!(
            pair[0].distance(pair[1]) >= threshold,
            "micro-segment recorded: {pair:?}"
        );
    }
}

#[test]
fn degenerate_path_click_creates_nothing() {
    let mut c = controller_with(
        Diagram::new(),
        StaticRegistry::default(),
        RecordingGateway::default(),
    );
    let events = record_events(&mut c);

    c.start_placement(PlacementSpec::new(PlaceKind::AreaPath));
    click(&mut c, Point::new(100.0, 100.0), 0);

    assert!(c.document().nodes.is_empty());
    assert!(!c.can_undo());
    assert!(events
        .borrow()
        .iter()
        .any(|e| matches!(e, EditorEvent::PlacementCancelled)));
}

#[test]
fn aspect_lock_draws_squares_and_circles() {
    let mut c = controller_with(
        Diagram::new(),
        StaticRegistry::default(),
        RecordingGateway::default(),
    );
    let shift = Modifiers {
        shift: true,
        ..Modifiers::NONE
    };

    c.start_placement(PlacementSpec::new(PlaceKind::AreaSquare));
    c.handle(&InputEvent::pointer_down(50.0, 50.0), 0);
    c.handle(
        &InputEvent::PointerMove {
            x: 150.0,
            y: 110.0,
            modifiers: shift,
        },
        1,
    );
    c.handle(
        &InputEvent::PointerUp {
            x: 150.0,
            y: 110.0,
            modifiers: shift,
        },
        2,
    );

    let NodeKind::AreaSquare { width, height, .. } = &c.document().nodes[0].kind else {
        panic!("expected AreaSquare");
    };
    assert_eq!(width, height, "shift locks the aspect");
    assert_eq!(*width, 100.0, "square uses the larger drag extent");

    c.start_placement(PlacementSpec::new(PlaceKind::AreaCircle));
    c.handle(&InputEvent::pointer_down(200.0, 200.0), 10);
    c.handle(
        &InputEvent::PointerMove {
            x: 260.0,
            y: 230.0,
            modifiers: shift,
        },
        11,
    );
    c.handle(
        &InputEvent::PointerUp {
            x: 260.0,
            y: 230.0,
            modifiers: shift,
        },
        12,
    );

    let NodeKind::AreaCircle { radius, .. } = &c.document().nodes[1].kind else {
        panic!("expected AreaCircle");
    };
    assert_eq!(*radius, 30.0);
}

// ─── Drop protocol ──────────────────────────────────────────────────────

#[test]
fn character_drop_resolves_name_from_registry() {
    let registry = StaticRegistry::with_entity("char-9", "Yara");
    let mut c = controller_with(Diagram::new(), registry, RecordingGateway::default());
    let events = record_events(&mut c);

    let handled = c.drop_payload(
        "application/x-storymap.character;subtype=char-9",
        Point::new(300.0, 200.0),
        0,
    );
    assert!(handled);

    let node = &c.document().nodes[0];
    assert_eq!(node.entity_ref.as_deref(), Some("char-9"));
    let NodeKind::Character { name } = &node.kind else {
        panic!("expected Character");
    };
    assert_eq!(name, "Yara");
    assert!(events
        .borrow()
        .iter()
        .any(|e| matches!(e, EditorEvent::ItemAdded { .. })));

    assert!(!c.drop_payload("text/plain", Point::ZERO, 10));
}

// ─── Connector relation editing ─────────────────────────────────────────

#[test]
fn relation_assignment_is_one_undoable_edit() {
    let mut doc = Diagram::new();
    doc.add_node(marker("a", 0.0, 0.0));
    doc.add_node(marker("b", 100.0, 0.0));
    doc.add_connector(sm_core::Connector::new(
        ItemId::intern("edge"),
        ItemId::intern("a"),
        ItemId::intern("b"),
    ));
    let mut c = controller_with(doc, StaticRegistry::default(), RecordingGateway::default());
    let edge = ItemId::intern("edge");

    // Untyped connector renders as a placeholder
    assert_eq!(c.document().connector(edge).unwrap().effective_color(), None);

    c.set_connector_relation(edge, Some(RelationKind::Rival), 0);
    let connector = c.document().connector(edge).unwrap();
    assert_eq!(connector.relation, Some(RelationKind::Rival));
    assert_eq!(connector.effective_color(), Some(RelationKind::Rival.color()));

    c.undo(10);
    assert_eq!(c.document().connector(edge).unwrap().relation, None);
    c.redo(20);
    assert_eq!(
        c.document().connector(edge).unwrap().relation,
        Some(RelationKind::Rival)
    );
}

// ─── Deletion confirmation ──────────────────────────────────────────────

#[test]
fn deleting_content_requires_confirmation() {
    let mut doc = Diagram::new();
    let mut note = Node::new(
        ItemId::intern("draft"),
        NodeKind::Note {
            text: "act two outline".into(),
            width: NOTE_SIZE.0,
            height: NOTE_SIZE.1,
        },
        10.0,
        10.0,
    );
    note.selected = true;
    doc.add_node(note);
    let mut c = controller_with(doc, StaticRegistry::default(), RecordingGateway::default());
    let id = ItemId::intern("draft");
    let center = c.document().node(id).unwrap().bounds().center();
    click(&mut c, center, 0);
    let events = record_events(&mut c);

    assert_eq!(
        c.request_delete_selection(10),
        DeleteOutcome::NeedsConfirmation(id)
    );
    assert!(c.document().node(id).is_some(), "nothing deleted yet");
    assert_eq!(
        events.borrow().as_slice(),
        &[EditorEvent::DeleteConfirmationRequested { id }]
    );

    assert!(c.confirm_delete(id, 20));
    assert!(c.document().node(id).is_none());
    assert!(!c.confirm_delete(id, 30), "already gone");
}

// ─── Persistence failure & retry ────────────────────────────────────────

#[test]
fn failed_save_keeps_edits_and_retries() {
    let gateway = RecordingGateway::default();
    let mut doc = Diagram::new();
    doc.add_node(marker("pin", 10.0, 10.0));
    let mut c = controller_with(doc, StaticRegistry::default(), gateway.clone());
    let id = ItemId::intern("pin");
    let events = record_events(&mut c);

    gateway.0.borrow_mut().failing = true;

    let center = c.document().node(id).unwrap().bounds().center();
    c.handle(&InputEvent::pointer_down(center.x, center.y), 0);
    c.handle(&InputEvent::pointer_move(center.x + 30.0, center.y), 1);
    c.handle(&InputEvent::pointer_up(center.x + 30.0, center.y), 2);

    c.tick(1100);
    assert!(gateway.0.borrow().saved.is_empty());
    assert!(events
        .borrow()
        .iter()
        .any(|e| matches!(e, EditorEvent::PersistenceFailed { .. })));
    // The in-memory edit survives the failure
    assert_eq!(c.document().node(id).unwrap().position(), Point::new(40.0, 10.0));

    // Storage comes back; the next debounce cycle retries
    gateway.0.borrow_mut().failing = false;
    c.tick(2200);
    assert_eq!(gateway.0.borrow().saved.len(), 1);
    assert_eq!(
        gateway.0.borrow().saved[0].node(id).unwrap().position(),
        Point::new(40.0, 10.0)
    );
}

// ─── Malformed document loading ─────────────────────────────────────────

#[test]
fn open_repairs_dangling_connectors_best_effort() {
    let gateway = RecordingGateway::default();
    gateway.0.borrow_mut().stored =
        Some(serde_json::from_str(include_str!("fixtures/world_map.json")).unwrap());

    let c = CanvasController::open(
        "world",
        Box::new(StaticRegistry::default()),
        Box::new(gateway),
        Box::new(StaticImages::default()),
        EngineConfig::default(),
    )
    .unwrap();

    let doc = c.document();
    assert_eq!(doc.nodes.len(), 3);
    // `route` survives, `broken` (→ sunken_city) is dropped
    assert_eq!(doc.connectors.len(), 1);
    assert_eq!(doc.connectors[0].id, ItemId::intern("route"));
    assert_eq!(doc.background_ref.as_deref(), Some("map-bg-3"));
}

// ─── Background & dominant color ────────────────────────────────────────

#[test]
fn background_swap_refreshes_dominant_color_undoably() {
    let images = StaticImages::default();
    images.images.borrow_mut().insert(
        "map-bg".to_string(),
        ImageData {
            width: 2,
            height: 1,
            pixels: vec![30, 90, 40, 255, 32, 92, 44, 255],
        },
    );
    let mut c = CanvasController::new(
        "world",
        Diagram::new(),
        Box::new(StaticRegistry::default()),
        Box::new(RecordingGateway::default()),
        Box::new(images),
        EngineConfig::default(),
    );

    c.set_background(Some("map-bg".into()), 0);
    assert_eq!(c.document().background_ref.as_deref(), Some("map-bg"));
    let dominant = c.document().dominant_color.expect("cache refreshed");
    assert!(dominant.g > dominant.r && dominant.g > dominant.b);

    c.undo(10);
    assert_eq!(c.document().background_ref, None);
    assert_eq!(c.document().dominant_color, None);
    c.redo(20);
    assert_eq!(c.document().background_ref.as_deref(), Some("map-bg"));
}
