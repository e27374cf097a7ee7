//! The canvas controller: one interaction state machine for every canvas.
//!
//! All pointer and key input funnels through here. The controller owns the
//! live document, the exclusive selection, the undo history, and the
//! debounce timers; it interprets gestures against the current `Mode` and
//! turns them into document edits, each recorded as one `Command`.
//!
//! Hosts (character map, mind-map, world map) differ only in the palette
//! they offer — they call `start_placement`/`cancel_placement`/
//! `drop_payload`, feed input events with a monotonic millisecond clock,
//! drive `tick` from their frame loop, and subscribe to `EditorEvent`s.

use crate::commands::{Command, CommandStack, Edit};
use crate::events::{EditorEvent, EventBus, SelectedItem};
use crate::gateway::{EngineError, EntityRegistry, ImageStore, PersistenceGateway};
use crate::input::{InputEvent, Modifiers, PointerButton};
use crate::schedule::{Debounce, OneShot};
use crate::shortcuts::{ShortcutAction, ShortcutMap};
use sm_core::geometry::{Point, Rect};
use sm_core::model::{
    Color, Connector, Diagram, Node, NodeKind, EVENT_SIZE, ICON_SIZE, MARKER_SIZE, NOTE_SIZE,
};
use sm_core::{EngineConfig, ItemId, RelationKind};
use sm_render::hit;
use sm_render::paint::ViewState;

/// Height of the floating item toolbar the host positions via
/// [`CanvasController::toolbar_anchor`].
const TOOLBAR_HEIGHT: f32 = 36.0;
const TOOLBAR_GAP: f32 = 8.0;

/// Default tint for freshly drawn map areas.
const AREA_COLOR: Color = Color::rgb8(77, 140, 89);
/// Default map marker color.
const MARKER_COLOR: Color = Color::rgb8(191, 56, 43);

// ─── Placement ───────────────────────────────────────────────────────────

/// The node kinds a palette tool can place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceKind {
    Character,
    Event,
    Note,
    Icon,
    Image,
    MapMarker,
    AreaSquare,
    AreaCircle,
    AreaPath,
}

impl PlaceKind {
    pub fn tag(&self) -> &'static str {
        match self {
            PlaceKind::Character => "character",
            PlaceKind::Event => "event",
            PlaceKind::Note => "note",
            PlaceKind::Icon => "icon",
            PlaceKind::Image => "image",
            PlaceKind::MapMarker => "mapMarker",
            PlaceKind::AreaSquare => "areaSquare",
            PlaceKind::AreaCircle => "areaCircle",
            PlaceKind::AreaPath => "areaPath",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "character" => PlaceKind::Character,
            "event" => PlaceKind::Event,
            "note" => PlaceKind::Note,
            "icon" => PlaceKind::Icon,
            "image" => PlaceKind::Image,
            "mapMarker" => PlaceKind::MapMarker,
            "areaSquare" => PlaceKind::AreaSquare,
            "areaCircle" => PlaceKind::AreaCircle,
            "areaPath" => PlaceKind::AreaPath,
            _ => return None,
        })
    }

    /// Area kinds need a press-drag-release draw instead of a single click.
    pub fn is_area(&self) -> bool {
        matches!(
            self,
            PlaceKind::AreaSquare | PlaceKind::AreaCircle | PlaceKind::AreaPath
        )
    }
}

/// What a palette tool (or a drag-and-drop payload) wants to place.
///
/// `subtype` is kind-dependent: an entity reference for characters and
/// events, an icon name for icons and markers, an image reference for
/// images. `None` falls back to kind defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementSpec {
    pub kind: PlaceKind,
    pub subtype: Option<String>,
}

impl PlacementSpec {
    /// Drop payload tag prefix, `application/<kind>`-style.
    pub const MIME_PREFIX: &'static str = "application/x-storymap.";

    pub fn new(kind: PlaceKind) -> Self {
        Self {
            kind,
            subtype: None,
        }
    }

    pub fn with_subtype(kind: PlaceKind, subtype: impl Into<String>) -> Self {
        Self {
            kind,
            subtype: Some(subtype.into()),
        }
    }

    /// Encode as a drag-and-drop payload tag,
    /// e.g. `application/x-storymap.mapMarker;subtype=castle`.
    pub fn to_mime(&self) -> String {
        match &self.subtype {
            Some(s) => format!("{}{};subtype={s}", Self::MIME_PREFIX, self.kind.tag()),
            None => format!("{}{}", Self::MIME_PREFIX, self.kind.tag()),
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        let rest = mime.strip_prefix(Self::MIME_PREFIX)?;
        let (tag, params) = match rest.split_once(';') {
            Some((tag, params)) => (tag, Some(params)),
            None => (rest, None),
        };
        let kind = PlaceKind::from_tag(tag)?;
        let subtype = params
            .and_then(|p| p.strip_prefix("subtype="))
            .map(str::to_string);
        Some(Self { kind, subtype })
    }
}

// ─── Interaction modes ───────────────────────────────────────────────────

/// The controller's interaction state machine.
#[derive(Debug)]
enum Mode {
    /// Nothing in flight; presses select and drag.
    Idle,
    /// A palette tool is armed; the next press places (or starts drawing).
    Placing(PlacementSpec),
    /// A node is being moved.
    DraggingItem {
        id: ItemId,
        /// Pointer offset from the node's top-left at press time.
        grab: Point,
        /// The node's position when the drag started.
        from: Point,
        moved: bool,
    },
    /// An area shape is being drawn out.
    DrawingArea {
        spec: PlacementSpec,
        anchor: Point,
        corner: Point,
        lock_aspect: bool,
        /// Freeform path points, relative to `anchor`.
        points: Vec<Point>,
    },
    /// A connector is being dragged from a node's handle.
    DraggingConnector { source: ItemId, current: Point },
}

/// Live gesture geometry hosts can render as a rubber band.
#[derive(Debug, Clone, PartialEq)]
pub enum Preview {
    Area { rect: Rect, circle: bool },
    Path { anchor: Point, points: Vec<Point> },
    Connector { from: Point, to: Point },
}

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Nothing was selected.
    Nothing,
    Deleted,
    /// The node carries content; host must call `confirm_delete`.
    NeedsConfirmation(ItemId),
}

// ─── The controller ──────────────────────────────────────────────────────

pub struct CanvasController {
    doc: Diagram,
    doc_id: String,
    config: EngineConfig,

    mode: Mode,
    selection: Option<SelectedItem>,
    hovered: Option<ItemId>,

    history: CommandStack,
    events: EventBus,

    persist: Debounce,
    hover_delay: OneShot,
    dirty: bool,

    registry: Box<dyn EntityRegistry>,
    gateway: Box<dyn PersistenceGateway>,
    images: Box<dyn ImageStore>,
}

impl CanvasController {
    /// Wrap an already-loaded document.
    pub fn new(
        doc_id: impl Into<String>,
        doc: Diagram,
        registry: Box<dyn EntityRegistry>,
        gateway: Box<dyn PersistenceGateway>,
        images: Box<dyn ImageStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            doc,
            doc_id: doc_id.into(),
            mode: Mode::Idle,
            selection: None,
            hovered: None,
            history: CommandStack::new(config.history_limit),
            events: EventBus::new(),
            persist: Debounce::new(config.persist_debounce_ms),
            hover_delay: OneShot::new(config.hover_delay_ms),
            dirty: false,
            registry,
            gateway,
            images,
            config,
        }
    }

    /// Load a document through the gateway, repairing it best-effort.
    pub fn open(
        doc_id: impl Into<String>,
        registry: Box<dyn EntityRegistry>,
        mut gateway: Box<dyn PersistenceGateway>,
        images: Box<dyn ImageStore>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let doc_id = doc_id.into();
        let mut doc = gateway.load_diagram(&doc_id)?;
        let dropped = doc.sanitize();
        if dropped > 0 {
            log::warn!("repaired diagram {doc_id}: dropped {dropped} malformed item(s)");
        }
        Ok(Self::new(doc_id, doc, registry, gateway, images, config))
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn document(&self) -> &Diagram {
        &self.doc
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn selection(&self) -> Option<SelectedItem> {
        self.selection
    }

    pub fn hovered(&self) -> Option<ItemId> {
        self.hovered
    }

    pub fn is_placing(&self) -> bool {
        matches!(self.mode, Mode::Placing(_) | Mode::DrawingArea { .. })
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Unsaved edits pending the debounce window?
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn subscribe(&mut self, f: impl FnMut(&EditorEvent) + 'static) {
        self.events.subscribe(f);
    }

    /// Transient view state for the renderer.
    pub fn view_state(&self) -> ViewState {
        let handle_on = match self.selection {
            Some(SelectedItem::Node(id)) => Some(id),
            _ => None,
        };
        ViewState {
            hovered: self.hovered,
            handle_on,
            handle_radius: self.config.handle_radius,
        }
    }

    /// Where the host should place the contextual toolbar: above the single
    /// selected item's bounds, or nowhere.
    pub fn toolbar_anchor(&self) -> Option<Rect> {
        let bounds = match self.selection? {
            SelectedItem::Node(id) => self.doc.node(id)?.bounds(),
            SelectedItem::Connector(id) => {
                let c = self.doc.connector(id)?;
                let a = self.doc.node(c.source)?.bounds().center();
                let b = self.doc.node(c.target)?.bounds().center();
                Rect::from_corners(a, b)
            }
        };
        Some(Rect::new(
            bounds.x,
            bounds.y - TOOLBAR_HEIGHT - TOOLBAR_GAP,
            bounds.width,
            TOOLBAR_HEIGHT,
        ))
    }

    /// Live gesture geometry for rubber-band rendering.
    pub fn preview(&self) -> Option<Preview> {
        match &self.mode {
            Mode::DrawingArea {
                spec,
                anchor,
                corner,
                lock_aspect,
                points,
            } => match spec.kind {
                PlaceKind::AreaPath => Some(Preview::Path {
                    anchor: *anchor,
                    points: points.clone(),
                }),
                PlaceKind::AreaCircle => Some(Preview::Area {
                    rect: area_rect(*anchor, *corner, *lock_aspect),
                    circle: true,
                }),
                _ => Some(Preview::Area {
                    rect: area_rect(*anchor, *corner, *lock_aspect),
                    circle: false,
                }),
            },
            Mode::DraggingConnector { source, current } => {
                let from = self.doc.node(*source)?.bounds().center();
                Some(Preview::Connector {
                    from,
                    to: *current,
                })
            }
            _ => None,
        }
    }

    // ── Palette contract ─────────────────────────────────────────────────

    /// Arm a placement tool. While a placement is pending this is a no-op —
    /// the first tool must resolve (place or cancel) before another arms.
    pub fn start_placement(&mut self, spec: PlacementSpec) {
        if !matches!(self.mode, Mode::Idle) {
            log::debug!("ignoring start_placement({}) while busy", spec.kind.tag());
            return;
        }
        let kind = spec.kind.tag().to_string();
        self.mode = Mode::Placing(spec);
        self.emit(EditorEvent::PlacementStarted { kind });
    }

    /// Abort a pending placement or in-progress area draw. The document is
    /// untouched; the palette is told to re-enable its tools.
    pub fn cancel_placement(&mut self) {
        if matches!(self.mode, Mode::Placing(_) | Mode::DrawingArea { .. }) {
            self.mode = Mode::Idle;
            self.emit(EditorEvent::PlacementCancelled);
        }
    }

    /// Handle a drop from the palette or a domain list (a character row, an
    /// icon cell). Equivalent to completing a placement at `at`.
    pub fn drop_payload(&mut self, mime: &str, at: Point, now: u64) -> bool {
        let Some(spec) = PlacementSpec::from_mime(mime) else {
            log::debug!("ignoring unknown drop payload {mime:?}");
            return false;
        };
        if spec.kind.is_area() {
            // Area kinds have no meaningful drop size; arm the draw tool.
            self.start_placement(spec);
            return true;
        }
        self.place(&spec, at, now)
    }

    // ── Input dispatch ───────────────────────────────────────────────────

    /// Feed one normalized input event. `now` is the host's monotonic
    /// millisecond clock, shared with `tick`.
    pub fn handle(&mut self, event: &InputEvent, now: u64) {
        match event {
            InputEvent::PointerDown {
                x,
                y,
                button,
                modifiers,
            } => self.pointer_down(Point::new(*x, *y), *button, *modifiers, now),
            InputEvent::PointerMove { x, y, modifiers } => {
                self.pointer_move(Point::new(*x, *y), *modifiers, now)
            }
            InputEvent::PointerUp { x, y, modifiers } => {
                self.pointer_up(Point::new(*x, *y), *modifiers, now)
            }
            InputEvent::Key { key, modifiers } => self.key(key, *modifiers, now),
        }
    }

    fn pointer_down(&mut self, p: Point, button: PointerButton, _modifiers: Modifiers, now: u64) {
        // Right-click cancels pending gestures and does nothing else.
        if button == PointerButton::Secondary {
            self.cancel_placement();
            return;
        }

        match &self.mode {
            Mode::Placing(spec) => {
                let spec = spec.clone();
                if spec.kind.is_area() {
                    self.mode = Mode::DrawingArea {
                        spec,
                        anchor: p,
                        corner: p,
                        lock_aspect: false,
                        points: vec![Point::ZERO],
                    };
                } else {
                    self.place(&spec, p, now);
                }
            }
            Mode::Idle => {
                // Connector handle of the selected node has first claim.
                if let Some(SelectedItem::Node(sel)) = self.selection
                    && let Some(node) = self.doc.node(sel)
                    && hit::hit_test_handle(node, p, self.config.handle_radius)
                {
                    self.mode = Mode::DraggingConnector {
                        source: sel,
                        current: p,
                    };
                    return;
                }

                match hit::hit_test(&self.doc, p, self.config.connector_tolerance) {
                    Some(hit::Hit::Node(id)) => {
                        self.select(Some(SelectedItem::Node(id)));
                        let origin = self.doc.node(id).map(Node::position).unwrap_or(p);
                        self.mode = Mode::DraggingItem {
                            id,
                            grab: p - origin,
                            from: origin,
                            moved: false,
                        };
                    }
                    Some(hit::Hit::Connector(id)) => {
                        self.select(Some(SelectedItem::Connector(id)));
                    }
                    None => self.select(None),
                }
            }
            // A second press mid-gesture (multi-touch, spurious events)
            // is ignored; the gesture resolves on release.
            _ => {}
        }
    }

    fn pointer_move(&mut self, p: Point, modifiers: Modifiers, now: u64) {
        if matches!(self.mode, Mode::Idle) {
            self.track_hover(p, now);
            return;
        }
        match &mut self.mode {
            Mode::DraggingItem {
                id,
                grab,
                from,
                moved,
            } => {
                let target = p - *grab;
                *moved = *moved || target.distance(*from) > self.config.drag_slop;
                let id = *id;
                if let Some(node) = self.doc.node_mut(id) {
                    node.set_position(target);
                }
            }
            Mode::DrawingArea {
                spec,
                anchor,
                corner,
                lock_aspect,
                points,
            } => {
                *corner = p;
                *lock_aspect = modifiers.shift;
                if spec.kind == PlaceKind::AreaPath {
                    let rel = p - *anchor;
                    let last = *points.last().expect("path starts with its anchor point");
                    // Skip micro-segments from pointer jitter.
                    if rel.distance(last) >= self.config.path_point_threshold {
                        points.push(rel);
                    }
                }
            }
            Mode::DraggingConnector { current, .. } => {
                *current = p;
            }
            Mode::Idle | Mode::Placing(_) => {}
        }
    }

    fn pointer_up(&mut self, p: Point, _modifiers: Modifiers, now: u64) {
        match std::mem::replace(&mut self.mode, Mode::Idle) {
            Mode::DraggingItem {
                id, grab, from, moved,
            } => {
                if !moved {
                    // A click, not a drag — selection already happened.
                    if let Some(node) = self.doc.node_mut(id) {
                        node.set_position(from);
                    }
                    return;
                }
                let to = p - grab;
                if let Some(node) = self.doc.node_mut(id) {
                    node.set_position(to);
                }
                self.push_command(
                    Command::new(Edit::MoveNode { id, from, to }, "Move item"),
                    now,
                );
                self.emit(EditorEvent::ItemMoved { id });
            }
            Mode::DrawingArea {
                spec,
                anchor,
                corner,
                lock_aspect,
                points,
            } => {
                match self.finish_area(&spec, anchor, corner, lock_aspect, points) {
                    Some(node) => self.commit_new_node(node, now),
                    None => self.emit(EditorEvent::PlacementCancelled),
                }
            }
            Mode::DraggingConnector { source, .. } => {
                match hit::hit_test_node(&self.doc, p) {
                    Some(target) if target != source => {
                        let connector =
                            Connector::new(ItemId::with_prefix("connector"), source, target);
                        if self.doc.add_connector(connector.clone()) {
                            self.push_command(
                                Command::new(
                                    Edit::AddConnector {
                                        connector: connector.clone(),
                                    },
                                    "Connect items",
                                ),
                                now,
                            );
                            let item = SelectedItem::Connector(connector.id);
                            self.emit(EditorEvent::ItemAdded { item });
                            self.select(Some(item));
                        }
                    }
                    // Empty space or the source itself: silent cancel.
                    _ => {}
                }
            }
            mode @ (Mode::Idle | Mode::Placing(_)) => {
                self.mode = mode;
            }
        }
    }

    fn key(&mut self, key: &str, modifiers: Modifiers, now: u64) {
        match ShortcutMap::resolve(key, modifiers) {
            Some(ShortcutAction::Undo) => self.undo(now),
            Some(ShortcutAction::Redo) => self.redo(now),
            Some(ShortcutAction::Delete) => {
                self.request_delete_selection(now);
            }
            Some(ShortcutAction::Cancel) => {
                if self.is_placing() {
                    self.cancel_placement();
                } else {
                    self.select(None);
                }
            }
            Some(action) => self.reorder_selected(action, now),
            None => {}
        }
    }

    /// Advance the timers. Call from the host's frame loop with the same
    /// clock the input events use.
    pub fn tick(&mut self, now: u64) {
        if self.persist.fire(now) {
            self.flush(now);
        }

        if self.hover_delay.fire(now) {
            self.resolve_hover(now);
        }
    }

    // ── Undo / redo ──────────────────────────────────────────────────────

    pub fn undo(&mut self, now: u64) {
        let Some(desc) = self.history.undo(&mut self.doc) else {
            return;
        };
        log::debug!("undo: {desc}");
        self.after_history_change(now);
    }

    pub fn redo(&mut self, now: u64) {
        let Some(desc) = self.history.redo(&mut self.doc) else {
            return;
        };
        log::debug!("redo: {desc}");
        self.after_history_change(now);
    }

    fn after_history_change(&mut self, now: u64) {
        // The edit may have removed the selected item from under us.
        let still_there = match self.selection {
            Some(SelectedItem::Node(id)) => self.doc.node(id).is_some(),
            Some(SelectedItem::Connector(id)) => self.doc.connector(id).is_some(),
            None => true,
        };
        if !still_there {
            self.select(None);
        }
        self.dirty = true;
        self.persist.poke(now);
        self.emit(EditorEvent::HistoryChanged {
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        });
    }

    // ── Item mutators ────────────────────────────────────────────────────
    //
    // The uniform path for property edits: capture before, mutate, capture
    // after, record one command. Items never write the document directly.

    pub fn set_node_text(&mut self, id: ItemId, text: &str, now: u64) {
        self.patch_node(id, "Edit text", now, |n| n.set_text(text));
    }

    pub fn set_node_color(&mut self, id: ItemId, color: Color, now: u64) {
        self.patch_node(id, "Change color", now, |n| n.set_color(color));
    }

    pub fn set_node_icon(&mut self, id: ItemId, icon: &str, now: u64) {
        self.patch_node(id, "Change icon", now, |n| n.set_icon(icon));
    }

    pub fn set_node_size(&mut self, id: ItemId, width: f32, height: f32, now: u64) {
        self.patch_node(id, "Resize", now, |n| n.set_size(width, height));
    }

    pub fn set_node_entity_ref(&mut self, id: ItemId, entity_ref: Option<String>, now: u64) {
        self.patch_node(id, "Link entity", now, |n| n.set_entity_ref(entity_ref));
    }

    pub fn set_connector_relation(
        &mut self,
        id: ItemId,
        relation: Option<RelationKind>,
        now: u64,
    ) {
        self.patch_connector(id, "Set relation", now, |c| c.relation = relation);
    }

    pub fn set_connector_label(&mut self, id: ItemId, label: Option<String>, now: u64) {
        self.patch_connector(id, "Edit label", now, |c| c.label = label);
    }

    pub fn set_connector_color(&mut self, id: ItemId, color: Option<Color>, now: u64) {
        self.patch_connector(id, "Change color", now, |c| c.color = color);
    }

    /// Swap the background image. The dominant color cache refreshes from
    /// the new image when it can be loaded.
    pub fn set_background(&mut self, background_ref: Option<String>, now: u64) {
        let before = (self.doc.background_ref.clone(), self.doc.dominant_color);
        self.doc.set_background(background_ref.clone());
        if let Some(image_ref) = &background_ref
            && let Some(image) = self.images.load_image(image_ref)
        {
            self.doc.refresh_dominant_color(&image);
        }
        let after = (self.doc.background_ref.clone(), self.doc.dominant_color);
        if before == after {
            return;
        }
        self.push_command(
            Command::new(Edit::SetBackground { before, after }, "Change background"),
            now,
        );
    }

    /// Run the host's image picker and place the result at `at`.
    pub fn place_uploaded_image(&mut self, at: Point, now: u64) -> bool {
        self.place(&PlacementSpec::new(PlaceKind::Image), at, now)
    }

    /// The background's dominant color, recomputed on demand after a
    /// background change invalidated the cache.
    pub fn dominant_color(&mut self) -> Option<Color> {
        if self.doc.dominant_color.is_none()
            && let Some(background_ref) = self.doc.background_ref.clone()
            && let Some(image) = self.images.load_image(&background_ref)
        {
            self.doc.refresh_dominant_color(&image);
        }
        self.doc.dominant_color
    }

    // ── Deletion ─────────────────────────────────────────────────────────

    /// Delete the selection. Nodes with typed content or an entity link are
    /// not deleted yet — the host is asked to confirm first.
    pub fn request_delete_selection(&mut self, now: u64) -> DeleteOutcome {
        match self.selection {
            Some(SelectedItem::Connector(id)) => {
                self.delete_connector(id, now);
                DeleteOutcome::Deleted
            }
            Some(SelectedItem::Node(id)) => {
                let trivial = self.doc.node(id).is_some_and(Node::is_trivial);
                if trivial {
                    self.delete_node(id, now);
                    DeleteOutcome::Deleted
                } else {
                    self.emit(EditorEvent::DeleteConfirmationRequested { id });
                    DeleteOutcome::NeedsConfirmation(id)
                }
            }
            None => DeleteOutcome::Nothing,
        }
    }

    /// Host confirmed: delete the node regardless of content.
    pub fn confirm_delete(&mut self, id: ItemId, now: u64) -> bool {
        if self.doc.node(id).is_none() {
            return false;
        }
        self.delete_node(id, now);
        true
    }

    fn delete_node(&mut self, id: ItemId, now: u64) {
        let Some((index, node, connectors)) = self.doc.remove_node(id) else {
            return;
        };
        self.push_command(
            Command::new(
                Edit::RemoveNode {
                    index,
                    node,
                    connectors,
                },
                "Delete item",
            ),
            now,
        );
        if self.selection == Some(SelectedItem::Node(id)) {
            self.select(None);
        }
        self.emit(EditorEvent::ItemRemoved {
            item: SelectedItem::Node(id),
        });
    }

    fn delete_connector(&mut self, id: ItemId, now: u64) {
        let Some((index, connector)) = self.doc.remove_connector(id) else {
            return;
        };
        self.push_command(
            Command::new(Edit::RemoveConnector { index, connector }, "Delete connector"),
            now,
        );
        if self.selection == Some(SelectedItem::Connector(id)) {
            self.select(None);
        }
        self.emit(EditorEvent::ItemRemoved {
            item: SelectedItem::Connector(id),
        });
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn emit(&mut self, event: EditorEvent) {
        self.events.emit(&event);
    }

    fn push_command(&mut self, command: Command, now: u64) {
        self.history.push(command);
        self.dirty = true;
        self.persist.poke(now);
        self.emit(EditorEvent::HistoryChanged {
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        });
    }

    fn select(&mut self, selection: Option<SelectedItem>) {
        if self.selection == selection {
            return;
        }
        self.doc.clear_selection();
        match selection {
            Some(SelectedItem::Node(id)) => {
                if let Some(node) = self.doc.node_mut(id) {
                    node.selected = true;
                }
            }
            Some(SelectedItem::Connector(id)) => {
                if let Some(connector) = self.doc.connector_mut(id) {
                    connector.selected = true;
                }
            }
            None => {}
        }
        self.selection = selection;
        self.emit(EditorEvent::SelectionChanged { selected: selection });
    }

    fn patch_node(&mut self, id: ItemId, desc: &str, now: u64, f: impl FnOnce(&mut Node)) {
        let Some(before) = self.doc.node(id).cloned() else {
            return;
        };
        if let Some(node) = self.doc.node_mut(id) {
            f(node);
        }
        let after = self.doc.node(id).cloned().expect("node still present");
        if before == after {
            return;
        }
        self.push_command(
            Command::new(
                Edit::PatchNode {
                    id,
                    before: Box::new(before),
                    after: Box::new(after),
                },
                desc,
            ),
            now,
        );
    }

    fn patch_connector(
        &mut self,
        id: ItemId,
        desc: &str,
        now: u64,
        f: impl FnOnce(&mut Connector),
    ) {
        let Some(before) = self.doc.connector(id).cloned() else {
            return;
        };
        if let Some(connector) = self.doc.connector_mut(id) {
            f(connector);
        }
        let after = self.doc.connector(id).cloned().expect("connector still present");
        if before == after {
            return;
        }
        self.push_command(
            Command::new(
                Edit::PatchConnector {
                    id,
                    before: Box::new(before),
                    after: Box::new(after),
                },
                desc,
            ),
            now,
        );
    }

    /// Create and commit a node for a single-click placement.
    fn place(&mut self, spec: &PlacementSpec, at: Point, now: u64) -> bool {
        let Some(node) = self.instantiate(spec, at) else {
            self.mode = Mode::Idle;
            self.emit(EditorEvent::PlacementCancelled);
            return false;
        };
        self.mode = Mode::Idle;
        self.commit_new_node(node, now);
        true
    }

    fn commit_new_node(&mut self, node: Node, now: u64) {
        let id = node.id;
        self.doc.add_node(node.clone());
        self.push_command(Command::new(Edit::AddNode { node }, "Add item"), now);
        let item = SelectedItem::Node(id);
        self.emit(EditorEvent::ItemAdded { item });
        self.select(Some(item));
    }

    /// Build a node from a placement spec. `at` is the cursor point; the
    /// node lands with its kind anchor under the cursor. Returns `None`
    /// when an image placement can't produce an image reference.
    fn instantiate(&mut self, spec: &PlacementSpec, at: Point) -> Option<Node> {
        let subtype = spec.subtype.clone();
        let (kind, entity_ref, id_prefix) = match spec.kind {
            PlaceKind::Character => {
                // Dropped character rows carry the entity id; resolve the
                // display name right away.
                let name = subtype
                    .as_deref()
                    .and_then(|r| self.registry.resolve_ref(r))
                    .map(|e| e.name)
                    .unwrap_or_default();
                (NodeKind::Character { name }, subtype, "character")
            }
            PlaceKind::Event => (
                NodeKind::Event {
                    text: String::new(),
                    width: EVENT_SIZE.0,
                    height: EVENT_SIZE.1,
                },
                subtype,
                "event",
            ),
            PlaceKind::Note => (
                NodeKind::Note {
                    text: String::new(),
                    width: NOTE_SIZE.0,
                    height: NOTE_SIZE.1,
                },
                None,
                "note",
            ),
            PlaceKind::Icon => (
                NodeKind::Icon {
                    icon: subtype.unwrap_or_else(|| "star".into()),
                    size: ICON_SIZE,
                },
                None,
                "icon",
            ),
            PlaceKind::Image => {
                let image_ref = match subtype {
                    Some(r) => r,
                    None => self.images.upload_image()?,
                };
                let (width, height) = self
                    .images
                    .load_image(&image_ref)
                    .map(|i| (i.width as f32, i.height as f32))
                    .unwrap_or((200.0, 150.0));
                (
                    NodeKind::Image {
                        image_ref,
                        width,
                        height,
                    },
                    None,
                    "image",
                )
            }
            PlaceKind::MapMarker => (
                NodeKind::MapMarker {
                    icon: subtype.unwrap_or_else(|| "flag".into()),
                    color: MARKER_COLOR,
                    size: MARKER_SIZE,
                },
                None,
                "marker",
            ),
            PlaceKind::AreaSquare => (
                NodeKind::AreaSquare {
                    width: 0.0,
                    height: 0.0,
                    color: AREA_COLOR,
                },
                None,
                "area",
            ),
            PlaceKind::AreaCircle => (
                NodeKind::AreaCircle {
                    radius: 0.0,
                    color: AREA_COLOR,
                },
                None,
                "area",
            ),
            PlaceKind::AreaPath => (
                NodeKind::AreaPath {
                    points: Vec::new(),
                    color: AREA_COLOR,
                },
                None,
                "area",
            ),
        };

        let anchor = kind.anchor();
        let mut node = Node::new(
            ItemId::with_prefix(id_prefix),
            kind,
            at.x - anchor.x,
            at.y - anchor.y,
        );
        node.entity_ref = entity_ref;
        Some(node)
    }

    /// Turn a finished area gesture into a node, or `None` for degenerate
    /// gestures (a stray click with an area tool armed).
    fn finish_area(
        &mut self,
        spec: &PlacementSpec,
        anchor: Point,
        corner: Point,
        lock_aspect: bool,
        points: Vec<Point>,
    ) -> Option<Node> {
        let id = ItemId::with_prefix("area");
        match spec.kind {
            PlaceKind::AreaPath => {
                if points.len() < 3 {
                    return None;
                }
                Some(Node::new(
                    id,
                    NodeKind::AreaPath {
                        points,
                        color: AREA_COLOR,
                    },
                    anchor.x,
                    anchor.y,
                ))
            }
            PlaceKind::AreaCircle => {
                let rect = area_rect(anchor, corner, lock_aspect);
                if rect.width.max(rect.height) < self.config.min_area_size {
                    return None;
                }
                Some(Node::new(
                    id,
                    NodeKind::AreaCircle {
                        radius: rect.width.max(rect.height) / 2.0,
                        color: AREA_COLOR,
                    },
                    rect.x,
                    rect.y,
                ))
            }
            _ => {
                let rect = area_rect(anchor, corner, lock_aspect);
                if rect.width.max(rect.height) < self.config.min_area_size {
                    return None;
                }
                Some(Node::new(
                    id,
                    NodeKind::AreaSquare {
                        width: rect.width,
                        height: rect.height,
                        color: AREA_COLOR,
                    },
                    rect.x,
                    rect.y,
                ))
            }
        }
    }

    fn reorder_selected(&mut self, action: ShortcutAction, now: u64) {
        let Some(SelectedItem::Node(id)) = self.selection else {
            return;
        };
        let Some(from) = self.doc.z_index(id) else {
            return;
        };
        let changed = match action {
            ShortcutAction::BringForward => self.doc.bring_forward(id),
            ShortcutAction::SendBackward => self.doc.send_backward(id),
            ShortcutAction::BringToFront => self.doc.bring_to_front(id),
            ShortcutAction::SendToBack => self.doc.send_to_back(id),
            _ => false,
        };
        if changed {
            let to = self.doc.z_index(id).expect("node still present");
            self.push_command(
                Command::new(Edit::ReorderNode { id, from, to }, "Reorder"),
                now,
            );
        }
    }

    fn track_hover(&mut self, p: Point, now: u64) {
        let over = hit::hit_test_node(&self.doc, p);
        if over == self.hovered {
            return;
        }
        // Leaving cancels any pending hover side effect.
        self.hover_delay.cancel();
        self.hovered = over;
        if let Some(id) = over
            && self
                .doc
                .node(id)
                .is_some_and(|n| n.entity_ref.is_some())
        {
            self.hover_delay.arm(now);
        }
    }

    /// The delayed hover check: resolve the hovered node's entity. A stale
    /// reference is cleared once and the node de-emphasized; resolution
    /// success surfaces as a `HoverInfo` event for the host's popup.
    fn resolve_hover(&mut self, now: u64) {
        let Some(id) = self.hovered else {
            return;
        };
        let Some(entity_ref) = self.doc.node(id).and_then(|n| n.entity_ref.clone()) else {
            return;
        };
        match self.registry.resolve_ref(&entity_ref) {
            Some(entity) => self.emit(EditorEvent::HoverInfo { id, entity }),
            None => {
                log::warn!("clearing stale entity ref {entity_ref:?} on {id}");
                if let Some(node) = self.doc.node_mut(id) {
                    node.entity_ref = None;
                    node.ref_broken = true;
                }
                // Recovery, not a user edit: persisted, but not undoable.
                self.dirty = true;
                self.persist.poke(now);
            }
        }
    }

    /// Write the document out if dirty. Failures keep the in-memory edits
    /// and re-arm the debounce so the next cycle retries.
    fn flush(&mut self, now: u64) {
        if !self.dirty {
            return;
        }
        match self.gateway.save_diagram(&self.doc_id, &self.doc) {
            Ok(()) => {
                self.dirty = false;
                log::debug!("persisted diagram {}", self.doc_id);
            }
            Err(e) => {
                log::warn!("persist failed for {}: {e}", self.doc_id);
                self.persist.poke(now);
                self.emit(EditorEvent::PersistenceFailed {
                    message: e.to_string(),
                });
            }
        }
    }

    /// Force an immediate save (host shutdown). Bypasses the debounce.
    pub fn flush_now(&mut self, now: u64) {
        self.persist.cancel();
        self.flush(now);
    }
}

fn area_rect(anchor: Point, corner: Point, lock_aspect: bool) -> Rect {
    let rect = Rect::from_corners(anchor, corner);
    if !lock_aspect {
        return rect;
    }
    // Keep the anchor corner fixed and square off toward the drag.
    let side = rect.width.max(rect.height);
    let x = if corner.x < anchor.x {
        anchor.x - side
    } else {
        anchor.x
    };
    let y = if corner.y < anchor.y {
        anchor.y - side
    } else {
        anchor.y
    };
    Rect::new(x, y, side, side)
}
