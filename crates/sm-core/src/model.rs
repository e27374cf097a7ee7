//! The persisted diagram document model.
//!
//! A `Diagram` is a flat, ordered collection of `Node`s plus the
//! `Connector`s between them and a little document-level metadata
//! (background image reference, cached dominant color). Vector order IS
//! z-order: the first node paints at the back, the last on top.
//!
//! The document is the single durable source of truth — interactive state
//! (selection, hover, broken-reference flags) is transient and never
//! serialized. The JSON form round-trips exactly for everything else.

use crate::geometry::{Point, Rect, path_bounds};
use crate::id::ItemId;
use crate::relations::RelationKind;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

// ─── Colors ──────────────────────────────────────────────────────────────

/// RGBA color. Stored as 4 × u8 — the hex wire form's native precision,
/// so serializing through `to_hex`/`from_hex` is lossless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Helper to parse a single hex digit.
fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl Color {
    pub const fn rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb8(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse a hex color string: `#RGB`, `#RRGGBB`, `#RRGGBBAA`.
    /// The leading `#` is optional.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        let bytes = hex.as_bytes();

        match bytes.len() {
            3 => {
                let r = hex_val(bytes[0])?;
                let g = hex_val(bytes[1])?;
                let b = hex_val(bytes[2])?;
                Some(Self::rgb8(r * 17, g * 17, b * 17))
            }
            6 => {
                let r = hex_val(bytes[0])? << 4 | hex_val(bytes[1])?;
                let g = hex_val(bytes[2])? << 4 | hex_val(bytes[3])?;
                let b = hex_val(bytes[4])? << 4 | hex_val(bytes[5])?;
                Some(Self::rgb8(r, g, b))
            }
            8 => {
                let r = hex_val(bytes[0])? << 4 | hex_val(bytes[1])?;
                let g = hex_val(bytes[2])? << 4 | hex_val(bytes[3])?;
                let b = hex_val(bytes[4])? << 4 | hex_val(bytes[5])?;
                let a = hex_val(bytes[6])? << 4 | hex_val(bytes[7])?;
                Some(Self::rgba8(r, g, b, a))
            }
            _ => None,
        }
    }

    /// Emit as `#RRGGBB`, or `#RRGGBBAA` when not fully opaque.
    pub fn to_hex(&self) -> String {
        let Self { r, g, b, a } = *self;
        if a == 255 {
            format!("#{r:02X}{g:02X}{b:02X}")
        } else {
            format!("#{r:02X}{g:02X}{b:02X}{a:02X}")
        }
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid hex color {s:?}")))
    }
}

// ─── Node kinds ──────────────────────────────────────────────────────────

/// Default character marker diameter.
pub const CHARACTER_SIZE: f32 = 48.0;
/// Default event box dimensions.
pub const EVENT_SIZE: (f32, f32) = (140.0, 60.0);
/// Default note dimensions.
pub const NOTE_SIZE: (f32, f32) = (160.0, 120.0);
/// Default icon edge length.
pub const ICON_SIZE: f32 = 32.0;
/// Default map marker width (the glyph is 1.5× as tall).
pub const MARKER_SIZE: f32 = 32.0;

/// The node kinds a canvas can carry. Closed set — rendering, hit-testing
/// and mutators dispatch on this tag exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NodeKind {
    /// A character marker on a relationship map.
    Character { name: String },

    /// A plot/event box on a mind-map.
    Event { text: String, width: f32, height: f32 },

    /// A free-floating sticky note.
    Note { text: String, width: f32, height: f32 },

    /// A decorative icon from the application's icon catalog.
    Icon { icon: String, size: f32 },

    /// An externally-stored image placed on the canvas.
    Image {
        image_ref: String,
        width: f32,
        height: f32,
    },

    /// A pin marker on a world map.
    MapMarker {
        icon: String,
        color: Color,
        size: f32,
    },

    /// A rectangular highlighted region on a world map.
    AreaSquare {
        width: f32,
        height: f32,
        color: Color,
    },

    /// A circular highlighted region.
    AreaCircle { radius: f32, color: Color },

    /// A freeform drawn region. Points are relative to the node position.
    AreaPath { points: Vec<Point>, color: Color },
}

impl NodeKind {
    /// Short tag used for generated ids and drop payloads.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Character { .. } => "character",
            NodeKind::Event { .. } => "event",
            NodeKind::Note { .. } => "note",
            NodeKind::Icon { .. } => "icon",
            NodeKind::Image { .. } => "image",
            NodeKind::MapMarker { .. } => "mapMarker",
            NodeKind::AreaSquare { .. } => "areaSquare",
            NodeKind::AreaCircle { .. } => "areaCircle",
            NodeKind::AreaPath { .. } => "areaPath",
        }
    }

    /// Offset from the node's top-left bounds corner to its logical anchor
    /// (the point that lands under the cursor on placement). A map marker
    /// hangs from its tip; box-like kinds center under the cursor.
    pub fn anchor(&self) -> Point {
        match self {
            NodeKind::Character { .. } => Point::new(CHARACTER_SIZE / 2.0, CHARACTER_SIZE / 2.0),
            NodeKind::Event { width, height, .. } | NodeKind::Note { width, height, .. } => {
                Point::new(width / 2.0, height / 2.0)
            }
            NodeKind::Icon { size, .. } => Point::new(size / 2.0, size / 2.0),
            NodeKind::Image { width, height, .. } => Point::new(width / 2.0, height / 2.0),
            NodeKind::MapMarker { size, .. } => Point::new(size / 2.0, size * 1.5),
            NodeKind::AreaSquare { .. }
            | NodeKind::AreaCircle { .. }
            | NodeKind::AreaPath { .. } => Point::ZERO,
        }
    }
}

// ─── Nodes ───────────────────────────────────────────────────────────────

/// A persisted graphical entity on the canvas.
///
/// `x`/`y` is the top-left corner of the node's bounds. `entity_ref` is a
/// weak link into the external domain registry (a character, a location);
/// the node never owns that data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: ItemId,

    #[serde(flatten)]
    pub kind: NodeKind,

    pub x: f32,
    pub y: f32,

    #[serde(rename = "entityRef", skip_serializing_if = "Option::is_none", default)]
    pub entity_ref: Option<String>,

    /// Transient selection flag — never persisted.
    #[serde(skip)]
    pub selected: bool,

    /// Transient marker set when a stale `entity_ref` was cleared, so the
    /// renderer de-emphasizes the item until the next reload.
    #[serde(skip)]
    pub ref_broken: bool,
}

impl Node {
    pub fn new(id: ItemId, kind: NodeKind, x: f32, y: f32) -> Self {
        Self {
            id,
            kind,
            x,
            y,
            entity_ref: None,
            selected: false,
            ref_broken: false,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn set_position(&mut self, p: Point) {
        self.x = p.x;
        self.y = p.y;
    }

    /// The node's bounding box in canvas coordinates.
    pub fn bounds(&self) -> Rect {
        match &self.kind {
            NodeKind::Character { .. } => Rect::new(self.x, self.y, CHARACTER_SIZE, CHARACTER_SIZE),
            NodeKind::Event { width, height, .. } | NodeKind::Note { width, height, .. } => {
                Rect::new(self.x, self.y, *width, *height)
            }
            NodeKind::Icon { size, .. } => Rect::new(self.x, self.y, *size, *size),
            NodeKind::Image { width, height, .. } => Rect::new(self.x, self.y, *width, *height),
            NodeKind::MapMarker { size, .. } => Rect::new(self.x, self.y, *size, size * 1.5),
            NodeKind::AreaSquare { width, height, .. } => {
                Rect::new(self.x, self.y, *width, *height)
            }
            NodeKind::AreaCircle { radius, .. } => {
                Rect::new(self.x, self.y, radius * 2.0, radius * 2.0)
            }
            NodeKind::AreaPath { points, .. } => {
                let b = path_bounds(points);
                Rect::new(self.x + b.x, self.y + b.y, b.width, b.height)
            }
        }
    }

    // ── Mutators ─────────────────────────────────────────────────────────
    //
    // The only sanctioned way to touch persisted fields. Kind mismatches
    // are ignored (a color pick on a note has nothing to color).

    pub fn set_color(&mut self, color: Color) {
        match &mut self.kind {
            NodeKind::MapMarker { color: c, .. }
            | NodeKind::AreaSquare { color: c, .. }
            | NodeKind::AreaCircle { color: c, .. }
            | NodeKind::AreaPath { color: c, .. } => *c = color,
            _ => log::debug!("set_color ignored for {} node {}", self.kind.tag(), self.id),
        }
    }

    pub fn set_icon(&mut self, icon: &str) {
        match &mut self.kind {
            NodeKind::Icon { icon: i, .. } | NodeKind::MapMarker { icon: i, .. } => {
                *i = icon.to_string()
            }
            _ => log::debug!("set_icon ignored for {} node {}", self.kind.tag(), self.id),
        }
    }

    pub fn set_size(&mut self, width: f32, height: f32) {
        match &mut self.kind {
            NodeKind::Event { width: w, height: h, .. }
            | NodeKind::Note { width: w, height: h, .. }
            | NodeKind::Image { width: w, height: h, .. }
            | NodeKind::AreaSquare { width: w, height: h, .. } => {
                *w = width;
                *h = height;
            }
            NodeKind::Icon { size, .. } | NodeKind::MapMarker { size, .. } => {
                *size = width.max(height)
            }
            NodeKind::AreaCircle { radius, .. } => *radius = width.max(height) / 2.0,
            _ => log::debug!("set_size ignored for {} node {}", self.kind.tag(), self.id),
        }
    }

    pub fn set_text(&mut self, text: &str) {
        match &mut self.kind {
            NodeKind::Character { name } => *name = text.to_string(),
            NodeKind::Event { text: t, .. } | NodeKind::Note { text: t, .. } => {
                *t = text.to_string()
            }
            _ => log::debug!("set_text ignored for {} node {}", self.kind.tag(), self.id),
        }
    }

    pub fn set_entity_ref(&mut self, entity_ref: Option<String>) {
        self.entity_ref = entity_ref;
        self.ref_broken = false;
    }

    /// A node is trivial when deleting it loses nothing the user typed or
    /// linked — used to decide whether deletion needs confirmation.
    pub fn is_trivial(&self) -> bool {
        if self.entity_ref.is_some() {
            return false;
        }
        match &self.kind {
            NodeKind::Character { name } => name.is_empty(),
            NodeKind::Event { text, .. } | NodeKind::Note { text, .. } => text.is_empty(),
            _ => true,
        }
    }
}

// ─── Connectors ──────────────────────────────────────────────────────────

/// A typed edge between two nodes. Untyped connectors (`relation: None`)
/// render in a muted placeholder state until the user assigns a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    pub id: ItemId,

    #[serde(rename = "sourceId")]
    pub source: ItemId,

    #[serde(rename = "targetId")]
    pub target: ItemId,

    #[serde(rename = "kind", skip_serializing_if = "Option::is_none", default)]
    pub relation: Option<RelationKind>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub color: Option<Color>,

    /// Transient selection flag — never persisted.
    #[serde(skip)]
    pub selected: bool,
}

impl Connector {
    pub fn new(id: ItemId, source: ItemId, target: ItemId) -> Self {
        Self {
            id,
            source,
            target,
            relation: None,
            label: None,
            color: None,
            selected: false,
        }
    }

    pub fn touches(&self, node: ItemId) -> bool {
        self.source == node || self.target == node
    }

    /// The color the connector renders with: explicit override, then the
    /// relation's catalog color, then none (placeholder gray).
    pub fn effective_color(&self) -> Option<Color> {
        self.color.or_else(|| self.relation.map(|r| r.color()))
    }
}

// ─── Images ──────────────────────────────────────────────────────────────

/// Decoded RGBA8 pixels of an externally-loaded image. Produced by the
/// host's `ImageStore`; the engine only reads it (dominant color).
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    /// RGBA8, row-major, `width * height * 4` bytes.
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// Most frequent color bucket (4 bits per channel), averaged back to a
    /// full-precision color. Near-transparent pixels are ignored.
    pub fn dominant_color(&self) -> Option<Color> {
        let mut counts: std::collections::HashMap<(u8, u8, u8), (u64, u64, u64, u64)> =
            std::collections::HashMap::new();
        for px in self.pixels.chunks_exact(4) {
            if px[3] < 32 {
                continue;
            }
            let key = (px[0] >> 4, px[1] >> 4, px[2] >> 4);
            let e = counts.entry(key).or_default();
            e.0 += 1;
            e.1 += px[0] as u64;
            e.2 += px[1] as u64;
            e.3 += px[2] as u64;
        }
        let (_, (n, r, g, b)) = counts.into_iter().max_by_key(|(_, (n, ..))| *n)?;
        Some(Color::rgb8((r / n) as u8, (g / n) as u8, (b / n) as u8))
    }
}

// ─── The document ────────────────────────────────────────────────────────

/// The complete persisted diagram.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagram {
    #[serde(default)]
    pub nodes: Vec<Node>,

    #[serde(default)]
    pub connectors: Vec<Connector>,

    #[serde(
        rename = "backgroundRef",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub background_ref: Option<String>,

    /// Cached derived value; recomputed lazily after the background changes.
    #[serde(
        rename = "dominantColor",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub dominant_color: Option<Color>,
}

impl Diagram {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Lookup ───────────────────────────────────────────────────────────

    pub fn node(&self, id: ItemId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: ItemId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn connector(&self, id: ItemId) -> Option<&Connector> {
        self.connectors.iter().find(|c| c.id == id)
    }

    pub fn connector_mut(&mut self, id: ItemId) -> Option<&mut Connector> {
        self.connectors.iter_mut().find(|c| c.id == id)
    }

    /// All connectors touching a node.
    pub fn connectors_of(&self, node: ItemId) -> impl Iterator<Item = &Connector> {
        self.connectors.iter().filter(move |c| c.touches(node))
    }

    /// Position of a node in the paint order (0 = back).
    pub fn z_index(&self, id: ItemId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    // ── Structural edits ─────────────────────────────────────────────────

    pub fn add_node(&mut self, node: Node) {
        debug_assert!(
            self.node(node.id).is_none(),
            "duplicate node id {}",
            node.id
        );
        self.nodes.push(node);
    }

    /// Re-insert a node at a specific z position (undo of a removal).
    pub fn insert_node(&mut self, index: usize, node: Node) {
        let index = index.min(self.nodes.len());
        self.nodes.insert(index, node);
    }

    /// Remove a node together with every connector touching it.
    /// Returns the old z position, the node, and the removed connectors
    /// so the whole removal stays reversible as one unit.
    pub fn remove_node(&mut self, id: ItemId) -> Option<(usize, Node, SmallVec<[Connector; 4]>)> {
        let index = self.z_index(id)?;
        let node = self.nodes.remove(index);
        let mut removed = SmallVec::new();
        self.connectors.retain(|c| {
            if c.touches(id) {
                removed.push(c.clone());
                false
            } else {
                true
            }
        });
        Some((index, node, removed))
    }

    /// Add a connector; refused (with a log) when an endpoint is missing
    /// or the connector would loop a node onto itself.
    pub fn add_connector(&mut self, connector: Connector) -> bool {
        if connector.source == connector.target {
            log::debug!("refusing self-connector on {}", connector.source);
            return false;
        }
        if self.node(connector.source).is_none() || self.node(connector.target).is_none() {
            log::warn!(
                "refusing connector {} with dangling endpoint",
                connector.id
            );
            return false;
        }
        self.connectors.push(connector);
        true
    }

    pub fn insert_connector(&mut self, index: usize, connector: Connector) {
        let index = index.min(self.connectors.len());
        self.connectors.insert(index, connector);
    }

    pub fn remove_connector(&mut self, id: ItemId) -> Option<(usize, Connector)> {
        let index = self.connectors.iter().position(|c| c.id == id)?;
        Some((index, self.connectors.remove(index)))
    }

    // ── Z-order ──────────────────────────────────────────────────────────

    /// Swap a node with its next-higher neighbor. Returns true on change.
    pub fn bring_forward(&mut self, id: ItemId) -> bool {
        match self.z_index(id) {
            Some(pos) if pos + 1 < self.nodes.len() => {
                self.nodes.swap(pos, pos + 1);
                true
            }
            _ => false,
        }
    }

    /// Swap a node with its next-lower neighbor. Returns true on change.
    pub fn send_backward(&mut self, id: ItemId) -> bool {
        match self.z_index(id) {
            Some(pos) if pos > 0 => {
                self.nodes.swap(pos, pos - 1);
                true
            }
            _ => false,
        }
    }

    pub fn bring_to_front(&mut self, id: ItemId) -> bool {
        match self.z_index(id) {
            Some(pos) if pos + 1 < self.nodes.len() => {
                let node = self.nodes.remove(pos);
                self.nodes.push(node);
                true
            }
            _ => false,
        }
    }

    pub fn send_to_back(&mut self, id: ItemId) -> bool {
        match self.z_index(id) {
            Some(pos) if pos > 0 => {
                let node = self.nodes.remove(pos);
                self.nodes.insert(0, node);
                true
            }
            _ => false,
        }
    }

    // ── Background ───────────────────────────────────────────────────────

    /// Swap the background reference. Invalidates the cached dominant color.
    pub fn set_background(&mut self, background_ref: Option<String>) {
        if self.background_ref != background_ref {
            self.background_ref = background_ref;
            self.dominant_color = None;
        }
    }

    /// Recompute the cached dominant color from decoded background pixels.
    pub fn refresh_dominant_color(&mut self, image: &ImageData) {
        self.dominant_color = image.dominant_color();
    }

    // ── Selection (transient) ────────────────────────────────────────────

    pub fn clear_selection(&mut self) {
        for n in &mut self.nodes {
            n.selected = false;
        }
        for c in &mut self.connectors {
            c.selected = false;
        }
    }

    // ── Load-time repair ─────────────────────────────────────────────────

    /// Best-effort sanitation for documents coming off disk: drop nodes
    /// with duplicate ids and connectors with dangling endpoints or
    /// self-loops. Returns how many items were dropped.
    pub fn sanitize(&mut self) -> usize {
        let mut dropped = 0;

        let mut seen = std::collections::HashSet::new();
        self.nodes.retain(|n| {
            if seen.insert(n.id) {
                true
            } else {
                log::warn!("dropping node with duplicate id {}", n.id);
                dropped += 1;
                false
            }
        });

        self.connectors.retain(|c| {
            let ok = c.source != c.target
                && seen.contains(&c.source)
                && seen.contains(&c.target);
            if !ok {
                log::warn!("dropping connector {} with dangling endpoint", c.id);
                dropped += 1;
            }
            ok
        });

        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn marker(id: &str, x: f32, y: f32) -> Node {
        Node::new(
            ItemId::intern(id),
            NodeKind::MapMarker {
                icon: "castle".into(),
                color: Color::from_hex("#C0392B").unwrap(),
                size: MARKER_SIZE,
            },
            x,
            y,
        )
    }

    #[test]
    fn color_hex_roundtrip() {
        let c = Color::from_hex("#6C5CE7").unwrap();
        assert_eq!(c.to_hex(), "#6C5CE7");

        let c2 = Color::from_hex("#FF000080").unwrap();
        assert_eq!(c2.a, 0x80);
        assert_eq!(c2.to_hex().len(), 9); // #RRGGBBAA

        assert_eq!(Color::from_hex("F00").unwrap().to_hex(), "#FF0000");
        assert!(Color::from_hex("#12345").is_none());

        // u8 channels make the hex wire form exact for every color
        let c3 = Color::rgba8(191, 56, 43, 255);
        assert_eq!(Color::from_hex(&c3.to_hex()), Some(c3));
        let c4 = Color::rgba8(77, 140, 89, 90);
        assert_eq!(Color::from_hex(&c4.to_hex()), Some(c4));
    }

    #[test]
    fn document_json_roundtrip() {
        let mut doc = Diagram::new();
        let mut hero = Node::new(
            ItemId::intern("hero"),
            NodeKind::Character {
                name: "Alba".into(),
            },
            10.0,
            20.0,
        );
        hero.entity_ref = Some("char-42".into());
        hero.selected = true; // transient — must not survive
        doc.add_node(hero);
        doc.add_node(marker("keep", 120.0, 80.0));
        doc.add_node(Node::new(
            ItemId::intern("region"),
            NodeKind::AreaPath {
                points: vec![
                    Point::new(0.0, 0.0),
                    Point::new(40.0, 8.0),
                    Point::new(24.0, 36.0),
                ],
                color: Color::rgb8(51, 128, 77),
            },
            300.0,
            200.0,
        ));
        let mut c = Connector::new(
            ItemId::intern("bond"),
            ItemId::intern("hero"),
            ItemId::intern("keep"),
        );
        c.relation = Some(RelationKind::Friend);
        c.label = Some("old allies".into());
        doc.connectors.push(c);
        doc.background_ref = Some("img-7".into());
        doc.dominant_color = Some(Color::rgb8(26, 51, 77));

        let json = serde_json::to_string_pretty(&doc).unwrap();
        let back: Diagram = serde_json::from_str(&json).unwrap();

        let mut expected = doc.clone();
        expected.nodes[0].selected = false;
        assert_eq!(back, expected);

        // Transient fields never appear in the wire form
        assert!(!json.contains("selected"));
        assert!(!json.contains("ref_broken"));
        // Flat node schema with a kind tag
        assert!(json.contains("\"kind\": \"mapMarker\""));
        assert!(json.contains("\"entityRef\": \"char-42\""));
        assert!(json.contains("\"sourceId\": \"hero\""));
    }

    #[test]
    fn removing_node_removes_connectors() {
        let mut doc = Diagram::new();
        doc.add_node(marker("a", 0.0, 0.0));
        doc.add_node(marker("b", 50.0, 0.0));
        doc.add_node(marker("c", 100.0, 0.0));
        assert!(doc.add_connector(Connector::new(
            ItemId::intern("ab"),
            ItemId::intern("a"),
            ItemId::intern("b"),
        )));
        assert!(doc.add_connector(Connector::new(
            ItemId::intern("bc"),
            ItemId::intern("b"),
            ItemId::intern("c"),
        )));

        let (index, node, removed) = doc.remove_node(ItemId::intern("b")).unwrap();
        assert_eq!(index, 1);
        assert_eq!(node.id, ItemId::intern("b"));
        assert_eq!(removed.len(), 2);
        assert!(doc.connectors.is_empty());

        // Reversal restores the original shape
        doc.insert_node(index, node);
        for c in removed {
            assert!(doc.add_connector(c));
        }
        assert_eq!(doc.nodes.len(), 3);
        assert_eq!(doc.nodes[1].id, ItemId::intern("b"));
        assert_eq!(doc.connectors.len(), 2);
    }

    #[test]
    fn connector_endpoints_validated() {
        let mut doc = Diagram::new();
        doc.add_node(marker("a", 0.0, 0.0));
        assert!(!doc.add_connector(Connector::new(
            ItemId::intern("dangling"),
            ItemId::intern("a"),
            ItemId::intern("ghost"),
        )));
        assert!(!doc.add_connector(Connector::new(
            ItemId::intern("loop"),
            ItemId::intern("a"),
            ItemId::intern("a"),
        )));
        assert!(doc.connectors.is_empty());
    }

    #[test]
    fn sanitize_drops_dangling_and_duplicates() {
        let json = r#"{
            "nodes": [
                {"id": "a", "kind": "note", "text": "hi", "width": 100, "height": 80, "x": 0, "y": 0},
                {"id": "a", "kind": "note", "text": "dup", "width": 100, "height": 80, "x": 10, "y": 10},
                {"id": "b", "kind": "icon", "icon": "star", "size": 32, "x": 50, "y": 50}
            ],
            "connectors": [
                {"id": "ok", "sourceId": "a", "targetId": "b"},
                {"id": "gone", "sourceId": "a", "targetId": "missing"},
                {"id": "self", "sourceId": "b", "targetId": "b"}
            ]
        }"#;
        let mut doc: Diagram = serde_json::from_str(json).unwrap();
        let dropped = doc.sanitize();
        assert_eq!(dropped, 3);
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.connectors.len(), 1);
        assert_eq!(doc.connectors[0].id, ItemId::intern("ok"));
    }

    #[test]
    fn z_order_ops() {
        let mut doc = Diagram::new();
        doc.add_node(marker("a", 0.0, 0.0));
        doc.add_node(marker("b", 0.0, 0.0));
        doc.add_node(marker("c", 0.0, 0.0));

        assert!(doc.bring_forward(ItemId::intern("a")));
        assert_eq!(doc.z_index(ItemId::intern("a")), Some(1));

        assert!(doc.bring_to_front(ItemId::intern("a")));
        assert_eq!(doc.z_index(ItemId::intern("a")), Some(2));
        assert!(!doc.bring_to_front(ItemId::intern("a")));

        assert!(doc.send_to_back(ItemId::intern("a")));
        assert_eq!(doc.z_index(ItemId::intern("a")), Some(0));
        assert!(!doc.send_backward(ItemId::intern("a")));
    }

    #[test]
    fn anchor_and_bounds() {
        let m = marker("m", 100.0, 60.0);
        let b = m.bounds();
        assert_eq!(b, Rect::new(100.0, 60.0, MARKER_SIZE, MARKER_SIZE * 1.5));
        // Tip of the pin is the anchor
        let a = m.kind.anchor();
        assert_eq!(a, Point::new(MARKER_SIZE / 2.0, MARKER_SIZE * 1.5));

        let path = Node::new(
            ItemId::intern("p"),
            NodeKind::AreaPath {
                points: vec![Point::new(-10.0, 0.0), Point::new(10.0, 0.0), Point::new(0.0, 20.0)],
                color: Color::rgb8(0, 0, 0),
            },
            200.0,
            100.0,
        );
        assert_eq!(path.bounds(), Rect::new(190.0, 100.0, 20.0, 20.0));
    }

    #[test]
    fn background_change_invalidates_dominant_color() {
        let mut doc = Diagram::new();
        doc.dominant_color = Some(Color::rgb8(255, 0, 0));
        doc.set_background(Some("img-1".into()));
        assert_eq!(doc.dominant_color, None);

        // Re-setting the same ref keeps the cache
        doc.dominant_color = Some(Color::rgb8(0, 255, 0));
        doc.set_background(Some("img-1".into()));
        assert!(doc.dominant_color.is_some());
    }

    #[test]
    fn dominant_color_prefers_majority_bucket() {
        // 3 red pixels, 1 blue, 1 fully transparent green
        let mut pixels = Vec::new();
        for _ in 0..3 {
            pixels.extend_from_slice(&[200, 10, 10, 255]);
        }
        pixels.extend_from_slice(&[10, 10, 200, 255]);
        pixels.extend_from_slice(&[10, 200, 10, 0]);
        let img = ImageData {
            width: 5,
            height: 1,
            pixels,
        };
        let c = img.dominant_color().unwrap();
        assert!(c.r > c.b && c.r > c.g);
    }

    #[test]
    fn trivial_nodes() {
        assert!(marker("m", 0.0, 0.0).is_trivial());

        let mut note = Node::new(
            ItemId::intern("n"),
            NodeKind::Note {
                text: String::new(),
                width: NOTE_SIZE.0,
                height: NOTE_SIZE.1,
            },
            0.0,
            0.0,
        );
        assert!(note.is_trivial());
        note.set_text("don't lose me");
        assert!(!note.is_trivial());

        let mut m = marker("m2", 0.0, 0.0);
        m.set_entity_ref(Some("loc-1".into()));
        assert!(!m.is_trivial());
    }
}
