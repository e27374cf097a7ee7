//! Diagram → Vello drawing commands.
//!
//! Walks the document in z-order and emits Vello paint operations.
//! Connectors paint first (under every node), then nodes back-to-front.
//! Selection halos, hover highlights, and broken-reference de-emphasis are
//! pure rendering — nothing here writes the document.

use crate::hit::handle_anchor;
use kurbo::{Affine, BezPath, Cap, Circle, Join, Line, Point as KPoint, Rect as KRect, Stroke};
use peniko::{Color as PColor, Fill};
use sm_core::geometry::Rect;
use sm_core::model::{Color, Connector, Diagram, Node, NodeKind};
use sm_core::ItemId;
use vello::Scene;

/// Transient view state the renderer needs beyond the document.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewState {
    pub hovered: Option<ItemId>,
    /// Show the connector handle on this node (the selected one).
    pub handle_on: Option<ItemId>,
    pub handle_radius: f32,
}

/// Selection halo color.
const ACCENT: Color = Color::rgb8(51, 140, 242);
/// Placeholder gray for untyped connectors.
const PLACEHOLDER: Color = Color::rgb8(158, 158, 166);
/// Opacity multiplier for nodes whose entity reference went stale.
const BROKEN_REF_OPACITY: f32 = 0.4;

/// Paint the canvas backdrop. Hosts that display the actual background
/// bitmap skip this; it fills the viewport with the cached dominant color
/// so empty documents still read as "the map".
pub fn paint_background(scene: &mut Scene, diagram: &Diagram, viewport: Rect) {
    let color = diagram.dominant_color.unwrap_or(Color::rgb8(247, 245, 240));
    scene.fill(
        Fill::NonZero,
        Affine::IDENTITY,
        to_peniko(color, 1.0),
        None,
        &to_kurbo(viewport),
    );
}

/// Paint the whole document into a freshly-cleared scene.
pub fn paint_scene(scene: &mut Scene, diagram: &Diagram, view: &ViewState) {
    for connector in &diagram.connectors {
        paint_connector(scene, diagram, connector);
    }
    for node in &diagram.nodes {
        paint_node(scene, node, view);
    }
    if let Some(id) = view.handle_on
        && let Some(node) = diagram.node(id)
    {
        paint_handle(scene, node, view.handle_radius);
    }
}

// ─── Nodes ───────────────────────────────────────────────────────────────

fn paint_node(scene: &mut Scene, node: &Node, view: &ViewState) {
    let b = node.bounds();
    let alpha = if node.ref_broken { BROKEN_REF_OPACITY } else { 1.0 };
    let hovered = view.hovered == Some(node.id);

    match &node.kind {
        NodeKind::Character { name } => {
            let disc = Circle::new(kcenter(&b), (b.width / 2.0) as f64);
            fill(scene, &disc, Color::rgb8(237, 224, 204), alpha);
            stroke(scene, &disc, Color::rgb8(115, 97, 77), 2.0, alpha);
            log::trace!("character {:?} label at ({}, {})", name, b.x, b.y + b.height);
            // Name label shaping needs the host's font context.
        }
        NodeKind::Event { text, .. } => {
            let shape = to_kurbo(b).to_rounded_rect(6.0);
            fill(scene, &shape, Color::rgb8(250, 240, 214), alpha);
            stroke(scene, &shape, Color::rgb8(179, 153, 102), 1.5, alpha);
            log::trace!("event text {:?} at ({}, {})", text, b.x, b.y);
        }
        NodeKind::Note { text, .. } => {
            fill(scene, &to_kurbo(b), Color::rgb8(255, 247, 191), alpha);
            stroke(scene, &to_kurbo(b), Color::rgb8(204, 189, 115), 1.0, alpha);
            // Folded corner
            let fold = 12.0_f64;
            let right = (b.x + b.width) as f64;
            let mut path = BezPath::new();
            path.move_to((right - fold, b.y as f64));
            path.line_to((right, (b.y as f64) + fold));
            path.line_to((right - fold, (b.y as f64) + fold));
            path.close_path();
            fill(scene, &path, Color::rgb8(224, 212, 140), alpha);
            log::trace!("note text {:?} at ({}, {})", text, b.x, b.y);
        }
        NodeKind::Icon { icon, .. } => {
            let shape = to_kurbo(b).to_rounded_rect(4.0);
            fill(scene, &shape, Color::rgb8(235, 235, 240), alpha);
            stroke(scene, &shape, Color::rgb8(153, 153, 166), 1.0, alpha);
            log::trace!("icon glyph {:?} at ({}, {})", icon, b.x, b.y);
        }
        NodeKind::Image { image_ref, .. } => {
            // The bitmap itself is composited by the host; we draw the frame.
            fill(scene, &to_kurbo(b), Color::rgb8(217, 217, 222), alpha);
            stroke(scene, &to_kurbo(b), Color::rgb8(128, 128, 140), 1.0, alpha);
            log::trace!("image frame for {:?}", image_ref);
        }
        NodeKind::MapMarker { color, size, .. } => {
            paint_marker(scene, &b, *size, *color, alpha);
        }
        NodeKind::AreaSquare { color, .. } => {
            fill(scene, &to_kurbo(b), color.with_alpha(0.35), alpha);
            stroke(scene, &to_kurbo(b), *color, 2.0, alpha);
        }
        NodeKind::AreaCircle { radius, color } => {
            let disc = Circle::new(kcenter(&b), *radius as f64);
            fill(scene, &disc, color.with_alpha(0.35), alpha);
            stroke(scene, &disc, *color, 2.0, alpha);
        }
        NodeKind::AreaPath { points, color } => {
            if points.len() >= 3 {
                let mut path = BezPath::new();
                let ox = node.x as f64;
                let oy = node.y as f64;
                path.move_to((ox + points[0].x as f64, oy + points[0].y as f64));
                for p in &points[1..] {
                    path.line_to((ox + p.x as f64, oy + p.y as f64));
                }
                path.close_path();
                fill(scene, &path, color.with_alpha(0.35), alpha);
                stroke(scene, &path, *color, 2.0, alpha);
            }
        }
    }

    if node.selected {
        halo(scene, &b, ACCENT, alpha);
    } else if hovered {
        halo(scene, &b, ACCENT.with_alpha(0.4), alpha);
    }
}

fn paint_marker(scene: &mut Scene, b: &Rect, size: f32, color: Color, alpha: f32) {
    let head_r = (size / 2.0) as f64;
    let cx = (b.x + size / 2.0) as f64;
    let head_cy = b.y as f64 + head_r;
    let tip_y = (b.y + size * 1.5) as f64;

    // Tip wedge under the head
    let mut tip = BezPath::new();
    tip.move_to((cx - head_r * 0.55, head_cy + head_r * 0.6));
    tip.line_to((cx, tip_y));
    tip.line_to((cx + head_r * 0.55, head_cy + head_r * 0.6));
    tip.close_path();
    fill(scene, &tip, color, alpha);

    let head = Circle::new(KPoint::new(cx, head_cy), head_r);
    fill(scene, &head, color, alpha);
    stroke(scene, &head, Color::rgb8(255, 255, 255), 1.5, alpha);

    // Inner dot
    let dot = Circle::new(KPoint::new(cx, head_cy), head_r * 0.35);
    fill(scene, &dot, Color::rgb8(255, 255, 255), alpha);
}

fn paint_handle(scene: &mut Scene, node: &Node, radius: f32) {
    let anchor = handle_anchor(&node.bounds());
    let grip = Circle::new(
        KPoint::new(anchor.x as f64, anchor.y as f64),
        radius.max(4.0) as f64,
    );
    fill(scene, &grip, Color::rgb8(255, 255, 255), 1.0);
    stroke(scene, &grip, ACCENT, 1.5, 1.0);
}

// ─── Connectors ──────────────────────────────────────────────────────────

fn paint_connector(scene: &mut Scene, diagram: &Diagram, connector: &Connector) {
    let (Some(src), Some(dst)) = (diagram.node(connector.source), diagram.node(connector.target))
    else {
        return;
    };
    let a = src.bounds().center();
    let b = dst.bounds().center();
    let line = Line::new(
        KPoint::new(a.x as f64, a.y as f64),
        KPoint::new(b.x as f64, b.y as f64),
    );

    let width = if connector.selected { 3.0 } else { 2.0 };
    match connector.effective_color() {
        Some(color) => {
            let stroke_style = Stroke {
                width,
                join: Join::Round,
                start_cap: Cap::Round,
                end_cap: Cap::Round,
                ..Default::default()
            };
            scene.stroke(
                &stroke_style,
                Affine::IDENTITY,
                to_peniko(color, 1.0),
                None,
                &line,
            );
        }
        None => {
            // Untyped: muted dashed placeholder until a relation is assigned
            let stroke_style = Stroke::new(width).with_dashes(0.0, [6.0, 4.0]);
            scene.stroke(
                &stroke_style,
                Affine::IDENTITY,
                to_peniko(PLACEHOLDER, 1.0),
                None,
                &line,
            );
        }
    }

    if connector.relation.is_some() || connector.label.is_some() {
        let mid = KPoint::new((a.x + b.x) as f64 / 2.0, (a.y + b.y) as f64 / 2.0);
        let chip = KRect::new(mid.x - 10.0, mid.y - 7.0, mid.x + 10.0, mid.y + 7.0)
            .to_rounded_rect(7.0);
        fill(scene, &chip, Color::rgb8(255, 255, 255), 1.0);
        stroke(
            scene,
            &chip,
            connector.effective_color().unwrap_or(PLACEHOLDER),
            1.5,
            1.0,
        );
        if let Some(label) = &connector.label {
            log::trace!("connector label {:?} at ({}, {})", label, mid.x, mid.y);
        }
    }

    if connector.selected {
        halo(
            scene,
            &Rect::from_corners(a, b),
            ACCENT,
            1.0,
        );
    }
}

// ─── Shared helpers ──────────────────────────────────────────────────────

fn halo(scene: &mut Scene, b: &Rect, color: Color, alpha: f32) {
    let shape = to_kurbo(b.inflate(4.0)).to_rounded_rect(6.0);
    let stroke_style = Stroke {
        width: 2.0,
        join: Join::Round,
        start_cap: Cap::Round,
        end_cap: Cap::Round,
        ..Default::default()
    };
    scene.stroke(
        &stroke_style,
        Affine::IDENTITY,
        to_peniko(color, alpha),
        None,
        &shape,
    );
}

fn fill<S: kurbo::Shape>(scene: &mut Scene, shape: &S, color: Color, alpha: f32) {
    scene.fill(
        Fill::NonZero,
        Affine::IDENTITY,
        to_peniko(color, alpha),
        None,
        shape,
    );
}

fn stroke<S: kurbo::Shape>(scene: &mut Scene, shape: &S, color: Color, width: f64, alpha: f32) {
    let stroke_style = Stroke {
        width,
        ..Default::default()
    };
    scene.stroke(
        &stroke_style,
        Affine::IDENTITY,
        to_peniko(color, alpha),
        None,
        shape,
    );
}

fn to_peniko(c: Color, alpha: f32) -> PColor {
    PColor::from_rgba8(c.r, c.g, c.b, (c.a as f32 * alpha).round() as u8)
}

fn to_kurbo(r: Rect) -> KRect {
    KRect::new(
        r.x as f64,
        r.y as f64,
        (r.x + r.width) as f64,
        (r.y + r.height) as f64,
    )
}

fn kcenter(r: &Rect) -> KPoint {
    let c = r.center();
    KPoint::new(c.x as f64, c.y as f64)
}

/// Alpha-adjusted copy of a color (render-only convenience).
trait WithAlpha {
    fn with_alpha(self, a: f32) -> Color;
}

impl WithAlpha for Color {
    fn with_alpha(self, a: f32) -> Color {
        Color {
            a: (a * 255.0).round() as u8,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sm_core::geometry::Point;
    use sm_core::model::{MARKER_SIZE, NOTE_SIZE};

    #[test]
    fn paints_every_kind_without_panic() {
        let mut doc = Diagram::new();
        doc.add_node(Node::new(
            ItemId::intern("pc"),
            NodeKind::Character { name: "Mika".into() },
            0.0,
            0.0,
        ));
        doc.add_node(Node::new(
            ItemId::intern("ev"),
            NodeKind::Event {
                text: "The heist".into(),
                width: 140.0,
                height: 60.0,
            },
            100.0,
            0.0,
        ));
        doc.add_node(Node::new(
            ItemId::intern("nt"),
            NodeKind::Note {
                text: "twist!".into(),
                width: NOTE_SIZE.0,
                height: NOTE_SIZE.1,
            },
            0.0,
            100.0,
        ));
        doc.add_node(Node::new(
            ItemId::intern("mk"),
            NodeKind::MapMarker {
                icon: "castle".into(),
                color: Color::rgb8(179, 51, 51),
                size: MARKER_SIZE,
            },
            200.0,
            200.0,
        ));
        doc.add_node(Node::new(
            ItemId::intern("rg"),
            NodeKind::AreaPath {
                points: vec![
                    Point::new(0.0, 0.0),
                    Point::new(50.0, 10.0),
                    Point::new(20.0, 40.0),
                ],
                color: Color::rgb8(51, 102, 51),
            },
            300.0,
            100.0,
        ));
        let mut c = Connector::new(
            ItemId::intern("edge"),
            ItemId::intern("pc"),
            ItemId::intern("ev"),
        );
        c.selected = true;
        doc.connectors.push(c);
        // Untyped placeholder connector
        doc.connectors.push(Connector::new(
            ItemId::intern("edge2"),
            ItemId::intern("ev"),
            ItemId::intern("nt"),
        ));
        doc.nodes[0].selected = true;
        doc.nodes[3].ref_broken = true;

        let mut scene = Scene::new();
        paint_background(&mut scene, &doc, Rect::new(0.0, 0.0, 800.0, 600.0));
        let view = ViewState {
            hovered: Some(ItemId::intern("ev")),
            handle_on: Some(ItemId::intern("pc")),
            handle_radius: 6.0,
        };
        paint_scene(&mut scene, &doc, &view);
    }
}
