//! Hit testing: point → item lookup.
//!
//! Nodes are tested front-to-back (reverse paint order), so the topmost
//! item under the cursor wins. Connectors sit visually under nodes and are
//! only tested after every node has missed. The document background is not
//! an item and can never intercept a hit — clicks on empty canvas resolve
//! to `None` so placement gestures always land.

use sm_core::geometry::{Point, Rect, polygon_contains, segment_distance};
use sm_core::model::{Diagram, Node, NodeKind};
use sm_core::ItemId;

/// What a canvas point resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hit {
    Node(ItemId),
    Connector(ItemId),
}

/// Find the topmost item at `p`. Nodes shadow connectors.
pub fn hit_test(diagram: &Diagram, p: Point, connector_tolerance: f32) -> Option<Hit> {
    if let Some(id) = hit_test_node(diagram, p) {
        return Some(Hit::Node(id));
    }
    hit_test_connector(diagram, p, connector_tolerance).map(Hit::Connector)
}

/// Find the topmost node at `p`, shape-accurate per kind.
pub fn hit_test_node(diagram: &Diagram, p: Point) -> Option<ItemId> {
    diagram
        .nodes
        .iter()
        .rev()
        .find(|n| node_contains(n, p))
        .map(|n| n.id)
}

fn node_contains(node: &Node, p: Point) -> bool {
    let b = node.bounds();
    if !b.contains(p) {
        return false;
    }
    match &node.kind {
        // Round kinds hit on their disc, not the square bounds
        NodeKind::Character { .. } | NodeKind::AreaCircle { .. } => {
            let r = b.width / 2.0;
            p.distance(b.center()) <= r
        }
        NodeKind::AreaPath { points, .. } => {
            let local = p - node.position();
            polygon_contains(points, local)
        }
        _ => true,
    }
}

/// Find the topmost connector within `tolerance` of `p`. The connector
/// line runs center-to-center between its endpoints.
pub fn hit_test_connector(diagram: &Diagram, p: Point, tolerance: f32) -> Option<ItemId> {
    diagram
        .connectors
        .iter()
        .rev()
        .find(|c| {
            let (Some(src), Some(dst)) = (diagram.node(c.source), diagram.node(c.target)) else {
                return false;
            };
            segment_distance(src.bounds().center(), dst.bounds().center(), p) <= tolerance
        })
        .map(|c| c.id)
}

/// Center of a node's connector drag handle: a small grip riding the
/// middle of the right edge of the node's bounds.
pub fn handle_anchor(bounds: &Rect) -> Point {
    Point::new(bounds.x + bounds.width, bounds.y + bounds.height / 2.0)
}

/// Whether `p` lands on the connector handle of `node`.
pub fn hit_test_handle(node: &Node, p: Point, handle_radius: f32) -> bool {
    // Slightly generous pick area; the handle is a small target.
    p.distance(handle_anchor(&node.bounds())) <= handle_radius * 1.5
}
