//! Undo/Redo command stack.
//!
//! Every user edit is recorded as a reversible `Command` holding the
//! before and after state of exactly one logical edit. The controller
//! applies the edit first and then pushes the record — `push` never
//! re-executes anything. Undo writes the `before` side back into the
//! document, redo the `after` side, so an undo/redo pair reproduces the
//! exact document state.

use sm_core::geometry::Point;
use sm_core::model::{Color, Connector, Diagram, Node};
use sm_core::ItemId;
use smallvec::SmallVec;

/// Which side of a command to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Apply {
    Before,
    After,
}

/// One logical, reversible edit with its captured before/after state.
#[derive(Debug, Clone)]
pub enum Edit {
    /// Node created. `before` = absent, `after` = the node.
    AddNode { node: Node },

    /// Node removed together with every connector that touched it, plus
    /// its old z position so undo restores the exact paint order.
    RemoveNode {
        index: usize,
        node: Node,
        connectors: SmallVec<[Connector; 4]>,
    },

    AddConnector { connector: Connector },

    RemoveConnector { index: usize, connector: Connector },

    /// Net displacement of one completed drag (never per-frame deltas).
    MoveNode { id: ItemId, from: Point, to: Point },

    /// Any property edit on a node (text, color, icon, size, entity ref),
    /// captured as full snapshots.
    PatchNode {
        id: ItemId,
        before: Box<Node>,
        after: Box<Node>,
    },

    /// Any property edit on a connector (relation, label, color).
    PatchConnector {
        id: ItemId,
        before: Box<Connector>,
        after: Box<Connector>,
    },

    /// Z-order change: the node moved from one paint position to another.
    ReorderNode { id: ItemId, from: usize, to: usize },

    /// Background swap, including the dominant-color cache it invalidated.
    SetBackground {
        before: (Option<String>, Option<Color>),
        after: (Option<String>, Option<Color>),
    },
}

impl Edit {
    /// Write one side of this edit into the document.
    pub fn apply(&self, doc: &mut Diagram, which: Apply) {
        match (self, which) {
            (Edit::AddNode { node }, Apply::After) => {
                if doc.node(node.id).is_none() {
                    doc.add_node(node.clone());
                }
            }
            (Edit::AddNode { node }, Apply::Before) => {
                doc.remove_node(node.id);
            }

            (Edit::RemoveNode { node, .. }, Apply::After) => {
                doc.remove_node(node.id);
            }
            (
                Edit::RemoveNode {
                    index,
                    node,
                    connectors,
                },
                Apply::Before,
            ) => {
                doc.insert_node(*index, node.clone());
                for c in connectors {
                    doc.add_connector(c.clone());
                }
            }

            (Edit::AddConnector { connector }, Apply::After) => {
                if doc.connector(connector.id).is_none() {
                    doc.add_connector(connector.clone());
                }
            }
            (Edit::AddConnector { connector }, Apply::Before) => {
                doc.remove_connector(connector.id);
            }

            (Edit::RemoveConnector { connector, .. }, Apply::After) => {
                doc.remove_connector(connector.id);
            }
            (Edit::RemoveConnector { index, connector }, Apply::Before) => {
                doc.insert_connector(*index, connector.clone());
            }

            (Edit::MoveNode { id, from, to }, _) => {
                let target = match which {
                    Apply::Before => from,
                    Apply::After => to,
                };
                if let Some(node) = doc.node_mut(*id) {
                    node.set_position(*target);
                }
            }

            (Edit::PatchNode { id, before, after }, _) => {
                let snapshot = match which {
                    Apply::Before => before,
                    Apply::After => after,
                };
                if let Some(node) = doc.node_mut(*id) {
                    // Selection is transient; keep whatever is current.
                    let selected = node.selected;
                    *node = (**snapshot).clone();
                    node.selected = selected;
                }
            }

            (Edit::PatchConnector { id, before, after }, _) => {
                let snapshot = match which {
                    Apply::Before => before,
                    Apply::After => after,
                };
                if let Some(connector) = doc.connector_mut(*id) {
                    let selected = connector.selected;
                    *connector = (**snapshot).clone();
                    connector.selected = selected;
                }
            }

            (Edit::ReorderNode { id, from, to }, _) => {
                let target = match which {
                    Apply::Before => *from,
                    Apply::After => *to,
                };
                if let Some(current) = doc.z_index(*id) {
                    let node = doc.nodes.remove(current);
                    doc.insert_node(target, node);
                }
            }

            (Edit::SetBackground { before, after }, _) => {
                let (background_ref, dominant) = match which {
                    Apply::Before => before,
                    Apply::After => after,
                };
                doc.background_ref = background_ref.clone();
                doc.dominant_color = *dominant;
            }
        }
    }
}

/// A recorded edit plus its human-readable label (undo menus).
#[derive(Debug, Clone)]
pub struct Command {
    pub edit: Edit,
    pub description: String,
}

impl Command {
    pub fn new(edit: Edit, description: impl Into<String>) -> Self {
        Self {
            edit,
            description: description.into(),
        }
    }
}

/// Linear undo/redo history with a bounded depth.
pub struct CommandStack {
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
    /// Maximum undo depth; the oldest command is forgotten beyond this.
    max_depth: usize,
}

impl CommandStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::with_capacity(max_depth.min(64)),
            redo_stack: Vec::new(),
            max_depth,
        }
    }

    /// Record a command whose effects the caller has already applied.
    /// Clears the redo side (standard linear history).
    pub fn push(&mut self, command: Command) {
        self.undo_stack.push(command);
        if self.undo_stack.len() > self.max_depth {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
    }

    /// Undo the most recent command. No-op on an empty stack.
    pub fn undo(&mut self, doc: &mut Diagram) -> Option<String> {
        let cmd = self.undo_stack.pop()?;
        cmd.edit.apply(doc, Apply::Before);
        let desc = cmd.description.clone();
        self.redo_stack.push(cmd);
        Some(desc)
    }

    /// Re-apply the most recently undone command. No-op on an empty stack.
    pub fn redo(&mut self, doc: &mut Diagram) -> Option<String> {
        let cmd = self.redo_stack.pop()?;
        cmd.edit.apply(doc, Apply::After);
        let desc = cmd.description.clone();
        self.undo_stack.push(cmd);
        Some(desc)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Drop all history (e.g. after loading a different document).
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
