//! Foreign UI trees and the owned snapshot built from them.
//!
//! The host platform exposes its on-screen hierarchy through handles that
//! may be invalidated after any query. Nothing here retains a
//! [`ForeignNode`] past one capture tick: [`snapshot::Snapshot`] copies what
//! it needs into owned nodes, and [`classify`] works only on that copy.

pub mod classify;
pub mod fixture;
pub mod snapshot;

pub use classify::{Document, NodeClass, collect_paragraphs, emphasize, extract_text, is_cohesive, is_link};
pub use fixture::{FixtureDocument, FixtureHandle, FixtureNode, FixtureProvider};
pub use snapshot::{NodeId, Snapshot, SnapshotNode};

use crate::flags::NodeActions;

/// Ephemeral handle into the host's UI tree.
///
/// Implementations must answer from stale handles with empty values
/// (`None`, `0`, `false`) instead of failing; the snapshotter treats those
/// as "no content".
pub trait ForeignNode: Sized {
    /// Stable identity hint supplied by the host, if any.
    fn identity_hint(&self) -> Option<String>;

    /// Fully qualified class/type tag (e.g. `android.widget.TextView`).
    fn class_name(&self) -> Option<String>;

    /// Text content, if the node carries any.
    fn text(&self) -> Option<String>;

    /// Actions the node declares it supports.
    fn actions(&self) -> NodeActions;

    /// Number of children currently exposed.
    fn child_count(&self) -> usize;

    /// Child at `index`; `None` if the handle went stale or the child vanished.
    fn child(&self, index: usize) -> Option<Self>;

    /// Invoke `action` on the node. Returns `false` if the host refused or
    /// the handle is stale.
    fn perform_action(&self, action: NodeActions) -> bool;
}

/// Read-only access to the host's current UI tree.
pub trait TreeProvider {
    type Node: ForeignNode;

    /// Root of the active window, or `None` when nothing is on screen.
    fn root(&mut self) -> Option<Self::Node>;

    /// Title of the active window, if the host exposes one.
    fn window_title(&mut self) -> Option<String>;
}

/// Deepest level any traversal of a foreign tree will descend to.
pub const MAX_TREE_DEPTH: usize = 256;

/// Depth-first search for the first node that can scroll forward.
pub fn find_scrollable<N: ForeignNode>(node: N) -> Option<N> {
    find_scrollable_at(node, 0)
}

fn find_scrollable_at<N: ForeignNode>(node: N, depth: usize) -> Option<N> {
    if depth > MAX_TREE_DEPTH {
        return None;
    }
    if node.actions().can_scroll_forward() {
        return Some(node);
    }
    (0..node.child_count())
        .filter_map(|i| node.child(i))
        .find_map(|child| find_scrollable_at(child, depth + 1))
}
