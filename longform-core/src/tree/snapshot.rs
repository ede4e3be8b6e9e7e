//! Owned, monotonically growing copy of a foreign UI tree.
//!
//! Each capture tick walks the live tree depth-first and merges it into the
//! snapshot. A node is identified by a key derived from its identity hint,
//! a hash of its position and content, and its class tag; a key seen before
//! is never re-created, so scrolling only ever adds nodes. A recycled list
//! slot that shows new content gets a new key.
//!
//! Web content containers are walked once and then frozen, since their
//! accessibility structure shifts across reflows.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::flags::NodeActions;
use crate::tree::classify::{NodeClass, is_cohesive};
use crate::tree::{ForeignNode, MAX_TREE_DEPTH};

// ── SnapshotNode ─────────────────────────────────────────────────

/// Index of a node inside its [`Snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// One owned node copied out of the foreign tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotNode {
    /// Snapshot-unique key.
    pub key: String,
    /// Identity hint the host supplied, if any.
    pub identity_hint: Option<String>,
    /// Class/type tag.
    pub class_name: Option<String>,
    /// Text content at the time the node was first seen.
    pub text: Option<String>,
    /// Declared actions.
    pub actions: NodeActions,
    children: Vec<NodeId>,
}

impl SnapshotNode {
    /// Children in first-discovery order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Classification of the class tag.
    pub fn class(&self) -> NodeClass {
        NodeClass::of(self.class_name.as_deref())
    }

    /// Whether the node has text containing something other than whitespace.
    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

// ── Snapshot ─────────────────────────────────────────────────────

/// Arena of [`SnapshotNode`]s keyed by their snapshot key.
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    nodes: Vec<SnapshotNode>,
    index: HashMap<String, NodeId>,
    roots: Vec<NodeId>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes captured so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes that were first seen without a snapshot parent, in order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> &SnapshotNode {
        &self.nodes[id.0]
    }

    /// Look a node up by its key.
    pub fn get(&self, key: &str) -> Option<&SnapshotNode> {
        self.index.get(key).map(|&id| self.node(id))
    }

    /// Resolved children of `id`.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &SnapshotNode> + '_ {
        self.node(id).children.iter().map(|&c| self.node(c))
    }

    /// Merge the live tree under `root` into the snapshot.
    ///
    /// Returns `true` if at least one new node was added.
    pub fn capture<N: ForeignNode>(&mut self, root: &N) -> bool {
        let before = self.nodes.len();
        let mut visited = HashSet::new();
        if let Some(live) = LiveNode::read(root, 0, &mut visited) {
            self.merge(&live, None, "", 0);
        }
        let grew = self.nodes.len() > before;
        trace!(before, after = self.nodes.len(), grew, "snapshot merged");
        grew
    }

    fn merge(&mut self, live: &LiveNode, parent: Option<NodeId>, parent_key: &str, occurrence: usize) {
        let key = node_key(
            live.identity_hint.as_deref(),
            parent_key,
            &live.signature,
            occurrence,
            live.class_name.as_deref(),
        );

        let id = match self.index.get(&key) {
            Some(&existing) => {
                if self.node(existing).class() == NodeClass::WebContent {
                    return;
                }
                existing
            }
            None => {
                let id = NodeId(self.nodes.len());
                self.nodes.push(SnapshotNode {
                    key: key.clone(),
                    identity_hint: live.identity_hint.clone(),
                    class_name: live.class_name.clone(),
                    text: live.text.clone(),
                    actions: live.actions,
                    children: Vec::new(),
                });
                self.index.insert(key.clone(), id);
                match parent {
                    Some(p) => self.link(p, id),
                    None => self.roots.push(id),
                }
                id
            }
        };

        // Siblings with the same hint and content are told apart by the
        // order they appear in.
        let mut seen: HashMap<(Option<&str>, [u8; 32]), usize> = HashMap::new();
        for child in &live.children {
            let count = seen
                .entry((child.identity_hint.as_deref(), *child.signature.as_bytes()))
                .or_default();
            self.merge(child, Some(id), &key, *count);
            *count += 1;
        }
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        let children = &mut self.nodes[parent.0].children;
        if !children.contains(&child) {
            children.push(child);
        }
    }

    /// Human-readable dump of the snapshot, one line per node.
    ///
    /// Format: `{id}/{key} [{snippet}] (paragraph) (clickable)`, indented two
    /// spaces per level.
    pub fn dump_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for &root in &self.roots {
            self.dump_into(root, 0, &mut lines);
        }
        lines
    }

    fn dump_into(&self, id: NodeId, depth: usize, lines: &mut Vec<String>) {
        let node = self.node(id);
        let mut line = format!(
            "{}{}/{} [{}]",
            "  ".repeat(depth),
            node.identity_hint.as_deref().unwrap_or("null"),
            node.key,
            format_snippet(node.text.as_deref()),
        );
        if is_cohesive(self, id) {
            line.push_str(" (paragraph)");
        }
        if node.actions.is_clickable() {
            line.push_str(" (clickable)");
        }
        lines.push(line);
        for &child in &node.children {
            self.dump_into(child, depth + 1, lines);
        }
    }
}

/// Derive the snapshot key of a node.
///
/// Hosts rarely give every element a stable id, and list containers recycle
/// their child views as they scroll. The key therefore hashes the parent key,
/// the node's content signature and its occurrence among identical
/// siblings, never its slot index.
pub fn node_key(
    identity_hint: Option<&str>,
    parent_key: &str,
    signature: &blake3::Hash,
    occurrence: usize,
    class_name: Option<&str>,
) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(parent_key.as_bytes());
    hasher.update(signature.as_bytes());
    hasher.update(&(occurrence as u64).to_le_bytes());
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);

    format!(
        "{}_{:016x}_{}",
        identity_hint.unwrap_or("null"),
        u64::from_le_bytes(prefix),
        class_name.unwrap_or("null"),
    )
}

// ── LiveNode ─────────────────────────────────────────────────────

/// Owned copy of one walk over the foreign tree, read before merging so
/// that every node's key can depend on its subtree.
struct LiveNode {
    identity_hint: Option<String>,
    class_name: Option<String>,
    text: Option<String>,
    actions: NodeActions,
    signature: blake3::Hash,
    children: Vec<LiveNode>,
}

impl LiveNode {
    fn read<N: ForeignNode>(node: &N, depth: usize, visited: &mut HashSet<String>) -> Option<Self> {
        if depth > MAX_TREE_DEPTH {
            return None;
        }

        let identity_hint = node.identity_hint();
        // A host node reached twice in one walk means the tree has a cycle.
        if let Some(hint) = &identity_hint {
            if !visited.insert(hint.clone()) {
                return None;
            }
        }

        let class_name = node.class_name();
        let text = node.text();
        let actions = node.actions();
        let children: Vec<_> = (0..node.child_count())
            .filter_map(|i| node.child(i))
            .filter_map(|child| Self::read(&child, depth + 1, visited))
            .collect();

        // Hinted nodes, scroll containers and web content keep their identity
        // while their children change; every other node is identified by what
        // it currently shows.
        let opaque = identity_hint.is_some()
            || actions.is_scrollable()
            || NodeClass::of(class_name.as_deref()) == NodeClass::WebContent;

        let mut hasher = blake3::Hasher::new();
        hasher.update(class_name.as_deref().unwrap_or_default().as_bytes());
        hasher.update(&[0]);
        hasher.update(text.as_deref().unwrap_or_default().as_bytes());
        if !opaque {
            for child in &children {
                hasher.update(child.signature.as_bytes());
            }
        }

        Some(Self {
            identity_hint,
            class_name,
            text,
            actions,
            signature: hasher.finalize(),
            children,
        })
    }
}

/// Shorten text for logs: `first15...last15` when longer than 30 chars.
pub fn format_snippet(text: Option<&str>) -> String {
    let Some(text) = text else {
        return "null".to_string();
    };
    let count = text.chars().count();
    if count <= 30 {
        return text.to_string();
    }
    let head: String = text.chars().take(15).collect();
    let tail: String = text.chars().skip(count - 15).collect();
    format!("{head}...{tail}")
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeProvider;
    use crate::tree::fixture::{FixtureNode, FixtureProvider};

    fn capture(provider: &mut FixtureProvider, snapshot: &mut Snapshot) -> bool {
        let root = provider.root().expect("fixture root");
        snapshot.capture(&root)
    }

    #[test]
    fn first_capture_copies_every_node() {
        let tree = FixtureNode::frame().with_children(vec![
            FixtureNode::text_view("One"),
            FixtureNode::text_view("Two"),
        ]);
        let mut provider = FixtureProvider::new(tree);
        let mut snapshot = Snapshot::new();

        assert!(capture(&mut provider, &mut snapshot));
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.roots().len(), 1);
        let root = snapshot.roots()[0];
        let texts: Vec<_> = snapshot
            .children(root)
            .map(|c| c.text.clone().unwrap_or_default())
            .collect();
        assert_eq!(texts, vec!["One", "Two"]);
    }

    #[test]
    fn recapture_of_unchanged_tree_does_not_grow() {
        let tree = FixtureNode::frame().with_children(vec![FixtureNode::text_view("One")]);
        let mut provider = FixtureProvider::new(tree);
        let mut snapshot = Snapshot::new();

        assert!(capture(&mut provider, &mut snapshot));
        assert!(!capture(&mut provider, &mut snapshot));
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn scrolled_children_are_appended() {
        let items = (0..6)
            .map(|i| FixtureNode::text_view(&format!("Item {i}")))
            .collect();
        let tree = FixtureNode::scroll_view().with_children(items);
        let mut provider = FixtureProvider::new(tree).with_viewport(3, 3);
        let mut snapshot = Snapshot::new();

        assert!(capture(&mut provider, &mut snapshot));
        assert_eq!(snapshot.len(), 4);

        let root = provider.root().unwrap();
        assert!(root.perform_action(NodeActions::SCROLL_FORWARD));
        assert!(capture(&mut provider, &mut snapshot));
        assert_eq!(snapshot.len(), 7);

        let root_id = snapshot.roots()[0];
        let texts: Vec<_> = snapshot
            .children(root_id)
            .filter_map(|c| c.text.clone())
            .collect();
        assert_eq!(texts.first().map(String::as_str), Some("Item 0"));
        assert_eq!(texts.last().map(String::as_str), Some("Item 5"));
    }

    #[test]
    fn recycled_slots_with_new_content_are_new_nodes() {
        let items = (0..6)
            .map(|i| {
                FixtureNode::frame().with_children(vec![FixtureNode::text_view(&format!("Item {i}"))])
            })
            .collect();
        let tree = FixtureNode::scroll_view().with_children(items);
        let mut provider = FixtureProvider::new(tree).with_viewport(2, 2);
        let mut snapshot = Snapshot::new();

        capture(&mut provider, &mut snapshot);
        for _ in 0..2 {
            let root = provider.root().unwrap();
            assert!(root.perform_action(NodeActions::SCROLL_FORWARD));
            assert!(capture(&mut provider, &mut snapshot));
        }
        assert!(!capture(&mut provider, &mut snapshot));

        let root_id = snapshot.roots()[0];
        let slots = snapshot.node(root_id).children();
        assert_eq!(slots.len(), 6);
        for (i, &slot) in slots.iter().enumerate() {
            let texts: Vec<_> = snapshot
                .children(slot)
                .filter_map(|c| c.text.clone())
                .collect();
            assert_eq!(texts, vec![format!("Item {i}")]);
        }
    }

    #[test]
    fn shifted_content_keeps_its_key() {
        let items = (0..4)
            .map(|i| {
                FixtureNode::frame().with_children(vec![FixtureNode::text_view(&format!("Item {i}"))])
            })
            .collect();
        let tree = FixtureNode::scroll_view().with_children(items);
        let mut provider = FixtureProvider::new(tree).with_viewport(2, 1);
        let mut snapshot = Snapshot::new();

        capture(&mut provider, &mut snapshot);
        let root = provider.root().unwrap();
        assert!(root.perform_action(NodeActions::SCROLL_FORWARD));
        // Item 1 moved from slot 1 to slot 0; only Item 2 is new.
        assert!(capture(&mut provider, &mut snapshot));
        assert_eq!(snapshot.len(), 1 + 3 * 2);
    }

    #[test]
    fn keys_are_unique() {
        let tree = FixtureNode::frame().with_children(vec![
            FixtureNode::text_view("Same"),
            FixtureNode::text_view("Same"),
            FixtureNode::view().with_children(vec![FixtureNode::text_view("Same")]),
        ]);
        let mut provider = FixtureProvider::new(tree);
        let mut snapshot = Snapshot::new();
        capture(&mut provider, &mut snapshot);

        let keys: HashSet<_> = snapshot.nodes.iter().map(|n| n.key.clone()).collect();
        assert_eq!(keys.len(), snapshot.len());
        assert_eq!(snapshot.len(), 5);
    }

    #[test]
    fn web_content_is_walked_once() {
        let tree = FixtureNode::web_view().with_children(vec![FixtureNode::text_view("Body")]);
        let mut provider = FixtureProvider::new(tree);
        let mut snapshot = Snapshot::new();
        assert!(capture(&mut provider, &mut snapshot));
        assert_eq!(snapshot.len(), 2);

        // The web view reflows and exposes a different child.
        provider.replace_root(
            FixtureNode::web_view().with_children(vec![FixtureNode::text_view("Reflowed")]),
        );
        assert!(!capture(&mut provider, &mut snapshot));
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn stale_handles_produce_nothing() {
        let tree = FixtureNode::frame().with_children(vec![FixtureNode::text_view("One")]);
        let mut provider = FixtureProvider::new(tree);
        let root = provider.root().unwrap();
        provider.invalidate_handles();

        let mut snapshot = Snapshot::new();
        snapshot.capture(&root);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.node(snapshot.roots()[0]).class_name.is_none());
    }

    #[test]
    fn repeated_identity_hint_is_not_rewalked() {
        let tree = FixtureNode::frame().with_id("loop").with_children(vec![
            FixtureNode::frame()
                .with_id("loop")
                .with_children(vec![FixtureNode::text_view("Deep")]),
        ]);
        let mut provider = FixtureProvider::new(tree);
        let mut snapshot = Snapshot::new();
        capture(&mut provider, &mut snapshot);
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn snippets_are_shortened() {
        assert_eq!(format_snippet(None), "null");
        assert_eq!(format_snippet(Some("short")), "short");
        let long = "abcdefghijklmnopqrstuvwxyz0123456789";
        assert_eq!(format_snippet(Some(long)), "abcdefghijklmno...vwxyz0123456789");
    }

    #[test]
    fn dump_marks_paragraphs_and_links() {
        let tree = FixtureNode::frame().with_children(vec![
            FixtureNode::text_view("Hello"),
            FixtureNode::view()
                .with_actions(&["click"])
                .with_children(vec![FixtureNode::text_view("link")]),
        ]);
        let mut provider = FixtureProvider::new(tree);
        let mut snapshot = Snapshot::new();
        capture(&mut provider, &mut snapshot);

        let lines = snapshot.dump_lines();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("  null/"));
        assert!(lines[1].ends_with("[Hello] (paragraph)"));
        assert!(lines[2].ends_with("(paragraph) (clickable)"));
    }
}
