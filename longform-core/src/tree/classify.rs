//! Paragraph classification and text extraction over a [`Snapshot`].
//!
//! A subtree is a *cohesive paragraph* when it reads as one block of text:
//! a text label, a leaf container holding text, or a container whose
//! children are only leaf labels, leaf containers and links. Anything else
//! is an implicit paragraph break, and its children are examined on their
//! own.
//!
//! Inline markup survives in a light form: link text is wrapped in `[ ]`
//! and text held directly by a generic container in `* *`.

use std::collections::HashSet;

use crate::tree::snapshot::{NodeId, Snapshot};

// ── NodeClass ────────────────────────────────────────────────────

/// Coarse classification of a node's class tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    /// Plain text label (`*.TextView`).
    TextLabel,
    /// Generic visual container (`*.View`).
    Container,
    /// Embedded web content (`*.WebView`).
    WebContent,
    /// Layouts, scrollers, buttons and everything else.
    Other,
}

impl NodeClass {
    pub fn of(class_name: Option<&str>) -> Self {
        match class_name {
            Some(c) if c.ends_with(".TextView") => Self::TextLabel,
            Some(c) if c.ends_with(".WebView") => Self::WebContent,
            Some(c) if c.ends_with(".View") => Self::Container,
            _ => Self::Other,
        }
    }
}

// ── Document ─────────────────────────────────────────────────────

/// Ordered, duplicate-free list of paragraphs.
///
/// Duplicates are detected by exact string equality, so paragraphs that
/// differ only in incidental whitespace are both kept.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Document {
    paragraphs: Vec<String>,
    seen: HashSet<String>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `paragraph` unless an identical one is already present.
    ///
    /// Returns `true` if it was added.
    pub fn push(&mut self, paragraph: String) -> bool {
        if self.seen.contains(&paragraph) {
            return false;
        }
        self.seen.insert(paragraph.clone());
        self.paragraphs.push(paragraph);
        true
    }

    pub fn paragraphs(&self) -> &[String] {
        &self.paragraphs
    }

    pub fn len(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    /// Paragraphs joined with a blank line.
    pub fn text(&self) -> String {
        self.paragraphs.join("\n\n")
    }

    pub fn into_paragraphs(self) -> Vec<String> {
        self.paragraphs
    }
}

// ── Classification ───────────────────────────────────────────────

fn is_leaf_label(snapshot: &Snapshot, id: NodeId) -> bool {
    let node = snapshot.node(id);
    node.class() == NodeClass::TextLabel && node.is_leaf()
}

/// A clickable container whose children are all leaf text labels.
pub fn is_link(snapshot: &Snapshot, id: NodeId) -> bool {
    let node = snapshot.node(id);
    node.actions.is_clickable()
        && !node.is_leaf()
        && node.class() == NodeClass::Container
        && node.children().iter().all(|&c| is_leaf_label(snapshot, c))
}

/// Whether the subtree at `id` reads as a single paragraph.
pub fn is_cohesive(snapshot: &Snapshot, id: NodeId) -> bool {
    let node = snapshot.node(id);

    if node.class() == NodeClass::TextLabel {
        return true;
    }

    if node.class() == NodeClass::Container && node.is_leaf() && node.has_text() {
        return true;
    }

    if node.is_leaf() {
        return false;
    }

    node.children().iter().all(|&c| {
        let child = snapshot.node(c);
        let leaf_label = child.class() == NodeClass::TextLabel && child.is_leaf();
        let leaf_container = child.class() == NodeClass::Container && child.is_leaf();
        leaf_label || leaf_container || is_link(snapshot, c)
    })
}

/// Text of a cohesive subtree with link and emphasis markers applied.
pub fn extract_text(snapshot: &Snapshot, id: NodeId) -> String {
    let node = snapshot.node(id);

    if is_link(snapshot, id) {
        let label: String = snapshot
            .children(id)
            .filter_map(|c| c.text.as_deref())
            .filter(|t| !t.trim().is_empty())
            .collect();
        return emphasize(&label, "[", "]");
    }

    if let Some(text) = node.text.as_deref().filter(|t| !t.trim().is_empty()) {
        if node.class() == NodeClass::Container {
            return emphasize(text, "*", "*");
        }
        return text.to_string();
    }

    node.children()
        .iter()
        .map(|&c| extract_text(snapshot, c))
        .filter(|t| !t.trim().is_empty())
        .collect()
}

/// Wrap the non-whitespace span of `text` in `left`/`right`, keeping the
/// surrounding whitespace outside the markers.
///
/// ```
/// use longform_core::tree::emphasize;
///
/// assert_eq!(emphasize(" ab ", "*", "*"), " *ab* ");
/// assert_eq!(emphasize("", "*", "*"), "");
/// ```
pub fn emphasize(text: &str, left: &str, right: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return text.to_string();
    }
    let start = text.len() - text.trim_start().len();
    let end = text.trim_end().len();
    format!("{}{left}{trimmed}{right}{}", &text[..start], &text[end..])
}

/// Walk the snapshot and merge every cohesive paragraph into `document`.
///
/// Returns the number of paragraphs newly added.
pub fn collect_paragraphs(snapshot: &Snapshot, document: &mut Document) -> usize {
    let before = document.len();
    for &root in snapshot.roots() {
        collect_into(snapshot, root, document);
    }
    document.len() - before
}

fn collect_into(snapshot: &Snapshot, id: NodeId, document: &mut Document) {
    if is_cohesive(snapshot, id) {
        let text = extract_text(snapshot, id);
        let text = text.trim();
        if !text.is_empty() {
            document.push(text.to_string());
        }
        return;
    }
    for &child in snapshot.node(id).children() {
        collect_into(snapshot, child, document);
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeProvider;
    use crate::tree::fixture::{FixtureNode, FixtureProvider};
    use proptest::prelude::*;

    fn snapshot_of(tree: FixtureNode) -> Snapshot {
        let mut provider = FixtureProvider::new(tree);
        let mut snapshot = Snapshot::new();
        let root = provider.root().expect("fixture root");
        snapshot.capture(&root);
        snapshot
    }

    fn root(snapshot: &Snapshot) -> NodeId {
        snapshot.roots()[0]
    }

    fn paragraphs(tree: FixtureNode) -> Vec<String> {
        let snapshot = snapshot_of(tree);
        let mut document = Document::new();
        collect_paragraphs(&snapshot, &mut document);
        document.into_paragraphs()
    }

    #[test]
    fn emphasize_keeps_outer_whitespace() {
        assert_eq!(emphasize(" ab ", "*", "*"), " *ab* ");
        assert_eq!(emphasize("ab", "[", "]"), "[ab]");
        assert_eq!(emphasize("\n a b\t", "*", "*"), "\n *a b*\t");
    }

    #[test]
    fn emphasize_blank_is_unchanged() {
        assert_eq!(emphasize("", "*", "*"), "");
        assert_eq!(emphasize("   ", "*", "*"), "   ");
    }

    #[test]
    fn class_tags() {
        assert_eq!(NodeClass::of(Some("android.widget.TextView")), NodeClass::TextLabel);
        assert_eq!(NodeClass::of(Some("android.view.View")), NodeClass::Container);
        assert_eq!(NodeClass::of(Some("android.webkit.WebView")), NodeClass::WebContent);
        assert_eq!(NodeClass::of(Some("android.widget.ScrollView")), NodeClass::Other);
        assert_eq!(NodeClass::of(None), NodeClass::Other);
    }

    #[test]
    fn link_text_is_bracketed() {
        let tree = FixtureNode::view()
            .with_actions(&["click"])
            .with_children(vec![FixtureNode::text_view("Read"), FixtureNode::text_view(" more")]);
        let snapshot = snapshot_of(tree);
        let id = root(&snapshot);

        assert!(is_link(&snapshot, id));
        assert_eq!(extract_text(&snapshot, id), "[Read more]");
    }

    #[test]
    fn unclickable_container_is_not_a_link() {
        let tree = FixtureNode::view().with_children(vec![FixtureNode::text_view("Read")]);
        let snapshot = snapshot_of(tree);
        assert!(!is_link(&snapshot, root(&snapshot)));
    }

    #[test]
    fn text_label_is_a_paragraph_regardless_of_children() {
        let tree = FixtureNode::text_view("Caption").with_children(vec![
            FixtureNode::frame().with_children(vec![FixtureNode::scroll_view()]),
        ]);
        let snapshot = snapshot_of(tree);
        assert!(is_cohesive(&snapshot, root(&snapshot)));
        assert_eq!(extract_text(&snapshot, root(&snapshot)), "Caption");
    }

    #[test]
    fn leaf_container_text_is_emphasized() {
        let tree = FixtureNode::view().with_text(" bold ");
        let snapshot = snapshot_of(tree);
        assert!(is_cohesive(&snapshot, root(&snapshot)));
        assert_eq!(extract_text(&snapshot, root(&snapshot)), " *bold* ");
    }

    #[test]
    fn blank_leaf_container_is_not_a_paragraph() {
        let tree = FixtureNode::view().with_text("  ");
        let snapshot = snapshot_of(tree);
        assert!(!is_cohesive(&snapshot, root(&snapshot)));
    }

    #[test]
    fn inline_runs_join_into_one_paragraph() {
        let tree = FixtureNode::view().with_children(vec![
            FixtureNode::text_view("See "),
            FixtureNode::view()
                .with_actions(&["click"])
                .with_children(vec![FixtureNode::text_view("the docs")]),
            FixtureNode::view().with_text(" now"),
            FixtureNode::text_view("."),
        ]);
        assert_eq!(paragraphs(tree), vec!["See [the docs] *now*."]);
    }

    #[test]
    fn layout_children_break_paragraphs() {
        let tree = FixtureNode::frame().with_children(vec![
            FixtureNode::text_view("First paragraph."),
            FixtureNode::frame().with_children(vec![FixtureNode::text_view("Nested.")]),
            FixtureNode::text_view("   "),
            FixtureNode::text_view("Last."),
        ]);
        assert_eq!(paragraphs(tree), vec!["First paragraph.", "Nested.", "Last."]);
    }

    #[test]
    fn duplicates_are_dropped_in_first_seen_order() {
        let tree = FixtureNode::frame().with_children(vec![
            FixtureNode::text_view("A"),
            FixtureNode::frame().with_children(vec![FixtureNode::text_view("B")]),
            FixtureNode::text_view("A"),
            FixtureNode::frame().with_children(vec![FixtureNode::text_view(" B ")]),
        ]);
        assert_eq!(paragraphs(tree), vec!["A", "B"]);
    }

    #[test]
    fn document_text_joins_with_blank_line() {
        let mut document = Document::new();
        assert!(document.push("one".into()));
        assert!(document.push("two".into()));
        assert!(!document.push("one".into()));
        assert_eq!(document.text(), "one\n\ntwo");
    }

    #[test]
    fn collecting_twice_adds_nothing() {
        let tree = FixtureNode::frame().with_children(vec![FixtureNode::text_view("Only")]);
        let snapshot = snapshot_of(tree);
        let mut document = Document::new();
        assert_eq!(collect_paragraphs(&snapshot, &mut document), 1);
        assert_eq!(collect_paragraphs(&snapshot, &mut document), 0);
    }

    fn arb_tree() -> impl Strategy<Value = FixtureNode> {
        let class = prop_oneof![
            Just(FixtureNode::text_view("")),
            Just(FixtureNode::view()),
            Just(FixtureNode::frame()),
        ]
        .boxed();
        let leaf = (class.clone(), proptest::option::of("[ab ]{0,3}"), any::<bool>()).prop_map(
            |(node, text, click)| {
                let node = match text {
                    Some(t) => node.with_text(&t),
                    None => node.without_text(),
                };
                if click { node.with_actions(&["click"]) } else { node }
            },
        );
        leaf.prop_recursive(4, 48, 4, move |inner| {
            (class.clone(), proptest::collection::vec(inner, 0..4), any::<bool>()).prop_map(
                |(node, children, click)| {
                    let node = node.without_text().with_children(children);
                    if click { node.with_actions(&["click"]) } else { node }
                },
            )
        })
    }

    proptest! {
        #[test]
        fn paragraphs_are_unique_trimmed_and_non_blank(tree in arb_tree()) {
            let found = paragraphs(tree);
            let unique: HashSet<_> = found.iter().collect();
            prop_assert_eq!(unique.len(), found.len());
            for p in &found {
                prop_assert!(!p.is_empty());
                prop_assert_eq!(p.trim(), p.as_str());
            }
        }

        #[test]
        fn recollection_preserves_order(tree in arb_tree()) {
            let snapshot = snapshot_of(tree);
            let mut document = Document::new();
            collect_paragraphs(&snapshot, &mut document);
            let first = document.paragraphs().to_vec();
            collect_paragraphs(&snapshot, &mut document);
            prop_assert_eq!(document.paragraphs(), first.as_slice());
        }
    }
}
