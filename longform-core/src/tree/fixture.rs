//! In-memory UI tree provider for tests and offline runs.
//!
//! A [`FixtureProvider`] serves handles into a [`FixtureNode`] tree and
//! emulates the host's behaviour closely enough to drive the capture loop:
//!
//! * a node declaring `scroll_forward` shows a sliding window of its
//!   children (`viewport` wide, advancing `step` per scroll) and only keeps
//!   the action while more children remain;
//! * [`FixtureProvider::invalidate_handles`] and
//!   [`FixtureProvider::replace_root`] make every outstanding handle stale,
//!   after which it answers with empty values.
//!
//! Trees load from JSON:
//!
//! ```json
//! { "title": "Article", "viewport": 3, "step": 2,
//!   "root": { "class": "android.widget.ScrollView",
//!             "actions": ["scroll_forward"],
//!             "children": [ { "class": "android.widget.TextView", "text": "Hi" } ] } }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::LongformError;
use crate::flags::NodeActions;
use crate::tree::{ForeignNode, TreeProvider};

pub const TEXT_VIEW: &str = "android.widget.TextView";
pub const VIEW: &str = "android.view.View";
pub const WEB_VIEW: &str = "android.webkit.WebView";
pub const SCROLL_VIEW: &str = "android.widget.ScrollView";
pub const FRAME_LAYOUT: &str = "android.widget.FrameLayout";

// ── FixtureNode ──────────────────────────────────────────────────

/// Declarative description of one UI element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureNode {
    pub id: Option<String>,
    pub class: Option<String>,
    pub text: Option<String>,
    pub actions: Vec<String>,
    pub children: Vec<FixtureNode>,
}

impl FixtureNode {
    pub fn new(class: &str) -> Self {
        Self {
            class: Some(class.to_string()),
            ..Default::default()
        }
    }

    pub fn text_view(text: &str) -> Self {
        Self::new(TEXT_VIEW).with_text(text)
    }

    pub fn view() -> Self {
        Self::new(VIEW)
    }

    pub fn web_view() -> Self {
        Self::new(WEB_VIEW)
    }

    pub fn frame() -> Self {
        Self::new(FRAME_LAYOUT)
    }

    pub fn scroll_view() -> Self {
        Self::new(SCROLL_VIEW).with_actions(&["scroll_forward"])
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn without_text(mut self) -> Self {
        self.text = None;
        self
    }

    pub fn with_actions(mut self, actions: &[&str]) -> Self {
        self.actions.extend(actions.iter().map(|a| a.to_string()));
        self
    }

    pub fn with_children(mut self, children: Vec<FixtureNode>) -> Self {
        self.children = children;
        self
    }

    fn declared_actions(&self) -> NodeActions {
        self.actions
            .iter()
            .filter_map(|a| NodeActions::parse(a))
            .fold(NodeActions::empty(), |acc, a| acc | a)
    }
}

/// On-disk fixture: a tree plus the scrolling parameters to emulate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureDocument {
    pub title: Option<String>,
    pub viewport: Option<usize>,
    pub step: Option<usize>,
    pub root: Option<FixtureNode>,
}

// ── FixtureProvider ──────────────────────────────────────────────

#[derive(Debug, Default)]
struct ScrollState {
    /// First visible child index per scrollable node path.
    offsets: HashMap<Vec<usize>, usize>,
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    viewport: Option<usize>,
    step: usize,
}

/// [`TreeProvider`] over a [`FixtureNode`] tree.
#[derive(Debug)]
pub struct FixtureProvider {
    title: Option<String>,
    root: Option<Arc<FixtureNode>>,
    state: Arc<Mutex<ScrollState>>,
    window: Window,
}

impl FixtureProvider {
    pub fn new(root: FixtureNode) -> Self {
        Self {
            title: None,
            root: Some(Arc::new(root)),
            state: Arc::new(Mutex::new(ScrollState::default())),
            window: Window {
                viewport: None,
                step: 1,
            },
        }
    }

    /// A provider with nothing on screen.
    pub fn empty() -> Self {
        let mut provider = Self::new(FixtureNode::default());
        provider.root = None;
        provider
    }

    /// Parse a [`FixtureDocument`] from JSON.
    pub fn from_json(json: &str) -> Result<Self, LongformError> {
        let doc: FixtureDocument = serde_json::from_str(json)?;
        let mut provider = match doc.root {
            Some(root) => Self::new(root),
            None => Self::empty(),
        };
        provider.title = doc.title;
        if let Some(viewport) = doc.viewport {
            provider = provider.with_viewport(viewport, doc.step.unwrap_or(viewport));
        }
        Ok(provider)
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Show at most `viewport` children of each scrollable node, advancing
    /// by `step` per scroll.
    pub fn with_viewport(mut self, viewport: usize, step: usize) -> Self {
        self.window = Window {
            viewport: Some(viewport.max(1)),
            step: step.max(1),
        };
        self
    }

    /// Swap the on-screen tree. Outstanding handles go stale and scroll
    /// positions reset.
    pub fn replace_root(&mut self, root: FixtureNode) {
        self.root = Some(Arc::new(root));
        let mut state = lock(&self.state);
        state.offsets.clear();
        state.generation += 1;
    }

    /// Make every outstanding handle stale.
    pub fn invalidate_handles(&mut self) {
        lock(&self.state).generation += 1;
    }
}

impl TreeProvider for FixtureProvider {
    type Node = FixtureHandle;

    fn root(&mut self) -> Option<FixtureHandle> {
        let root = self.root.clone()?;
        let generation = lock(&self.state).generation;
        Some(FixtureHandle {
            root,
            path: Vec::new(),
            generation,
            state: Arc::clone(&self.state),
            window: self.window,
        })
    }

    fn window_title(&mut self) -> Option<String> {
        self.title.clone()
    }
}

fn lock(state: &Mutex<ScrollState>) -> MutexGuard<'_, ScrollState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── FixtureHandle ────────────────────────────────────────────────

/// Handle into a [`FixtureProvider`] tree.
#[derive(Debug, Clone)]
pub struct FixtureHandle {
    root: Arc<FixtureNode>,
    /// Indices into the full (unwindowed) child lists.
    path: Vec<usize>,
    generation: u64,
    state: Arc<Mutex<ScrollState>>,
    window: Window,
}

impl FixtureHandle {
    fn resolve(&self) -> Option<&FixtureNode> {
        if lock(&self.state).generation != self.generation {
            return None;
        }
        let mut node = self.root.as_ref();
        for &i in &self.path {
            node = node.children.get(i)?;
        }
        Some(node)
    }

    fn windowed(&self, node: &FixtureNode) -> bool {
        self.window.viewport.is_some() && node.declared_actions().can_scroll_forward()
    }

    /// Visible `(first, count)` range of this node's children.
    fn visible(&self, node: &FixtureNode) -> (usize, usize) {
        let total = node.children.len();
        match self.window.viewport {
            Some(viewport) if self.windowed(node) => {
                let offset = lock(&self.state)
                    .offsets
                    .get(&self.path)
                    .copied()
                    .unwrap_or(0);
                (offset, viewport.min(total - offset.min(total)))
            }
            _ => (0, total),
        }
    }

    fn max_offset(&self, node: &FixtureNode) -> usize {
        let viewport = self.window.viewport.unwrap_or(usize::MAX);
        node.children.len().saturating_sub(viewport)
    }
}

impl ForeignNode for FixtureHandle {
    fn identity_hint(&self) -> Option<String> {
        self.resolve()?.id.clone()
    }

    fn class_name(&self) -> Option<String> {
        self.resolve()?.class.clone()
    }

    fn text(&self) -> Option<String> {
        self.resolve()?.text.clone()
    }

    fn actions(&self) -> NodeActions {
        let Some(node) = self.resolve() else {
            return NodeActions::empty();
        };
        let mut actions = node.declared_actions();
        if actions.can_scroll_forward() {
            let (offset, _) = self.visible(node);
            let more = self.windowed(node) && offset < self.max_offset(node);
            actions.set(NodeActions::SCROLL_FORWARD, more);
            actions.set(NodeActions::SCROLL_BACKWARD, self.windowed(node) && offset > 0);
        }
        actions
    }

    fn child_count(&self) -> usize {
        self.resolve().map(|n| self.visible(n).1).unwrap_or(0)
    }

    fn child(&self, index: usize) -> Option<Self> {
        let node = self.resolve()?;
        let (offset, count) = self.visible(node);
        if index >= count {
            return None;
        }
        let mut path = self.path.clone();
        path.push(offset + index);
        Some(Self {
            root: Arc::clone(&self.root),
            path,
            generation: self.generation,
            state: Arc::clone(&self.state),
            window: self.window,
        })
    }

    fn perform_action(&self, action: NodeActions) -> bool {
        let Some(node) = self.resolve() else {
            return false;
        };
        if !self.windowed(node) {
            return false;
        }
        let max = self.max_offset(node);
        let mut state = lock(&self.state);
        let offset = state.offsets.entry(self.path.clone()).or_insert(0);
        let next = if action == NodeActions::SCROLL_FORWARD {
            (*offset + self.window.step).min(max)
        } else if action == NodeActions::SCROLL_BACKWARD {
            offset.saturating_sub(self.window.step)
        } else {
            return false;
        };
        let moved = next != *offset;
        *offset = next;
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<FixtureNode> {
        (0..n).map(|i| FixtureNode::text_view(&format!("{i}"))).collect()
    }

    fn visible_texts(handle: &FixtureHandle) -> Vec<String> {
        (0..handle.child_count())
            .filter_map(|i| handle.child(i))
            .filter_map(|c| c.text())
            .collect()
    }

    #[test]
    fn unwindowed_scroll_view_shows_everything() {
        let mut provider = FixtureProvider::new(FixtureNode::scroll_view().with_children(items(4)));
        let root = provider.root().unwrap();
        assert_eq!(root.child_count(), 4);
        assert!(!root.actions().can_scroll_forward());
        assert!(!root.perform_action(NodeActions::SCROLL_FORWARD));
    }

    #[test]
    fn window_slides_until_the_end() {
        let mut provider = FixtureProvider::new(FixtureNode::scroll_view().with_children(items(5)))
            .with_viewport(2, 2);
        let root = provider.root().unwrap();
        assert_eq!(visible_texts(&root), vec!["0", "1"]);
        assert!(root.actions().can_scroll_forward());

        assert!(root.perform_action(NodeActions::SCROLL_FORWARD));
        assert_eq!(visible_texts(&root), vec!["2", "3"]);

        assert!(root.perform_action(NodeActions::SCROLL_FORWARD));
        assert_eq!(visible_texts(&root), vec!["3", "4"]);
        assert!(!root.actions().can_scroll_forward());
        assert!(!root.perform_action(NodeActions::SCROLL_FORWARD));

        assert!(root.perform_action(NodeActions::SCROLL_BACKWARD));
        assert_eq!(visible_texts(&root), vec!["1", "2"]);
    }

    #[test]
    fn stale_handle_answers_empty() {
        let mut provider = FixtureProvider::new(FixtureNode::frame().with_children(items(2)));
        let root = provider.root().unwrap();
        let child = root.child(0).unwrap();
        provider.invalidate_handles();

        assert_eq!(root.child_count(), 0);
        assert!(child.text().is_none());
        assert!(root.child(0).is_none());
        assert_eq!(root.actions(), NodeActions::empty());
    }

    #[test]
    fn empty_provider_has_no_root() {
        let mut provider = FixtureProvider::empty();
        assert!(provider.root().is_none());
    }

    #[test]
    fn loads_json_document() {
        let json = r#"{
            "title": "Essay",
            "viewport": 1,
            "root": {
                "class": "android.widget.ScrollView",
                "actions": ["scroll_forward"],
                "children": [
                    { "class": "android.widget.TextView", "text": "A" },
                    { "class": "android.widget.TextView", "text": "B" }
                ]
            }
        }"#;
        let mut provider = FixtureProvider::from_json(json).unwrap();
        assert_eq!(provider.window_title().as_deref(), Some("Essay"));
        let root = provider.root().unwrap();
        assert_eq!(visible_texts(&root), vec!["A"]);
        assert!(root.perform_action(NodeActions::SCROLL_FORWARD));
        assert_eq!(visible_texts(&root), vec!["B"]);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let err = FixtureProvider::from_json("{ not json").unwrap_err();
        assert!(matches!(err, LongformError::Config(_)));
    }
}
