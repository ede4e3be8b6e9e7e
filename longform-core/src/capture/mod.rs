//! Scroll-and-reconverge capture loop.
//!
//! Each tick merges the host tree into the [`Snapshot`] and scrolls the
//! first scrollable node forward. The loop converges once several ticks in a
//! row add nothing to the snapshot, or once nothing is left to scroll.
//! Paragraphs are collected into the [`Document`] once, from the final
//! snapshot, whichever way the run ends.
//!
//! ```text
//!  Idle ──► Capturing ──► Converged
//!               │
//!               ├──► Aborted
//!               └──► Disconnected
//! ```

pub mod article;

pub use article::{Article, DEFAULT_TITLE, PREVIEW_CHARS, PresentationSink};

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::error::LongformError;
use crate::flags::NodeActions;
use crate::tree::{Document, ForeignNode, Snapshot, TreeProvider, collect_paragraphs, find_scrollable};

// ── CaptureConfig ────────────────────────────────────────────────

/// Configuration for [`CaptureService`].
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Delay between ticks.
    pub tick_interval: Duration,
    /// Consecutive ticks without snapshot growth before converging.
    pub max_unproductive_ticks: u32,
    /// Hard cap on ticks for trees whose content never settles.
    pub max_ticks: Option<u32>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(200),
            max_unproductive_ticks: 5,
            max_ticks: Some(600),
        }
    }
}

// ── CapturePhase ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapturePhase {
    #[default]
    Idle,
    Capturing,
    /// No new content appeared; the document is final.
    Converged,
    /// The host went away mid-capture.
    Disconnected,
    /// The user stopped the capture.
    Aborted,
}

impl std::fmt::Display for CapturePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Capturing => write!(f, "Capturing"),
            Self::Converged => write!(f, "Converged"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}

impl CapturePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Converged | Self::Disconnected | Self::Aborted)
    }

    /// Valid from: `Idle`.
    pub fn begin(&mut self) -> Result<(), LongformError> {
        match self {
            Self::Idle => {
                *self = Self::Capturing;
                Ok(())
            }
            _ => Err(LongformError::InvalidTransition(
                "cannot begin capture: not in Idle state",
            )),
        }
    }

    /// Valid from: `Capturing`.
    pub fn converge(&mut self) -> Result<(), LongformError> {
        match self {
            Self::Capturing => {
                *self = Self::Converged;
                Ok(())
            }
            _ => Err(LongformError::InvalidTransition(
                "cannot converge: not in Capturing state",
            )),
        }
    }

    /// Valid from: `Idle`, `Capturing`.
    pub fn stop(&mut self, reason: StopReason) -> Result<(), LongformError> {
        match self {
            Self::Idle | Self::Capturing => {
                *self = match reason {
                    StopReason::Aborted => Self::Aborted,
                    StopReason::Disconnected => Self::Disconnected,
                };
                Ok(())
            }
            _ => Err(LongformError::InvalidTransition(
                "cannot stop: capture already finished",
            )),
        }
    }
}

// ── CaptureHandle ────────────────────────────────────────────────

/// Why a capture was stopped from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Aborted,
    Disconnected,
}

/// Cloneable remote control for a running [`CaptureService`].
///
/// Stopping is idempotent; the first recorded reason wins.
#[derive(Debug, Clone, Default)]
pub struct CaptureHandle {
    cancel: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl CaptureHandle {
    pub fn abort(&self) {
        self.stop(StopReason::Aborted);
    }

    /// The host service was disconnected.
    pub fn disconnect(&self) {
        self.stop(StopReason::Disconnected);
    }

    pub fn stop(&self, reason: StopReason) {
        let _ = self.reason.set(reason);
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }
}

// ── CaptureService ───────────────────────────────────────────────

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No window was on screen.
    Skipped,
    /// The snapshot grew.
    Productive,
    /// The snapshot did not grow.
    Unproductive,
    /// This tick converged the capture.
    Converged,
    /// The capture had already ended.
    Finished,
}

/// Result of [`CaptureService::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureReport {
    pub article: Article,
    pub phase: CapturePhase,
    pub ticks: u32,
    pub scrolls: u32,
}

/// Drives one capture over a [`TreeProvider`].
pub struct CaptureService<P: TreeProvider> {
    provider: P,
    config: CaptureConfig,
    handle: CaptureHandle,
    phase: CapturePhase,
    snapshot: Snapshot,
    document: Document,
    title: Option<String>,
    title_taken: bool,
    unproductive: u32,
    ticks: u32,
    scrolls: u32,
}

impl<P: TreeProvider> CaptureService<P> {
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, CaptureConfig::default())
    }

    pub fn with_config(provider: P, config: CaptureConfig) -> Self {
        Self {
            provider,
            config,
            handle: CaptureHandle::default(),
            phase: CapturePhase::Idle,
            snapshot: Snapshot::new(),
            document: Document::new(),
            title: None,
            title_taken: false,
            unproductive: 0,
            ticks: 0,
            scrolls: 0,
        }
    }

    /// A cloneable handle that stops the capture from another task.
    pub fn handle(&self) -> CaptureHandle {
        self.handle.clone()
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Paragraphs of the finished run; empty until the capture ends.
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Scroll actions issued so far.
    pub fn scrolls(&self) -> u32 {
        self.scrolls
    }

    /// Run one snapshot + scroll cycle.
    pub fn tick(&mut self) -> TickOutcome {
        if self.phase.is_terminal() {
            return TickOutcome::Finished;
        }
        if let Some(reason) = self.handle.reason() {
            self.finish_stopped(reason);
            return TickOutcome::Finished;
        }
        if self.phase == CapturePhase::Idle {
            let _ = self.phase.begin();
            info!("capture started");
        }
        self.ticks += 1;

        let outcome = match self.provider.root() {
            None => {
                trace!(tick = self.ticks, "no active window");
                TickOutcome::Skipped
            }
            Some(root) => self.tick_with_root(root),
        };

        if !self.phase.is_terminal() && self.config.max_ticks.is_some_and(|max| self.ticks >= max) {
            self.converge("tick limit reached");
            return TickOutcome::Converged;
        }
        outcome
    }

    fn tick_with_root(&mut self, root: P::Node) -> TickOutcome {
        if !self.title_taken {
            self.title = self.provider.window_title();
            self.title_taken = true;
        }

        let grew = self.snapshot.capture(&root);
        if grew {
            self.unproductive = 0;
        } else {
            self.unproductive += 1;
        }
        if grew {
            debug!(tick = self.ticks, nodes = self.snapshot.len(), "productive tick");
        } else {
            debug!(tick = self.ticks, unproductive = self.unproductive, "unproductive tick");
        }
        for line in self.snapshot.dump_lines() {
            trace!("{line}");
        }

        if self.unproductive >= self.config.max_unproductive_ticks {
            self.converge("content stopped changing");
            return TickOutcome::Converged;
        }

        match find_scrollable(root) {
            Some(node) => {
                let moved = node.perform_action(NodeActions::SCROLL_FORWARD);
                self.scrolls += 1;
                trace!(moved, "scrolled forward");
            }
            None => {
                self.converge("nothing left to scroll");
                return TickOutcome::Converged;
            }
        }

        if grew {
            TickOutcome::Productive
        } else {
            TickOutcome::Unproductive
        }
    }

    /// Classify the snapshot as it stands into a fresh document.
    fn collect(&mut self) {
        let mut document = Document::new();
        collect_paragraphs(&self.snapshot, &mut document);
        self.document = document;
    }

    fn converge(&mut self, why: &str) {
        if self.phase.converge().is_ok() {
            self.collect();
            info!(
                why,
                ticks = self.ticks,
                paragraphs = self.document.len(),
                "capture converged"
            );
        }
    }

    fn finish_stopped(&mut self, reason: StopReason) {
        if self.phase.stop(reason).is_ok() {
            self.collect();
            info!(
                ?reason,
                ticks = self.ticks,
                paragraphs = self.document.len(),
                "capture stopped"
            );
        }
    }

    /// Tick until the capture converges or is stopped, then hand the article
    /// to `sink`.
    pub async fn run<S: PresentationSink>(mut self, sink: &mut S) -> CaptureReport {
        let cancel = self.handle.cancel.clone();

        loop {
            self.tick();
            if self.phase.is_terminal() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    let reason = self.handle.reason().unwrap_or(StopReason::Aborted);
                    self.finish_stopped(reason);
                    break;
                }
                _ = tokio::time::sleep(self.config.tick_interval) => {}
            }
        }

        let report = self.into_report();
        if !report.article.is_empty() {
            sink.present(&report.article);
        }
        report
    }

    /// Finish without ticking further.
    pub fn into_report(mut self) -> CaptureReport {
        if !self.phase.is_terminal() {
            self.collect();
        }
        CaptureReport {
            article: Article::new(self.title, self.document.into_paragraphs()),
            phase: self.phase,
            ticks: self.ticks,
            scrolls: self.scrolls,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{FixtureNode, FixtureProvider};

    fn fast() -> CaptureConfig {
        CaptureConfig {
            tick_interval: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn article_tree(n: usize) -> FixtureNode {
        let items = (0..n)
            .map(|i| {
                FixtureNode::frame()
                    .with_id(&format!("p{i}"))
                    .with_children(vec![FixtureNode::text_view(&format!("Paragraph {i}."))])
            })
            .collect();
        FixtureNode::frame().with_children(vec![FixtureNode::scroll_view().with_children(items)])
    }

    #[test]
    fn phase_transitions() {
        let mut phase = CapturePhase::default();
        assert!(phase.converge().is_err());
        phase.begin().unwrap();
        assert!(phase.begin().is_err());
        phase.converge().unwrap();
        assert!(phase.is_terminal());
        assert!(phase.stop(StopReason::Aborted).is_err());
        assert_eq!(phase.to_string(), "Converged");
    }

    #[test]
    fn converges_without_scrollable_node() {
        let tree = FixtureNode::frame().with_children(vec![FixtureNode::text_view("Hi")]);
        let mut service = CaptureService::with_config(FixtureProvider::new(tree), fast());

        assert_eq!(service.tick(), TickOutcome::Converged);
        assert_eq!(service.phase(), CapturePhase::Converged);
        assert_eq!(service.document().paragraphs(), ["Hi"]);
        assert_eq!(service.tick(), TickOutcome::Finished);
    }

    #[test]
    fn stops_scrolling_after_unproductive_ticks() {
        // Identical items produce identical keys, so scrolling never grows
        // the snapshot.
        let items = (0..50).map(|_| FixtureNode::text_view("Same")).collect();
        let tree = FixtureNode::scroll_view().with_children(items);
        let provider = FixtureProvider::new(tree).with_viewport(1, 1);
        let mut service = CaptureService::with_config(provider, fast());

        assert_eq!(service.tick(), TickOutcome::Productive);
        for _ in 0..4 {
            assert_eq!(service.tick(), TickOutcome::Unproductive);
        }
        assert_eq!(service.tick(), TickOutcome::Converged);
        assert_eq!(service.scrolls(), 5);

        for _ in 0..3 {
            assert_eq!(service.tick(), TickOutcome::Finished);
        }
        assert_eq!(service.scrolls(), 5);
    }

    #[test]
    fn scrolling_reveals_the_whole_article() {
        let provider = FixtureProvider::new(article_tree(10))
            .with_viewport(3, 2)
            .with_title("Long Read");
        let mut service = CaptureService::with_config(provider, fast());

        while !service.phase().is_terminal() {
            service.tick();
        }

        let report = service.into_report();
        assert_eq!(report.phase, CapturePhase::Converged);
        assert_eq!(report.article.title.as_deref(), Some("Long Read"));
        let expected: Vec<_> = (0..10).map(|i| format!("Paragraph {i}.")).collect();
        assert_eq!(report.article.paragraphs, expected);
    }

    #[test]
    fn recycled_list_slots_keep_paragraphs_apart() {
        let items = (0..6)
            .map(|i| FixtureNode::frame().with_children(vec![FixtureNode::text_view(&format!("Paragraph {i}."))]))
            .collect();
        let tree = FixtureNode::scroll_view().with_children(items);
        let provider = FixtureProvider::new(tree).with_viewport(2, 2);
        let mut service = CaptureService::with_config(provider, fast());

        while !service.phase().is_terminal() {
            service.tick();
        }

        let expected: Vec<_> = (0..6).map(|i| format!("Paragraph {i}.")).collect();
        assert_eq!(service.document().paragraphs(), expected.as_slice());
    }

    #[test]
    fn growing_paragraph_is_collected_once() {
        let runs = (0..4)
            .map(|i| FixtureNode::text_view(&format!("run{i} ")))
            .collect();
        let tree = FixtureNode::scroll_view().with_id("body").with_children(runs);
        let provider = FixtureProvider::new(tree).with_viewport(2, 2);
        let mut service = CaptureService::with_config(provider, fast());

        while !service.phase().is_terminal() {
            service.tick();
        }

        assert_eq!(service.document().len(), 1);
        let paragraph = &service.document().paragraphs()[0];
        for i in 0..4 {
            assert_eq!(paragraph.matches(&format!("run{i}")).count(), 1);
        }
    }

    #[test]
    fn missing_window_skips_tick() {
        let mut service = CaptureService::with_config(FixtureProvider::empty(), fast());
        assert_eq!(service.tick(), TickOutcome::Skipped);
        assert_eq!(service.phase(), CapturePhase::Capturing);
        assert!(service.title().is_none());
    }

    #[test]
    fn tick_limit_converges() {
        let config = CaptureConfig {
            max_ticks: Some(3),
            ..fast()
        };
        let mut service = CaptureService::with_config(FixtureProvider::empty(), config);
        assert_eq!(service.tick(), TickOutcome::Skipped);
        assert_eq!(service.tick(), TickOutcome::Skipped);
        assert_eq!(service.tick(), TickOutcome::Converged);
    }

    #[test]
    fn handle_stop_is_idempotent_first_reason_wins() {
        let service = CaptureService::new(FixtureProvider::empty());
        let handle = service.handle();
        handle.disconnect();
        handle.abort();
        handle.disconnect();
        assert!(handle.is_stopped());
        assert_eq!(handle.reason(), Some(StopReason::Disconnected));
    }

    #[test]
    fn stopped_before_tick_finishes_immediately() {
        let mut service = CaptureService::new(FixtureProvider::new(article_tree(3)));
        service.handle().abort();
        assert_eq!(service.tick(), TickOutcome::Finished);
        assert_eq!(service.phase(), CapturePhase::Aborted);
        assert!(service.document().is_empty());
    }

    #[tokio::test]
    async fn run_presents_converged_article() {
        let provider = FixtureProvider::new(article_tree(4)).with_viewport(2, 2);
        let service = CaptureService::with_config(provider, fast());

        let mut presented = Vec::new();
        let mut sink = |a: &Article| presented.push(a.clone());
        let report = service.run(&mut sink).await;

        assert_eq!(report.phase, CapturePhase::Converged);
        assert_eq!(presented.len(), 1);
        assert_eq!(presented[0].paragraphs.len(), 4);
    }

    #[tokio::test]
    async fn abort_finalizes_partial_article() {
        let config = CaptureConfig {
            tick_interval: Duration::from_secs(60),
            ..Default::default()
        };
        let provider = FixtureProvider::new(article_tree(10)).with_viewport(2, 2);
        let service = CaptureService::with_config(provider, config);
        let handle = service.handle();

        let task = tokio::spawn(async move {
            let mut sink = |_: &Article| {};
            service.run(&mut sink).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.abort();
        handle.abort();

        let report = task.await.unwrap();
        assert_eq!(report.phase, CapturePhase::Aborted);
        assert_eq!(report.ticks, 1);
        assert_eq!(report.article.paragraphs, vec!["Paragraph 0.", "Paragraph 1."]);
    }

    #[tokio::test]
    async fn empty_capture_skips_sink() {
        let tree = FixtureNode::frame();
        let service = CaptureService::with_config(FixtureProvider::new(tree), fast());
        let mut calls = 0;
        let mut sink = |_: &Article| calls += 1;
        let report = service.run(&mut sink).await;
        assert!(report.article.is_empty());
        assert_eq!(calls, 0);
    }
}
