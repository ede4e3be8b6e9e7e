//! The finished result of a capture run.

use chrono::NaiveDate;

/// Title used when the host exposed no window title.
pub const DEFAULT_TITLE: &str = "Untitled Article";

/// Character count of [`Article::preview`] before the ellipsis.
pub const PREVIEW_CHARS: usize = 100;

/// Reconstructed article text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Article {
    pub title: Option<String>,
    pub paragraphs: Vec<String>,
}

impl Article {
    pub fn new(title: Option<String>, paragraphs: Vec<String>) -> Self {
        Self { title, paragraphs }
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    /// Paragraphs joined with a blank line.
    pub fn text(&self) -> String {
        self.paragraphs.join("\n\n")
    }

    /// Title, or [`DEFAULT_TITLE`] when none was captured.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_TITLE)
    }

    /// First `limit` characters of the text, with `...` appended when cut.
    pub fn preview(&self, limit: usize) -> String {
        let text = self.text();
        if text.chars().count() <= limit {
            return text;
        }
        let mut head: String = text.chars().take(limit).collect();
        head.push_str("...");
        head
    }

    /// `"{yyyy-MM-dd} {title}.txt"`.
    pub fn suggested_file_name(&self, date: NaiveDate) -> String {
        format!("{} {}.txt", date.format("%Y-%m-%d"), self.display_title())
    }
}

/// Receives the article once a capture run ends.
///
/// Called only when at least one paragraph was captured.
pub trait PresentationSink {
    fn present(&mut self, article: &Article);
}

impl<F: FnMut(&Article)> PresentationSink for F {
    fn present(&mut self, article: &Article) {
        self(article)
    }
}
