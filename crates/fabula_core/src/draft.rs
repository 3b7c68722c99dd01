//! Story draft types.

use serde::{Deserialize, Serialize};

/// One generated chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// 1-based chapter number
    pub chapter: u32,
    /// Chapter prose
    pub text: String,
}

impl Chapter {
    /// Word count of the chapter text.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// A generated story draft, sanitized before evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StoryDraft {
    /// Story title
    pub title: String,
    /// One-paragraph description for listings
    pub description: String,
    /// Ordered chapters
    pub chapters: Vec<Chapter>,
}

impl StoryDraft {
    /// Total word count across all chapters.
    pub fn total_word_count(&self) -> usize {
        self.chapters.iter().map(Chapter::word_count).sum()
    }

    /// The text of a 1-based chapter, if present.
    pub fn chapter_text(&self, chapter: u32) -> Option<&str> {
        self.chapters
            .iter()
            .find(|c| c.chapter == chapter)
            .map(|c| c.text.as_str())
    }
}
