//! Outbound word filter.
//!
//! Replaces configured words with asterisks in every text leaf. The pipeline
//! rebuilds the message tree instead of mutating it and appends a visible
//! notice leaf when anything was altered.

use botlink_core::protocol::Message;

/// Notice appended (wrapped in a new chain) when the filter changed content.
pub const FILTER_NOTICE: &str = "\n<已经过关键词过滤>";

pub struct WordFilter {
    words: Vec<String>,
}

impl WordFilter {
    pub fn new(words: Vec<String>) -> Self {
        Self {
            words: words.into_iter().filter(|w| !w.is_empty()).collect(),
        }
    }

    /// Substitute every configured word. Sets `filtered` when text changed.
    pub fn filter_text(&self, text: &str, filtered: &mut bool) -> String {
        let mut out = text.to_string();
        for word in &self.words {
            if out.contains(word.as_str()) {
                out = out.replace(word.as_str(), &"*".repeat(word.chars().count()));
                *filtered = true;
            }
        }
        out
    }

    /// Rebuild a message with all text leaves passed through the filter.
    /// Returns the rebuilt message and whether anything was altered.
    pub fn filter_message(&self, message: &Message) -> (Message, bool) {
        let mut filtered = false;
        let rebuilt = self.rebuild(message, &mut filtered);
        (rebuilt, filtered)
    }

    fn rebuild(&self, message: &Message, filtered: &mut bool) -> Message {
        match message {
            Message::Text { text } => Message::Text {
                text: self.filter_text(text, filtered),
            },
            Message::Chain { items } => Message::chain(
                items.iter().map(|m| self.rebuild(m, filtered)).collect(),
            ),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_words_with_stars() {
        let filter = WordFilter::new(vec!["bomb".into()]);
        let mut hit = false;
        assert_eq!(filter.filter_text("a bomb here", &mut hit), "a **** here");
        assert!(hit);
    }

    #[test]
    fn clean_text_is_untouched() {
        let filter = WordFilter::new(vec!["bomb".into()]);
        let mut hit = false;
        assert_eq!(filter.filter_text("all quiet", &mut hit), "all quiet");
        assert!(!hit);
    }

    #[test]
    fn rebuilds_nested_chains_without_mutating_original() {
        let filter = WordFilter::new(vec!["xx".into()]);
        let original = Message::chain(vec![
            Message::text("xx"),
            Message::chain(vec![Message::text("deep xx")]),
            Message::Image { url: "u".into() },
        ]);
        let (rebuilt, hit) = filter.filter_message(&original);
        assert!(hit);
        assert_eq!(rebuilt.plain_text(), "**deep **");
        assert_eq!(original.plain_text(), "xxdeep xx");
    }
}
