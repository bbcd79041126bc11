/// Summarizer - 文字起こしから分類用の要約を作る境界。
use std::fmt;

use async_trait::async_trait;

use crate::util::text::{postprocess_summary, split_sentences};

/// 生成モデルを使わない場合の要約上限（文字数）。
pub const DEFAULT_SUMMARY_CHARS: usize = 200;

#[async_trait]
pub trait Summarizer: Send + Sync + fmt::Debug {
    async fn summarize(&self, text: &str) -> anyhow::Result<String>;
}

/// 先頭から文単位で切り出す抽出型の要約。
///
/// 1文目すら収まらない場合は文字数で切り詰め、いずれの場合も切り詰めたら `...` を付ける。
#[derive(Debug, Clone, Copy)]
pub struct ExtractiveSummarizer {
    max_chars: usize,
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new(DEFAULT_SUMMARY_CHARS)
    }
}

impl ExtractiveSummarizer {
    #[must_use]
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    #[must_use]
    pub fn summarize_sync(&self, text: &str) -> String {
        let text = postprocess_summary(text);
        if text.chars().count() <= self.max_chars {
            return text;
        }

        let mut selected: Vec<String> = Vec::new();
        let mut used = 0;
        for sentence in split_sentences(&text) {
            let length = sentence.chars().count() + usize::from(!selected.is_empty());
            if used + length > self.max_chars {
                break;
            }
            used += length;
            selected.push(sentence);
        }

        if selected.is_empty() {
            let head: String = text.chars().take(self.max_chars).collect();
            return format!("{}...", head.trim_end());
        }
        format!("{}...", selected.join(" "))
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, text: &str) -> anyhow::Result<String> {
        Ok(self.summarize_sync(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_returned_as_is() {
        let summarizer = ExtractiveSummarizer::default();
        assert_eq!(summarizer.summarize_sync("Rates held steady ."), "Rates held steady.");
    }

    #[test]
    fn long_text_keeps_whole_sentences() {
        let summarizer = ExtractiveSummarizer::new(50);
        let text = "The team won the cup. Fans celebrated downtown. Police closed several streets overnight.";
        assert_eq!(
            summarizer.summarize_sync(text),
            "The team won the cup. Fans celebrated downtown...."
        );
    }

    #[test]
    fn oversized_first_sentence_is_truncated_by_chars() {
        let summarizer = ExtractiveSummarizer::new(10);
        assert_eq!(
            summarizer.summarize_sync("Parliament passed the budget bill after a long debate"),
            "Parliament..."
        );
    }
}
