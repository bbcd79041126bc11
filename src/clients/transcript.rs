//! 動画の文字起こし取得の境界と、取得結果の検証。
use std::fmt;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// これより短い文字起こしは要約・分類に回さない。
pub const MIN_TRANSCRIPT_CHARS: usize = 50;

/// 取得失敗のメッセージが本文として返ってきたことを示す語。
const ERROR_INDICATORS: &[&str] = &["error", "failed", "max retries", "ssl", "connection", "timeout"];

static VIDEO_ID_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([a-zA-Z0-9_-]{11})")
            .expect("compile watch/embed pattern"),
        Regex::new(r"youtube\.com/watch\?.*v=([a-zA-Z0-9_-]{11})")
            .expect("compile query pattern"),
        Regex::new(r"youtu\.be/([a-zA-Z0-9_-]{11})").expect("compile short link pattern"),
    ]
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("invalid video url: {0}")]
    InvalidUrl(String),
    #[error("transcript unavailable: {0}")]
    Unavailable(String),
    #[error("transcript extraction failed or transcript too short ({0} chars)")]
    TooShort(usize),
    #[error("transcript extraction failed due to network or access issues")]
    ContainsErrorMessage,
}

#[async_trait]
pub trait TranscriptSource: Send + Sync + fmt::Debug {
    async fn extract_transcript(&self, url: &str) -> Result<String, TranscriptError>;
}

/// URL から 11 文字の動画 ID を取り出す。
#[must_use]
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
}

/// 短すぎる文字起こしや、エラーメッセージらしき本文を弾く。
///
/// # Errors
/// 検証に通らない場合は [`TranscriptError`]。
pub fn validate_transcript(transcript: &str) -> Result<(), TranscriptError> {
    let length = transcript.chars().count();
    if length < MIN_TRANSCRIPT_CHARS {
        return Err(TranscriptError::TooShort(length));
    }
    let lowered = transcript.to_lowercase();
    if ERROR_INDICATORS
        .iter()
        .any(|indicator| lowered.contains(indicator))
    {
        return Err(TranscriptError::ContainsErrorMessage);
    }
    Ok(())
}

/// 文字起こしの取得先が設定されていない場合の既定実装。常に失敗する。
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableTranscriptSource;

#[async_trait]
impl TranscriptSource for UnavailableTranscriptSource {
    async fn extract_transcript(&self, url: &str) -> Result<String, TranscriptError> {
        let video_id = extract_video_id(url)
            .ok_or_else(|| TranscriptError::InvalidUrl(url.to_string()))?;
        Err(TranscriptError::Unavailable(format!(
            "no transcript provider is configured for video {video_id}"
        )))
    }
}
