pub mod summarizer;
pub mod transcript;

pub use summarizer::{ExtractiveSummarizer, Summarizer};
pub use transcript::{
    TranscriptError, TranscriptSource, UnavailableTranscriptSource, extract_video_id,
    validate_transcript,
};
