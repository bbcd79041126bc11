pub mod dataset;
pub mod orchestrator;

pub use dataset::{DatasetRow, DatasetStore, contains_transcript};
pub use orchestrator::{RetrainOrchestrator, RetrainStage, SampleSubmission, SubmitOutcome};
