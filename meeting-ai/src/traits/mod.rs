pub mod generation;
pub mod transcription;
