use crate::quality::FrameRejection;

/// Failures surfaced by the gesture engines.
///
/// None of these corrupt state: the operation that failed leaves the
/// library, the working frame list and any practice/recognition session
/// exactly as they were.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("gesture name must not be empty")]
    EmptyName,

    #[error("no hand detected; make sure your hand is visible to the tracker")]
    NoHand,

    #[error("no sequence in progress; start one first")]
    NotRecording,

    #[error("a sequence for '{0}' is already in progress")]
    AlreadyRecording(String),

    #[error("sequence already holds {0} frames; finish or clear it")]
    SequenceFull(usize),

    #[error("no frames captured; nothing to save")]
    NothingCaptured,

    #[error(transparent)]
    Rejected(#[from] FrameRejection),

    #[error("frame quality {score:.0} below capture minimum {min:.0}")]
    LowQuality { score: f64, min: f64 },

    #[error("gesture not found: {0}")]
    NotFound(String),

    #[error("no gestures in the library")]
    EmptyLibrary,

    #[error("invalid dataset: {0}")]
    InvalidDataset(String),
}
