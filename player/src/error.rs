use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    /// The file or camera could not be opened; playback never starts.
    #[error("failed to open {target}: {reason}")]
    SourceOpen { target: String, reason: String },

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("terminal I/O failed: {0}")]
    Terminal(#[from] std::io::Error),
}
