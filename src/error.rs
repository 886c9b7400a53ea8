use thiserror::Error;

pub type MusicResult<T> = Result<T, MusicError>;

#[derive(Debug, Error)]
pub enum MusicError {
    /// A lookup or search produced nothing usable, including a track without a playable stream.
    #[error("{0}")]
    NotFound(String),

    /// The input shape is not supported by the targeted platform.
    #[error("{0}")]
    InvalidInput(String),

    /// The remote service or helper process failed before answering.
    #[error("remote service error: {0}")]
    Remote(String),

    /// The output device refused an operation.
    #[error("output device error: {0}")]
    Device(String),

    /// An internal precondition was broken. Always an integration defect.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl MusicError {
    /// Text shown to the guild when a request fails.
    pub fn user_message(&self) -> String {
        match self {
            MusicError::NotFound(why) | MusicError::InvalidInput(why) => why.clone(),
            MusicError::Remote(_) => "The music service did not answer, try again later.".to_string(),
            MusicError::Device(_) | MusicError::InvariantViolation(_) => {
                "Something went wrong with the player.".to_string()
            }
        }
    }
}

impl From<reqwest::Error> for MusicError {
    fn from(error: reqwest::Error) -> Self {
        MusicError::Remote(error.to_string())
    }
}

impl From<serde_json::Error> for MusicError {
    fn from(error: serde_json::Error) -> Self {
        MusicError::Remote(format!("unexpected response: {error}"))
    }
}

impl From<std::io::Error> for MusicError {
    fn from(error: std::io::Error) -> Self {
        MusicError::Remote(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_keeps_lookup_failures_verbatim() {
        let error = MusicError::NotFound("No track matches \"abc\"".to_string());
        assert_eq!(error.user_message(), "No track matches \"abc\"");

        let error = MusicError::InvariantViolation("no voice connection".to_string());
        assert_eq!(error.user_message(), "Something went wrong with the player.");
    }

    #[test]
    fn io_errors_are_remote_failures() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "yt-dlp missing");
        assert!(matches!(MusicError::from(io), MusicError::Remote(_)));
    }
}
