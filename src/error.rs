use thiserror::Error;

/// Errors that can end or degrade a briefing.
#[derive(Debug, Error)]
pub enum BriefError {
    /// The authorization handshake failed or was denied.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// The access token expired and could not be refreshed.
    #[error("credential expired: {0}")]
    CredentialExpired(String),

    /// A downstream provider call failed (network, quota, malformed response).
    #[error("provider error: {0}")]
    Provider(String),

    /// Duplicate tool name, missing secret or otherwise unusable setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The step cap was reached without a terminal decision. Recorded on the
    /// partial brief rather than returned.
    #[error("step cap of {0} reached without a final answer")]
    LoopExceeded(usize),

    /// The decision process could not produce a decision.
    #[error("decision process failed: {0}")]
    Decision(String),
}

impl BriefError {
    /// Whether the error belongs in a tool's result instead of aborting the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BriefError::Provider(_))
    }

    /// Whether the session credential caused the error and must be dropped.
    pub fn clears_session(&self) -> bool {
        matches!(self, BriefError::CredentialExpired(_))
    }

    /// Non-technical text for the chat.
    pub fn user_message(&self) -> String {
        match self {
            BriefError::Authorization(_) => {
                "❌ Google authorization did not complete. Please try /connect again.".to_string()
            }
            BriefError::CredentialExpired(_) => {
                "🔑 Your Google session has expired. Please reconnect with /connect.".to_string()
            }
            BriefError::Provider(_) => {
                "⚠️ One of your Google services could not be reached. Please try again later."
                    .to_string()
            }
            BriefError::Configuration(detail) => {
                format!("⚙️ The assistant is misconfigured: {}", detail)
            }
            BriefError::LoopExceeded(_) => {
                "⏱️ The briefing was cut short; this is what was gathered so far.".to_string()
            }
            BriefError::Decision(_) => {
                "🤖 The language model is not available right now. Please try again later."
                    .to_string()
            }
        }
    }
}
