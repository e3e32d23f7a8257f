//! Session configuration.
//!
//! [`SessionOptions`] carries everything transmitted in the start message:
//! the authentication key, system instructions, voice selection and the
//! function descriptor set. Options are fixed for the lifetime of a session.

use serde::{Deserialize, Serialize};

/// Environment variable holding the authentication key.
pub const ENV_API_KEY: &str = "VOICEWIRE_API_KEY";

/// Environment variable overriding the system instructions.
pub const ENV_INSTRUCTIONS: &str = "VOICEWIRE_INSTRUCTIONS";

/// Environment variable overriding the voice selection.
pub const ENV_VOICE: &str = "VOICEWIRE_VOICE";

/// Default system instructions when none are configured.
const DEFAULT_INSTRUCTIONS: &str = "You are a helpful voice assistant.";

// =============================================================================
// Voices
// =============================================================================

/// Voice selection for synthesized audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceChoice {
    /// Female voice (default)
    #[default]
    Female,
    /// Male voice
    Male,
    /// Neutral voice
    Neutral,
}

impl VoiceChoice {
    /// Convert to the wire parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Female => "female",
            Self::Male => "male",
            Self::Neutral => "neutral",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "female" => Self::Female,
            "male" => Self::Male,
            "neutral" => Self::Neutral,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for VoiceChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Session options
// =============================================================================

/// Configuration for one session attempt.
///
/// The function descriptor set is not part of the options; it comes from the
/// [`FunctionRegistry`](crate::functions::FunctionRegistry) the session is
/// built with, which is the single source of truth for local capabilities.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Authentication key presented in the start message
    pub auth_key: String,
    /// System instructions for the assistant
    pub instructions: String,
    /// Voice selection
    pub voice: VoiceChoice,
}

impl SessionOptions {
    /// Create options with the given authentication key and default
    /// instructions and voice.
    pub fn new(auth_key: impl Into<String>) -> Self {
        Self {
            auth_key: auth_key.into(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            ..Default::default()
        }
    }

    /// Set the system instructions.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Set the voice selection.
    pub fn with_voice(mut self, voice: VoiceChoice) -> Self {
        self.voice = voice;
        self
    }

    /// Load options from the environment.
    ///
    /// Reads a `.env` file if present, then `VOICEWIRE_API_KEY` (required),
    /// `VOICEWIRE_INSTRUCTIONS` and `VOICEWIRE_VOICE` (optional).
    pub fn from_env() -> Result<Self, crate::error::SessionError> {
        let _ = dotenvy::dotenv();

        let auth_key = std::env::var(ENV_API_KEY).map_err(|_| {
            crate::error::SessionError::InvalidRequest(format!("{ENV_API_KEY} is not set"))
        })?;

        let mut options = Self::new(auth_key);
        if let Ok(instructions) = std::env::var(ENV_INSTRUCTIONS) {
            options.instructions = instructions;
        }
        if let Ok(voice) = std::env::var(ENV_VOICE) {
            options.voice = VoiceChoice::from_str_or_default(&voice);
        }
        Ok(options)
    }
}
