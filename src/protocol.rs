//! Wire vocabulary for the voice-conversation channel.
//!
//! All messages are JSON objects tagged by a `type` field and carried over a
//! persistent named-message channel. The concrete framing (WebSocket text
//! frames, heartbeats, reconnect policy) belongs to the transport layer; this
//! module only defines the payloads.
//!
//! Client events (sent to the server):
//! - `start` - begin a session: auth key, instructions, voice, functions
//! - `stop` - end the active session
//! - `audio_chunk` - one encoded capture frame with presence metadata
//! - `invocation_result` - result for a remote function invocation
//!
//! Server events (received from the server):
//! - `auth_succeeded` / `auth_failed` - outcome of authentication
//! - `session_ready` - the session is live, audio may flow
//! - `session_ended` - the session is over, with optional usage totals
//! - `text_update` - incremental assistant text
//! - `audio_chunk` - one encoded synthesized-audio frame
//! - `invocation_requested` - the model asks to run a local function
//! - `error` - server-signaled runtime error

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::functions::FunctionDescriptor;

/// Messages emitted by this client toward the remote side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Begin a session
    Start {
        /// Authentication key
        auth_key: String,
        /// System instructions for the assistant
        instructions: String,
        /// Voice selection for synthesized audio
        voice: String,
        /// Complete set of locally available functions
        functions: Vec<FunctionDescriptor>,
    },

    /// End the active session
    Stop,

    /// One frame of captured audio
    AudioChunk {
        /// Base64-encoded PCM16-LE payload
        audio: String,
        /// Advisory presence hint: the frame likely contains signal
        has_audio: bool,
        /// Peak normalized amplitude across the frame, 0.0 to 1.0
        max_amplitude: f32,
    },

    /// Result of a local function invocation
    InvocationResult {
        /// Call identifier this result answers
        call_id: String,
        /// Name of the invoked function
        function_name: String,
        /// Structured result payload, including a `status` field
        result: Value,
    },
}

/// Messages received from the remote side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Authentication accepted; the session is not yet live
    AuthSucceeded {
        /// Server-authoritative credit balance
        credits_remaining: f64,
    },

    /// Authentication rejected
    AuthFailed {
        /// Failure reason supplied by the server
        reason: String,
        /// Credit balance, if the server reports one
        #[serde(skip_serializing_if = "Option::is_none")]
        credits_remaining: Option<f64>,
    },

    /// The session is live; audio and invocations may flow
    SessionReady {
        /// Advisory cost per minute of conversation
        cost_per_minute: f64,
        /// Number of function descriptors the server accepted
        functions_loaded: u32,
        /// Informational message
        message: String,
    },

    /// The session is over
    SessionEnded {
        /// Reason the session ended
        reason: String,
        /// Credits consumed by the session, if reported
        #[serde(skip_serializing_if = "Option::is_none")]
        total_credits_used: Option<f64>,
        /// Remaining balance, if reported
        #[serde(skip_serializing_if = "Option::is_none")]
        remaining_credits: Option<f64>,
    },

    /// Incremental assistant text
    TextUpdate {
        /// Text content
        text: String,
    },

    /// One frame of synthesized audio
    AudioChunk {
        /// Base64-encoded PCM16-LE payload
        audio: String,
    },

    /// The model requests execution of a local function
    InvocationRequested {
        /// Name of the function to execute
        function_name: String,
        /// Argument mapping
        arguments: Value,
        /// Opaque call identifier correlating the eventual result
        call_id: String,
    },

    /// Server-signaled runtime error (rate limiting, credit exhaustion, ...)
    Error {
        /// Machine-readable error category
        error_type: String,
        /// Human-readable message
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::ParamType;
    use serde_json::json;

    #[test]
    fn test_start_serialization() {
        let desc = FunctionDescriptor::new("getWeather", "Fetch weather").with_param(
            "city",
            ParamType::String,
            true,
            "City name",
        );
        let event = ClientEvent::Start {
            auth_key: "key1".to_string(),
            instructions: "assistant".to_string(),
            voice: "female".to_string(),
            functions: vec![desc],
        };

        let json = serde_json::to_string(&event).expect("Should serialize");
        assert!(json.contains(r#""type":"start""#));
        assert!(json.contains(r#""auth_key":"key1""#));
        assert!(json.contains(r#""name":"getWeather""#));
    }

    #[test]
    fn test_audio_chunk_round_trip() {
        let event = ClientEvent::AudioChunk {
            audio: "AAAA".to_string(),
            has_audio: true,
            max_amplitude: 0.5,
        };

        let json = serde_json::to_string(&event).expect("Should serialize");
        assert!(json.contains(r#""has_audio":true"#));

        match serde_json::from_str(&json).expect("Should deserialize") {
            ClientEvent::AudioChunk {
                audio,
                has_audio,
                max_amplitude,
            } => {
                assert_eq!(audio, "AAAA");
                assert!(has_audio);
                assert_eq!(max_amplitude, 0.5);
            }
            _ => panic!("Expected AudioChunk variant"),
        }
    }

    #[test]
    fn test_server_event_deserialization() {
        let json = r#"{"type":"session_ready","cost_per_minute":1.0,"functions_loaded":1,"message":"ready"}"#;
        match serde_json::from_str(json).expect("Should deserialize") {
            ServerEvent::SessionReady {
                cost_per_minute,
                functions_loaded,
                message,
            } => {
                assert_eq!(cost_per_minute, 1.0);
                assert_eq!(functions_loaded, 1);
                assert_eq!(message, "ready");
            }
            _ => panic!("Expected SessionReady variant"),
        }
    }

    #[test]
    fn test_session_ended_optional_fields() {
        let json = r#"{"type":"session_ended","reason":"client stop"}"#;
        match serde_json::from_str(json).expect("Should deserialize") {
            ServerEvent::SessionEnded {
                reason,
                total_credits_used,
                remaining_credits,
            } => {
                assert_eq!(reason, "client stop");
                assert!(total_credits_used.is_none());
                assert!(remaining_credits.is_none());
            }
            _ => panic!("Expected SessionEnded variant"),
        }
    }

    #[test]
    fn test_invocation_requested_deserialization() {
        let json = r#"{"type":"invocation_requested","function_name":"getWeather","arguments":{"city":"Paris"},"call_id":"call-1"}"#;
        match serde_json::from_str(json).expect("Should deserialize") {
            ServerEvent::InvocationRequested {
                function_name,
                arguments,
                call_id,
            } => {
                assert_eq!(function_name, "getWeather");
                assert_eq!(arguments, json!({"city": "Paris"}));
                assert_eq!(call_id, "call-1");
            }
            _ => panic!("Expected InvocationRequested variant"),
        }
    }

    #[test]
    fn test_unknown_event_rejected() {
        let json = r#"{"type":"no_such_event"}"#;
        assert!(serde_json::from_str::<ServerEvent>(json).is_err());
    }
}
