pub mod audio;
pub mod config;
pub mod error;
pub mod functions;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-export commonly used items for convenience
pub use audio::{AudioFrame, BufferSink, OutboundAudio, Playback, PlaybackSink};
pub use config::{SessionOptions, VoiceChoice};
pub use error::{SessionError, SessionResult, TransportError, TransportResult};
pub use functions::{
    handler_fn, FunctionDescriptor, FunctionHandler, FunctionRegistry, InvocationBroker, ParamSpec,
    ParamType,
};
pub use protocol::{ClientEvent, ServerEvent};
pub use session::{Session, SessionEvent, SessionPhase};
pub use transport::{ChannelPeer, ChannelTransport, MessageTransport, TransportEvent, WebSocketTransport};
