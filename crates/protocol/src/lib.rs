//! Wire protocol types for chatline client-server messaging.
//!
//! Defines the JSON envelope every realtime message travels in, the
//! message type discriminators, and the typed payloads for the chat,
//! voice, and image message kinds.

pub mod constants;
pub mod envelope;
pub mod messages;

// Re-export primary types for convenience.
pub use constants::MessageType;
pub use envelope::{Envelope, EnvelopeError};
pub use messages::{AudioPayload, Detection, DetectionPayload, ImagePayload, TextPayload};
