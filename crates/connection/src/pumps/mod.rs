//! Per-connection background tasks. Each live transport owns a read
//! pump, a write pump, and a heartbeat pump, all tied to one
//! cancellation token.

pub(crate) mod heartbeat;
pub(crate) mod read;
pub(crate) mod write;
