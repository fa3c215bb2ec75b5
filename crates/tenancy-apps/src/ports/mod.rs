//! Ports module (Hexagonal Architecture)
//!
//! Inbound: the operations a transport layer calls.
//! Outbound: the collaborators the engine consumes.

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
