//! Hello exchange and capability negotiation: the typed capability map,
//! its per-key merge policy, the authentication challenge/response
//! handshake, and the resulting session profile.

mod capabilities;
mod challenge;
mod hello;
mod resolver;

pub use capabilities::Capabilities;
pub use challenge::{Challenge, DigestAlgorithm};
pub use hello::{NegotiationError, SessionProfile};
pub use resolver::{HelloResolver, ResolutionPolicy};

pub use rdsp_wire::Value;
