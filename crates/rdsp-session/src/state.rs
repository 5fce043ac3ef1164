//! Per-connection lifecycle state machine: which packet types may cross the
//! wire in each direction before a session reaches `Ready`, independent of
//! which subsystems are enabled.

/// Lifecycle of a single connection. Only `New` and `Auth` restrict inbound
/// and outbound packets by a fixed name list; `Ready` defers entirely to the
/// subsystem registry and the negotiated capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    New,
    Auth,
    Ready,
    Closing,
    Closed,
}

impl ConnectionState {
    /// Whether `packet_type` may be received while in this state.
    pub fn allowed_inbound(self, packet_type: &str) -> bool {
        match self {
            ConnectionState::New => packet_type == "hello",
            ConnectionState::Auth => matches!(packet_type, "hello" | "disconnect"),
            ConnectionState::Ready => true,
            ConnectionState::Closing | ConnectionState::Closed => false,
        }
    }

    /// Whether a *fresh* enqueue of `packet_type` is permitted while in this
    /// state. `Closing` never accepts new enqueues — whatever was already
    /// queued still drains via `OutboundWriter::drain_and_close`.
    pub fn allowed_outbound(self, packet_type: &str) -> bool {
        match self {
            ConnectionState::New => matches!(packet_type, "hello" | "challenge" | "disconnect"),
            ConnectionState::Auth => matches!(packet_type, "challenge" | "disconnect"),
            ConnectionState::Ready => true,
            ConnectionState::Closing | ConnectionState::Closed => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_only_accepts_hello_inbound() {
        assert!(ConnectionState::New.allowed_inbound("hello"));
        assert!(!ConnectionState::New.allowed_inbound("pointer-position"));
    }

    #[test]
    fn auth_accepts_hello_response_or_disconnect() {
        assert!(ConnectionState::Auth.allowed_inbound("hello"));
        assert!(ConnectionState::Auth.allowed_inbound("disconnect"));
        assert!(!ConnectionState::Auth.allowed_inbound("key-action"));
    }

    #[test]
    fn ready_accepts_anything_by_name() {
        assert!(ConnectionState::Ready.allowed_inbound("whatever-subsystems-registered"));
    }

    #[test]
    fn closing_and_closed_accept_nothing() {
        assert!(!ConnectionState::Closing.allowed_inbound("hello"));
        assert!(!ConnectionState::Closed.allowed_outbound("disconnect"));
    }
}
