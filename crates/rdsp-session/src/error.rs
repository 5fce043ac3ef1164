use crate::state::ConnectionState;

/// Shared session-level error, wrapping the crate-local error enums each
/// layer raises, mirroring the teacher's layered `RpcError` pattern.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] rdsp_wire::WireError),
    #[error(transparent)]
    Negotiation(#[from] rdsp_proto::NegotiationError),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("packet type {packet_type:?} is not allowed while the connection is {state:?}")]
    StateViolation {
        state: ConnectionState,
        packet_type: String,
    },
    #[error("no subsystem is registered for packet type {0:?}")]
    UnknownPacketType(String),
    #[error(transparent)]
    Subsystem(#[from] SubsystemError),
}

/// A subsystem handler's failure. `fatal` mirrors the distilled contract:
/// a non-fatal error is logged and the connection survives; a fatal one
/// tears the connection down.
#[derive(Debug)]
pub struct SubsystemError {
    pub subsystem: &'static str,
    pub fatal: bool,
    pub source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl SubsystemError {
    pub fn new(
        subsystem: &'static str,
        fatal: bool,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            subsystem,
            fatal,
            source: Box::new(source),
        }
    }

    pub fn recoverable(subsystem: &'static str, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(subsystem, false, source)
    }

    pub fn fatal(subsystem: &'static str, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(subsystem, true, source)
    }
}

impl std::fmt::Display for SubsystemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subsystem {} failed: {}", self.subsystem, self.source)
    }
}

impl std::error::Error for SubsystemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
