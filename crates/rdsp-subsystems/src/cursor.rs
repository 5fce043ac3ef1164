//! Cursor shape updates: an empty payload means "use the platform default
//! cursor", anything else carries the new shape's bytes.

use rdsp_session::{ConnectionSource, HandleFuture, Packet, Subsystem, SubsystemError};
use rdsp_wire::Value;

#[derive(Debug, Clone, Default)]
pub struct CursorConnectionState {
    pub shape: Option<Vec<u8>>,
}

pub struct CursorSubsystem;

impl Subsystem for CursorSubsystem {
    fn packet_types(&self) -> &'static [&'static str] {
        &["cursor"]
    }

    fn capability_prefix(&self) -> &'static str {
        "cursor"
    }

    fn handle<'a>(&'a self, source: &'a mut ConnectionSource, packet: Packet) -> HandleFuture<'a> {
        Box::pin(async move {
            let shape = match packet.args.first() {
                Some(Value::Bytes(b)) if !b.is_empty() => Some(b.clone()),
                _ => None,
            };
            source.subsystem_state_mut::<CursorConnectionState>().shape = shape;
            Ok::<(), SubsystemError>(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdsp_session::SessionId;

    #[tokio::test]
    async fn empty_payload_resets_to_default_cursor() {
        let subsystem = CursorSubsystem;
        let (transport, _peer) = rdsp_wire::Transport::mem_pair();
        let mut source = ConnectionSource::new(SessionId(1), transport);

        subsystem.handle(&mut source, Packet::new("cursor", vec![Value::Bytes(vec![1, 2])])).await.unwrap();
        assert!(source.subsystem_state::<CursorConnectionState>().unwrap().shape.is_some());

        subsystem.handle(&mut source, Packet::new("cursor", vec![Value::Bytes(vec![])])).await.unwrap();
        assert!(source.subsystem_state::<CursorConnectionState>().unwrap().shape.is_none());
    }
}
