//! Lets a connection switch its preferred picture encoding and quality/speed
//! tunables after hello, without renegotiating capabilities.

use rdsp_session::{ConnectionSource, HandleFuture, Packet, Subsystem, SubsystemError};

use crate::args::{str_arg, ArgError};

const SUBSYSTEM: &str = "encoding";

#[derive(Debug, Clone, Default)]
pub struct EncodingConnectionState {
    pub current: Option<String>,
    pub quality: Option<i64>,
    pub speed: Option<i64>,
}

pub struct EncodingSubsystem;

impl Subsystem for EncodingSubsystem {
    fn packet_types(&self) -> &'static [&'static str] {
        &["encoding"]
    }

    fn capability_prefix(&self) -> &'static str {
        "encodings"
    }

    fn handle<'a>(&'a self, source: &'a mut ConnectionSource, packet: Packet) -> HandleFuture<'a> {
        Box::pin(async move {
            let name = str_arg(&packet.args, 0, "encoding").map_err(arg_err)?;
            let quality = packet.args.get(1).and_then(rdsp_wire::Value::as_int);
            let speed = packet.args.get(2).and_then(rdsp_wire::Value::as_int);

            let state = source.subsystem_state_mut::<EncodingConnectionState>();
            state.current = Some(name.to_string());
            if quality.is_some() {
                state.quality = quality;
            }
            if speed.is_some() {
                state.speed = speed;
            }
            Ok(())
        })
    }
}

fn arg_err(err: ArgError) -> SubsystemError {
    SubsystemError::recoverable(SUBSYSTEM, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdsp_session::SessionId;
    use rdsp_wire::Value;

    #[tokio::test]
    async fn switching_encoding_preserves_prior_quality_when_omitted() {
        let subsystem = EncodingSubsystem;
        let (transport, _peer) = rdsp_wire::Transport::mem_pair();
        let mut source = ConnectionSource::new(SessionId(1), transport);

        subsystem
            .handle(&mut source, Packet::new("encoding", vec![Value::Str("h264".into()), Value::Int(80)]))
            .await
            .unwrap();
        subsystem
            .handle(&mut source, Packet::new("encoding", vec![Value::Str("jpeg".into())]))
            .await
            .unwrap();

        let state = source.subsystem_state::<EncodingConnectionState>().unwrap();
        assert_eq!(state.current.as_deref(), Some("jpeg"));
        assert_eq!(state.quality, Some(80));
    }
}
