//! Per-connection advisory bandwidth limit: other subsystems (encoding,
//! window) consult this when choosing quality, but nothing here enforces
//! it at the transport level.

use rdsp_session::{ConnectionSource, HandleFuture, Packet, Subsystem, SubsystemError};

use crate::args::{int_arg, ArgError};

const SUBSYSTEM: &str = "bandwidth";

#[derive(Debug, Clone, Copy, Default)]
pub struct BandwidthConnectionState {
    /// `None` means no limit has been advertised yet.
    pub limit_bytes_per_second: Option<i64>,
}

pub struct BandwidthSubsystem;

impl Subsystem for BandwidthSubsystem {
    fn packet_types(&self) -> &'static [&'static str] {
        &["bandwidth-limit"]
    }

    fn capability_prefix(&self) -> &'static str {
        "bandwidth"
    }

    fn handle<'a>(&'a self, source: &'a mut ConnectionSource, packet: Packet) -> HandleFuture<'a> {
        Box::pin(async move {
            let limit = int_arg(&packet.args, 0, "bytes_per_second").map_err(arg_err)?;
            source.subsystem_state_mut::<BandwidthConnectionState>().limit_bytes_per_second = Some(limit);
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
    async fn stores_the_advertised_limit() {
        let subsystem = BandwidthSubsystem;
        let (transport, _peer) = rdsp_wire::Transport::mem_pair();
        let mut source = ConnectionSource::new(SessionId(1), transport);

        subsystem
            .handle(&mut source, Packet::new("bandwidth-limit", vec![Value::Int(1_000_000)]))
            .await
            .unwrap();

        assert_eq!(
            source.subsystem_state::<BandwidthConnectionState>().unwrap().limit_bytes_per_second,
            Some(1_000_000)
        );
    }
}
