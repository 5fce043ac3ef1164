//! Webcam forwarding: tracks which device ids are currently streaming so
//! stray frame/ack packets for a device that was never started are caught.

use std::collections::HashSet;

use rdsp_session::{ConnectionSource, HandleFuture, Packet, Subsystem, SubsystemError};
use tracing::warn;

use crate::args::{int_arg, ArgError};

const SUBSYSTEM: &str = "webcam";

#[derive(Debug, Default)]
pub struct WebcamConnectionState {
    active_devices: HashSet<i64>,
}

impl WebcamConnectionState {
    pub fn is_active(&self, device_id: i64) -> bool {
        self.active_devices.contains(&device_id)
    }
}

pub struct WebcamSubsystem;

impl Subsystem for WebcamSubsystem {
    fn packet_types(&self) -> &'static [&'static str] {
        &["webcam-start", "webcam-stop", "webcam-ack", "webcam-frame"]
    }

    fn capability_prefix(&self) -> &'static str {
        "webcam"
    }

    fn handle<'a>(&'a self, source: &'a mut ConnectionSource, packet: Packet) -> HandleFuture<'a> {
        Box::pin(async move {
            let device_id = int_arg(&packet.args, 0, "device_id").map_err(arg_err)?;
            let state = source.subsystem_state_mut::<WebcamConnectionState>();
            match packet.packet_type.as_str() {
                "webcam-start" => {
                    state.active_devices.insert(device_id);
                }
                "webcam-stop" => {
                    state.active_devices.remove(&device_id);
                }
                "webcam-ack" | "webcam-frame" => {
                    if !state.active_devices.contains(&device_id) {
                        warn!(device_id, packet_type = %packet.packet_type, "webcam packet for a device that was never started");
                    }
                }
                other => unreachable!("unregistered packet type routed to webcam subsystem: {other}"),
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
    async fn start_then_stop_clears_active_device() {
        let subsystem = WebcamSubsystem;
        let (transport, _peer) = rdsp_wire::Transport::mem_pair();
        let mut source = ConnectionSource::new(SessionId(1), transport);

        subsystem.handle(&mut source, Packet::new("webcam-start", vec![Value::Int(0)])).await.unwrap();
        assert!(source.subsystem_state::<WebcamConnectionState>().unwrap().is_active(0));

        subsystem.handle(&mut source, Packet::new("webcam-stop", vec![Value::Int(0)])).await.unwrap();
        assert!(!source.subsystem_state::<WebcamConnectionState>().unwrap().is_active(0));
    }
}
