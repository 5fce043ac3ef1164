//! A narrow request/response exec channel: `command-request` names a
//! server-side action by id, `command-response` must echo that id exactly
//! once.

use std::collections::HashSet;

use rdsp_session::{ConnectionSource, HandleFuture, Packet, Subsystem, SubsystemError};
use tracing::warn;

use crate::args::{int_arg, str_arg, ArgError};

const SUBSYSTEM: &str = "command";

#[derive(Debug, Default)]
pub struct CommandConnectionState {
    pending: HashSet<i64>,
}

pub struct CommandSubsystem;

impl Subsystem for CommandSubsystem {
    fn packet_types(&self) -> &'static [&'static str] {
        &["command-request", "command-response"]
    }

    fn capability_prefix(&self) -> &'static str {
        "command"
    }

    fn handle<'a>(&'a self, source: &'a mut ConnectionSource, packet: Packet) -> HandleFuture<'a> {
        Box::pin(async move {
            let id = int_arg(&packet.args, 0, "id").map_err(arg_err)?;
            let state = source.subsystem_state_mut::<CommandConnectionState>();
            match packet.packet_type.as_str() {
                "command-request" => {
                    let _name = str_arg(&packet.args, 1, "name").map_err(arg_err)?;
                    if !state.pending.insert(id) {
                        warn!(id, "command-request id reused before its previous response");
                    }
                }
                "command-response" => {
                    if !state.pending.remove(&id) {
                        warn!(id, "command-response for unknown or already-answered request");
                    }
                }
                other => unreachable!("unregistered packet type routed to command subsystem: {other}"),
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
    async fn request_then_response_clears_pending() {
        let subsystem = CommandSubsystem;
        let (transport, _peer) = rdsp_wire::Transport::mem_pair();
        let mut source = ConnectionSource::new(SessionId(1), transport);

        subsystem
            .handle(&mut source, Packet::new("command-request", vec![Value::Int(1), Value::Str("restart".into())]))
            .await
            .unwrap();
        assert_eq!(source.subsystem_state::<CommandConnectionState>().unwrap().pending.len(), 1);

        subsystem
            .handle(&mut source, Packet::new("command-response", vec![Value::Int(1)]))
            .await
            .unwrap();
        assert_eq!(source.subsystem_state::<CommandConnectionState>().unwrap().pending.len(), 0);
    }
}
