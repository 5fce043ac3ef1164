//! Forwards client-side log records into this process's own tracing
//! output, tagged so they're distinguishable from the server's own events.

use rdsp_session::{ConnectionSource, HandleFuture, Packet, Subsystem, SubsystemError};
use tracing::{debug, error, info, warn};

use crate::args::{int_arg, str_arg, ArgError};

const SUBSYSTEM: &str = "logging";

pub struct LoggingSubsystem;

impl Subsystem for LoggingSubsystem {
    fn packet_types(&self) -> &'static [&'static str] {
        &["logging"]
    }

    fn capability_prefix(&self) -> &'static str {
        "logging"
    }

    fn handle<'a>(&'a self, _source: &'a mut ConnectionSource, packet: Packet) -> HandleFuture<'a> {
        Box::pin(async move {
            let level = int_arg(&packet.args, 0, "level").map_err(arg_err)?;
            let message = str_arg(&packet.args, 1, "message").map_err(arg_err)?;
            match level {
                n if n >= 40 => error!(peer = true, "{message}"),
                30..=39 => warn!(peer = true, "{message}"),
                20..=29 => info!(peer = true, "{message}"),
                _ => debug!(peer = true, "{message}"),
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
    async fn forwards_a_well_formed_record() {
        let subsystem = LoggingSubsystem;
        let (transport, _peer) = rdsp_wire::Transport::mem_pair();
        let mut source = ConnectionSource::new(SessionId(1), transport);

        let result = subsystem
            .handle(&mut source, Packet::new("logging", vec![Value::Int(30), Value::Str("disk low".into())]))
            .await;
        assert!(result.is_ok());
    }
}
