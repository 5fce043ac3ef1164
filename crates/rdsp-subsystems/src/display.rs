//! Desktop-level state: show-desktop toggling and the negotiated/resized
//! desktop dimensions.

use rdsp_session::{ConnectionSource, HandleFuture, Packet, Subsystem, SubsystemError};

use crate::args::{bool_arg, int_arg, ArgError};

const SUBSYSTEM: &str = "display";

#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayConnectionState {
    pub show_desktop: bool,
    pub size: (i64, i64),
    pub max_size: (i64, i64),
}

pub struct DisplaySubsystem;

impl Subsystem for DisplaySubsystem {
    fn packet_types(&self) -> &'static [&'static str] {
        &["show-desktop", "desktop-size"]
    }

    fn capability_prefix(&self) -> &'static str {
        "display"
    }

    fn handle<'a>(&'a self, source: &'a mut ConnectionSource, packet: Packet) -> HandleFuture<'a> {
        Box::pin(async move {
            match packet.packet_type.as_str() {
                "show-desktop" => {
                    let show = bool_arg(&packet.args, 0, "show").map_err(arg_err)?;
                    source.subsystem_state_mut::<DisplayConnectionState>().show_desktop = show;
                    Ok(())
                }
                "desktop-size" => {
                    let w = int_arg(&packet.args, 0, "w").map_err(arg_err)?;
                    let h = int_arg(&packet.args, 1, "h").map_err(arg_err)?;
                    let max_w = int_arg(&packet.args, 2, "max_w").map_err(arg_err)?;
                    let max_h = int_arg(&packet.args, 3, "max_h").map_err(arg_err)?;

                    let state = source.subsystem_state_mut::<DisplayConnectionState>();
                    state.size = (w, h);
                    state.max_size = (max_w, max_h);
                    Ok(())
                }
                other => unreachable!("unregistered packet type routed to display subsystem: {other}"),
            }
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

    fn connection() -> ConnectionSource {
        let (transport, _peer) = rdsp_wire::Transport::mem_pair();
        ConnectionSource::new(SessionId(1), transport)
    }

    #[tokio::test]
    async fn desktop_size_updates_stored_dimensions() {
        let subsystem = DisplaySubsystem;
        let mut source = connection();

        subsystem
            .handle(
                &mut source,
                Packet::new("desktop-size", vec![Value::Int(1920), Value::Int(1080), Value::Int(3840), Value::Int(2160)]),
            )
            .await
            .unwrap();

        let state = source.subsystem_state::<DisplayConnectionState>().unwrap();
        assert_eq!(state.size, (1920, 1080));
        assert_eq!(state.max_size, (3840, 2160));
    }
}
