//! The dispatch loop: reads frames, decodes packets, checks state and
//! subsystem enablement, and invokes the matching handler. Ping echoes are
//! answered inline here rather than handed to a subsystem, so round-trip
//! measurement reflects the reader context rather than queueing delay.

use std::sync::Arc;

use rdsp_proto::Capabilities;
use rdsp_wire::{Frame, PacketEncoder, Priority, Value};
use tracing::{error, warn};

use crate::connection::ConnectionSource;
use crate::error::SessionError;
use crate::packet::Packet;
use crate::registry::SubsystemRegistry;
use crate::state::ConnectionState;

/// Side channels (chunk index 1-7) never arrive before the main frame
/// (index 0) they travel with; this caps how many we'll fold into one
/// logical packet before treating the stream as desynchronized.
const MAX_SIDE_CHANNELS: usize = 7;

/// Drives one connection until its transport closes or it is torn down by a
/// fatal subsystem error or a state violation.
pub async fn run(
    mut source: ConnectionSource,
    registry: Arc<SubsystemRegistry>,
    encoder: Arc<dyn PacketEncoder>,
) -> Result<(), SessionError> {
    let mut pushback: Option<Frame> = None;

    loop {
        let frame = match pushback.take() {
            Some(frame) => frame,
            None => match source.transport().recv_frame().await {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(error = %err, "transport closed, tearing down connection");
                    return close_connection(&mut source).await;
                }
            },
        };

        if frame.header.chunk_idx != 0 {
            warn!(chunk_idx = frame.header.chunk_idx, "side-channel frame with no preceding main frame, dropping");
            continue;
        }

        let main_bytes = source.decode_frame(&frame)?;
        let mut chunks = Vec::new();
        loop {
            if chunks.len() >= MAX_SIDE_CHANNELS {
                break;
            }
            let next = match source.transport().recv_frame().await {
                Ok(next) => next,
                Err(err) => {
                    warn!(error = %err, "transport closed while reassembling side channels");
                    return close_connection(&mut source).await;
                }
            };
            if next.header.chunk_idx == 0 {
                pushback = Some(next);
                break;
            }
            chunks.push(source.decode_frame(&next)?);
        }

        let values = encoder.decode(&main_bytes)?;
        let mut packet = Packet::from_values(values)?;
        packet.chunks = chunks;

        if packet.packet_type == "ping" {
            if let Err(err) = handle_ping(&mut source, packet, encoder.as_ref()) {
                warn!(error = %err, "dropping ping echo");
            }
            continue;
        }

        if !source.state().allowed_inbound(&packet.packet_type) {
            if source.state() == ConnectionState::Ready {
                warn!(packet_type = %packet.packet_type, "unknown packet type, dropping");
                continue;
            }
            let violation = SessionError::StateViolation {
                state: source.state(),
                packet_type: packet.packet_type,
            };
            error!(error = %violation, "protocol error");
            let _ = close_connection(&mut source).await;
            return Err(violation);
        }

        if packet.packet_type == "disconnect" {
            source.transition(ConnectionState::Closing);
            return close_connection(&mut source).await;
        }

        let Some(subsystem) = registry.resolve(&packet.packet_type).cloned() else {
            if source.state() == ConnectionState::Ready {
                warn!(packet_type = %packet.packet_type, "unknown packet type, dropping");
                continue;
            }
            return Err(SessionError::UnknownPacketType(packet.packet_type));
        };

        if !subsystem_enabled(source.capabilities(), subsystem.capability_prefix()) {
            warn!(
                subsystem = subsystem.capability_prefix(),
                packet_type = %packet.packet_type,
                "subsystem disabled, dropping packet"
            );
            continue;
        }

        let packet_type = packet.packet_type.clone();
        if let Err(err) = subsystem.handle(&mut source, packet).await {
            error!(
                subsystem = err.subsystem,
                packet_type = %packet_type,
                cause = %err,
                "subsystem handler failed"
            );
            if err.fatal {
                let _ = close_connection(&mut source).await;
                return Err(SessionError::Subsystem(err));
            }
        }
    }
}

/// A subsystem is enabled unless its namespace explicitly turns itself off
/// with `{prefix}.enabled = false`; subsystems with no enablement flag of
/// their own (pointer, keyboard, display) are always reachable once ready.
fn subsystem_enabled(capabilities: &Capabilities, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    capabilities
        .get_bool(&format!("{prefix}.enabled"))
        .unwrap_or(true)
}

fn handle_ping(
    source: &mut ConnectionSource,
    packet: Packet,
    encoder: &dyn PacketEncoder,
) -> Result<(), SessionError> {
    let client_time = packet.args.first().and_then(Value::as_int).unwrap_or(0);
    let server_time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    source
        .send_packet(Priority::Urgent, "ping-echo", encoder, vec![Value::Int(client_time), Value::Int(server_time)], &[])
        .map_err(|err| SessionError::Protocol(format!("ping echo dropped: {err}")))
}

/// Flushes whatever is already queued, closes the transport, and marks the
/// connection terminal.
async fn close_connection(source: &mut ConnectionSource) -> Result<(), SessionError> {
    source.begin_close("connection closing");
    while let Some(frame) = source.pop_outbound() {
        source.transport().send_frame(frame).await?;
    }
    source.transport().close();
    source.transition(ConnectionState::Closed);
    Ok(())
}
