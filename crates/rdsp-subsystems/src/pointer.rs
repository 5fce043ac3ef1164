//! Pointer input: per-`device_id` monotonic sequence enforcement for button
//! events, and last-position tracking per window so a server that falls
//! behind can coalesce onto the latest position instead of processing
//! every stale sample.

use std::collections::HashMap;

use rdsp_session::{ConnectionSource, HandleFuture, Packet, Subsystem, SubsystemError};
use rdsp_wire::Value;
use tracing::warn;

use crate::args::{bool_arg, int_arg, ArgError};

const SUBSYSTEM: &str = "pointer";

#[derive(Debug, Clone, Default)]
pub struct PointerConnectionState {
    last_sequence: HashMap<i64, i64>,
    last_position: HashMap<i64, (i64, i64)>,
}

impl PointerConnectionState {
    pub fn last_position_for(&self, wid: i64) -> Option<(i64, i64)> {
        self.last_position.get(&wid).copied()
    }
}

pub struct PointerSubsystem;

impl Subsystem for PointerSubsystem {
    fn packet_types(&self) -> &'static [&'static str] {
        &["pointer-position", "pointer-button", "input-devices"]
    }

    fn capability_prefix(&self) -> &'static str {
        "pointer"
    }

    fn handle<'a>(&'a self, source: &'a mut ConnectionSource, packet: Packet) -> HandleFuture<'a> {
        Box::pin(async move {
            match packet.packet_type.as_str() {
                "pointer-position" => self.handle_position(source, &packet),
                "pointer-button" => self.handle_button(source, &packet),
                "input-devices" => {
                    tracing::debug!(device_count = packet.args.len(), "input-devices received");
                    Ok(())
                }
                other => unreachable!("unregistered packet type routed to pointer subsystem: {other}"),
            }
        })
    }
}

impl PointerSubsystem {
    fn handle_position(&self, source: &mut ConnectionSource, packet: &Packet) -> Result<(), SubsystemError> {
        let wid = int_arg(&packet.args, 0, "wid").map_err(arg_err)?;
        let pos = read_pos(&packet.args, 1).map_err(arg_err)?;

        let state = source.subsystem_state_mut::<PointerConnectionState>();
        // Coalescing: a later position for the same window simply overwrites
        // the prior one — there is nothing to "process" beyond the latest
        // sample when the server is behind.
        state.last_position.insert(wid, pos);
        Ok(())
    }

    fn handle_button(&self, source: &mut ConnectionSource, packet: &Packet) -> Result<(), SubsystemError> {
        let device_id = int_arg(&packet.args, 0, "device_id").map_err(arg_err)?;
        let sequence = int_arg(&packet.args, 1, "sequence").map_err(arg_err)?;
        let wid = int_arg(&packet.args, 2, "wid").map_err(arg_err)?;
        let _button = int_arg(&packet.args, 3, "button").map_err(arg_err)?;
        let _pressed = bool_arg(&packet.args, 4, "pressed").map_err(arg_err)?;

        let state = source.subsystem_state_mut::<PointerConnectionState>();
        if let Some(&last) = state.last_sequence.get(&device_id) {
            if sequence <= last {
                warn!(device_id, sequence, last, "out-of-order pointer-button sequence, dropping");
                return Ok(());
            }
        }
        state.last_sequence.insert(device_id, sequence);
        if let Ok(pos) = read_pos(&packet.args, 5) {
            state.last_position.insert(wid, pos);
        }
        Ok(())
    }
}

fn read_pos(args: &[Value], index: usize) -> Result<(i64, i64), ArgError> {
    let list = args
        .get(index)
        .and_then(Value::as_list)
        .ok_or(ArgError::WrongType { index, name: "pos" })?;
    let x = list.first().and_then(Value::as_int).ok_or(ArgError::WrongType { index, name: "pos.x" })?;
    let y = list.get(1).and_then(Value::as_int).ok_or(ArgError::WrongType { index, name: "pos.y" })?;
    Ok((x, y))
}

fn arg_err(err: ArgError) -> SubsystemError {
    SubsystemError::recoverable(SUBSYSTEM, err)
}
