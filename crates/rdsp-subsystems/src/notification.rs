//! Desktop notification forwarding: tracks which notification ids are
//! currently shown and validates the optional icon tuple's shape.

use std::collections::HashSet;

use rdsp_session::{ConnectionSource, HandleFuture, Packet, Subsystem, SubsystemError};
use rdsp_wire::Value;

use crate::args::{int_arg, str_arg, ArgError};

const SUBSYSTEM: &str = "notification";

#[derive(Debug, Default)]
pub struct NotificationConnectionState {
    pub enabled: bool,
    active_ids: HashSet<i64>,
}

impl NotificationConnectionState {
    pub fn is_active(&self, id: i64) -> bool {
        self.active_ids.contains(&id)
    }
}

pub struct NotificationSubsystem;

impl Subsystem for NotificationSubsystem {
    fn packet_types(&self) -> &'static [&'static str] {
        &["notification-show", "notification-close", "notification-action", "notification-status"]
    }

    fn capability_prefix(&self) -> &'static str {
        "notification"
    }

    fn handle<'a>(&'a self, source: &'a mut ConnectionSource, packet: Packet) -> HandleFuture<'a> {
        Box::pin(async move {
            match packet.packet_type.as_str() {
                "notification-show" => {
                    let id = int_arg(&packet.args, 0, "id").map_err(arg_err)?;
                    if let Some(icon) = packet.args.iter().find_map(as_icon_tuple) {
                        validate_icon(icon).map_err(arg_err)?;
                    }
                    source.subsystem_state_mut::<NotificationConnectionState>().active_ids.insert(id);
                    Ok(())
                }
                "notification-close" => {
                    let id = int_arg(&packet.args, 0, "id").map_err(arg_err)?;
                    source.subsystem_state_mut::<NotificationConnectionState>().active_ids.remove(&id);
                    Ok(())
                }
                "notification-action" => {
                    let _id = int_arg(&packet.args, 0, "id").map_err(arg_err)?;
                    let _action_key = str_arg(&packet.args, 1, "action_key").map_err(arg_err)?;
                    Ok(())
                }
                "notification-status" => {
                    let enabled = packet.args.first().and_then(Value::as_bool).unwrap_or(true);
                    source.subsystem_state_mut::<NotificationConnectionState>().enabled = enabled;
                    Ok(())
                }
                other => unreachable!("unregistered packet type routed to notification subsystem: {other}"),
            }
        })
    }
}

fn as_icon_tuple(value: &Value) -> Option<&[Value]> {
    match value {
        Value::List(items) if items.len() == 4 => Some(items.as_slice()),
        _ => None,
    }
}

/// `(format, w, h, bytes)`; `png` is the one format every peer must accept.
fn validate_icon(icon: &[Value]) -> Result<(), ArgError> {
    let format = icon[0].as_str().ok_or(ArgError::WrongType { index: 0, name: "icon.format" })?;
    icon[1].as_int().ok_or(ArgError::WrongType { index: 1, name: "icon.w" })?;
    icon[2].as_int().ok_or(ArgError::WrongType { index: 2, name: "icon.h" })?;
    if !matches!(icon[3], Value::Bytes(_)) {
        return Err(ArgError::WrongType { index: 3, name: "icon.bytes" });
    }
    if format != "png" {
        tracing::debug!(format, "notification icon in a non-mandatory format");
    }
    Ok(())
}

fn arg_err(err: ArgError) -> SubsystemError {
    SubsystemError::recoverable(SUBSYSTEM, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdsp_session::SessionId;

    fn connection() -> ConnectionSource {
        let (transport, _peer) = rdsp_wire::Transport::mem_pair();
        ConnectionSource::new(SessionId(1), transport)
    }

    #[tokio::test]
    async fn show_then_close_clears_active_id() {
        let subsystem = NotificationSubsystem;
        let mut source = connection();

        subsystem
            .handle(&mut source, Packet::new("notification-show", vec![Value::Int(1), Value::Str("summary".into())]))
            .await
            .unwrap();
        assert!(source.subsystem_state::<NotificationConnectionState>().unwrap().is_active(1));

        subsystem
            .handle(&mut source, Packet::new("notification-close", vec![Value::Int(1)]))
            .await
            .unwrap();
        assert!(!source.subsystem_state::<NotificationConnectionState>().unwrap().is_active(1));
    }

    #[tokio::test]
    async fn malformed_icon_tuple_is_rejected() {
        let subsystem = NotificationSubsystem;
        let mut source = connection();
        let bad_icon = Value::List(vec![Value::Str("png".into()), Value::Int(16), Value::Int(16), Value::Str("not-bytes".into())]);

        let result = subsystem
            .handle(&mut source, Packet::new("notification-show", vec![Value::Int(1), bad_icon]))
            .await;
        assert!(result.is_err());
    }
}
