//! Keyboard input: key press/release forwarding and keymap updates, sent
//! separately from hello to keep the initial handshake small.

use std::collections::{BTreeMap, HashSet};

use rdsp_session::{ConnectionSource, HandleFuture, Packet, Subsystem, SubsystemError};
use rdsp_wire::Value;

use crate::args::{bool_arg, int_arg, str_arg, ArgError};

const SUBSYSTEM: &str = "keyboard";

#[derive(Debug, Default)]
pub struct KeyboardConnectionState {
    pub keymap: BTreeMap<String, Value>,
    pressed_keycodes: HashSet<i64>,
}

impl KeyboardConnectionState {
    pub fn is_pressed(&self, keycode: i64) -> bool {
        self.pressed_keycodes.contains(&keycode)
    }
}

pub struct KeyboardSubsystem;

impl Subsystem for KeyboardSubsystem {
    fn packet_types(&self) -> &'static [&'static str] {
        &["key-action", "keymap-changed"]
    }

    fn capability_prefix(&self) -> &'static str {
        "keyboard"
    }

    fn handle<'a>(&'a self, source: &'a mut ConnectionSource, packet: Packet) -> HandleFuture<'a> {
        Box::pin(async move {
            match packet.packet_type.as_str() {
                "key-action" => {
                    let _keyname = str_arg(&packet.args, 0, "keyname").map_err(arg_err)?;
                    let pressed = bool_arg(&packet.args, 1, "pressed").map_err(arg_err)?;
                    let keycode = int_arg(&packet.args, 5, "keycode").map_err(arg_err)?;

                    let state = source.subsystem_state_mut::<KeyboardConnectionState>();
                    if pressed {
                        state.pressed_keycodes.insert(keycode);
                    } else {
                        state.pressed_keycodes.remove(&keycode);
                    }
                    Ok(())
                }
                "keymap-changed" => {
                    let attrs = match packet.args.first() {
                        Some(Value::Map(m)) => m.clone(),
                        _ => BTreeMap::new(),
                    };
                    source.subsystem_state_mut::<KeyboardConnectionState>().keymap = attrs;
                    Ok(())
                }
                other => unreachable!("unregistered packet type routed to keyboard subsystem: {other}"),
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

    fn connection() -> ConnectionSource {
        let (transport, _peer) = rdsp_wire::Transport::mem_pair();
        ConnectionSource::new(SessionId(1), transport)
    }

    fn key_action(pressed: bool, keycode: i64) -> Packet {
        Packet::new(
            "key-action",
            vec![
                Value::Str("a".into()),
                Value::Bool(pressed),
                Value::List(vec![]),
                Value::Int(97),
                Value::Str("a".into()),
                Value::Int(keycode),
                Value::Int(0),
            ],
        )
    }

    #[tokio::test]
    async fn press_then_release_clears_pressed_set() {
        let subsystem = KeyboardSubsystem;
        let mut source = connection();

        subsystem.handle(&mut source, key_action(true, 38)).await.unwrap();
        assert!(source.subsystem_state::<KeyboardConnectionState>().unwrap().is_pressed(38));

        subsystem.handle(&mut source, key_action(false, 38)).await.unwrap();
        assert!(!source.subsystem_state::<KeyboardConnectionState>().unwrap().is_pressed(38));
    }

    #[tokio::test]
    async fn keymap_changed_replaces_stored_map() {
        let subsystem = KeyboardSubsystem;
        let mut source = connection();

        let mut attrs = BTreeMap::new();
        attrs.insert("layout".to_string(), Value::Str("us".into()));
        subsystem
            .handle(&mut source, Packet::new("keymap-changed", vec![Value::Map(attrs)]))
            .await
            .unwrap();

        let state = source.subsystem_state::<KeyboardConnectionState>().unwrap();
        assert_eq!(state.keymap.get("layout"), Some(&Value::Str("us".into())));
    }
}
