//! A decoded packet: the wire's value sequence with its leading string
//! element split out as the type name every subsystem and the dispatcher
//! key off of.

use rdsp_wire::Value;

use crate::error::SessionError;

#[derive(Debug, Clone)]
pub struct Packet {
    pub packet_type: String,
    pub args: Vec<Value>,
    /// Bulk bytes carried in this packet's side channels (chunk index 1-7,
    /// in order), reassembled by the dispatch loop before the packet is
    /// handed to a subsystem. Empty for packets sent without side channels.
    pub chunks: Vec<Vec<u8>>,
}

impl Packet {
    pub fn new(packet_type: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            packet_type: packet_type.into(),
            args,
            chunks: Vec::new(),
        }
    }

    /// Splits a decoded value sequence into a packet, per the protocol's
    /// convention that `values[0]` is always the type name.
    pub fn from_values(mut values: Vec<Value>) -> Result<Self, SessionError> {
        if values.is_empty() {
            return Err(SessionError::Protocol("packet has no type name".into()));
        }
        let packet_type = match values.remove(0) {
            Value::Str(s) => s,
            other => {
                return Err(SessionError::Protocol(format!(
                    "packet type must be a string, got {other:?}"
                )));
            }
        };
        Ok(Self {
            packet_type,
            args: values,
            chunks: Vec::new(),
        })
    }

    pub fn into_values(self) -> Vec<Value> {
        let mut out = Vec::with_capacity(self.args.len() + 1);
        out.push(Value::Str(self.packet_type));
        out.extend(self.args);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_leading_type_name() {
        let values = vec![Value::Str("ping".into()), Value::Int(42)];
        let packet = Packet::from_values(values).unwrap();
        assert_eq!(packet.packet_type, "ping");
        assert_eq!(packet.args, vec![Value::Int(42)]);
    }

    #[test]
    fn rejects_empty_packet() {
        assert!(Packet::from_values(vec![]).is_err());
    }

    #[test]
    fn rejects_non_string_leading_element() {
        assert!(Packet::from_values(vec![Value::Int(1)]).is_err());
    }

    #[test]
    fn round_trips_through_into_values() {
        let packet = Packet::new("pointer-position", vec![Value::Int(7)]);
        let values = packet.into_values();
        let restored = Packet::from_values(values).unwrap();
        assert_eq!(restored.packet_type, "pointer-position");
    }
}
