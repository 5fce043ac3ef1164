//! Window pixel updates over an opaque `wid` space. A `draw` packet's pixel
//! payload is one of three shapes: bytes carried inline in the packet (or,
//! for anything too big to be worth inlining, in the packet's side
//! channels), an `(offset, length)` reference into the mmap fast path, or a
//! codec-stream frame handed off to a worker.

use std::collections::{BTreeMap, HashSet};

use rdsp_session::{ConnectionSource, HandleFuture, Packet, Subsystem, SubsystemError};
use rdsp_wire::Value;

use crate::args::{int_arg, str_arg, ArgError};

const SUBSYSTEM: &str = "window";

#[derive(Debug, Clone)]
pub enum PixelPayload {
    Inline(Vec<u8>),
    MmapOffset { offset: u32, length: u32 },
    CodecStream { codec: String, data: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct PixelUpdate {
    pub wid: i64,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub payload: PixelPayload,
}

#[derive(Debug, Default)]
pub struct WindowConnectionState {
    known_wids: HashSet<i64>,
    last_update: Option<PixelUpdate>,
}

impl WindowConnectionState {
    pub fn knows(&self, wid: i64) -> bool {
        self.known_wids.contains(&wid)
    }

    pub fn last_update(&self) -> Option<&PixelUpdate> {
        self.last_update.as_ref()
    }
}

pub struct WindowSubsystem;

impl Subsystem for WindowSubsystem {
    fn packet_types(&self) -> &'static [&'static str] {
        &["draw"]
    }

    fn capability_prefix(&self) -> &'static str {
        "window"
    }

    fn handle<'a>(&'a self, source: &'a mut ConnectionSource, packet: Packet) -> HandleFuture<'a> {
        Box::pin(async move {
            let wid = int_arg(&packet.args, 0, "wid").map_err(arg_err)?;
            let x = int_arg(&packet.args, 1, "x").map_err(arg_err)?;
            let y = int_arg(&packet.args, 2, "y").map_err(arg_err)?;
            let width = int_arg(&packet.args, 3, "w").map_err(arg_err)?;
            let height = int_arg(&packet.args, 4, "h").map_err(arg_err)?;
            let encoding = str_arg(&packet.args, 5, "encoding").map_err(arg_err)?;
            let options = match packet.args.get(7) {
                Some(Value::Map(m)) => m.clone(),
                _ => BTreeMap::new(),
            };

            let payload = decode_payload(encoding, packet.args.get(6), &options, &packet.chunks).map_err(arg_err)?;

            let state = source.subsystem_state_mut::<WindowConnectionState>();
            state.known_wids.insert(wid);
            state.last_update = Some(PixelUpdate { wid, x, y, width, height, payload });
            Ok(())
        })
    }
}

fn decode_payload(
    encoding: &str,
    raw: Option<&Value>,
    options: &BTreeMap<String, Value>,
    chunks: &[Vec<u8>],
) -> Result<PixelPayload, ArgError> {
    if encoding == "mmap" {
        let offset = options
            .get("offset")
            .and_then(Value::as_int)
            .ok_or(ArgError::WrongType { index: 7, name: "options.offset" })? as u32;
        let length = options
            .get("length")
            .and_then(Value::as_int)
            .ok_or(ArgError::WrongType { index: 7, name: "options.length" })? as u32;
        return Ok(PixelPayload::MmapOffset { offset, length });
    }

    // A sender that split its pixel bytes across side channels is telling
    // us the payload was too big to be worth inlining; those bytes take
    // priority over whatever's in the inline argument.
    let data = match chunks.first() {
        Some(bytes) => bytes.clone(),
        None => match raw {
            Some(Value::Bytes(b)) => b.clone(),
            _ => Vec::new(),
        },
    };

    if options.get("stream").and_then(Value::as_bool).unwrap_or(false) {
        Ok(PixelPayload::CodecStream { codec: encoding.to_string(), data })
    } else {
        Ok(PixelPayload::Inline(data))
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

    fn draw(wid: i64, encoding: &str, raw: Value, options: BTreeMap<String, Value>) -> Packet {
        Packet::new(
            "draw",
            vec![
                Value::Int(wid),
                Value::Int(0),
                Value::Int(0),
                Value::Int(100),
                Value::Int(100),
                Value::Str(encoding.into()),
                raw,
                Value::Map(options),
            ],
        )
    }

    #[tokio::test]
    async fn inline_png_is_stored_verbatim() {
        let subsystem = WindowSubsystem;
        let mut source = connection();
        subsystem
            .handle(&mut source, draw(1, "png", Value::Bytes(vec![1, 2, 3]), BTreeMap::new()))
            .await
            .unwrap();

        let state = source.subsystem_state::<WindowConnectionState>().unwrap();
        assert!(state.knows(1));
        assert!(matches!(state.last_update().unwrap().payload, PixelPayload::Inline(ref b) if b == &[1, 2, 3]));
    }

    #[tokio::test]
    async fn mmap_encoding_extracts_offset_and_length() {
        let subsystem = WindowSubsystem;
        let mut source = connection();
        let mut options = BTreeMap::new();
        options.insert("offset".to_string(), Value::Int(4096));
        options.insert("length".to_string(), Value::Int(65536));

        subsystem
            .handle(&mut source, draw(2, "mmap", Value::Bytes(vec![]), options))
            .await
            .unwrap();

        let state = source.subsystem_state::<WindowConnectionState>().unwrap();
        assert!(matches!(
            state.last_update().unwrap().payload,
            PixelPayload::MmapOffset { offset: 4096, length: 65536 }
        ));
    }

    #[tokio::test]
    async fn side_channel_bytes_take_priority_over_inline_argument() {
        let subsystem = WindowSubsystem;
        let mut source = connection();
        let mut packet = draw(4, "png", Value::Bytes(vec![0xFF]), BTreeMap::new());
        packet.chunks = vec![vec![1, 2, 3, 4, 5]];

        subsystem.handle(&mut source, packet).await.unwrap();

        let state = source.subsystem_state::<WindowConnectionState>().unwrap();
        assert!(matches!(state.last_update().unwrap().payload, PixelPayload::Inline(ref b) if b == &[1, 2, 3, 4, 5]));
    }

    #[tokio::test]
    async fn stream_option_selects_codec_stream_variant() {
        let subsystem = WindowSubsystem;
        let mut source = connection();
        let mut options = BTreeMap::new();
        options.insert("stream".to_string(), Value::Bool(true));

        subsystem
            .handle(&mut source, draw(3, "h264", Value::Bytes(vec![9, 9]), options))
            .await
            .unwrap();

        let state = source.subsystem_state::<WindowConnectionState>().unwrap();
        assert!(matches!(
            &state.last_update().unwrap().payload,
            PixelPayload::CodecStream { codec, data } if codec == "h264" && data == &[9, 9]
        ));
    }
}
