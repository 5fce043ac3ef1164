//! Audio control-plane state machine. Codec work itself happens in a
//! separate worker process; this subsystem owns only stream bookkeeping and
//! in-order forwarding of data frames to whichever collaborator the runtime
//! wired in.

use std::collections::BTreeMap;
use std::sync::Arc;

use rdsp_session::{ConnectionSource, HandleFuture, Packet, Subsystem, SubsystemError};
use rdsp_wire::Value;
use tracing::warn;

use crate::args::{str_arg, ArgError};

const SUBSYSTEM: &str = "audio";

#[derive(Debug, thiserror::Error)]
pub enum AudioCodecError {
    #[error("worker rejected frame: {0}")]
    Rejected(String),
}

/// The out-of-process codec collaborator: the subsystem only ever asks it
/// to forward a frame, never performs encode/decode itself.
pub trait AudioCodec: Send + Sync + 'static {
    fn forward(&self, codec: &str, data: &[u8], attrs: &BTreeMap<String, Value>) -> Result<(), AudioCodecError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
}

/// Per-connection audio state: at most one active stream per direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioConnectionState {
    pub receive: Option<StreamState>,
    pub send: Option<StreamState>,
}

impl AudioConnectionState {
    fn receive_or_idle(&self) -> StreamState {
        self.receive.unwrap_or(StreamState::Idle)
    }
}

pub struct AudioSubsystem {
    codec: Arc<dyn AudioCodec>,
}

impl AudioSubsystem {
    pub fn new(codec: Arc<dyn AudioCodec>) -> Self {
        Self { codec }
    }
}

impl Subsystem for AudioSubsystem {
    fn packet_types(&self) -> &'static [&'static str] {
        &["sound-data", "sound-control"]
    }

    fn capability_prefix(&self) -> &'static str {
        "sound"
    }

    fn handle<'a>(&'a self, source: &'a mut ConnectionSource, packet: Packet) -> HandleFuture<'a> {
        Box::pin(async move {
            match packet.packet_type.as_str() {
                "sound-data" => self.handle_sound_data(source, packet),
                "sound-control" => self.handle_sound_control(source, packet),
                other => unreachable!("unregistered packet type routed to audio subsystem: {other}"),
            }
        })
    }
}

impl AudioSubsystem {
    fn handle_sound_data(&self, source: &mut ConnectionSource, packet: Packet) -> Result<(), SubsystemError> {
        let codec = str_arg(&packet.args, 0, "codec").map_err(arg_err)?;
        let data = match packet.args.get(1) {
            Some(Value::Bytes(b)) => b.clone(),
            Some(_) | None => Vec::new(),
        };
        let attrs = match packet.args.get(2) {
            Some(Value::Map(m)) => m.clone(),
            _ => BTreeMap::new(),
        };

        let start = attrs.get("start-of-stream").and_then(Value::as_bool).unwrap_or(false);
        let end = attrs.get("end-of-stream").and_then(Value::as_bool).unwrap_or(false);

        let state = source.subsystem_state_mut::<AudioConnectionState>();
        if state.receive_or_idle() == StreamState::Idle && !start {
            warn!("sound-data received with no active stream and no start-of-stream marker");
        }
        state.receive = Some(if end { StreamState::Idle } else { StreamState::Streaming });

        self.codec
            .forward(codec, &data, &attrs)
            .map_err(|e| SubsystemError::recoverable(SUBSYSTEM, e))
    }

    fn handle_sound_control(&self, source: &mut ConnectionSource, packet: Packet) -> Result<(), SubsystemError> {
        let subcommand = str_arg(&packet.args, 0, "subcommand").map_err(arg_err)?;
        let state = source.subsystem_state_mut::<AudioConnectionState>();
        match subcommand {
            "stop" => state.receive = Some(StreamState::Idle),
            "start" => state.receive = Some(StreamState::Streaming),
            other => warn!(subcommand = other, "unrecognized sound-control subcommand"),
        }
        Ok(())
    }
}

fn arg_err(err: ArgError) -> SubsystemError {
    SubsystemError::recoverable(SUBSYSTEM, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdsp_session::SessionId;
    use std::sync::Mutex;

    struct RecordingCodec(Mutex<Vec<(String, usize)>>);

    impl AudioCodec for RecordingCodec {
        fn forward(&self, codec: &str, data: &[u8], _attrs: &BTreeMap<String, Value>) -> Result<(), AudioCodecError> {
            self.0.lock().unwrap().push((codec.to_string(), data.len()));
            Ok(())
        }
    }

    fn connection() -> ConnectionSource {
        let (transport, _peer) = rdsp_wire::Transport::mem_pair();
        ConnectionSource::new(SessionId(1), transport)
    }

    #[tokio::test]
    async fn start_of_stream_transitions_to_streaming() {
        let codec = Arc::new(RecordingCodec(Mutex::new(Vec::new())));
        let subsystem = AudioSubsystem::new(codec.clone());
        let mut source = connection();

        let mut attrs = BTreeMap::new();
        attrs.insert("start-of-stream".to_string(), Value::Bool(true));
        let packet = Packet::new(
            "sound-data",
            vec![Value::Str("opus".into()), Value::Bytes(vec![1, 2, 3]), Value::Map(attrs)],
        );
        subsystem.handle(&mut source, packet).await.unwrap();

        let state = source.subsystem_state::<AudioConnectionState>().unwrap();
        assert_eq!(state.receive, Some(StreamState::Streaming));
        assert_eq!(codec.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn end_of_stream_returns_to_idle() {
        let codec = Arc::new(RecordingCodec(Mutex::new(Vec::new())));
        let subsystem = AudioSubsystem::new(codec);
        let mut source = connection();
        source.subsystem_state_mut::<AudioConnectionState>().receive = Some(StreamState::Streaming);

        let mut attrs = BTreeMap::new();
        attrs.insert("end-of-stream".to_string(), Value::Bool(true));
        let packet = Packet::new("sound-data", vec![Value::Str("opus".into()), Value::Bytes(vec![]), Value::Map(attrs)]);
        subsystem.handle(&mut source, packet).await.unwrap();

        assert_eq!(
            source.subsystem_state::<AudioConnectionState>().unwrap().receive,
            Some(StreamState::Idle)
        );
    }
}
