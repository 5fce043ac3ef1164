//! Bidirectional clipboard forwarding: selection enablement, greedy/target
//! preferences, and request/response tracking with timeout.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rdsp_session::{ConnectionSource, HandleFuture, Packet, Subsystem, SubsystemError};
use rdsp_wire::Value;
use tracing::warn;

use crate::args::{bool_arg, int_arg, str_arg, ArgError};

const SUBSYSTEM: &str = "clipboard";

/// Default interval an unanswered `clipboard-request` waits before it's
/// considered timed out and dropped from tracking.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipboardDirection {
    #[default]
    None,
    ToClient,
    ToServer,
    Both,
}

#[derive(Debug, Default)]
pub struct ClipboardConnectionState {
    pub enabled: bool,
    pub direction: ClipboardDirection,
    pub selections: Vec<String>,
    pending: HashMap<i64, Instant>,
}

impl ClipboardConnectionState {
    /// Removes and returns request ids that have outlived `timeout`,
    /// implementing the "unanswered requests time out" invariant. Callers
    /// drive this from a periodic maintenance tick rather than the
    /// per-packet dispatch path, since timeout expiry isn't itself a wire
    /// event.
    pub fn reap_expired(&mut self, timeout: Duration) -> Vec<i64> {
        let now = Instant::now();
        let expired: Vec<i64> = self
            .pending
            .iter()
            .filter(|(_, started)| now.duration_since(**started) >= timeout)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.pending.remove(id);
        }
        expired
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

pub struct ClipboardSubsystem;

impl Subsystem for ClipboardSubsystem {
    fn packet_types(&self) -> &'static [&'static str] {
        &[
            "set-clipboard-enabled",
            "clipboard-enable-selections",
            "clipboard-token",
            "clipboard-request",
            "clipboard-contents",
            "clipboard-contents-none",
            "clipboard-pending-requests",
        ]
    }

    fn capability_prefix(&self) -> &'static str {
        "clipboard"
    }

    fn handle<'a>(&'a self, source: &'a mut ConnectionSource, packet: Packet) -> HandleFuture<'a> {
        Box::pin(async move {
            let state = source.subsystem_state_mut::<ClipboardConnectionState>();
            match packet.packet_type.as_str() {
                "set-clipboard-enabled" => {
                    state.enabled = bool_arg(&packet.args, 0, "enabled").map_err(arg_err)?;
                }
                "clipboard-enable-selections" => {
                    state.selections = packet
                        .args
                        .first()
                        .and_then(Value::as_list)
                        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
                        .unwrap_or_default();
                }
                "clipboard-token" => {
                    tracing::debug!("clipboard ownership token received");
                }
                "clipboard-request" => {
                    let request_id = int_arg(&packet.args, 0, "request_id").map_err(arg_err)?;
                    let _target = str_arg(&packet.args, 1, "target").map_err(arg_err)?;
                    if state.pending.insert(request_id, Instant::now()).is_some() {
                        warn!(request_id, "clipboard request id reused before its previous reply");
                    }
                }
                "clipboard-contents" | "clipboard-contents-none" => {
                    let request_id = int_arg(&packet.args, 0, "request_id").map_err(arg_err)?;
                    if state.pending.remove(&request_id).is_none() {
                        warn!(request_id, "clipboard reply for unknown or already-answered request");
                    }
                }
                "clipboard-pending-requests" => {
                    let _advisory_count = int_arg(&packet.args, 0, "n").map_err(arg_err)?;
                }
                other => unreachable!("unregistered packet type routed to clipboard subsystem: {other}"),
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

    fn connection() -> ConnectionSource {
        let (transport, _peer) = rdsp_wire::Transport::mem_pair();
        ConnectionSource::new(SessionId(1), transport)
    }

    #[tokio::test]
    async fn request_then_contents_clears_pending() {
        let subsystem = ClipboardSubsystem;
        let mut source = connection();

        subsystem
            .handle(&mut source, Packet::new("clipboard-request", vec![Value::Int(1), Value::Str("UTF8_STRING".into())]))
            .await
            .unwrap();
        assert_eq!(source.subsystem_state::<ClipboardConnectionState>().unwrap().pending_count(), 1);

        subsystem
            .handle(&mut source, Packet::new("clipboard-contents", vec![Value::Int(1)]))
            .await
            .unwrap();
        assert_eq!(source.subsystem_state::<ClipboardConnectionState>().unwrap().pending_count(), 0);
    }

    #[tokio::test]
    async fn reap_expired_drops_stale_requests() {
        let subsystem = ClipboardSubsystem;
        let mut source = connection();
        subsystem
            .handle(&mut source, Packet::new("clipboard-request", vec![Value::Int(9), Value::Str("TEXT".into())]))
            .await
            .unwrap();

        let state = source.subsystem_state_mut::<ClipboardConnectionState>();
        let expired = state.reap_expired(Duration::from_secs(0));
        assert_eq!(expired, vec![9]);
        assert_eq!(state.pending_count(), 0);
    }

    #[tokio::test]
    async fn set_enabled_updates_state() {
        let subsystem = ClipboardSubsystem;
        let mut source = connection();
        subsystem
            .handle(&mut source, Packet::new("set-clipboard-enabled", vec![Value::Bool(true)]))
            .await
            .unwrap();
        assert!(source.subsystem_state::<ClipboardConnectionState>().unwrap().enabled);
    }
}
