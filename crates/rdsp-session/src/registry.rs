//! Subsystem trait and the compile-time-registered packet-type dispatch
//! table, generalizing the teacher's `ServiceDispatch` (`method_ids()` +
//! `dispatch()`) from integer RPC method IDs to packet-type strings.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::connection::ConnectionSource;
use crate::error::SubsystemError;
use crate::packet::Packet;

pub type HandleFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SubsystemError>> + Send + 'a>>;

/// One protocol subsystem: the packet types it owns, the capability
/// namespace that enables/disables it, and the handler the dispatch loop
/// invokes once state and enablement checks pass.
pub trait Subsystem: Send + Sync + 'static {
    fn packet_types(&self) -> &'static [&'static str];

    /// The capability namespace this subsystem is gated under, e.g.
    /// `"clipboard"` for `clipboard.enabled`. Empty means always enabled.
    fn capability_prefix(&self) -> &'static str;

    fn handle<'a>(&'a self, source: &'a mut ConnectionSource, packet: Packet) -> HandleFuture<'a>;
}

/// Built once at startup from the full list of subsystems a runtime wires
/// in. A packet type claimed by two subsystems is a startup-time panic, not
/// a runtime surprise — the whole point of registering the table ahead of
/// time instead of trying each subsystem in sequence.
pub struct SubsystemRegistry {
    by_packet_type: HashMap<&'static str, Arc<dyn Subsystem>>,
}

impl SubsystemRegistry {
    pub fn build(subsystems: Vec<Arc<dyn Subsystem>>) -> Self {
        let mut by_packet_type = HashMap::new();
        for subsystem in subsystems {
            for &packet_type in subsystem.packet_types() {
                if by_packet_type.insert(packet_type, subsystem.clone()).is_some() {
                    panic!("packet type {packet_type:?} is claimed by more than one subsystem");
                }
            }
        }
        Self { by_packet_type }
    }

    pub fn resolve(&self, packet_type: &str) -> Option<&Arc<dyn Subsystem>> {
        self.by_packet_type.get(packet_type)
    }

    pub fn len(&self) -> usize {
        self.by_packet_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_packet_type.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Subsystem for Echo {
        fn packet_types(&self) -> &'static [&'static str] {
            &["ping", "pong"]
        }

        fn capability_prefix(&self) -> &'static str {
            "echo"
        }

        fn handle<'a>(&'a self, _source: &'a mut ConnectionSource, _packet: Packet) -> HandleFuture<'a> {
            Box::pin(async move { Ok(()) })
        }
    }

    struct Clashing;

    impl Subsystem for Clashing {
        fn packet_types(&self) -> &'static [&'static str] {
            &["ping"]
        }

        fn capability_prefix(&self) -> &'static str {
            "clash"
        }

        fn handle<'a>(&'a self, _source: &'a mut ConnectionSource, _packet: Packet) -> HandleFuture<'a> {
            Box::pin(async move { Ok(()) })
        }
    }

    #[test]
    fn resolves_registered_packet_types() {
        let registry = SubsystemRegistry::build(vec![Arc::new(Echo)]);
        assert!(registry.resolve("ping").is_some());
        assert!(registry.resolve("unknown-type").is_none());
    }

    #[test]
    #[should_panic(expected = "claimed by more than one subsystem")]
    fn panics_at_build_time_on_conflicting_packet_types() {
        SubsystemRegistry::build(vec![Arc::new(Echo), Arc::new(Clashing)]);
    }
}
