//! Hello capability merge: each key has a fixed resolution policy,
//! specified by the core rather than negotiated per-connection.

use std::collections::BTreeMap;

use rdsp_wire::Value;

use crate::capabilities::Capabilities;

/// How a single capability key's final value is derived from the two
/// sides' advertised values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Encoder/decoder lists: the agreed set is {this side's encoders} ∩
    /// {peer's decoders}, ordered by the local side's preference.
    Intersect,
    /// Boolean feature enables: the agreed value is the logical AND of
    /// both sides.
    And,
    /// Tunables: the peer's value overrides the local default if present.
    PeerOverrides,
    /// Unknown keys: preserved through unexamined, so a newer peer can
    /// advertise keys an older core doesn't understand without breaking
    /// negotiation. Treated the same as peer-overrides at the value level,
    /// since the point is to forward rather than interpret.
    Verbatim,
}

/// Maps each known capability key to its resolution policy, with
/// [`ResolutionPolicy::Verbatim`] as the default for anything unregistered.
pub struct HelloResolver {
    policies: BTreeMap<&'static str, ResolutionPolicy>,
}

impl HelloResolver {
    /// The policy table for the capability keys the core itself defines.
    /// Subsystems register additional keys via [`HelloResolver::register`].
    pub fn with_defaults() -> Self {
        let mut resolver = Self {
            policies: BTreeMap::new(),
        };
        resolver.register("encodings", ResolutionPolicy::Intersect);
        resolver.register("audio.codecs", ResolutionPolicy::Intersect);
        resolver.register("compressors", ResolutionPolicy::Intersect);
        resolver.register("clipboard.targets", ResolutionPolicy::Intersect);
        resolver.register("clipboard.enabled", ResolutionPolicy::And);
        resolver.register("notifications.enabled", ResolutionPolicy::And);
        resolver.register("webcam.enabled", ResolutionPolicy::And);
        resolver.register("bandwidth-limit", ResolutionPolicy::PeerOverrides);
        resolver.register("keyboard.repeat-interval", ResolutionPolicy::PeerOverrides);
        resolver
    }

    pub fn register(&mut self, key: &'static str, policy: ResolutionPolicy) {
        self.policies.insert(key, policy);
    }

    fn policy_for(&self, key: &str) -> ResolutionPolicy {
        self.policies
            .get(key)
            .copied()
            .unwrap_or(ResolutionPolicy::Verbatim)
    }

    /// Merges `local` (this side's advertised capabilities) with `peer`
    /// (the remote side's hello) into the agreed session profile.
    pub fn resolve(&self, local: &Capabilities, peer: &Capabilities) -> Capabilities {
        let mut out = Capabilities::new();

        let mut keys: Vec<&str> = local.keys().chain(peer.keys()).collect();
        keys.sort_unstable();
        keys.dedup();

        for key in keys {
            let local_value = local.get(key);
            let peer_value = peer.get(key);
            if let Some(value) = self.resolve_key(key, local_value, peer_value) {
                out.set(key, value);
            }
        }

        out
    }

    fn resolve_key(
        &self,
        key: &str,
        local: Option<&Value>,
        peer: Option<&Value>,
    ) -> Option<Value> {
        match self.policy_for(key) {
            ResolutionPolicy::Intersect => {
                let local_list = local.and_then(Value::as_list).unwrap_or(&[]);
                let peer_list = peer.and_then(Value::as_list).unwrap_or(&[]);
                let agreed: Vec<Value> = local_list
                    .iter()
                    .filter(|item| peer_list.contains(item))
                    .cloned()
                    .collect();
                Some(Value::List(agreed))
            }
            ResolutionPolicy::And => {
                let local_bool = local.and_then(Value::as_bool).unwrap_or(false);
                let peer_bool = peer.and_then(Value::as_bool).unwrap_or(false);
                Some(Value::Bool(local_bool && peer_bool))
            }
            ResolutionPolicy::PeerOverrides | ResolutionPolicy::Verbatim => {
                peer.or(local).cloned()
            }
        }
    }
}

impl Default for HelloResolver {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn str_list(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::Str(s.to_string())).collect())
    }

    #[test]
    fn intersect_keeps_local_order() {
        let resolver = HelloResolver::with_defaults();
        let mut local = Capabilities::new();
        local.set("encodings", str_list(&["h264", "vp9", "png"]));
        let mut peer = Capabilities::new();
        peer.set("encodings", str_list(&["vp9", "png", "jpeg"]));

        let merged = resolver.resolve(&local, &peer);
        assert_eq!(
            merged.get("encodings").unwrap(),
            &str_list(&["vp9", "png"])
        );
    }

    #[test]
    fn and_requires_both_sides_true() {
        let resolver = HelloResolver::with_defaults();
        let mut local = Capabilities::new();
        local.set("clipboard.enabled", Value::Bool(true));
        let mut peer = Capabilities::new();
        peer.set("clipboard.enabled", Value::Bool(false));

        let merged = resolver.resolve(&local, &peer);
        assert_eq!(merged.get_bool("clipboard.enabled"), Some(false));
    }

    #[test]
    fn peer_overrides_local_tunable() {
        let resolver = HelloResolver::with_defaults();
        let mut local = Capabilities::new();
        local.set("bandwidth-limit", Value::Int(1_000_000));
        let mut peer = Capabilities::new();
        peer.set("bandwidth-limit", Value::Int(500_000));

        let merged = resolver.resolve(&local, &peer);
        assert_eq!(merged.get_int("bandwidth-limit"), Some(500_000));
    }

    #[test]
    fn local_tunable_survives_when_peer_silent() {
        let resolver = HelloResolver::with_defaults();
        let mut local = Capabilities::new();
        local.set("bandwidth-limit", Value::Int(1_000_000));
        let peer = Capabilities::new();

        let merged = resolver.resolve(&local, &peer);
        assert_eq!(merged.get_int("bandwidth-limit"), Some(1_000_000));
    }

    #[test]
    fn unknown_keys_pass_through() {
        let resolver = HelloResolver::with_defaults();
        let mut local = Capabilities::new();
        local.set("x-vendor-extension", Value::Str("abc".into()));
        let peer = Capabilities::new();

        let merged = resolver.resolve(&local, &peer);
        assert_eq!(merged.get_str("x-vendor-extension"), Some("abc"));
    }
}
