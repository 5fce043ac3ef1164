//! Ties the capability resolver and authentication challenge together into
//! the hello exchange's outcome.

use crate::capabilities::Capabilities;
use crate::resolver::HelloResolver;

#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("no common picture encoding was agreed")]
    NoCommonEncoding,
    #[error("authentication required but no challenge response was supplied")]
    AuthenticationRequired,
    #[error("authentication failed")]
    AuthenticationFailed,
}

/// The result of successfully merging both sides' hellos: the agreed
/// session profile every subsystem reads its enablement and tunables from.
#[derive(Debug, Clone)]
pub struct SessionProfile {
    pub capabilities: Capabilities,
}

impl SessionProfile {
    pub fn negotiate(
        resolver: &HelloResolver,
        local: &Capabilities,
        peer: &Capabilities,
    ) -> Result<Self, NegotiationError> {
        let capabilities = resolver.resolve(local, peer);
        validate_minimum(&capabilities)?;
        Ok(Self { capabilities })
    }
}

/// Checks the minimum feature set the core requires regardless of what
/// subsystems layer on top: without at least one common picture encoding
/// there is nothing a display session can do.
fn validate_minimum(capabilities: &Capabilities) -> Result<(), NegotiationError> {
    let has_encoding = capabilities
        .get_str_list("encodings")
        .is_some_and(|list| !list.is_empty());
    if !has_encoding {
        return Err(NegotiationError::NoCommonEncoding);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdsp_wire::Value;

    fn str_list(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::Str(s.to_string())).collect())
    }

    #[test]
    fn negotiation_succeeds_with_common_encoding() {
        let resolver = HelloResolver::with_defaults();
        let mut local = Capabilities::new();
        local.set("encodings", str_list(&["png", "h264"]));
        let mut peer = Capabilities::new();
        peer.set("encodings", str_list(&["h264", "jpeg"]));

        let profile = SessionProfile::negotiate(&resolver, &local, &peer).unwrap();
        assert_eq!(
            profile.capabilities.get("encodings").unwrap(),
            &str_list(&["h264"])
        );
    }

    #[test]
    fn negotiation_fails_with_no_common_encoding() {
        let resolver = HelloResolver::with_defaults();
        let mut local = Capabilities::new();
        local.set("encodings", str_list(&["png"]));
        let mut peer = Capabilities::new();
        peer.set("encodings", str_list(&["jpeg"]));

        assert!(matches!(
            SessionProfile::negotiate(&resolver, &local, &peer),
            Err(NegotiationError::NoCommonEncoding)
        ));
    }
}
