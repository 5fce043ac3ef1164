use std::collections::BTreeMap;

use rdsp_wire::Value;

/// The capability map exchanged in a `hello` packet: a typed wrapper over
/// `Value::Map` with namespaced accessors (`caps.get("encodings", "png")`
/// reads the `encodings` subsystem's `png` key).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capabilities(BTreeMap<String, Value>);

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }

    pub fn into_value(self) -> Value {
        Value::Map(self.0)
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Map(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    pub fn get_str_list(&self, key: &str) -> Option<Vec<&str>> {
        self.get(key)?.as_list().map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
        })
    }

    /// Keys namespaced under `namespace.`, e.g. all `encodings.*` keys for
    /// the picture-encoding subsystem.
    pub fn namespace(&self, namespace: &str) -> impl Iterator<Item = (&str, &Value)> {
        let prefix = format!("{namespace}.");
        self.0.iter().filter_map(move |(k, v)| {
            k.strip_prefix(prefix.as_str()).map(|rest| (rest, v))
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_value() {
        let mut caps = Capabilities::new();
        caps.set("bandwidth-limit", Value::Int(1_000_000));
        caps.set("clipboard.enabled", Value::Bool(true));

        let value = caps.clone().into_value();
        let restored = Capabilities::from_value(value).unwrap();
        assert_eq!(restored, caps);
    }

    #[test]
    fn namespace_strips_prefix() {
        let mut caps = Capabilities::new();
        caps.set("encodings.png", Value::Bool(true));
        caps.set("encodings.jpeg", Value::Bool(false));
        caps.set("other", Value::Int(1));

        let mut ns: Vec<_> = caps.namespace("encodings").collect();
        ns.sort_by_key(|(k, _)| *k);
        assert_eq!(ns.len(), 2);
        assert_eq!(ns[0].0, "jpeg");
        assert_eq!(ns[1].0, "png");
    }
}
