//! Configuration lookups a program makes before mapping its ports:
//! latency, buffering, and arbitrary named values handed down by the
//! launcher.
//!
//! One `ConfigValue` enum and one `ConfigSource::lookup` method cover
//! every kind of named value a launcher hands down; the caller
//! pattern-matches the variant it expects.

use crate::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Str(String),
    Int(i64),
    Double(f64),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            ConfigValue::Double(d) => Some(*d),
            ConfigValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

/// Anything that can answer "what is variable `name` set to". A launcher
/// implements this over whatever configuration file format it reads; the
/// core only ever consumes it through this trait.
pub trait ConfigSource {
    fn lookup(&self, name: &str) -> Option<&ConfigValue>;

    /// Looks up `name`, falling back to `default` if unset. Missing
    /// configuration is not an error; a type mismatch is the caller's to
    /// detect via the `as_*` accessors.
    fn lookup_or(&self, name: &str, default: ConfigValue) -> ConfigValue {
        self.lookup(name).cloned().unwrap_or(default)
    }
}

/// An in-memory `ConfigSource`, useful for tests and for a launcher that
/// has already parsed its configuration into a map.
#[derive(Debug, Clone, Default)]
pub struct MapConfigSource {
    values: HashMap<String, ConfigValue>,
}

impl MapConfigSource {
    pub fn new() -> Self {
        Self {
            values: HashMap::default(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: ConfigValue) {
        self.values.insert(name.into(), value);
    }
}

impl ConfigSource for MapConfigSource {
    fn lookup(&self, name: &str) -> Option<&ConfigValue> {
        self.values.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_or_falls_back_to_default_when_unset() {
        let source = MapConfigSource::new();
        let value = source.lookup_or("latency", ConfigValue::Double(0.0));
        assert_eq!(value, ConfigValue::Double(0.0));
    }

    #[test]
    fn lookup_returns_set_value() {
        let mut source = MapConfigSource::new();
        source.set("width", ConfigValue::Int(42));
        assert_eq!(source.lookup("width").unwrap().as_int(), Some(42));
    }
}
