//! graph_serde: identity-preserving encoding of object graphs.
//!
//! Converts an in-memory graph that may share sub-objects or contain cycles
//! into a tree-shaped, type-tagged JSON value, and rebuilds an equivalent
//! graph from it with sharing, cycles and class tags restored.
//!
//! - [`Value`] - the object graph (scalars plus shared composites)
//! - [`ClassRegistry`] / [`Class`] - type tags, placeholder construction,
//!   post-decode hooks and the exclusion policy
//! - [`Encoder`] - graph to wire tree
//! - [`Decoder`] - wire tree to graph
//! - [`wire`] - node layout, side table and reference validation
//!
//! # Wire format
//!
//! ```text
//! { "t": "A", "v": { "_mapId": 0 },
//!   "_map": [[0, { "name": "A", "self": { "t": "A", "v": { "_mapId": 0 } } }]] }
//! ```
//!
//! Composites reached more than once are moved into the root side table
//! (`_map`) and every occurrence becomes a reference node. Everything else
//! is inlined.
//!
//! # Example
//!
//! ```
//! use graph_serde::{ClassRegistry, Decoder, Encoder, NamedClass, Record, Value};
//!
//! let registry = ClassRegistry::new().with_class(NamedClass::new("A"));
//!
//! let a = Value::record(Record::new("A").with_field("name", "A"));
//! a.set_field("self", a.clone());
//!
//! let wire = Encoder::new(&registry).encode(&a).unwrap();
//! assert_eq!(wire["_map"].as_array().unwrap().len(), 1);
//!
//! let o = Decoder::new(&registry).decode(&wire).unwrap();
//! assert_eq!(o.field("name").unwrap().as_str(), Some("A"));
//! assert!(o.field("self").unwrap().same_value(&o));
//! ```

pub mod config;
pub mod decode;
pub mod encode;
mod error;
pub mod registry;
pub mod value;
pub mod wire;

// Re-exports
pub use config::{DecoderConfig, EncoderConfig, EngineConfig};
pub use decode::Decoder;
pub use encode::Encoder;
pub use error::{Result, SerdeError};
pub use registry::{Class, ClassRegistry, NamedClass};
pub use value::{Record, Shared, Value, ValueMap, ValueSet};
pub use wire::{validate_references, validate_references_with, WireStats};

/// Encode a graph with the default encoder configuration.
pub fn encode(registry: &ClassRegistry, value: &Value) -> Result<serde_json::Value> {
    Encoder::new(registry).encode(value)
}

/// Decode a wire tree with the default decoder configuration.
pub fn decode(registry: &ClassRegistry, wire: &serde_json::Value) -> Result<Value> {
    Decoder::new(registry).decode(wire)
}

/// Encoder and decoder built from one [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct Engine<'r> {
    registry: &'r ClassRegistry,
    config: EngineConfig,
}

impl<'r> Engine<'r> {
    /// Create an engine over a registry.
    pub fn new(registry: &'r ClassRegistry, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Encoder built from the encoder half of the config.
    pub fn encoder(&self) -> Encoder<'r> {
        Encoder::with_config(self.registry, self.config.encoder.clone())
    }

    /// Decoder built from the decoder half of the config.
    pub fn decoder(&self) -> Decoder<'r> {
        Decoder::with_config(self.registry, self.config.decoder.clone())
    }

    /// Encode a graph. See [`Encoder::encode`].
    pub fn encode(&self, value: &Value) -> Result<serde_json::Value> {
        self.encoder().encode(value)
    }

    /// Decode a wire tree. See [`Decoder::decode`].
    pub fn decode(&self, wire: &serde_json::Value) -> Result<Value> {
        self.decoder().decode(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_MAX_DEPTH, PERMISSIVE_MAX_DEPTH};
    use std::thread;

    /// Run `f` on a thread with a main-thread sized stack.
    fn on_main_sized_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
        thread::Builder::new()
            .stack_size(8 * 1024 * 1024)
            .spawn(f)
            .unwrap()
            .join()
            .unwrap()
    }

    fn nested_arrays(levels: usize) -> Value {
        (0..levels).fold(Value::from(0), |inner, _| Value::array(vec![inner]))
    }

    #[test]
    fn free_functions_round_trip() {
        let registry = ClassRegistry::new();
        let value = Value::array(vec![Value::from(1), Value::from("two")]);
        let wire = encode(&registry, &value).unwrap();
        let back = decode(&registry, &wire).unwrap();
        assert!(back.deep_eq(&value));
    }

    #[test]
    fn engine_applies_config() {
        let registry = ClassRegistry::new();
        let engine = Engine::new(&registry, EngineConfig::strict());
        assert!(engine.decoder().config().validate_input);
        assert_eq!(engine.encoder().config().max_depth, 128);

        let wire = serde_json::json!({"v": {"x": {"v": {"_mapId": 4}}}});
        assert!(matches!(
            engine.decode(&wire),
            Err(SerdeError::MissingSideTable { id: 4 })
        ));
    }

    #[test]
    fn default_depth_round_trips_on_a_spawned_thread() {
        let registry = ClassRegistry::new();
        let engine = Engine::new(&registry, EngineConfig::default());
        let value = nested_arrays(DEFAULT_MAX_DEPTH);

        let wire = engine.encode(&value).unwrap();
        let back = engine.decode(&wire).unwrap();
        assert!(back.deep_eq(&value));
    }

    #[test]
    fn permissive_depth_round_trips() {
        let outcome = on_main_sized_stack(|| {
            let registry = ClassRegistry::new();
            let mut config = EngineConfig::permissive();
            config.decoder.validate_input = true;
            let engine = Engine::new(&registry, config);

            let value = nested_arrays(PERMISSIVE_MAX_DEPTH);
            let wire = engine.encode(&value).map_err(|e| e.code())?;
            let back = engine.decode(&wire).map_err(|e| e.code())?;
            if !back.deep_eq(&value) {
                return Err("MISMATCH");
            }

            match engine.encode(&nested_arrays(PERMISSIVE_MAX_DEPTH + 1)) {
                Err(SerdeError::DepthLimitExceeded { max }) if max == PERMISSIVE_MAX_DEPTH => Ok(()),
                _ => Err("NO_DEPTH_ERROR"),
            }
        });
        assert_eq!(outcome, Ok(()));
    }
}
