//! Engine configuration.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Default recursion limit for encode, decode and validation.
///
/// Encode and decode recurse once per nesting level; this limit fits the
/// 2 MiB stack of a spawned thread in a debug build.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Recursion limit of [`EngineConfig::permissive`]. Needs a stack the size
/// of a default main thread (8 MiB).
pub const PERMISSIVE_MAX_DEPTH: usize = 512;

/// Configuration for both halves of the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Encoder configuration.
    pub encoder: EncoderConfig,
    /// Decoder configuration.
    pub decoder: DecoderConfig,
}

/// Encoder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Maximum nesting depth of the graph being encoded.
    pub max_depth: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Decoder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Maximum nesting depth of the wire tree.
    pub max_depth: usize,
    /// Whether to run [`Class::after_decode`](crate::Class::after_decode) hooks.
    pub run_after_decode: bool,
    /// Whether to check reference-table closure before building anything.
    pub validate_input: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            run_after_decode: true,
            validate_input: false,
        }
    }
}

impl EngineConfig {
    /// Validate wire input up front and keep a tighter depth limit.
    pub fn strict() -> Self {
        Self {
            encoder: EncoderConfig { max_depth: 128 },
            decoder: DecoderConfig {
                max_depth: 128,
                run_after_decode: true,
                validate_input: true,
            },
        }
    }

    /// Deeper graphs, no hooks, no up-front validation.
    pub fn permissive() -> Self {
        Self {
            encoder: EncoderConfig {
                max_depth: PERMISSIVE_MAX_DEPTH,
            },
            decoder: DecoderConfig {
                max_depth: PERMISSIVE_MAX_DEPTH,
                run_after_decode: false,
                validate_input: false,
            },
        }
    }

    /// Load a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
