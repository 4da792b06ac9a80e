//! Graph decoder.
//!
//! Decoding is two-phase per composite: an empty placeholder is allocated
//! and, for reference nodes, registered under its id *before* any child is
//! decoded. A child that refers back to the same id (a cycle) or any later
//! reference to it (sharing) resolves to that same placeholder, which is
//! then filled in place.

use crate::config::DecoderConfig;
use crate::error::{Result, SerdeError};
use crate::registry::{Class, ClassRegistry};
use crate::value::{shared, Record, Shared, Value, ValueMap, ValueSet};
use crate::wire::{self, NodeView, TAG_ARRAY, TAG_DATE, TAG_FUNCTION, TAG_MAP, TAG_SET};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Decodes wire trees back into object graphs.
#[derive(Debug, Clone)]
pub struct Decoder<'r> {
    registry: &'r ClassRegistry,
    config: DecoderConfig,
}

impl<'r> Decoder<'r> {
    /// Create a decoder with the default configuration.
    pub fn new(registry: &'r ClassRegistry) -> Self {
        Self::with_config(registry, DecoderConfig::default())
    }

    /// Create a decoder with an explicit configuration.
    pub fn with_config(registry: &'r ClassRegistry, config: DecoderConfig) -> Self {
        Self { registry, config }
    }

    /// The active configuration.
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode a wire tree.
    ///
    /// # Errors
    /// Fails on malformed input: references that the root side table does
    /// not resolve, structurally invalid nodes, or nesting deeper than
    /// `max_depth`. Unregistered type tags are not errors.
    pub fn decode(&self, wire: &JsonValue) -> Result<Value> {
        if self.config.validate_input {
            wire::validate_references_with(wire, self.config.max_depth)?;
        }
        let mut session = DecodeSession::load(wire)?;
        self.decode_value(wire, &mut session, 0, true)
    }

    /// Parse JSON text and decode it.
    pub fn decode_str(&self, json: &str) -> Result<Value> {
        let wire: JsonValue = serde_json::from_str(json)?;
        self.decode(&wire)
    }

    fn decode_value<'w>(
        &self,
        wire: &'w JsonValue,
        session: &mut DecodeSession<'w>,
        depth: usize,
        is_root: bool,
    ) -> Result<Value> {
        if depth > self.config.max_depth {
            return Err(SerdeError::DepthLimitExceeded {
                max: self.config.max_depth,
            });
        }
        match wire {
            JsonValue::Null => Ok(Value::Null),
            JsonValue::Bool(b) => Ok(Value::Bool(*b)),
            JsonValue::Number(n) => n
                .as_f64()
                .map(Value::Number)
                .ok_or_else(|| SerdeError::malformed(format!("unrepresentable number: {n}"))),
            JsonValue::String(s) => Ok(Value::String(s.clone())),
            JsonValue::Array(_) => Err(SerdeError::malformed("bare array outside a node")),
            JsonValue::Object(obj) => {
                let node = NodeView::parse(obj)?;
                if node.has_side_table && !is_root {
                    return Err(SerdeError::malformed("_map on a non-root node"));
                }
                self.decode_node(node, session, depth)
            }
        }
    }

    fn decode_node<'w>(
        &self,
        node: NodeView<'w>,
        session: &mut DecodeSession<'w>,
        depth: usize,
    ) -> Result<Value> {
        match node.tag {
            Some(TAG_DATE) => decode_date(node.body),
            Some(TAG_FUNCTION) => self.decode_function(node.body),
            tag => {
                let id = wire::reference_id(node.body)?;
                if let Some(existing) = id.and_then(|id| session.placeholders.get(&id)) {
                    return Ok(existing.clone());
                }

                let placeholder = self.placeholder(tag);
                if let Some(id) = id {
                    session.placeholders.insert(id, placeholder.to_value());
                }
                let children = match id {
                    Some(id) => session.children(id)?,
                    None => node.body,
                };
                self.populate(&placeholder, children, session, depth)?;
                Ok(placeholder.to_value())
            }
        }
    }

    fn decode_function(&self, body: &JsonValue) -> Result<Value> {
        let name = body
            .as_str()
            .ok_or_else(|| SerdeError::malformed("function node without a name"))?;
        if self.registry.contains(name) {
            Ok(Value::function(name))
        } else {
            trace!(name, "unregistered function reference decoded as empty record");
            Ok(Value::record(Record::untyped()))
        }
    }

    fn placeholder(&self, tag: Option<&str>) -> Placeholder<'r> {
        match tag {
            Some(TAG_ARRAY) => Placeholder::Array(shared(Vec::new())),
            Some(TAG_SET) => Placeholder::Set(shared(ValueSet::new())),
            Some(TAG_MAP) => Placeholder::Map(shared(ValueMap::new())),
            _ => {
                let (record, class) = self.registry.construct(tag);
                if let (Some(tag), None) = (tag, class) {
                    warn!(tag, "unregistered type tag; decoding as untyped record");
                }
                Placeholder::Record(shared(record), class)
            }
        }
    }

    fn populate<'w>(
        &self,
        placeholder: &Placeholder<'r>,
        children: &'w JsonValue,
        session: &mut DecodeSession<'w>,
        depth: usize,
    ) -> Result<()> {
        match placeholder {
            Placeholder::Array(items) => {
                for item in expect_list(children, TAG_ARRAY)? {
                    let value = self.decode_value(item, session, depth + 1, false)?;
                    items.borrow_mut().push(value);
                }
            }
            Placeholder::Set(set) => {
                for item in expect_list(children, TAG_SET)? {
                    let value = self.decode_value(item, session, depth + 1, false)?;
                    set.borrow_mut().insert(value);
                }
            }
            Placeholder::Map(map) => {
                for entry in expect_list(children, TAG_MAP)? {
                    let [key, value] = match entry.as_array().map(Vec::as_slice) {
                        Some([key, value]) => [key, value],
                        _ => return Err(SerdeError::malformed("map entry is not a [key, value] pair")),
                    };
                    let key = self.decode_value(key, session, depth + 1, false)?;
                    let value = self.decode_value(value, session, depth + 1, false)?;
                    map.borrow_mut().insert(key, value);
                }
            }
            Placeholder::Record(record, class) => {
                let fields = children.as_object().ok_or_else(|| {
                    SerdeError::malformed(format!("record children must be an object, got {children}"))
                })?;
                for (name, field) in fields {
                    let value = self.decode_value(field, session, depth + 1, false)?;
                    record.borrow_mut().insert(name.clone(), value);
                }
                if let Some(class) = class {
                    if self.config.run_after_decode {
                        // No borrow is held here; the hook may walk back into
                        // this record through a cycle.
                        class.after_decode(&Value::Record(Rc::clone(record)));
                    }
                }
            }
        }
        Ok(())
    }
}

fn expect_list<'w>(children: &'w JsonValue, tag: &str) -> Result<&'w Vec<JsonValue>> {
    children
        .as_array()
        .ok_or_else(|| SerdeError::malformed(format!("{tag} children must be an array, got {children}")))
}

/// Dates are epoch milliseconds; RFC 3339 strings are accepted as well.
fn decode_date(body: &JsonValue) -> Result<Value> {
    let date = match body {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        JsonValue::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        _ => None,
    };
    date.map(Value::Date)
        .ok_or_else(|| SerdeError::malformed(format!("invalid date: {body}")))
}

/// Empty instance awaiting its children.
enum Placeholder<'r> {
    Array(Shared<Vec<Value>>),
    Set(Shared<ValueSet>),
    Map(Shared<ValueMap>),
    Record(Shared<Record>, Option<&'r Arc<dyn Class>>),
}

impl Placeholder<'_> {
    fn to_value(&self) -> Value {
        match self {
            Placeholder::Array(h) => Value::Array(h.clone()),
            Placeholder::Set(h) => Value::Set(h.clone()),
            Placeholder::Map(h) => Value::Map(h.clone()),
            Placeholder::Record(h, _) => Value::Record(h.clone()),
        }
    }
}

/// State scoped to a single top-level `decode` call; dropped when it returns.
struct DecodeSession<'w> {
    side_table: Option<HashMap<u32, &'w JsonValue>>,
    placeholders: HashMap<u32, Value>,
}

impl<'w> DecodeSession<'w> {
    fn load(root: &'w JsonValue) -> Result<Self> {
        let side_table = wire::side_table_entries(root)?;
        if let Some(table) = &side_table {
            debug!(entries = table.len(), "loaded side table");
        }
        Ok(Self {
            side_table,
            placeholders: HashMap::new(),
        })
    }

    fn children(&self, id: u32) -> Result<&'w JsonValue> {
        match &self.side_table {
            None => Err(SerdeError::MissingSideTable { id }),
            Some(table) => table
                .get(&id)
                .copied()
                .ok_or(SerdeError::UnresolvedReference { id }),
        }
    }
}
