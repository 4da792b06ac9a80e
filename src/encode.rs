//! Graph encoder.
//!
//! A single depth-first pass assigns every composite an id on first visit
//! and records where its node was written. Composites are inlined the first
//! time they are reached; a later visit emits a reference node instead of
//! descending again, which is what stops cycles. Once the pass is complete,
//! every composite seen more than once has its first node patched into a
//! reference and its children moved into the root side table.

use crate::config::EncoderConfig;
use crate::error::{Result, SerdeError};
use crate::registry::ClassRegistry;
use crate::value::{handle_identity, Record, Value, ValueMap};
use crate::wire::{
    self, SlotPath, SlotStep, KEY_SIDE_TABLE, KEY_VALUE, TAG_ARRAY, TAG_DATE, TAG_FUNCTION,
    TAG_MAP, TAG_SET,
};
use serde_json::{Number, Value as JsonValue};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Largest integer an f64 holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Encodes object graphs into wire trees.
///
/// All traversal state lives in a per-call session, so one encoder can serve
/// any number of independent `encode` calls.
#[derive(Debug, Clone)]
pub struct Encoder<'r> {
    registry: &'r ClassRegistry,
    config: EncoderConfig,
}

impl<'r> Encoder<'r> {
    /// Create an encoder with the default configuration.
    pub fn new(registry: &'r ClassRegistry) -> Self {
        Self::with_config(registry, EncoderConfig::default())
    }

    /// Create an encoder with an explicit configuration.
    pub fn with_config(registry: &'r ClassRegistry, config: EncoderConfig) -> Self {
        Self { registry, config }
    }

    /// The active configuration.
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encode a graph into a wire tree.
    ///
    /// # Errors
    /// Fails on non-finite numbers and on graphs nested deeper than
    /// `max_depth`. Values dropped by the exclusion policy are not errors.
    pub fn encode(&self, value: &Value) -> Result<JsonValue> {
        let mut session = EncodeSession::default();
        let mut path = SlotPath::root();
        let mut root = self.encode_value(value, &mut session, &mut path)?;
        session.finish(&mut root)?;
        Ok(root)
    }

    /// Encode a graph straight to JSON text.
    pub fn encode_to_string(&self, value: &Value) -> Result<String> {
        Ok(serde_json::to_string(&self.encode(value)?)?)
    }

    fn encode_value(
        &self,
        value: &Value,
        session: &mut EncodeSession,
        path: &mut SlotPath,
    ) -> Result<JsonValue> {
        match value {
            Value::Null => Ok(JsonValue::Null),
            Value::Bool(b) => Ok(JsonValue::Bool(*b)),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => Ok(JsonValue::String(s.clone())),
            Value::Date(date) => Ok(wire::node(
                Some(TAG_DATE),
                JsonValue::from(date.timestamp_millis()),
            )),
            Value::Function(name) => Ok(wire::node(
                Some(TAG_FUNCTION),
                JsonValue::String(name.clone()),
            )),
            Value::Array(items) => self.encode_composite(
                handle_identity(items),
                Some(TAG_ARRAY),
                session,
                path,
                |this, session, path| this.encode_items(items.borrow().iter(), session, path),
            ),
            Value::Set(set) => self.encode_composite(
                handle_identity(set),
                Some(TAG_SET),
                session,
                path,
                |this, session, path| this.encode_items(set.borrow().iter(), session, path),
            ),
            Value::Map(map) => self.encode_composite(
                handle_identity(map),
                Some(TAG_MAP),
                session,
                path,
                |this, session, path| this.encode_entries(&map.borrow(), session, path),
            ),
            Value::Record(record) => {
                let class = record.borrow().class().map(str::to_string);
                if let Some(class) = class.as_deref() {
                    if !self.registry.is_allowed(class) {
                        trace!(class, "dropping instance excluded by policy");
                        return Ok(JsonValue::Null);
                    }
                }
                self.encode_composite(
                    handle_identity(record),
                    class.as_deref(),
                    session,
                    path,
                    |this, session, path| this.encode_fields(&record.borrow(), session, path),
                )
            }
        }
    }

    fn encode_composite<F>(
        &self,
        identity: usize,
        tag: Option<&str>,
        session: &mut EncodeSession,
        path: &mut SlotPath,
        children: F,
    ) -> Result<JsonValue>
    where
        F: FnOnce(&Self, &mut EncodeSession, &mut SlotPath) -> Result<JsonValue>,
    {
        if let Some(id) = session.revisit(identity) {
            return Ok(wire::reference(tag, id));
        }
        if path.depth() >= self.config.max_depth {
            return Err(SerdeError::DepthLimitExceeded {
                max: self.config.max_depth,
            });
        }

        session.first_visit(identity, path);
        let body = children(self, session, path)?;
        Ok(wire::node(tag, body))
    }

    fn encode_items<'v>(
        &self,
        items: impl Iterator<Item = &'v Value>,
        session: &mut EncodeSession,
        path: &mut SlotPath,
    ) -> Result<JsonValue> {
        let mut encoded = Vec::new();
        for (i, item) in items.enumerate() {
            encoded.push(descend(path, SlotStep::Index(i), |path| {
                self.encode_value(item, session, path)
            })?);
        }
        Ok(JsonValue::Array(encoded))
    }

    fn encode_entries(
        &self,
        map: &ValueMap,
        session: &mut EncodeSession,
        path: &mut SlotPath,
    ) -> Result<JsonValue> {
        let mut encoded = Vec::with_capacity(map.len());
        for (i, (key, value)) in map.iter().enumerate() {
            let key = descend(path, SlotStep::Entry(i, 0), |path| {
                self.encode_value(key, session, path)
            })?;
            let value = descend(path, SlotStep::Entry(i, 1), |path| {
                self.encode_value(value, session, path)
            })?;
            encoded.push(JsonValue::Array(vec![key, value]));
        }
        Ok(JsonValue::Array(encoded))
    }

    fn encode_fields(
        &self,
        record: &Record,
        session: &mut EncodeSession,
        path: &mut SlotPath,
    ) -> Result<JsonValue> {
        let mut encoded = serde_json::Map::new();
        for (name, value) in record.fields() {
            let value = descend(path, SlotStep::Field(name.clone()), |path| {
                self.encode_value(value, session, path)
            })?;
            encoded.insert(name.clone(), value);
        }
        Ok(JsonValue::Object(encoded))
    }
}

fn descend<T>(path: &mut SlotPath, step: SlotStep, f: impl FnOnce(&mut SlotPath) -> T) -> T {
    path.push(step);
    let out = f(path);
    path.pop();
    out
}

fn number_to_json(n: f64) -> Result<JsonValue> {
    if !n.is_finite() {
        return Err(SerdeError::NonFiniteNumber(n));
    }
    // Integral values go out as JSON integers; -0 keeps its float form.
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER && !(n == 0.0 && n.is_sign_negative()) {
        return Ok(JsonValue::from(n as i64));
    }
    Number::from_f64(n)
        .map(JsonValue::Number)
        .ok_or(SerdeError::NonFiniteNumber(n))
}

/// First-visit bookkeeping for one composite.
#[derive(Debug)]
struct Visit {
    id: u32,
    times: u32,
    /// Where the first (inlined) node was written.
    slot: SlotPath,
}

/// Traversal state scoped to a single `encode` call.
///
/// Keyed by composite address. The graph is borrowed for the whole call, so
/// no address can be freed and reused while the table is alive.
#[derive(Debug, Default)]
struct EncodeSession {
    visits: HashMap<usize, Visit>,
    next_id: u32,
}

impl EncodeSession {
    /// Bump the visit counter of an already seen composite.
    fn revisit(&mut self, identity: usize) -> Option<u32> {
        let visit = self.visits.get_mut(&identity)?;
        visit.times += 1;
        Some(visit.id)
    }

    fn first_visit(&mut self, identity: usize, slot: &SlotPath) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.visits.insert(
            identity,
            Visit {
                id,
                times: 1,
                slot: slot.clone(),
            },
        );
        id
    }

    /// Patch every multiply-visited composite into a reference and attach
    /// the side table to the root.
    fn finish(self, root: &mut JsonValue) -> Result<()> {
        let assigned = self.next_id;
        let mut shared: Vec<Visit> = self
            .visits
            .into_values()
            .filter(|visit| visit.times > 1)
            .collect();
        if shared.is_empty() {
            return Ok(());
        }

        // Deepest first: an ancestor's body must still be inline while the
        // slots of its descendants are resolved through it.
        shared.sort_by(|a, b| {
            b.slot
                .depth()
                .cmp(&a.slot.depth())
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut table = Vec::with_capacity(shared.len());
        for visit in &shared {
            let body = visit
                .slot
                .locate_mut(root)
                .and_then(|node| node.get_mut(KEY_VALUE))
                .ok_or(SerdeError::DanglingSlot { id: visit.id })?;
            let children = std::mem::replace(body, wire::reference_body(visit.id));
            table.push((visit.id, children));
        }
        table.sort_by_key(|(id, _)| *id);

        debug!(
            assigned,
            shared = table.len(),
            "promoted shared values to side table"
        );

        let entries = table
            .into_iter()
            .map(|(id, children)| JsonValue::Array(vec![JsonValue::from(id), children]))
            .collect();
        let root_id = shared.last().map_or(0, |visit| visit.id);
        root.as_object_mut()
            .ok_or(SerdeError::DanglingSlot { id: root_id })?
            .insert(KEY_SIDE_TABLE.to_string(), JsonValue::Array(entries));
        Ok(())
    }
}
