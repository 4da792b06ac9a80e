//! Wire format shared by the encoder and decoder.
//!
//! Every composite travels as a node `{ "t": <tag>, "v": <children> }`. The
//! tag is omitted for untyped records. A node whose `v` is
//! `{ "_mapId": <id> }` is a reference node: its children live in the side
//! table carried by the root node only:
//!
//! ```text
//! { "t": "Person", "v": { "name": "A", "self": { "t": "Person", "v": { "_mapId": 0 } } },
//!   "_map": [[0, { ... children of the shared value ... }]] }
//! ```
//!
//! Scalars are written as plain JSON. Dates are `{ "t": "Date", "v": <epoch millis> }`
//! and function references are `{ "t": "function", "v": <name> }`.

use crate::config::DEFAULT_MAX_DEPTH;
use crate::error::{Result, SerdeError};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

pub const KEY_TAG: &str = "t";
pub const KEY_VALUE: &str = "v";
pub const KEY_SIDE_TABLE: &str = "_map";
pub const KEY_MAP_ID: &str = "_mapId";

pub const TAG_DATE: &str = "Date";
pub const TAG_FUNCTION: &str = "function";
pub const TAG_ARRAY: &str = "Array";
pub const TAG_SET: &str = "Set";
pub const TAG_MAP: &str = "Map";

/// Build a node with an optional tag.
pub fn node(tag: Option<&str>, body: JsonValue) -> JsonValue {
    let mut obj = Map::new();
    if let Some(tag) = tag {
        obj.insert(KEY_TAG.to_string(), JsonValue::String(tag.to_string()));
    }
    obj.insert(KEY_VALUE.to_string(), body);
    JsonValue::Object(obj)
}

/// Body of a reference node: `{ "_mapId": id }`.
pub fn reference_body(id: u32) -> JsonValue {
    let mut obj = Map::new();
    obj.insert(KEY_MAP_ID.to_string(), JsonValue::from(id));
    JsonValue::Object(obj)
}

/// Build a reference node.
pub fn reference(tag: Option<&str>, id: u32) -> JsonValue {
    node(tag, reference_body(id))
}

/// If `body` is a reference body, return its id.
///
/// A record that happens to have a single `_mapId` field is indistinguishable
/// from a reference; the format reserves that key.
pub fn reference_id(body: &JsonValue) -> Result<Option<u32>> {
    match body.as_object().and_then(|obj| obj.get(KEY_MAP_ID)) {
        Some(id) => parse_id(id).map(Some),
        None => Ok(None),
    }
}

fn parse_id(id: &JsonValue) -> Result<u32> {
    id.as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| SerdeError::malformed(format!("invalid _mapId: {id}")))
}

/// Borrowed view of a node's parts.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NodeView<'a> {
    pub tag: Option<&'a str>,
    pub body: &'a JsonValue,
    pub has_side_table: bool,
}

impl<'a> NodeView<'a> {
    pub(crate) fn parse(obj: &'a Map<String, JsonValue>) -> Result<Self> {
        let tag = match obj.get(KEY_TAG) {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(tag)) => Some(tag.as_str()),
            Some(other) => {
                return Err(SerdeError::malformed(format!("non-string tag: {other}")));
            }
        };
        let body = obj
            .get(KEY_VALUE)
            .ok_or_else(|| SerdeError::malformed("node without a `v` field"))?;
        Ok(Self {
            tag,
            body,
            has_side_table: obj.contains_key(KEY_SIDE_TABLE),
        })
    }
}

/// Parse the root side table into `id -> children`.
///
/// Returns `None` if the root is not a node or carries no `_map`.
pub fn side_table_entries(root: &JsonValue) -> Result<Option<HashMap<u32, &JsonValue>>> {
    let Some(table) = root.as_object().and_then(|obj| obj.get(KEY_SIDE_TABLE)) else {
        return Ok(None);
    };
    let entries = table
        .as_array()
        .ok_or_else(|| SerdeError::malformed("_map is not an array"))?;

    let mut by_id = HashMap::with_capacity(entries.len());
    for entry in entries {
        let (id, children) = match entry.as_array().map(Vec::as_slice) {
            Some([id, children]) => (parse_id(id)?, children),
            _ => return Err(SerdeError::malformed("_map entry is not an [id, children] pair")),
        };
        if by_id.insert(id, children).is_some() {
            return Err(SerdeError::DuplicateSideTableEntry { id });
        }
    }
    Ok(Some(by_id))
}

/// One step from a node into its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStep {
    /// Record field.
    Field(String),
    /// Array or set position.
    Index(usize),
    /// Map entry `i`, key (0) or value (1).
    Entry(usize, usize),
}

/// Where a node sits, as steps from the root node through `v` bodies.
///
/// The empty path is the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotPath(Vec<SlotStep>);

impl SlotPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: SlotStep) {
        self.0.push(step);
    }

    pub fn pop(&mut self) -> Option<SlotStep> {
        self.0.pop()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn steps(&self) -> &[SlotStep] {
        &self.0
    }

    /// Resolve this path against an encoded tree.
    pub fn locate_mut<'a>(&self, root: &'a mut JsonValue) -> Option<&'a mut JsonValue> {
        self.0.iter().try_fold(root, |node, step| {
            let body = node.get_mut(KEY_VALUE)?;
            match step {
                SlotStep::Field(name) => body.get_mut(name.as_str()),
                SlotStep::Index(i) => body.get_mut(*i),
                SlotStep::Entry(i, j) => body.get_mut(*i)?.get_mut(*j),
            }
        })
    }
}

/// Counts gathered while validating a wire tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WireStats {
    /// Nodes visited, reference nodes included.
    pub nodes: usize,
    /// Reference nodes.
    pub references: usize,
    /// Entries in the root side table.
    pub side_table_entries: usize,
}

/// Check reference-table closure of an encoded tree.
///
/// Every `_mapId` in the tree, including those inside side-table entries,
/// must name an entry of the root `_map`; ids must be unique; `_map` may
/// only appear on the root. Nesting is limited to [`DEFAULT_MAX_DEPTH`].
pub fn validate_references(wire: &JsonValue) -> Result<WireStats> {
    validate_references_with(wire, DEFAULT_MAX_DEPTH)
}

/// [`validate_references`] with an explicit nesting limit.
pub fn validate_references_with(wire: &JsonValue, max_depth: usize) -> Result<WireStats> {
    let table = side_table_entries(wire)?;
    let mut walker = RefWalker {
        max_depth,
        table: table.as_ref(),
        stats: WireStats {
            side_table_entries: table.as_ref().map_or(0, HashMap::len),
            ..WireStats::default()
        },
    };

    walker.walk_value(wire, 0, true)?;
    if let Some(table) = &table {
        for children in table.values() {
            walker.walk_children(children, 1)?;
        }
    }
    Ok(walker.stats)
}

struct RefWalker<'t, 'a> {
    max_depth: usize,
    table: Option<&'t HashMap<u32, &'a JsonValue>>,
    stats: WireStats,
}

impl RefWalker<'_, '_> {
    fn walk_value(&mut self, value: &JsonValue, depth: usize, is_root: bool) -> Result<()> {
        if depth > self.max_depth {
            return Err(SerdeError::DepthLimitExceeded {
                max: self.max_depth,
            });
        }
        match value {
            JsonValue::Object(obj) => {
                let view = NodeView::parse(obj)?;
                if view.has_side_table && !is_root {
                    return Err(SerdeError::malformed("_map on a non-root node"));
                }
                self.stats.nodes += 1;
                match view.tag {
                    Some(TAG_DATE) | Some(TAG_FUNCTION) => Ok(()),
                    _ => match reference_id(view.body)? {
                        Some(id) => {
                            self.stats.references += 1;
                            self.resolve(id)
                        }
                        None => self.walk_children(view.body, depth + 1),
                    },
                }
            }
            JsonValue::Array(_) => Err(SerdeError::malformed("bare array outside a node")),
            _ => Ok(()),
        }
    }

    // Children are either a record body (object) or a list whose nested
    // arrays can only be map entries, since values never appear as bare
    // arrays.
    fn walk_children(&mut self, children: &JsonValue, depth: usize) -> Result<()> {
        match children {
            JsonValue::Object(fields) => {
                for value in fields.values() {
                    self.walk_value(value, depth, false)?;
                }
                Ok(())
            }
            JsonValue::Array(items) => {
                for item in items {
                    match item {
                        JsonValue::Array(pair) => {
                            for value in pair {
                                self.walk_value(value, depth, false)?;
                            }
                        }
                        value => self.walk_value(value, depth, false)?,
                    }
                }
                Ok(())
            }
            other => Err(SerdeError::malformed(format!(
                "composite children must be an object or array, got {other}"
            ))),
        }
    }

    fn resolve(&self, id: u32) -> Result<()> {
        match self.table {
            None => Err(SerdeError::MissingSideTable { id }),
            Some(table) if table.contains_key(&id) => Ok(()),
            Some(_) => Err(SerdeError::UnresolvedReference { id }),
        }
    }
}
