//! In-memory object graph.
//!
//! Scalars are held inline. Composites (`Array`, `Set`, `Map`, `Record`) are
//! shared handles: cloning a [`Value`] clones the handle, so both clones
//! point at the same composite. Sharing and cycles are expressed by
//! inserting a clone of a handle somewhere else in the graph (or into
//! itself).
//!
//! Handles are reference counted, so a cyclic graph (built by hand or
//! returned by the decoder) keeps itself alive after the last outside
//! handle is dropped. Call [`Value::clear`] on one composite of each cycle
//! to release it.

use crate::wire::{TAG_ARRAY, TAG_DATE, TAG_FUNCTION, TAG_MAP, TAG_SET};
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;

/// Shared, interior-mutable handle used for every composite.
pub type Shared<T> = Rc<RefCell<T>>;

pub(crate) fn shared<T>(inner: T) -> Shared<T> {
    Rc::new(RefCell::new(inner))
}

pub(crate) fn handle_identity<T>(handle: &Shared<T>) -> usize {
    Rc::as_ptr(handle) as *const () as usize
}

/// A node of the object graph.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent / nothing.
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Date-time instant, carried on the wire as epoch milliseconds.
    Date(DateTime<Utc>),
    /// Name-only handle for a function or class reference. Never executable.
    Function(String),
    Array(Shared<Vec<Value>>),
    Set(Shared<ValueSet>),
    Map(Shared<ValueMap>),
    Record(Shared<Record>),
}

impl Value {
    /// Create a new array composite.
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(shared(items.into_iter().collect()))
    }

    /// Create a new set composite. Duplicate members are dropped.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Set(shared(items.into_iter().collect()))
    }

    /// Create a new map composite. Later duplicate keys overwrite earlier ones.
    pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Value::Map(shared(entries.into_iter().collect()))
    }

    /// Wrap a record in a new shared handle.
    pub fn record(record: Record) -> Self {
        Value::Record(shared(record))
    }

    /// Create a name-only function reference.
    pub fn function(name: impl Into<String>) -> Self {
        Value::Function(name.into())
    }

    /// True for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for arrays, sets, maps and records.
    pub fn is_composite(&self) -> bool {
        self.identity().is_some()
    }

    /// Return the value if it is a plain scalar (bool, number, string or
    /// date). `Null` and function references are not simple.
    pub fn as_simple(&self) -> Option<&Value> {
        match self {
            Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Date(_) => Some(self),
            _ => None,
        }
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The number, if this is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The date, if this is one.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// The array handle, if this is an array.
    pub fn as_array(&self) -> Option<&Shared<Vec<Value>>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The set handle, if this is a set.
    pub fn as_set(&self) -> Option<&Shared<ValueSet>> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    /// The map handle, if this is a map.
    pub fn as_map(&self) -> Option<&Shared<ValueMap>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// The record handle, if this is a record.
    pub fn as_record(&self) -> Option<&Shared<Record>> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Identity of a composite: the address of its shared allocation.
    ///
    /// Only meaningful while the graph is alive; scalars have no identity.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Array(h) => Some(handle_identity(h)),
            Value::Set(h) => Some(handle_identity(h)),
            Value::Map(h) => Some(handle_identity(h)),
            Value::Record(h) => Some(handle_identity(h)),
            _ => None,
        }
    }

    /// Runtime type name, as written into the wire `t` tag.
    ///
    /// Untyped records and scalars other than dates have no type name.
    pub fn type_name(&self) -> Option<String> {
        match self {
            Value::Array(_) => Some(TAG_ARRAY.to_string()),
            Value::Set(_) => Some(TAG_SET.to_string()),
            Value::Map(_) => Some(TAG_MAP.to_string()),
            Value::Date(_) => Some(TAG_DATE.to_string()),
            Value::Function(_) => Some(TAG_FUNCTION.to_string()),
            Value::Record(record) => record.borrow().class().map(str::to_string),
            _ => None,
        }
    }

    /// Clone of a record field, or `None` if this is not a record or the
    /// field is missing.
    pub fn field(&self, name: &str) -> Option<Value> {
        self.as_record()?.borrow().get(name).cloned()
    }

    /// Set a record field in place. Returns `false` if this is not a record.
    pub fn set_field(&self, name: impl Into<String>, value: Value) -> bool {
        match self.as_record() {
            Some(record) => {
                record.borrow_mut().insert(name, value);
                true
            }
            None => false,
        }
    }

    /// Empty a composite in place, dropping every child handle it holds.
    /// Returns `false` for scalars.
    ///
    /// Other handles to the composite stay valid and see it empty.
    pub fn clear(&self) -> bool {
        match self {
            Value::Array(h) => h.borrow_mut().clear(),
            Value::Set(h) => h.borrow_mut().clear(),
            Value::Map(h) => h.borrow_mut().clear(),
            Value::Record(h) => h.borrow_mut().clear(),
            _ => return false,
        }
        true
    }

    /// SameValueZero: scalars compare by value (NaN equals NaN, 0 equals
    /// -0), composites by identity.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => numbers_equal(*a, *b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => match (self.identity(), other.identity()) {
                (Some(a), Some(b)) => a == b && self.kind() == other.kind(),
                _ => false,
            },
        }
    }

    /// Structural equality. Terminates on cyclic graphs: a pair of
    /// composites already under comparison is assumed equal.
    ///
    /// Set members and map entries are compared in insertion order.
    pub fn deep_eq(&self, other: &Value) -> bool {
        deep_eq(self, other, &mut HashSet::new())
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Function(_) => "function",
            Value::Array(_) => "array",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Record(_) => "record",
        }
    }
}

fn numbers_equal(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn deep_eq(a: &Value, b: &Value, assumed: &mut HashSet<(usize, usize)>) -> bool {
    if let (Some(ia), Some(ib)) = (a.identity(), b.identity()) {
        if ia == ib {
            return a.kind() == b.kind();
        }
        if !assumed.insert((ia, ib)) {
            return true;
        }
    }

    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| deep_eq(l, r, assumed))
        }
        (Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| deep_eq(l, r, assumed))
        }
        (Value::Map(x), Value::Map(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.iter().zip(y.iter()).all(|((lk, lv), (rk, rv))| {
                    deep_eq(lk, rk, assumed) && deep_eq(lv, rv, assumed)
                })
        }
        (Value::Record(x), Value::Record(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.class() == y.class()
                && x.len() == y.len()
                && x.fields().zip(y.fields()).all(|((lk, lv), (rk, rv))| {
                    lk == rk && deep_eq(lv, rv, assumed)
                })
        }
        _ => a.same_value(b),
    }
}

// Shallow on purpose: composites may be cyclic.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Date(d) => write!(f, "Date({})", d.to_rfc3339()),
            Value::Function(name) => write!(f, "Function({name})"),
            Value::Array(h) => match h.try_borrow() {
                Ok(items) => write!(f, "Array(len={})", items.len()),
                Err(_) => f.write_str("Array(<borrowed>)"),
            },
            Value::Set(h) => match h.try_borrow() {
                Ok(set) => write!(f, "Set(len={})", set.len()),
                Err(_) => f.write_str("Set(<borrowed>)"),
            },
            Value::Map(h) => match h.try_borrow() {
                Ok(map) => write!(f, "Map(len={})", map.len()),
                Err(_) => f.write_str("Map(<borrowed>)"),
            },
            Value::Record(h) => match h.try_borrow() {
                Ok(record) => write!(
                    f,
                    "Record({}, fields={:?})",
                    record.class().unwrap_or("<untyped>"),
                    record.fields.keys().collect::<Vec<_>>()
                ),
                Err(_) => f.write_str("Record(<borrowed>)"),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::record(record)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(shared(items))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

/// A keyed record, optionally tagged with a class name.
///
/// Fields are kept in a `BTreeMap` so encoding order is deterministic.
#[derive(Debug, Clone, Default)]
pub struct Record {
    class: Option<String>,
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Create an empty record tagged with a class name.
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: Some(class.into()),
            fields: BTreeMap::new(),
        }
    }

    /// Create an empty plain record with no class.
    pub fn untyped() -> Self {
        Self::default()
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Class name, `None` for untyped records.
    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    /// True when the record carries a class name.
    pub fn is_typed(&self) -> bool {
        self.class.is_some()
    }

    /// Borrow a field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Insert or replace a field, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(name.into(), value)
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Remove every field.
    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// True when the field is present, even if it holds `Null`.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Fields in key order.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Insertion-ordered set, unique under [`Value::same_value`].
///
/// Lookups are linear: composite members compare by identity, which has no
/// stable hash across graphs.
#[derive(Debug, Clone, Default)]
pub struct ValueSet {
    items: Vec<Value>,
}

impl ValueSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a member. Returns `false` if an equal member was present.
    pub fn insert(&mut self, value: Value) -> bool {
        if self.contains(&value) {
            return false;
        }
        self.items.push(value);
        true
    }

    /// True when an equal member is present.
    pub fn contains(&self, value: &Value) -> bool {
        self.items.iter().any(|item| item.same_value(value))
    }

    /// Members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.iter()
    }

    /// Remove every member.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the set has no members.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<Value> for ValueSet {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let mut set = ValueSet::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

/// Insertion-ordered map, keys unique under [`Value::same_value`].
#[derive(Debug, Clone, Default)]
pub struct ValueMap {
    entries: Vec<(Value, Value)>,
}

impl ValueMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry. A replaced entry keeps its position.
    pub fn insert(&mut self, key: Value, value: Value) -> Option<Value> {
        match self.entries.iter_mut().find(|(k, _)| k.same_value(&key)) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Look up the value stored under an equal key.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.same_value(key))
            .map(|(_, v)| v)
    }

    /// True when an equal key is present.
    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(Value, Value)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let mut map = ValueMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}
