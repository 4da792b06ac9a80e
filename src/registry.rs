//! Class registry and exclusion policy.
//!
//! The registry maps a type tag to a [`Class`] that knows how to allocate an
//! empty instance and, optionally, how to finish it after its fields are
//! decoded. Both the encoder and the decoder borrow it read-only.

use crate::value::{Record, Value};
use crate::wire::{TAG_ARRAY, TAG_MAP, TAG_SET};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Built-in tags every registry knows about.
pub const BUILTIN_TAGS: [&str; 3] = [TAG_ARRAY, TAG_MAP, TAG_SET];

/// A registered type.
pub trait Class: Send + Sync {
    /// Tag written into the wire `t` field for instances of this class.
    fn name(&self) -> &str;

    /// Allocate an empty instance. Fields are filled in afterwards.
    fn construct(&self) -> Record {
        Record::new(self.name())
    }

    /// Post-construction hook, run once after every field is populated.
    ///
    /// Use it for derived state that is not carried on the wire. `instance`
    /// is the shared handle of the decoded record and no borrow of it is
    /// held during the call, so the hook may read back into the instance
    /// through a cycle.
    fn after_decode(&self, _instance: &Value) {}
}

/// A class with no behavior beyond its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedClass {
    name: String,
}

impl NamedClass {
    /// Create a class known only by its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Class for NamedClass {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Registry of classes consulted during encode and decode.
pub struct ClassRegistry {
    classes: HashMap<String, Arc<dyn Class>>,
    /// Allow-set installed by [`ClassRegistry::set_exclusively`].
    only: Option<BTreeSet<String>>,
}

impl ClassRegistry {
    /// Create a registry that knows only the built-in tags.
    pub fn new() -> Self {
        Self {
            classes: HashMap::new(),
            only: None,
        }
    }

    /// Register a class, replacing any class with the same name.
    pub fn register(&mut self, class: impl Class + 'static) -> &mut Self {
        self.register_arc(Arc::new(class))
    }

    /// Register an already shared class.
    pub fn register_arc(&mut self, class: Arc<dyn Class>) -> &mut Self {
        self.classes.insert(class.name().to_string(), class);
        self
    }

    /// Register plain named classes in bulk.
    pub fn register_all<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.register(NamedClass::new(name));
        }
        self
    }

    /// Builder-style [`ClassRegistry::register`].
    pub fn with_class(mut self, class: impl Class + 'static) -> Self {
        self.register(class);
        self
    }

    /// Look up a user-registered class. Built-in tags have no `Class`.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Class>> {
        self.classes.get(name)
    }

    /// True for built-in tags and registered classes.
    pub fn contains(&self, name: &str) -> bool {
        BUILTIN_TAGS.contains(&name) || self.classes.contains_key(name)
    }

    /// Registered class names, sorted, built-ins included.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = BUILTIN_TAGS
            .iter()
            .copied()
            .chain(self.classes.keys().map(String::as_str))
            .collect();
        names.sort_unstable();
        names
    }

    /// Install an allow-set. Class instances outside it encode as `null`.
    ///
    /// Built-in collection tags are always allowed.
    pub fn set_exclusively<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut only: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        only.extend(BUILTIN_TAGS.iter().map(|tag| tag.to_string()));
        self.only = Some(only);
    }

    /// Remove the allow-set installed by [`ClassRegistry::set_exclusively`].
    pub fn clear_exclusion(&mut self) {
        self.only = None;
    }

    /// True when an allow-set is installed.
    pub fn has_exclusion(&self) -> bool {
        self.only.is_some()
    }

    /// Check a type name against the allow-set, if one is installed.
    pub fn is_allowed(&self, type_name: &str) -> bool {
        match &self.only {
            Some(only) => only.contains(type_name),
            None => true,
        }
    }

    /// Allocate the placeholder instance for a record tag.
    ///
    /// Returns the instance and the class that built it; unknown or absent
    /// tags yield an untyped record and no class.
    pub(crate) fn construct(&self, tag: Option<&str>) -> (Record, Option<&Arc<dyn Class>>) {
        match tag.and_then(|name| self.get(name)) {
            Some(class) => (class.construct(), Some(class)),
            None => (Record::untyped(), None),
        }
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes", &self.names())
            .field("only", &self.only)
            .finish()
    }
}
