//! The versioned configuration document and its referential-integrity rules.
//!
//! On disk the document is a JSON object with six keys, always written in
//! this order:
//!
//! ```json
//! {
//!   "formatVersion": "1.0.0",
//!   "sources": { "hatchedEgg": ["sources/hatchedEgg"] },
//!   "patches": {},
//!   "mozconfigs": { "debug": "cleanroom/mozconfigs/debug.mozconfig" },
//!   "integrations": {
//!     "central": {
//!       "vanillaTag": "central",
//!       "sourceKeys": ["hatchedEgg"],
//!       "patchKeys": [],
//!       "targetDirectory": "../compiles/central"
//!     }
//!   },
//!   "projects": {
//!     "p1": { "integrationKey": "central", "mozconfigKey": "debug", "appDirKey": "hatchedEgg" }
//!   }
//! }
//! ```
//!
//! Integrations and projects refer to entries of other collections by key.
//! Loading constructs every collection first and checks references second,
//! so a key may point at an entry that appears later in the input.

use super::entity::{EntityShapeError, JsonEntity};
use super::{File, Integration, PathResolver, Project, Reference, StringSet};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Schema version written into every document
pub const FORMAT_VERSION: &str = "1.0.0";

/// Top-level keys in serialisation order
pub const CONFIG_KEYS: [&str; 6] = [
    "formatVersion",
    "sources",
    "patches",
    "mozconfigs",
    "integrations",
    "projects",
];

/// The five named collections of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Sources,
    Patches,
    Mozconfigs,
    Integrations,
    Projects,
}

impl Collection {
    /// JSON key of the collection
    pub fn key(self) -> &'static str {
        match self {
            Collection::Sources => "sources",
            Collection::Patches => "patches",
            Collection::Mozconfigs => "mozconfigs",
            Collection::Integrations => "integrations",
            Collection::Projects => "projects",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A key held by an integration or project that names no existing entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} \"{key}\" refers to missing {target} entry \"{missing}\" (via {field})")]
pub struct ReferentialIntegrityError {
    /// Entity kind holding the reference, e.g. `Project`
    pub kind: &'static str,
    /// Key of the referencing entity in its own collection
    pub key: String,
    /// Field that carried the reference, e.g. `appDirKey`
    pub field: &'static str,
    pub target: Collection,
    /// The referenced key that does not exist
    pub missing: String,
}

impl ReferentialIntegrityError {
    fn new(kind: &'static str, key: &str, reference: Reference<'_>) -> Self {
        Self {
            kind,
            key: key.to_string(),
            field: reference.field,
            target: reference.target,
            missing: reference.key.to_string(),
        }
    }
}

/// Errors raised while loading a document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Value is not a configuration document (format {})", FORMAT_VERSION)]
    Malformed,

    #[error(transparent)]
    Shape(#[from] EntityShapeError),

    #[error(transparent)]
    ReferentialIntegrity(#[from] ReferentialIntegrityError),
}

/// The whole configuration document.
///
/// Each collection maps entry names to entities and keeps insertion order.
/// The collections are public so callers can stage entries in memory; call
/// [`validate`](Self::validate) before relying on cross-references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFileFormat {
    pub sources: IndexMap<String, StringSet>,
    pub patches: IndexMap<String, File>,
    pub mozconfigs: IndexMap<String, File>,
    pub integrations: IndexMap<String, Integration>,
    pub projects: IndexMap<String, Project>,
}

impl ConfigFileFormat {
    /// An empty document, the starting point for new configurations.
    pub fn new() -> Self {
        Self::default()
    }

    /// The canonical empty document in JSON form.
    pub fn blank() -> Value {
        Self::default().to_json()
    }

    /// Whether `value` is a well-formed document.
    ///
    /// Requires a plain object with exactly the six top-level keys, the
    /// current [`FORMAT_VERSION`], and every collection entry satisfying its
    /// entity predicate. References are not checked here.
    pub fn is_json(value: &Value) -> bool {
        let Some(object) = value.as_object() else {
            return false;
        };

        if object.len() != CONFIG_KEYS.len()
            || !CONFIG_KEYS.iter().all(|key| object.contains_key(*key))
        {
            return false;
        }

        object.get("formatVersion").and_then(Value::as_str) == Some(FORMAT_VERSION)
            && mapping_is_json::<StringSet>(&object["sources"])
            && mapping_is_json::<File>(&object["patches"])
            && mapping_is_json::<File>(&object["mozconfigs"])
            && mapping_is_json::<Integration>(&object["integrations"])
            && mapping_is_json::<Project>(&object["projects"])
    }

    /// Build a document from JSON.
    ///
    /// `resolver` must resolve to the document's directory; every `File`
    /// entry receives its own clone. All collections are constructed before
    /// any reference is checked.
    ///
    /// # Errors
    /// - [`ConfigurationError::Malformed`] if `value` fails [`is_json`](Self::is_json)
    /// - [`ConfigurationError::ReferentialIntegrity`] for the first dangling key
    pub fn from_json(resolver: &PathResolver, value: &Value) -> Result<Self, ConfigurationError> {
        if !Self::is_json(value) {
            return Err(ConfigurationError::Malformed);
        }

        let document = Self {
            sources: build_mapping(&value["sources"], |entry| StringSet::from_json((), entry))?,
            patches: build_mapping(&value["patches"], |entry| {
                File::from_json(resolver.clone(), entry)
            })?,
            mozconfigs: build_mapping(&value["mozconfigs"], |entry| {
                File::from_json(resolver.clone(), entry)
            })?,
            integrations: build_mapping(&value["integrations"], |entry| {
                Integration::from_json((), entry)
            })?,
            projects: build_mapping(&value["projects"], |entry| Project::from_json((), entry))?,
        };

        document.validate()?;
        Ok(document)
    }

    /// Check every cross-reference, reporting the first dangling one.
    pub fn validate(&self) -> Result<(), ReferentialIntegrityError> {
        match self.dangling_references().into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Every dangling reference: integrations before projects, each in
    /// collection order, then field order.
    pub fn dangling_references(&self) -> Vec<ReferentialIntegrityError> {
        let integrations = self.integrations.iter().flat_map(|(key, integration)| {
            integration
                .references()
                .map(move |reference| (Integration::NAME, key, reference))
        });
        let projects = self.projects.iter().flat_map(|(key, project)| {
            project
                .references()
                .map(move |reference| (Project::NAME, key, reference))
        });

        integrations
            .chain(projects)
            .filter(|(_, _, reference)| !self.contains(reference.target, reference.key))
            .map(|(kind, key, reference)| ReferentialIntegrityError::new(kind, key, reference))
            .collect()
    }

    /// Whether `collection` holds an entry named `key`.
    pub fn contains(&self, collection: Collection, key: &str) -> bool {
        match collection {
            Collection::Sources => self.sources.contains_key(key),
            Collection::Patches => self.patches.contains_key(key),
            Collection::Mozconfigs => self.mozconfigs.contains_key(key),
            Collection::Integrations => self.integrations.contains_key(key),
            Collection::Projects => self.projects.contains_key(key),
        }
    }

    /// Entry names of `collection` in insertion order.
    pub fn keys(&self, collection: Collection) -> Vec<&str> {
        fn names<V>(map: &IndexMap<String, V>) -> Vec<&str> {
            map.keys().map(String::as_str).collect()
        }

        match collection {
            Collection::Sources => names(&self.sources),
            Collection::Patches => names(&self.patches),
            Collection::Mozconfigs => names(&self.mozconfigs),
            Collection::Integrations => names(&self.integrations),
            Collection::Projects => names(&self.projects),
        }
    }

    /// Serialise with `formatVersion` first and each collection in insertion
    /// order.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert(CONFIG_KEYS[0].to_string(), Value::from(FORMAT_VERSION));
        object.insert(Collection::Sources.key().to_string(), mapping_to_json(&self.sources));
        object.insert(Collection::Patches.key().to_string(), mapping_to_json(&self.patches));
        object.insert(
            Collection::Mozconfigs.key().to_string(),
            mapping_to_json(&self.mozconfigs),
        );
        object.insert(
            Collection::Integrations.key().to_string(),
            mapping_to_json(&self.integrations),
        );
        object.insert(Collection::Projects.key().to_string(), mapping_to_json(&self.projects));
        Value::Object(object)
    }

    /// The exact bytes written to disk: two-space indented JSON and a
    /// trailing newline.
    pub fn to_pretty_string(&self) -> serde_json::Result<String> {
        let mut serialized = serde_json::to_string_pretty(&self.to_json())?;
        serialized.push('\n');
        Ok(serialized)
    }
}

fn mapping_is_json<E: JsonEntity>(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|entries| entries.values().all(E::is_json))
}

fn build_mapping<E, F>(value: &Value, mut build: F) -> Result<IndexMap<String, E>, EntityShapeError>
where
    F: FnMut(&Value) -> Result<E, EntityShapeError>,
{
    let Some(entries) = value.as_object() else {
        return Err(EntityShapeError::new("collection", "expected an object"));
    };

    entries
        .iter()
        .map(|(key, entry)| Ok((key.clone(), build(entry)?)))
        .collect()
}

fn mapping_to_json<E: JsonEntity>(entries: &IndexMap<String, E>) -> Value {
    Value::Object(
        entries
            .iter()
            .map(|(key, entity)| (key.clone(), entity.to_json()))
            .collect(),
    )
}
