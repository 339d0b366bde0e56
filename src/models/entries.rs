//! Leaf values stored in the document's named collections.

use super::entity::{EntityShapeError, JsonEntity, parse_shape};
use super::PathResolver;
use crate::{path_resolving_entity, pure_value_entity};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use serde_json::Value;
use std::collections::HashSet;

/// Ordered, de-duplicated list of relative paths.
///
/// Serialises to a JSON array of strings. Insertion order survives a round
/// trip; inserting an entry that is already present is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringSet {
    entries: IndexSet<String>,
}

impl StringSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry`, returning false if it was already present.
    pub fn insert(&mut self, entry: impl Into<String>) -> bool {
        self.entries.insert(entry.into())
    }

    /// Remove `entry` while keeping the order of the rest.
    pub fn remove(&mut self, entry: &str) -> bool {
        self.entries.shift_remove(entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.contains(entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for StringSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl JsonEntity for StringSet {
    type Context = ();
    const NAME: &'static str = "StringSet";

    fn is_json(value: &Value) -> bool {
        let Some(items) = value.as_array() else {
            return false;
        };

        let mut seen = HashSet::with_capacity(items.len());
        items
            .iter()
            .all(|item| item.as_str().is_some_and(|entry| seen.insert(entry)))
    }

    fn from_json(_context: (), value: &Value) -> Result<Self, EntityShapeError> {
        let items: Vec<String> = parse_shape(Self::NAME, value)?;
        let count = items.len();
        let entries: IndexSet<String> = items.into_iter().collect();

        if entries.len() != count {
            return Err(EntityShapeError::new(Self::NAME, "duplicate entries"));
        }
        Ok(Self { entries })
    }

    fn to_json(&self) -> Value {
        Value::Array(self.entries.iter().cloned().map(Value::String).collect())
    }
}

pure_value_entity!(StringSet);

/// A single path relative to the document's directory.
///
/// The path is bound to a resolver when the entry is constructed, so the
/// absolute location reflects the document directory at that moment rather
/// than whatever the caller's resolver points to later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    location: PathResolver,
}

impl File {
    /// Bind `path` beneath the directory `document` resolves to.
    pub fn new(document: &PathResolver, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            location: document.nested(path),
        }
    }

    /// The path as stored in the document.
    pub fn relative_path(&self) -> &Utf8Path {
        self.location.relative()
    }

    pub fn absolute_path(&self) -> Utf8PathBuf {
        self.location.get_path(true)
    }
}

impl JsonEntity for File {
    type Context = PathResolver;
    const NAME: &'static str = "File";

    fn is_json(value: &Value) -> bool {
        value.is_string()
    }

    fn from_json(context: PathResolver, value: &Value) -> Result<Self, EntityShapeError> {
        let path: String = parse_shape(Self::NAME, value)?;
        Ok(Self::new(&context, path))
    }

    fn to_json(&self) -> Value {
        Value::String(self.location.relative().to_string())
    }
}

path_resolving_entity!(File);

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolver() -> PathResolver {
        PathResolver::new("/work/project", "").unwrap()
    }

    #[test]
    fn test_string_set_predicate() {
        assert!(StringSet::is_json(&json!([])));
        assert!(StringSet::is_json(&json!(["sources/a", "sources/b"])));

        assert!(!StringSet::is_json(&json!(["sources/a", "sources/a"])));
        assert!(!StringSet::is_json(&json!(["sources/a", 3])));
        assert!(!StringSet::is_json(&json!({"0": "sources/a"})));
        assert!(!StringSet::is_json(&json!("sources/a")));
    }

    #[test]
    fn test_string_set_preserves_order() {
        let value = json!(["z", "a", "m"]);
        let set = StringSet::from_json((), &value).unwrap();

        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["z", "a", "m"]);
        assert_eq!(set.to_json(), value);
    }

    #[test]
    fn test_string_set_insert_dedupes() {
        let mut set: StringSet = ["a", "b"].into_iter().collect();
        assert!(!set.insert("a"));
        assert!(set.insert("c"));
        assert!(set.remove("a"));
        assert_eq!(set.to_json(), json!(["b", "c"]));
    }

    #[test]
    fn test_string_set_factory_rejects_duplicates() {
        let err = StringSet::from_json((), &json!(["a", "a"])).unwrap_err();
        assert_eq!(err.entity, "StringSet");
    }

    #[test]
    fn test_file_binds_to_document_directory() {
        let mut document = resolver();
        let file = File::from_json(document.clone(), &json!("mozconfigs/debug.mozconfig")).unwrap();

        // later changes to the document resolver do not move the file
        document.set_path(false, "elsewhere").unwrap();

        assert_eq!(file.relative_path().as_str(), "mozconfigs/debug.mozconfig");
        assert_eq!(
            file.absolute_path().as_str(),
            "/work/project/mozconfigs/debug.mozconfig"
        );
        assert_eq!(file.to_json(), json!("mozconfigs/debug.mozconfig"));
    }

    #[test]
    fn test_file_predicate() {
        assert!(File::is_json(&json!("patches/a.patch")));
        assert!(!File::is_json(&json!(["patches/a.patch"])));
        assert!(!File::is_json(&json!(null)));
    }
}
