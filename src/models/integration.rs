//! Entities that point at other collections by key instead of embedding them.

use super::configuration::Collection;
use super::entity::{EntityShapeError, JsonEntity, parse_shape};
use crate::pure_value_entity;
use serde::Deserialize;
use serde_json::{Value, json};

/// A key held by a composite entity, and the collection it must exist in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference<'a> {
    /// JSON field the key came from, e.g. `sourceKeys`
    pub field: &'static str,
    pub target: Collection,
    pub key: &'a str,
}

/// A build-branch overlay: a vanilla upstream tag plus source and patch sets.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Integration {
    pub vanilla_tag: String,
    /// Keys into the document's `sources`
    pub source_keys: Vec<String>,
    /// Keys into the document's `patches`
    pub patch_keys: Vec<String>,
    /// Where the integration is assembled, relative to the document directory
    pub target_directory: String,
}

impl Integration {
    pub fn new(vanilla_tag: impl Into<String>, target_directory: impl Into<String>) -> Self {
        Self {
            vanilla_tag: vanilla_tag.into(),
            source_keys: Vec::new(),
            patch_keys: Vec::new(),
            target_directory: target_directory.into(),
        }
    }

    /// Every key this integration expects other collections to hold.
    pub fn references(&self) -> impl Iterator<Item = Reference<'_>> {
        let sources = self.source_keys.iter().map(|key| Reference {
            field: "sourceKeys",
            target: Collection::Sources,
            key: key.as_str(),
        });
        let patches = self.patch_keys.iter().map(|key| Reference {
            field: "patchKeys",
            target: Collection::Patches,
            key: key.as_str(),
        });
        sources.chain(patches)
    }
}

impl JsonEntity for Integration {
    type Context = ();
    const NAME: &'static str = "Integration";

    fn is_json(value: &Value) -> bool {
        value.is_object() && Self::deserialize(value).is_ok()
    }

    fn from_json(_context: (), value: &Value) -> Result<Self, EntityShapeError> {
        if !value.is_object() {
            return Err(EntityShapeError::new(Self::NAME, "expected an object"));
        }
        parse_shape(Self::NAME, value)
    }

    fn to_json(&self) -> Value {
        json!({
            "vanillaTag": self.vanilla_tag,
            "sourceKeys": self.source_keys,
            "patchKeys": self.patch_keys,
            "targetDirectory": self.target_directory,
        })
    }
}

pure_value_entity!(Integration);

/// One buildable target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Project {
    /// Key into the document's `integrations`
    pub integration_key: String,
    /// Key into the document's `mozconfigs`
    pub mozconfig_key: String,
    /// Key into the document's `sources`
    pub app_dir_key: String,
}

impl Project {
    pub fn new(
        integration_key: impl Into<String>,
        mozconfig_key: impl Into<String>,
        app_dir_key: impl Into<String>,
    ) -> Self {
        Self {
            integration_key: integration_key.into(),
            mozconfig_key: mozconfig_key.into(),
            app_dir_key: app_dir_key.into(),
        }
    }

    pub fn references(&self) -> impl Iterator<Item = Reference<'_>> {
        [
            Reference {
                field: "integrationKey",
                target: Collection::Integrations,
                key: self.integration_key.as_str(),
            },
            Reference {
                field: "mozconfigKey",
                target: Collection::Mozconfigs,
                key: self.mozconfig_key.as_str(),
            },
            Reference {
                field: "appDirKey",
                target: Collection::Sources,
                key: self.app_dir_key.as_str(),
            },
        ]
        .into_iter()
    }
}

impl JsonEntity for Project {
    type Context = ();
    const NAME: &'static str = "Project";

    fn is_json(value: &Value) -> bool {
        value.is_object() && Self::deserialize(value).is_ok()
    }

    fn from_json(_context: (), value: &Value) -> Result<Self, EntityShapeError> {
        if !value.is_object() {
            return Err(EntityShapeError::new(Self::NAME, "expected an object"));
        }
        parse_shape(Self::NAME, value)
    }

    fn to_json(&self) -> Value {
        json!({
            "integrationKey": self.integration_key,
            "mozconfigKey": self.mozconfig_key,
            "appDirKey": self.app_dir_key,
        })
    }
}

pure_value_entity!(Project);
