//! Data models for the configuration document.
//!
//! This module contains the entity graph staged by callers and later written by
//! [`FsQueue`](crate::services::FsQueue):
//! - [`PathResolver`]: Absolute base directory plus relative subpath, used wherever a filesystem location is stored
//! - [`JsonEntity`]: The predicate / factory / serializer contract every entity implements
//! - [`StringSet`], [`File`]: Leaf values held in the `sources`, `patches` and `mozconfigs` collections
//! - [`Integration`], [`Project`]: Composite entities that reference other collections by key
//! - [`ConfigFileFormat`]: The versioned document aggregating all five collections
//!
//! # Architecture Note
//!
//! Entities are plain values. Composite entities never embed what they
//! reference; the document checks that every key resolves, either while
//! loading ([`ConfigFileFormat::from_json`]) or on demand
//! ([`ConfigFileFormat::validate`]).

pub mod configuration;
pub mod entity;
pub mod entries;
pub mod integration;
pub mod path_resolver;

pub use configuration::{
    CONFIG_KEYS, Collection, ConfigFileFormat, ConfigurationError, FORMAT_VERSION,
    ReferentialIntegrityError,
};
pub use entity::{EntityShapeError, JsonEntity};
pub use entries::{File, StringSet};
pub use integration::{Integration, Project, Reference};
pub use path_resolver::{PathResolver, PathResolverError};
