//! Integration tests for ConfigFileFormat
//!
//! These tests verify:
//! - Shape predicates reject every malformed top level
//! - Two-phase loading with forward references
//! - Dangling references fail without a partial document
//! - Serialization order and on-disk formatting

#![cfg(unix)]

use cleanroom::models::{
    CONFIG_KEYS, Collection, ConfigFileFormat, ConfigurationError, FORMAT_VERSION, PathResolver,
    Project,
};
use proptest::prelude::*;
use serde_json::{Value, json};

fn resolver() -> PathResolver {
    PathResolver::new("/work/project", ".cleanroom").unwrap()
}

fn hatched_egg(app_dir_key: &str) -> Value {
    let mut document = ConfigFileFormat::blank();
    document["sources"]["hatchedEgg"] = json!(["sources/hatchedEgg"]);
    document["mozconfigs"]["debug"] = json!("cleanroom/mozconfigs/debug.mozconfig");
    document["integrations"]["central"] = json!({
        "vanillaTag": "central",
        "sourceKeys": ["hatchedEgg"],
        "patchKeys": [],
        "targetDirectory": "../compiles/central",
    });
    document["projects"]["p1"] = json!({
        "integrationKey": "central",
        "mozconfigKey": "debug",
        "appDirKey": app_dir_key,
    });
    document
}

#[test]
fn test_end_to_end_document_round_trips() {
    let input = hatched_egg("hatchedEgg");
    assert!(ConfigFileFormat::is_json(&input));

    let document = ConfigFileFormat::from_json(&resolver(), &input).unwrap();
    assert_eq!(document.to_json(), input);
    assert_eq!(
        document.mozconfigs["debug"].absolute_path().as_str(),
        "/work/project/.cleanroom/cleanroom/mozconfigs/debug.mozconfig"
    );
}

#[test]
fn test_unknown_app_dir_fails_whole_load() {
    let input = hatched_egg("unknownEgg");
    // The shape is fine; only the reference is wrong.
    assert!(ConfigFileFormat::is_json(&input));

    match ConfigFileFormat::from_json(&resolver(), &input) {
        Err(ConfigurationError::ReferentialIntegrity(err)) => {
            assert_eq!(err.key, "p1");
            assert_eq!(err.missing, "unknownEgg");
            assert_eq!(err.target, Collection::Sources);
        }
        other => panic!("Expected a referential integrity error, got: {:?}", other),
    }
}

#[test]
fn test_missing_patch_key_is_reported() {
    let mut input = hatched_egg("hatchedEgg");
    input["integrations"]["central"]["patchKeys"] = json!(["security-fix"]);

    let err = ConfigFileFormat::from_json(&resolver(), &input).unwrap_err();
    assert!(
        err.to_string().contains("\"security-fix\""),
        "Error should name the missing key: {}",
        err
    );
}

#[test]
fn test_missing_source_key_fails_load() {
    let mut input = hatched_egg("hatchedEgg");
    input["integrations"]["central"]["sourceKeys"] = json!(["hatchedEgg", "goldenEgg"]);

    match ConfigFileFormat::from_json(&resolver(), &input) {
        Err(ConfigurationError::ReferentialIntegrity(err)) => {
            assert_eq!(err.key, "central");
            assert_eq!(err.field, "sourceKeys");
            assert_eq!(err.target, Collection::Sources);
            assert_eq!(err.missing, "goldenEgg");
        }
        other => panic!("Expected a referential integrity error, got: {:?}", other),
    }
}

#[test]
fn test_missing_integration_key_fails_load() {
    let mut input = hatched_egg("hatchedEgg");
    input["projects"]["p1"]["integrationKey"] = json!("beta");

    match ConfigFileFormat::from_json(&resolver(), &input) {
        Err(ConfigurationError::ReferentialIntegrity(err)) => {
            assert_eq!(err.key, "p1");
            assert_eq!(err.field, "integrationKey");
            assert_eq!(err.target, Collection::Integrations);
            assert_eq!(err.missing, "beta");
        }
        other => panic!("Expected a referential integrity error, got: {:?}", other),
    }
}

#[test]
fn test_each_top_level_key_is_required() {
    for key in CONFIG_KEYS {
        let mut input = hatched_egg("hatchedEgg");
        input.as_object_mut().unwrap().remove(key);

        assert!(!ConfigFileFormat::is_json(&input), "{} should be required", key);
        assert!(matches!(
            ConfigFileFormat::from_json(&resolver(), &input),
            Err(ConfigurationError::Malformed)
        ));
    }
}

#[test]
fn test_rejects_extra_keys_and_other_versions() {
    let mut extra = ConfigFileFormat::blank();
    extra["comment"] = json!("not allowed");
    assert!(!ConfigFileFormat::is_json(&extra));

    let mut old = ConfigFileFormat::blank();
    old["formatVersion"] = json!("0.9.0");
    assert!(!ConfigFileFormat::is_json(&old));

    assert!(!ConfigFileFormat::is_json(&json!([ConfigFileFormat::blank()])));
    assert!(!ConfigFileFormat::is_json(&Value::Null));
}

#[test]
fn test_rejects_malformed_entries() {
    let mut duplicate = ConfigFileFormat::blank();
    duplicate["sources"]["egg"] = json!(["a", "a"]);
    assert!(!ConfigFileFormat::is_json(&duplicate));

    let mut numeric = ConfigFileFormat::blank();
    numeric["mozconfigs"]["debug"] = json!(42);
    assert!(!ConfigFileFormat::is_json(&numeric));

    let mut partial_project = ConfigFileFormat::blank();
    partial_project["projects"]["p1"] = json!({ "integrationKey": "central" });
    assert!(!ConfigFileFormat::is_json(&partial_project));
}

#[test]
fn test_dangling_references_lists_everything() {
    let mut document = ConfigFileFormat::new();
    document
        .projects
        .insert("p1".into(), Project::new("central", "debug", "egg"));

    let dangling = document.dangling_references();
    let missing: Vec<_> = dangling.iter().map(|e| e.missing.as_str()).collect();
    assert_eq!(missing, ["central", "debug", "egg"]);
    assert_eq!(document.validate().unwrap_err(), dangling[0]);
}

#[test]
fn test_pretty_string_layout() {
    let document = ConfigFileFormat::from_json(&resolver(), &hatched_egg("hatchedEgg")).unwrap();
    let text = document.to_pretty_string().unwrap();

    assert!(text.ends_with("}\n"));
    assert!(text.starts_with(&format!("{{\n  \"formatVersion\": \"{}\",\n  \"sources\"", FORMAT_VERSION)));

    let positions: Vec<_> = CONFIG_KEYS
        .iter()
        .map(|key| text.find(&format!("\"{}\"", key)).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

fn key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,6}"
}

prop_compose! {
    /// A valid document with random keys and every reference satisfied
    fn arb_document()(
        sources in proptest::collection::btree_set(key(), 1..4),
        patches in proptest::collection::btree_set(key(), 0..3),
        mozconfig in key(),
        tag in key(),
    ) -> Value {
        let mut document = ConfigFileFormat::blank();
        for name in &sources {
            document["sources"][name] = json!([format!("sources/{}", name)]);
        }
        for name in &patches {
            document["patches"][name] = json!(format!("patches/{}.patch", name));
        }
        document["mozconfigs"][&mozconfig] = json!(format!("mozconfigs/{}", mozconfig));
        let first_source = sources.iter().next().cloned().unwrap_or_default();
        document["integrations"][&tag] = json!({
            "vanillaTag": tag,
            "sourceKeys": sources.iter().collect::<Vec<_>>(),
            "patchKeys": patches.iter().collect::<Vec<_>>(),
            "targetDirectory": format!("../compiles/{}", tag),
        });
        document["projects"]["main"] = json!({
            "integrationKey": tag,
            "mozconfigKey": mozconfig,
            "appDirKey": first_source,
        });
        document
    }
}

proptest! {
    /// Property: every valid document survives from_json + to_json unchanged
    #[test]
    fn valid_documents_round_trip(input in arb_document()) {
        prop_assert!(ConfigFileFormat::is_json(&input));
        let document = ConfigFileFormat::from_json(&resolver(), &input).unwrap();
        let output = document.to_json();

        prop_assert_eq!(&output, &input);
        prop_assert_eq!(
            serde_json::to_string(&output).unwrap(),
            serde_json::to_string(&input).unwrap()
        );
    }
}
