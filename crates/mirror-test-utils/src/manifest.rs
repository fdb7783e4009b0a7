//! `package.json` builders.

use serde_json::{Map, Value, json};

/// Build a pretty-printed `package.json` with the given dependencies.
///
/// Dependencies keep the order they are passed in.
pub fn package_manifest(name: &str, version: &str, dependencies: &[(&str, &str)]) -> String {
    let deps: Map<String, Value> = dependencies
        .iter()
        .map(|(dep, constraint)| ((*dep).to_string(), Value::from(*constraint)))
        .collect();

    let manifest = json!({
        "name": name,
        "version": version,
        "description": format!("{name} test package"),
        "main": "index.js",
        "dependencies": deps,
    });

    let mut text = serde_json::to_string_pretty(&manifest).unwrap();
    text.push('\n');
    text
}
