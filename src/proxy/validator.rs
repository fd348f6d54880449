//! Semantic validation of a configuration document.
//!
//! Checks cross references between sections (layers → caches/sources,
//! caches → sources/grids, grids → base grids). Everything reported here is
//! a warning: the loader logs the messages but never refuses to start on them.

use std::collections::HashSet;

use serde_yaml::Value;

use super::grid::BUILTIN_GRIDS;

/// Validate cross references and return warning messages.
pub fn validate(conf: &Value) -> Vec<String> {
    let mut warnings = Vec::new();

    match conf.get("services") {
        None | Some(Value::Null) => warnings.push("Missing services section".to_string()),
        Some(_) => {}
    }

    let caches = section_keys(conf, "caches");
    let sources = section_keys(conf, "sources");
    let mut grids = section_keys(conf, "grids");
    grids.extend(BUILTIN_GRIDS.iter().map(|g| g.to_string()));

    if let Some(layers) = conf.get("layers") {
        let mut seen = HashSet::new();
        match layers {
            Value::Sequence(items) => {
                for (index, layer) in items.iter().enumerate() {
                    validate_layer(layer, index, None, &caches, &sources, &mut seen, &mut warnings);
                }
            }
            Value::Mapping(items) => {
                for (index, (key, layer)) in items.iter().enumerate() {
                    validate_layer(layer, index, key.as_str(), &caches, &sources, &mut seen, &mut warnings);
                }
            }
            _ => {}
        }
    }

    if let Some(Value::Mapping(entries)) = conf.get("caches") {
        for (name, cache) in entries {
            let name = name.as_str().unwrap_or_default();
            match string_list(cache.get("sources")) {
                Some(cache_sources) => {
                    for source in cache_sources {
                        if !sources.contains(source) && !caches.contains(source) {
                            warnings.push(format!(
                                "Source '{}' for cache '{}' not found in config",
                                source, name
                            ));
                        }
                    }
                }
                None => warnings.push(format!("Missing sources for cache '{}'", name)),
            }
            for grid in string_list(cache.get("grids")).unwrap_or_default() {
                if !grids.contains(grid) {
                    warnings.push(format!(
                        "Grid '{}' for cache '{}' not found in config",
                        grid, name
                    ));
                }
            }
        }
    }

    if let Some(Value::Mapping(entries)) = conf.get("grids") {
        for (name, grid) in entries {
            let name = name.as_str().unwrap_or_default();
            if let Some(base) = grid.get("base").and_then(Value::as_str) {
                if !grids.contains(base) {
                    warnings.push(format!(
                        "Base grid '{}' for grid '{}' not found in config",
                        base, name
                    ));
                }
            }
        }
    }

    warnings
}

fn validate_layer(
    layer: &Value,
    index: usize,
    key: Option<&str>,
    caches: &HashSet<String>,
    sources: &HashSet<String>,
    seen: &mut HashSet<String>,
    warnings: &mut Vec<String>,
) {
    let name = layer.get("name").and_then(Value::as_str).or(key);
    let label = match name {
        Some(name) => name.to_string(),
        None => {
            let title = layer.get("title").and_then(Value::as_str);
            let has_children = layer.get("layers").is_some();
            // Group layers may omit the name, leaf layers may not.
            if !has_children {
                warnings.push(format!(
                    "Missing name for layer {}",
                    title.map(|t| format!("'{}'", t)).unwrap_or_else(|| format!("#{}", index))
                ));
            }
            title.unwrap_or("unnamed").to_string()
        }
    };

    if let Some(name) = name {
        if !seen.insert(name.to_string()) {
            warnings.push(format!("Duplicate layer name '{}'", name));
        }
    }

    for source in string_list(layer.get("sources")).unwrap_or_default() {
        if !caches.contains(source) && !sources.contains(source) {
            warnings.push(format!(
                "Source '{}' for layer '{}' not in cache or source section",
                source, label
            ));
        }
    }

    if let Some(Value::Sequence(children)) = layer.get("layers") {
        for (child_index, child) in children.iter().enumerate() {
            validate_layer(child, child_index, None, caches, sources, seen, warnings);
        }
    }
}

fn section_keys(conf: &Value, section: &str) -> HashSet<String> {
    match conf.get(section) {
        Some(Value::Mapping(entries)) => entries
            .keys()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect(),
        _ => HashSet::new(),
    }
}

fn string_list(value: Option<&Value>) -> Option<Vec<&str>> {
    value
        .and_then(Value::as_sequence)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
}
