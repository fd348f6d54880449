//! Declarative option schema for tile-proxy configuration documents.
//!
//! [`validate_options`] walks a parsed document against [`config_schema`] and
//! reports every problem it finds. Unknown keys are *informal*: they are
//! reported, but a document whose only problems are unknown keys is still
//! usable. Missing required keys, type mismatches and unknown `type`
//! discriminators are hard errors.

use serde_yaml::Value;

/// Schema node.
#[derive(Debug, Clone)]
pub enum Schema {
    Str,
    Number,
    Bool,
    Anything,
    /// First alternative whose shape matches the value is used
    OneOf(Vec<Schema>),
    List(Box<Schema>),
    /// Mapping with a fixed set of known keys
    Map(Vec<Field>),
    /// Mapping with arbitrary (user chosen) string keys
    AnyMap(Box<Schema>),
    /// Mapping whose variant is selected by the value of `key`
    Typed {
        key: &'static str,
        variants: Vec<(&'static str, Schema)>,
    },
    /// Deferred node for recursive structures
    Lazy(fn() -> Schema),
}

/// A known key of a [`Schema::Map`].
#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub schema: Schema,
    pub required: bool,
}

fn opt(name: &'static str, schema: Schema) -> Field {
    Field {
        name,
        schema,
        required: false,
    }
}

fn req(name: &'static str, schema: Schema) -> Field {
    Field {
        name,
        schema,
        required: true,
    }
}

fn list(schema: Schema) -> Schema {
    Schema::List(Box::new(schema))
}

fn any_map(schema: Schema) -> Schema {
    Schema::AnyMap(Box::new(schema))
}

// =============================================================================
// Schema
// =============================================================================

fn source_common() -> Vec<Field> {
    vec![
        opt("coverage", Schema::Anything),
        opt("seed_only", Schema::Bool),
        opt("min_res", Schema::Number),
        opt("max_res", Schema::Number),
        opt("min_scale", Schema::Number),
        opt("max_scale", Schema::Number),
        opt("concurrent_requests", Schema::Number),
        opt("http", Schema::Anything),
        opt("image", Schema::Anything),
        opt("on_error", Schema::Anything),
    ]
}

fn with_common(mut fields: Vec<Field>) -> Schema {
    fields.extend(source_common());
    Schema::Map(fields)
}

fn source_schema() -> Schema {
    Schema::Typed {
        key: "type",
        variants: vec![
            (
                "tile",
                with_common(vec![
                    req("url", Schema::Str),
                    opt("grid", Schema::Str),
                    opt("origin", Schema::Str),
                    opt("transparent", Schema::Bool),
                ]),
            ),
            (
                "wms",
                with_common(vec![
                    req("req", Schema::Anything),
                    opt("wms_opts", Schema::Anything),
                    opt("supported_srs", list(Schema::Str)),
                    opt("supported_formats", list(Schema::Str)),
                    opt("forward_req_params", list(Schema::Str)),
                ]),
            ),
            (
                "mapserver",
                with_common(vec![
                    req("req", Schema::Anything),
                    opt("mapserver", Schema::Anything),
                    opt("supported_srs", list(Schema::Str)),
                    opt("supported_formats", list(Schema::Str)),
                ]),
            ),
            (
                "mapnik",
                with_common(vec![
                    req("mapfile", Schema::Str),
                    opt("layers", Schema::OneOf(vec![list(Schema::Str), Schema::Str])),
                    opt("transparent", Schema::Bool),
                    opt("scale_factor", Schema::Number),
                ]),
            ),
            ("debug", Schema::Map(Vec::new())),
        ],
    }
}

fn cache_backend_schema() -> Schema {
    Schema::Typed {
        key: "type",
        variants: vec![
            (
                "file",
                Schema::Map(vec![
                    opt("directory_layout", Schema::Str),
                    opt("directory", Schema::Str),
                    opt("use_grid_names", Schema::Bool),
                ]),
            ),
            (
                "sqlite",
                Schema::Map(vec![
                    opt("directory", Schema::Str),
                    opt("tile_lock_dir", Schema::Str),
                ]),
            ),
            ("mbtiles", Schema::Map(vec![opt("filename", Schema::Str)])),
            (
                "geopackage",
                Schema::Map(vec![
                    opt("filename", Schema::Str),
                    opt("table_name", Schema::Str),
                ]),
            ),
            (
                "compact",
                Schema::Map(vec![
                    req("version", Schema::Number),
                    opt("directory", Schema::Str),
                ]),
            ),
        ],
    }
}

fn cache_schema() -> Schema {
    Schema::Map(vec![
        opt("grids", list(Schema::Str)),
        opt("sources", list(Schema::Str)),
        opt("format", Schema::Str),
        opt("request_format", Schema::Str),
        opt("image", Schema::Anything),
        opt("cache", cache_backend_schema()),
        opt("cache_dir", Schema::Str),
        opt("disable_storage", Schema::Bool),
        opt("meta_size", list(Schema::Number)),
        opt("meta_buffer", Schema::Number),
        opt("bulk_meta_tiles", Schema::Bool),
        opt("minimize_meta_requests", Schema::Bool),
        opt("link_single_color_images", Schema::Bool),
        opt("upscale_tiles", Schema::Number),
        opt("downscale_tiles", Schema::Number),
        opt("watermark", Schema::Anything),
        opt("refresh_before", Schema::Anything),
    ])
}

fn grid_schema() -> Schema {
    Schema::Map(vec![
        opt("base", Schema::Str),
        opt("name", Schema::Str),
        opt("srs", Schema::Str),
        opt("bbox", Schema::OneOf(vec![list(Schema::Number), Schema::Str])),
        opt("bbox_srs", Schema::Str),
        opt("num_levels", Schema::Number),
        opt("res", list(Schema::Number)),
        opt("res_factor", Schema::OneOf(vec![Schema::Number, Schema::Str])),
        opt("min_res", Schema::Number),
        opt("max_res", Schema::Number),
        opt("stretch_factor", Schema::Number),
        opt("max_shrink_factor", Schema::Number),
        opt("align_resolutions_with", Schema::Str),
        opt("origin", Schema::Str),
        opt("tile_size", list(Schema::Number)),
        opt("threshold_res", list(Schema::Number)),
    ])
}

fn layer_schema() -> Schema {
    Schema::Map(vec![
        opt("name", Schema::Str),
        opt("title", Schema::Str),
        opt("sources", list(Schema::Str)),
        opt("tile_sources", list(Schema::Str)),
        opt("layers", Schema::Lazy(layer_list_schema)),
        opt("md", Schema::Anything),
        opt("legendurl", Schema::Str),
        opt("min_res", Schema::Number),
        opt("max_res", Schema::Number),
        opt("min_scale", Schema::Number),
        opt("max_scale", Schema::Number),
        opt("dimensions", Schema::Anything),
    ])
}

fn layer_list_schema() -> Schema {
    list(layer_schema())
}

fn services_schema() -> Schema {
    Schema::Map(vec![
        opt(
            "tms",
            Schema::Map(vec![
                opt("use_grid_names", Schema::Bool),
                opt("origin", Schema::Str),
            ]),
        ),
        opt(
            "wmts",
            Schema::Map(vec![
                opt("restful", Schema::Bool),
                opt("restful_template", Schema::Str),
                opt("restful_featureinfo_template", Schema::Str),
                opt("kvp", Schema::Bool),
                opt("md", Schema::Anything),
                opt("featureinfo_formats", Schema::Anything),
            ]),
        ),
        opt(
            "wms",
            Schema::Map(vec![
                opt("srs", list(Schema::Str)),
                opt("bbox_srs", Schema::Anything),
                opt("image_formats", list(Schema::Str)),
                opt("attribution", Schema::Anything),
                opt("featureinfo_types", Schema::Anything),
                opt("featureinfo_xslt", Schema::Anything),
                opt("on_source_errors", Schema::Str),
                opt("max_output_pixels", Schema::Anything),
                opt("strict", Schema::Bool),
                opt("md", Schema::Anything),
                opt("inspire_md", Schema::Anything),
                opt("versions", list(Schema::Str)),
            ]),
        ),
        opt("demo", Schema::Map(Vec::new())),
        opt("kml", Schema::Map(vec![opt("use_grid_names", Schema::Bool)])),
    ])
}

fn globals_schema() -> Schema {
    Schema::Map(vec![
        opt(
            "cache",
            Schema::Map(vec![
                opt("base_dir", Schema::Str),
                opt("lock_dir", Schema::Str),
                opt("tile_lock_dir", Schema::Str),
                opt("meta_size", list(Schema::Number)),
                opt("meta_buffer", Schema::Number),
                opt("bulk_meta_tiles", Schema::Bool),
                opt("max_tile_limit", Schema::Number),
                opt("minimize_meta_requests", Schema::Bool),
                opt("concurrent_tile_creators", Schema::Number),
                opt("link_single_color_images", Schema::Bool),
            ]),
        ),
        opt("image", Schema::Anything),
        opt("http", Schema::Anything),
        opt("srs", Schema::Anything),
        opt("tiles", Schema::Anything),
        opt("mapserver", Schema::Anything),
        opt("renderd", Schema::Anything),
    ])
}

/// The complete document schema.
pub fn config_schema() -> Schema {
    Schema::Map(vec![
        opt("globals", globals_schema()),
        opt("services", services_schema()),
        opt(
            "layers",
            Schema::OneOf(vec![layer_list_schema(), any_map(layer_schema())]),
        ),
        opt("caches", any_map(cache_schema())),
        opt("sources", any_map(source_schema())),
        opt("grids", any_map(grid_schema())),
        opt("parts", Schema::Anything),
        opt("base", Schema::OneOf(vec![Schema::Str, list(Schema::Str)])),
    ])
}

// =============================================================================
// Validation
// =============================================================================

/// Validate a configuration document against [`config_schema`].
///
/// Returns every error message and whether all of them are informal.
/// A valid document returns `(vec![], true)`.
pub fn validate_options(conf: &Value) -> (Vec<String>, bool) {
    validate(&config_schema(), conf)
}

/// Validate an arbitrary value against a schema node.
pub fn validate(schema: &Schema, value: &Value) -> (Vec<String>, bool) {
    let mut checker = Checker::default();
    checker.check(schema, value);
    let informal_only = checker.hard_errors == 0;
    (checker.errors, informal_only)
}

#[derive(Default)]
struct Checker {
    pos: Vec<String>,
    errors: Vec<String>,
    hard_errors: usize,
}

impl Checker {
    fn position(&self) -> String {
        if self.pos.is_empty() {
            "root".to_string()
        } else {
            self.pos.join(".")
        }
    }

    fn hard(&mut self, message: String) {
        self.errors.push(message);
        self.hard_errors += 1;
    }

    fn informal(&mut self, message: String) {
        self.errors.push(message);
    }

    fn type_error(&mut self, value: &Value, expected: &str) {
        let message = format!(
            "{} in {} not of type {}",
            describe(value),
            self.position(),
            expected
        );
        self.hard(message);
    }

    fn check(&mut self, schema: &Schema, value: &Value) {
        match schema {
            Schema::Anything => {}
            Schema::Str => {
                if !value.is_string() {
                    self.type_error(value, "str");
                }
            }
            Schema::Number => {
                if !value.is_number() {
                    self.type_error(value, "number");
                }
            }
            Schema::Bool => {
                if !value.is_bool() {
                    self.type_error(value, "bool");
                }
            }
            Schema::Lazy(build) => self.check(&build(), value),
            Schema::OneOf(alternatives) => match alternatives.iter().find(|s| accepts(s, value)) {
                Some(alternative) => self.check(alternative, value),
                None => {
                    let expected: Vec<&str> = alternatives.iter().map(shape_name).collect();
                    self.type_error(value, &expected.join(" or "));
                }
            },
            Schema::List(item) => {
                let Some(items) = value.as_sequence() else {
                    self.type_error(value, "list");
                    return;
                };
                for (index, entry) in items.iter().enumerate() {
                    self.with_index(index, |checker| checker.check(item, entry));
                }
            }
            Schema::AnyMap(inner) => {
                if value.is_null() {
                    return;
                }
                let Some(mapping) = value.as_mapping() else {
                    self.type_error(value, "dict");
                    return;
                };
                for (key, entry) in mapping {
                    let key = key_name(key);
                    self.with_key(&key, |checker| checker.check(inner, entry));
                }
            }
            Schema::Map(fields) => self.check_map(fields, value, None),
            Schema::Typed { key, variants } => {
                if value.is_null() {
                    self.hard(format!("missing '{}', not in {}", key, self.position()));
                    return;
                }
                if !value.is_mapping() {
                    self.type_error(value, "dict");
                    return;
                }
                match value.get(*key) {
                    None => {
                        self.hard(format!("missing '{}', not in {}", key, self.position()));
                    }
                    Some(kind) => {
                        let name = kind.as_str().unwrap_or_default();
                        match variants.iter().find(|(variant, _)| *variant == name) {
                            Some((_, Schema::Map(fields))) => {
                                self.check_map(fields, value, Some(*key))
                            }
                            Some((_, other)) => self.check(other, value),
                            None => {
                                self.hard(format!(
                                    "unknown '{}' value {} in {}",
                                    key,
                                    describe(kind),
                                    self.position()
                                ));
                            }
                        }
                    }
                }
            }
        }
    }

    fn check_map(&mut self, fields: &[Field], value: &Value, discriminator: Option<&str>) {
        // `demo:` and friends are written without a value.
        if value.is_null() {
            for field in fields.iter().filter(|f| f.required) {
                self.hard(format!(
                    "missing '{}', not in {}",
                    field.name,
                    self.position()
                ));
            }
            return;
        }
        let Some(mapping) = value.as_mapping() else {
            self.type_error(value, "dict");
            return;
        };

        for (key, entry) in mapping {
            let key = key_name(key);
            if Some(key.as_str()) == discriminator {
                continue;
            }
            match fields.iter().find(|f| f.name == key) {
                Some(field) => self.with_key(&key, |checker| checker.check(&field.schema, entry)),
                None => {
                    let message = format!("unknown '{}' in {}", key, self.position());
                    self.informal(message);
                }
            }
        }

        for field in fields.iter().filter(|f| f.required) {
            if mapping.get(field.name).is_none() {
                self.hard(format!(
                    "missing '{}', not in {}",
                    field.name,
                    self.position()
                ));
            }
        }
    }

    fn with_key(&mut self, key: &str, f: impl FnOnce(&mut Self)) {
        self.pos.push(key.to_string());
        f(self);
        self.pos.pop();
    }

    fn with_index(&mut self, index: usize, f: impl FnOnce(&mut Self)) {
        match self.pos.last_mut() {
            Some(last) => {
                let saved = last.clone();
                last.push_str(&format!("[{}]", index));
                f(self);
                if let Some(last) = self.pos.last_mut() {
                    *last = saved;
                }
            }
            None => self.with_key(&format!("[{}]", index), f),
        }
    }
}

/// Shallow shape check used to pick a [`Schema::OneOf`] alternative.
fn accepts(schema: &Schema, value: &Value) -> bool {
    match schema {
        Schema::Anything => true,
        Schema::Str => value.is_string(),
        Schema::Number => value.is_number(),
        Schema::Bool => value.is_bool(),
        Schema::List(_) => value.is_sequence(),
        Schema::Map(_) | Schema::AnyMap(_) | Schema::Typed { .. } => {
            value.is_mapping() || value.is_null()
        }
        Schema::OneOf(alternatives) => alternatives.iter().any(|s| accepts(s, value)),
        Schema::Lazy(build) => accepts(&build(), value),
    }
}

fn shape_name(schema: &Schema) -> &'static str {
    match schema {
        Schema::Anything => "anything",
        Schema::Str => "str",
        Schema::Number => "number",
        Schema::Bool => "bool",
        Schema::List(_) => "list",
        Schema::Map(_) | Schema::AnyMap(_) | Schema::Typed { .. } => "dict",
        Schema::OneOf(_) | Schema::Lazy(_) => "value",
    }
}

fn key_name(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => describe(other),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s),
        Value::Sequence(_) => "list".to_string(),
        Value::Mapping(_) => "dict".to_string(),
        Value::Tagged(tagged) => format!("!{}", tagged.tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_valid_document() {
        let conf = yaml(
            r#"
services:
  demo:
  tms:
    origin: nw
layers:
  - name: osm
    title: OSM
    sources: [osm_cache]
caches:
  osm_cache:
    grids: [GLOBAL_WEBMERCATOR]
    sources: [osm_tiles]
    cache:
      type: file
      directory_layout: tms
sources:
  osm_tiles:
    type: tile
    url: https://tile.example.com/%(tms_path)s.png
grids:
  local:
    base: GLOBAL_GEODETIC
    bbox: "5,45,15,55"
"#,
        );
        let (errors, informal_only) = validate_options(&conf);
        assert!(errors.is_empty(), "{:?}", errors);
        assert!(informal_only);
    }

    #[test]
    fn test_unknown_keys_are_informal() {
        let conf = yaml(
            r#"
services:
  tms:
    flavour: vanilla
colour: blue
"#,
        );
        let (errors, informal_only) = validate_options(&conf);
        assert_eq!(
            errors,
            vec![
                "unknown 'flavour' in services.tms".to_string(),
                "unknown 'colour' in root".to_string(),
            ]
        );
        assert!(informal_only);
    }

    #[test]
    fn test_type_mismatch_is_hard() {
        let conf = yaml(
            r#"
caches:
  osm_cache:
    grids: GLOBAL_WEBMERCATOR
"#,
        );
        let (errors, informal_only) = validate_options(&conf);
        assert_eq!(
            errors,
            vec!["'GLOBAL_WEBMERCATOR' in caches.osm_cache.grids not of type list".to_string()]
        );
        assert!(!informal_only);
    }

    #[test]
    fn test_missing_required_and_unknown_type() {
        let conf = yaml(
            r#"
sources:
  a:
    type: tile
  b:
    type: carrier_pigeon
  c:
    url: http://example.com
"#,
        );
        let (errors, informal_only) = validate_options(&conf);
        assert!(errors.contains(&"missing 'url', not in sources.a".to_string()));
        assert!(errors.contains(&"unknown 'type' value 'carrier_pigeon' in sources.b".to_string()));
        assert!(errors.contains(&"missing 'type', not in sources.c".to_string()));
        assert!(!informal_only);
    }

    #[test]
    fn test_nested_layer_positions() {
        let conf = yaml(
            r#"
layers:
  - name: group
    layers:
      - name: child
        sources: [1]
"#,
        );
        let (errors, _) = validate_options(&conf);
        assert_eq!(
            errors,
            vec!["1 in layers[0].layers[0].sources[0] not of type str".to_string()]
        );
    }

    #[test]
    fn test_mixed_errors_not_informal() {
        let conf = yaml(
            r#"
unknown_section: {}
services:
  tms:
    use_grid_names: "yes please"
"#,
        );
        let (errors, informal_only) = validate_options(&conf);
        assert_eq!(errors.len(), 2);
        assert!(!informal_only);
    }
}
