//! Configuration loading.
//!
//! # Pipeline
//!
//! ```text
//! YAML file ──► build_config ──► schema::validate_options ──► validator::validate ──► ProxyConfiguration
//!                (mapping)        (fatal policy)              (warnings only)          (grids resolved)
//! ```
//!
//! [`ProxyConfiguration::configured_services`] then turns the validated
//! document into the services answered by [`ProxyApp`](super::app::ProxyApp).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::{debug, error, info, warn};

use super::cache::{DirectoryLayout, FileCache, TileFormat};
use super::grid::{bbox_from_slice, parse_bbox, Grid, Origin, DEFAULT_NUM_LEVELS, MAX_NUM_LEVELS};
use super::layer::TileLayer;
use super::service::{
    DemoService, RestTemplate, Service, TmsService, WmtsService, DEFAULT_RESTFUL_TEMPLATE,
};
use super::{schema, validator};
use crate::error::ConfigurationError;

/// Cache base directory used when `globals.cache.base_dir` is not set.
pub const DEFAULT_CACHE_BASE_DIR: &str = "./cache_data";

/// Grid used by caches that do not list any.
pub const DEFAULT_CACHE_GRID: &str = "GLOBAL_WEBMERCATOR";

/// Default WMTS service title.
const DEFAULT_WMTS_TITLE: &str = "Tile proxy";

// =============================================================================
// Loading
// =============================================================================

/// Read a configuration file into a YAML mapping.
///
/// An empty document is an empty mapping; any other non-mapping root is an error.
pub fn build_config(path: &Path) -> Result<Value, ConfigurationError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_yaml::from_str(&text).map_err(|source| ConfigurationError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    match value {
        Value::Null => Ok(Value::Mapping(Mapping::new())),
        Value::Mapping(_) => Ok(value),
        _ => Err(ConfigurationError::NotAMapping {
            path: path.to_path_buf(),
        }),
    }
}

/// Options for [`load_configuration`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Configuration is loaded for seeding
    pub seed: bool,
    /// Configuration is loaded for a renderd daemon
    pub renderd: bool,
    /// Accept documents whose only schema problems are informal
    pub ignore_warnings: bool,
}

/// Load, validate and build a configuration.
///
/// Every schema problem and every semantic warning is logged once at WARN.
/// Loading fails when the schema check reports a hard error, or reports any
/// problem while `ignore_warnings` is off.
pub fn load_configuration(
    path: &Path,
    options: LoadOptions,
) -> Result<ProxyConfiguration, ConfigurationError> {
    let conf = build_config(path)?;

    let (errors, informal_only) = schema::validate_options(&conf);
    for error in &errors {
        warn!("{}", error);
    }
    if !informal_only || (!errors.is_empty() && !options.ignore_warnings) {
        error!(path = %path.display(), "invalid configuration");
        return Err(ConfigurationError::Invalid { errors });
    }

    for warning in validator::validate(&conf) {
        warn!("{}", warning);
    }

    let config = ProxyConfiguration::new(conf, path, options.seed, options.renderd)?;
    info!(path = %path.display(), grids = config.grids.len(), "configuration loaded");
    Ok(config)
}

// =============================================================================
// Typed document
// =============================================================================

/// The parts of the document the services are built from.
///
/// Keys not listed here are still schema checked but otherwise unused.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProxyDocument {
    pub globals: Option<GlobalsConf>,
    pub caches: Option<BTreeMap<String, Option<CacheConf>>>,
    pub grids: Option<BTreeMap<String, Option<GridConf>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GlobalsConf {
    pub cache: Option<GlobalCacheConf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GlobalCacheConf {
    pub base_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConf {
    pub grids: Vec<String>,
    pub sources: Vec<String>,
    pub format: Option<String>,
    pub cache: Option<CacheBackendConf>,
    pub cache_dir: Option<String>,
    pub disable_storage: bool,
}

impl Default for CacheConf {
    fn default() -> Self {
        Self {
            grids: vec![DEFAULT_CACHE_GRID.to_string()],
            sources: Vec::new(),
            format: None,
            cache: None,
            cache_dir: None,
            disable_storage: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheBackendConf {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub directory_layout: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BboxConf {
    List(Vec<f64>),
    Text(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GridConf {
    pub base: Option<String>,
    pub name: Option<String>,
    pub srs: Option<String>,
    pub bbox: Option<BboxConf>,
    pub bbox_srs: Option<String>,
    pub num_levels: Option<u32>,
    pub res: Option<Vec<f64>>,
    pub min_res: Option<f64>,
    pub origin: Option<String>,
    pub tile_size: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LayerConf {
    pub name: Option<String>,
    pub title: Option<String>,
    pub sources: Vec<String>,
    pub tile_sources: Vec<String>,
    pub layers: Vec<LayerConf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct TmsConf {
    origin: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct WmtsConf {
    restful: bool,
    restful_template: Option<String>,
    kvp: bool,
    md: Option<Value>,
}

impl Default for WmtsConf {
    fn default() -> Self {
        Self {
            restful: true,
            restful_template: None,
            kvp: true,
            md: None,
        }
    }
}

/// Deserialize a section value, treating `null` as the type's default.
fn section<T>(what: &str, value: &Value) -> Result<T, ConfigurationError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if value.is_null() {
        return Ok(T::default());
    }
    serde_yaml::from_value(value.clone())
        .map_err(|e| ConfigurationError::Build(format!("invalid {}: {}", what, e)))
}

// =============================================================================
// Base configuration
// =============================================================================

/// A configuration file and its modification time when it was loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
}

impl ConfigFile {
    fn new(path: &Path) -> Self {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        Self {
            path: path.to_path_buf(),
            modified,
        }
    }

    /// Whether the file on disk changed since it was loaded.
    pub fn is_modified(&self) -> bool {
        let current = std::fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        current != self.modified
    }
}

/// Settings shared by every service of a configuration.
#[derive(Debug, Clone)]
pub struct BaseConfig {
    /// Directory caches are stored under unless they name their own
    pub cache_base_dir: PathBuf,
    /// Directory relative paths in the document are resolved against
    pub config_dir: PathBuf,
    pub config_files: Vec<ConfigFile>,
}

// =============================================================================
// ProxyConfiguration
// =============================================================================

/// A validated configuration with its grids resolved.
#[derive(Debug)]
pub struct ProxyConfiguration {
    raw: Value,
    document: ProxyDocument,
    grids: BTreeMap<String, Arc<Grid>>,
    base: BaseConfig,
    seed: bool,
    renderd: bool,
    tile_layers: OnceLock<Vec<Arc<TileLayer>>>,
}

impl ProxyConfiguration {
    /// Build from an already validated document loaded from `path`.
    pub fn new(
        raw: Value,
        path: &Path,
        seed: bool,
        renderd: bool,
    ) -> Result<Self, ConfigurationError> {
        let document: ProxyDocument = section("configuration", &raw)?;

        let config_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let base_dir = document
            .globals
            .as_ref()
            .and_then(|g| g.cache.as_ref())
            .and_then(|c| c.base_dir.as_deref())
            .unwrap_or(DEFAULT_CACHE_BASE_DIR);
        let base = BaseConfig {
            cache_base_dir: config_dir.join(base_dir),
            config_dir,
            config_files: vec![ConfigFile::new(path)],
        };

        let mut config = Self {
            raw,
            document,
            grids: BTreeMap::new(),
            base,
            seed,
            renderd,
            tile_layers: OnceLock::new(),
        };
        config.grids = config.resolve_grids()?;
        Ok(config)
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn document(&self) -> &ProxyDocument {
        &self.document
    }

    pub fn base_config(&self) -> &BaseConfig {
        &self.base
    }

    pub fn seed(&self) -> bool {
        self.seed
    }

    pub fn renderd(&self) -> bool {
        self.renderd
    }

    /// A resolved grid by name (configured or built-in and referenced).
    pub fn grid(&self, name: &str) -> Option<&Arc<Grid>> {
        self.grids.get(name)
    }

    /// Build the services named in the `services` section.
    pub fn configured_services(&self) -> Result<Vec<Box<dyn Service>>, ConfigurationError> {
        let services = match self.raw.get("services") {
            Some(Value::Mapping(services)) => services.clone(),
            _ => Mapping::new(),
        };
        let layers = self.tile_layers()?;
        let has = |name: &str| services.contains_key(name);

        let mut built: Vec<Box<dyn Service>> = Vec::new();
        for (key, value) in &services {
            let name = key.as_str().unwrap_or_default();
            match name {
                "tms" => {
                    let conf: TmsConf = section("tms service", value)?;
                    let origin = match conf.origin.as_deref() {
                        None => Origin::SouthWest,
                        Some(origin) => Origin::parse(origin).ok_or_else(|| {
                            ConfigurationError::Build(format!("invalid tms origin '{}'", origin))
                        })?,
                    };
                    built.push(Box::new(TmsService::new(layers.clone(), origin)));
                }
                "wmts" => {
                    let conf: WmtsConf = section("wmts service", value)?;
                    if !conf.restful && !conf.kvp {
                        return Err(ConfigurationError::Build(
                            "wmts service needs restful or kvp enabled".to_string(),
                        ));
                    }
                    let template = RestTemplate::parse(
                        conf.restful_template
                            .as_deref()
                            .unwrap_or(DEFAULT_RESTFUL_TEMPLATE),
                    )?;
                    let title = conf
                        .md
                        .as_ref()
                        .and_then(|md| md.get("title"))
                        .and_then(Value::as_str)
                        .unwrap_or(DEFAULT_WMTS_TITLE)
                        .to_string();
                    built.push(Box::new(WmtsService::new(
                        layers.clone(),
                        conf.restful,
                        conf.kvp,
                        template,
                        title,
                    )));
                }
                "demo" => {
                    built.push(Box::new(DemoService::new(
                        layers.clone(),
                        has("tms"),
                        has("wmts"),
                    )));
                }
                other => warn!(service = other, "service is not supported and was not started"),
            }
        }

        debug!(
            services = ?built.iter().map(|s| s.name()).collect::<Vec<_>>(),
            tile_layers = layers.len(),
            "services configured"
        );
        Ok(built)
    }

    /// Tile layers: named layers backed by caches, one per cache grid.
    ///
    /// `tile_sources` lists the caches explicitly; otherwise a layer whose
    /// `sources` is exactly one cache is tiled from that cache.
    ///
    /// Built once; later calls return the same layers.
    pub fn tile_layers(&self) -> Result<Vec<Arc<TileLayer>>, ConfigurationError> {
        if let Some(layers) = self.tile_layers.get() {
            return Ok(layers.clone());
        }
        let layers = self.build_tile_layers()?;
        Ok(self.tile_layers.get_or_init(|| layers).clone())
    }

    fn build_tile_layers(&self) -> Result<Vec<Arc<TileLayer>>, ConfigurationError> {
        let caches = self.caches()?;
        let mut tile_layers: Vec<Arc<TileLayer>> = Vec::new();

        for layer in self.layers()? {
            let Some(name) = layer.name.as_deref() else {
                continue;
            };
            let explicit = !layer.tile_sources.is_empty();
            let cache_names: &[String] = if explicit {
                &layer.tile_sources
            } else if layer.sources.len() == 1 {
                &layer.sources
            } else {
                &[]
            };

            for cache_name in cache_names {
                let Some(cache) = caches.get(cache_name) else {
                    if explicit {
                        return Err(ConfigurationError::Build(format!(
                            "tile_source '{}' of layer '{}' is not a cache",
                            cache_name, name
                        )));
                    }
                    continue;
                };
                for grid_name in &cache.grids {
                    let grid = self.grid(grid_name).ok_or_else(|| {
                        ConfigurationError::Build(format!(
                            "unknown grid '{}' for cache '{}'",
                            grid_name, cache_name
                        ))
                    })?;
                    if tile_layers
                        .iter()
                        .any(|t| t.name == name && t.grid.name == grid.name)
                    {
                        warn!(layer = name, grid = %grid.name, "duplicate tile layer skipped");
                        continue;
                    }
                    tile_layers.push(Arc::new(TileLayer {
                        name: name.to_string(),
                        title: layer.title.clone().unwrap_or_else(|| name.to_string()),
                        grid: Arc::clone(grid),
                        cache: self.file_cache(cache_name, cache, grid)?,
                    }));
                }
            }
        }

        Ok(tile_layers)
    }

    fn caches(&self) -> Result<BTreeMap<String, CacheConf>, ConfigurationError> {
        let mut caches = BTreeMap::new();
        for (name, conf) in self.document.caches.iter().flatten() {
            let conf = conf.clone().unwrap_or_default();
            if let Some(backend) = &conf.cache {
                if backend.kind != "file" {
                    return Err(ConfigurationError::Build(format!(
                        "cache '{}' uses the '{}' backend, only 'file' caches are supported",
                        name, backend.kind
                    )));
                }
            }
            if conf.disable_storage {
                warn!(cache = %name, "cache has disable_storage set and no tiles will be found");
            }
            caches.insert(name.clone(), conf);
        }
        Ok(caches)
    }

    fn layers(&self) -> Result<Vec<LayerConf>, ConfigurationError> {
        let top: Vec<LayerConf> = match self.raw.get("layers") {
            None | Some(Value::Null) => Vec::new(),
            Some(layers @ Value::Sequence(_)) => section("layers", layers)?,
            Some(Value::Mapping(entries)) => {
                let mut layers = Vec::new();
                for (key, value) in entries {
                    let mut layer: LayerConf = section("layer", value)?;
                    if layer.name.is_none() {
                        layer.name = key.as_str().map(str::to_string);
                    }
                    layers.push(layer);
                }
                layers
            }
            Some(_) => {
                return Err(ConfigurationError::Build(
                    "layers must be a list or a mapping".to_string(),
                ))
            }
        };

        let mut flat = Vec::new();
        flatten_layers(top, &mut flat);
        Ok(flat)
    }

    fn file_cache(
        &self,
        name: &str,
        conf: &CacheConf,
        grid: &Grid,
    ) -> Result<FileCache, ConfigurationError> {
        let backend = conf.cache.as_ref();
        let layout = match backend.and_then(|b| b.directory_layout.as_deref()) {
            Some(layout) => DirectoryLayout::parse(layout)?,
            None => DirectoryLayout::Tms,
        };
        let dir = match backend.and_then(|b| b.directory.as_deref()) {
            Some(directory) => self.base.config_dir.join(directory),
            None => {
                let base = match conf.cache_dir.as_deref() {
                    Some(dir) => self.base.config_dir.join(dir),
                    None => self.base.cache_base_dir.clone(),
                };
                base.join(format!("{}_{}", name, grid.name))
            }
        };
        let format = conf
            .format
            .as_deref()
            .map(TileFormat::parse)
            .unwrap_or_default();
        Ok(FileCache::new(dir, layout, format))
    }

    /// Resolve every configured grid plus every built-in grid caches refer to.
    fn resolve_grids(&self) -> Result<BTreeMap<String, Arc<Grid>>, ConfigurationError> {
        let confs: BTreeMap<String, GridConf> = self
            .document
            .grids
            .iter()
            .flatten()
            .map(|(name, conf)| (name.clone(), conf.clone().unwrap_or_default()))
            .collect();

        let mut referenced: Vec<String> = confs.keys().cloned().collect();
        for (_, cache) in self.document.caches.iter().flatten() {
            let grids = cache
                .as_ref()
                .map(|c| c.grids.clone())
                .unwrap_or_else(|| vec![DEFAULT_CACHE_GRID.to_string()]);
            referenced.extend(grids);
        }

        let mut resolved = BTreeMap::new();
        for name in referenced {
            if resolved.contains_key(&name) {
                continue;
            }
            let grid = resolve_grid(&name, &confs, &mut Vec::new())?;
            resolved.insert(name, Arc::new(grid));
        }
        Ok(resolved)
    }
}

fn flatten_layers(layers: Vec<LayerConf>, out: &mut Vec<LayerConf>) {
    for mut layer in layers {
        let children = std::mem::take(&mut layer.layers);
        out.push(layer);
        flatten_layers(children, out);
    }
}

// =============================================================================
// Grid resolution
// =============================================================================

fn resolve_grid(
    name: &str,
    confs: &BTreeMap<String, GridConf>,
    stack: &mut Vec<String>,
) -> Result<Grid, ConfigurationError> {
    let Some(conf) = confs.get(name) else {
        return Grid::builtin(name)
            .ok_or_else(|| ConfigurationError::Build(format!("unknown grid '{}'", name)));
    };
    if stack.iter().any(|n| n == name) {
        stack.push(name.to_string());
        return Err(ConfigurationError::Build(format!(
            "grid base cycle: {}",
            stack.join(" -> ")
        )));
    }

    stack.push(name.to_string());
    let base = match conf.base.as_deref() {
        Some(base) => Some(resolve_grid(base, confs, stack)?),
        None => None,
    };
    stack.pop();

    build_grid(name, conf, base.as_ref())
}

fn build_grid(name: &str, conf: &GridConf, base: Option<&Grid>) -> Result<Grid, ConfigurationError> {
    let build_err = |msg: String| ConfigurationError::Build(format!("grid '{}': {}", name, msg));

    let srs = conf
        .srs
        .clone()
        .or_else(|| base.map(|b| b.srs.clone()))
        .ok_or_else(|| build_err("missing srs".to_string()))?;

    if let Some(bbox_srs) = conf.bbox_srs.as_deref() {
        if !bbox_srs.eq_ignore_ascii_case(&srs) {
            return Err(build_err(format!(
                "bbox_srs '{}' differs from srs '{}', bbox transformation is not supported",
                bbox_srs, srs
            )));
        }
    }

    let bbox = match &conf.bbox {
        Some(BboxConf::List(values)) => bbox_from_slice(values)?,
        Some(BboxConf::Text(text)) => parse_bbox(text)?,
        None => match base {
            Some(base) if base.srs.eq_ignore_ascii_case(&srs) => base.bbox,
            _ => Grid::default_bbox(&srs)
                .ok_or_else(|| build_err(format!("no bbox given and no default for '{}'", srs)))?,
        },
    };

    let tile_size = match conf.tile_size.as_deref() {
        Some([w, h]) if *w >= 1.0 && *h >= 1.0 => (*w as u32, *h as u32),
        Some(other) => return Err(build_err(format!("invalid tile_size {:?}", other))),
        None => base.map(|b| b.tile_size).unwrap_or((256, 256)),
    };

    let origin = match conf.origin.as_deref() {
        Some(origin) => {
            Origin::parse(origin).ok_or_else(|| build_err(format!("invalid origin '{}'", origin)))?
        }
        None => base.map(|b| b.origin).unwrap_or(Origin::SouthWest),
    };

    let grid_name = conf.name.clone().unwrap_or_else(|| name.to_string());

    if let Some(res) = &conf.res {
        if res.is_empty() || res.iter().any(|r| *r <= 0.0) {
            return Err(build_err("res must list positive resolutions".to_string()));
        }
        if res.len() > MAX_NUM_LEVELS as usize {
            return Err(build_err(format!(
                "res lists {} resolutions, at most {} levels are supported",
                res.len(),
                MAX_NUM_LEVELS
            )));
        }
        return Ok(Grid {
            name: grid_name,
            srs,
            bbox,
            tile_size,
            origin,
            resolutions: res.clone(),
        });
    }

    let geometry_changed = conf.srs.is_some() || conf.bbox.is_some() || conf.tile_size.is_some();
    let num_levels = conf
        .num_levels
        .or_else(|| base.map(Grid::num_levels))
        .unwrap_or(DEFAULT_NUM_LEVELS);
    if num_levels > MAX_NUM_LEVELS {
        return Err(build_err(format!(
            "num_levels {} exceeds the supported maximum of {}",
            num_levels, MAX_NUM_LEVELS
        )));
    }

    match base {
        Some(base) if conf.min_res.is_none() && conf.num_levels.is_none() && !geometry_changed => {
            Ok(Grid {
                name: grid_name,
                srs,
                bbox,
                tile_size,
                origin,
                resolutions: base.resolutions.clone(),
            })
        }
        _ => Ok(Grid::with_levels(
            grid_name, srs, bbox, tile_size, origin, conf.min_res, num_levels,
        )),
    }
}
