//! Application settings and per-run processing options.
//!
//! Two layers live here:
//!
//! - [`ConfigStore`]: the persistent key/value settings file (`config.json`).
//!   Reads go through the [`CacheManager`] (`category = "config"`), writes go
//!   to both the cache and the backing file.
//! - [`ProcessingOptions`]: the typed, validated options for one batch run,
//!   built either from the stored settings or from a TOML run file.
//!
//! ## Run File
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! output_format = ".png"    # png, jpg, jpeg, bmp, tif, tiff, webp
//! scale_ratio = 1.0         # > 0; 1.0 keeps the original size
//! brightness = 1.0          # multipliers, 1.0 = unchanged
//! contrast = 1.0
//! saturation = 1.0
//! remove_black = false      # make near-black pixels transparent
//! remove_white = false      # make near-white pixels transparent
//! max_workers = 4           # omit for auto = CPU cores
//!
//! [geo]
//! enable_reproject = false
//! source_crs = "auto"       # "auto" = use the CRS embedded in the file
//! target_crs = "EPSG:4326"
//! preserve_geospatial = false  # requires enable_reproject
//! geo_driver = "GTiff"
//! ```
//!
//! Run files are sparse: values are merged over the stock defaults, unknown
//! keys are rejected.

use crate::cache::CacheManager;
use crate::geo::{Driver, is_crs_identifier};
use crate::imaging::normalize_extension;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

const CACHE_CATEGORY: &str = "config";

/// Output extensions the pixel stage can encode.
pub const OUTPUT_FORMATS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

// ============================================================================
// ConfigStore
// ============================================================================

/// Built-in settings, merged under whatever the config file contains.
pub fn default_settings() -> Map<String, Value> {
    let defaults = json!({
        "language": "vi",
        "theme": "cosmo",
        "last_input_dir": "",
        "last_output_dir": "",
        "export_format": "PNG",
        "scale_ratio": 1.0,
        "enable_geo": false,
        "target_crs": "EPSG:4326",
        "remove_black": false,
        "remove_white": false,
        "save_geo": true,
        "geo_format": "GTiff",
        "brightness": 1.0,
        "contrast": 1.0,
        "saturation": 1.0,
    });
    match defaults {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Persistent flat key/value settings.
///
/// The whole object is rewritten on every persisted change; there are no
/// partial writes.
pub struct ConfigStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
    cache: CacheManager,
}

impl ConfigStore {
    /// Load settings from `path`, falling back to defaults.
    ///
    /// A missing file is created with the defaults. An unreadable one is
    /// left alone and the defaults are used for this session.
    pub fn open(path: impl Into<PathBuf>, cache: CacheManager) -> Self {
        let path = path.into();
        let mut values = default_settings();
        let mut write_defaults = false;

        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Map<String, Value>>(&content) {
                Ok(loaded) => values.extend(loaded),
                Err(e) => tracing::warn!("ignoring unreadable config {}: {e}", path.display()),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => write_defaults = true,
            Err(e) => tracing::warn!("failed to read config {}: {e}", path.display()),
        }

        let store = Self {
            path,
            values: Mutex::new(values),
            cache,
        };
        if write_defaults && let Err(e) = store.save() {
            tracing::warn!("failed to write default config: {e}");
        }
        store
    }

    /// `<platform config dir>/TifTiff/config.json`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("TifTiff")
            .join("config.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn values(&self) -> std::sync::MutexGuard<'_, Map<String, Value>> {
        self.values.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn cache_key(key: &str) -> String {
        format!("config_{key}")
    }

    /// Look a key up: cache first, then the loaded settings, then defaults.
    pub fn get(&self, key: &str) -> Option<Value> {
        let cache_key = Self::cache_key(key);
        if let Some(hit) = self.cache.get_cache(&cache_key, Some(CACHE_CATEGORY)) {
            return Some(hit);
        }
        let found = self
            .values()
            .get(key)
            .cloned()
            .or_else(|| default_settings().remove(key))?;
        self.cache.set_cache(&cache_key, &found, Some(CACHE_CATEGORY));
        Some(found)
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Typed lookup; a stored value of the wrong shape yields `default`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or(default)
    }

    /// Set one key. Returns `false` only when persisting was requested and failed.
    pub fn set(&self, key: &str, value: Value, persist: bool) -> bool {
        self.values().insert(key.to_string(), value.clone());
        self.cache
            .set_cache(&Self::cache_key(key), &value, Some(CACHE_CATEGORY));
        !persist || self.persist()
    }

    /// Set several keys at once, persisting the full object a single time.
    pub fn update(&self, changes: Map<String, Value>, persist: bool) -> bool {
        for (key, value) in &changes {
            self.cache
                .set_cache(&Self::cache_key(key), value, Some(CACHE_CATEGORY));
        }
        self.values().extend(changes);
        !persist || self.persist()
    }

    /// Restore defaults and drop every cached setting.
    pub fn reset(&self, persist: bool) -> bool {
        *self.values() = default_settings();
        self.cache.clear_cache(Some(CACHE_CATEGORY));
        !persist || self.persist()
    }

    pub fn get_all(&self) -> Map<String, Value> {
        self.values().clone()
    }

    /// Write the full settings object to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&*self.values())?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    fn persist(&self) -> bool {
        match self.save() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("failed to save config {}: {e}", self.path.display());
                false
            }
        }
    }
}

// ============================================================================
// ProcessingOptions
// ============================================================================

/// Options for one batch run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingOptions {
    /// Output extension for the pixel stage, e.g. `".png"`.
    pub output_format: String,
    pub scale_ratio: f64,
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
    pub remove_black: bool,
    pub remove_white: bool,
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    pub max_workers: Option<usize>,
    pub geo: GeoOptions,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            output_format: ".png".to_string(),
            scale_ratio: 1.0,
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
            remove_black: false,
            remove_white: false,
            max_workers: None,
            geo: GeoOptions::default(),
        }
    }
}

/// Geospatial sub-options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeoOptions {
    pub enable_reproject: bool,
    /// `"auto"` uses the CRS embedded in each file.
    pub source_crs: String,
    pub target_crs: String,
    pub preserve_geospatial: bool,
    pub geo_driver: Driver,
}

impl Default for GeoOptions {
    fn default() -> Self {
        Self {
            enable_reproject: false,
            source_crs: "auto".to_string(),
            target_crs: "EPSG:4326".to_string(),
            preserve_geospatial: false,
            geo_driver: Driver::GTiff,
        }
    }
}

impl GeoOptions {
    /// Explicit source CRS, or `None` for `"auto"`/empty.
    pub fn source_override(&self) -> Option<&str> {
        let s = self.source_crs.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("auto") {
            None
        } else {
            Some(s)
        }
    }
}

impl ProcessingOptions {
    /// Build run options from stored settings, then validate.
    pub fn from_config(store: &ConfigStore) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let export_format: String = store.get_as("export_format", "PNG".to_string());
        let enable_geo: bool = store.get_as("enable_geo", false);
        let geo_format: String = store.get_as("geo_format", "GTiff".to_string());

        let options = Self {
            output_format: normalize_extension(&export_format),
            scale_ratio: store.get_as("scale_ratio", defaults.scale_ratio),
            brightness: store.get_as("brightness", defaults.brightness),
            contrast: store.get_as("contrast", defaults.contrast),
            saturation: store.get_as("saturation", defaults.saturation),
            remove_black: store.get_as("remove_black", false),
            remove_white: store.get_as("remove_white", false),
            max_workers: None,
            geo: GeoOptions {
                enable_reproject: enable_geo,
                source_crs: "auto".to_string(),
                target_crs: store.get_as("target_crs", defaults.geo.target_crs),
                preserve_geospatial: enable_geo && store.get_as("save_geo", true),
                geo_driver: Driver::from_name(&geo_format).unwrap_or_default(),
            },
        };
        options.validate()?;
        Ok(options)
    }

    /// Validate values; called once before a run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.scale_ratio.is_finite() || self.scale_ratio <= 0.0 {
            return Err(ConfigError::Validation(
                "scale_ratio must be a finite number greater than 0".into(),
            ));
        }
        for (name, value) in [
            ("brightness", self.brightness),
            ("contrast", self.contrast),
            ("saturation", self.saturation),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{name} must be a finite number >= 0"
                )));
            }
        }
        let ext = self.output_format.trim().trim_start_matches('.').to_lowercase();
        if !OUTPUT_FORMATS.contains(&ext.as_str()) {
            return Err(ConfigError::Validation(format!(
                "output_format must be one of {}, got {:?}",
                OUTPUT_FORMATS.join(", "),
                self.output_format
            )));
        }
        if self.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "max_workers must be at least 1".into(),
            ));
        }
        if self.geo.preserve_geospatial && !self.geo.enable_reproject {
            return Err(ConfigError::Validation(
                "geo.preserve_geospatial requires geo.enable_reproject".into(),
            ));
        }
        if !is_crs_identifier(&self.geo.target_crs) {
            return Err(ConfigError::Validation(format!(
                "geo.target_crs must look like AUTHORITY:CODE, got {:?}",
                self.geo.target_crs
            )));
        }
        if let Some(src) = self.geo.source_override()
            && !is_crs_identifier(src)
        {
            return Err(ConfigError::Validation(format!(
                "geo.source_crs must be \"auto\" or AUTHORITY:CODE, got {src:?}"
            )));
        }
        Ok(())
    }
}

/// Resolve the effective worker count for a run.
///
/// - `None` → all available cores
/// - `Some(n)` → `min(n, cores)`
///
/// The result is further capped by `file_count` and never drops below 1.
pub fn effective_workers(max_workers: Option<usize>, file_count: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let workers = max_workers.map(|n| n.min(cores)).unwrap_or(cores);
    workers.min(file_count).max(1)
}

// ============================================================================
// TOML run files
// ============================================================================

/// Stock default options as a `toml::Value::Table`, the base layer for merging.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ProcessingOptions::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key by key; any other overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto the stock defaults, deserialize and validate.
pub fn resolve_options(overlay: Option<toml::Value>) -> Result<ProcessingOptions, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let mut options: ProcessingOptions = merged.try_into()?;
    options.output_format = normalize_extension(&options.output_format);
    options.validate()?;
    Ok(options)
}

/// Load run options from a TOML file.
pub fn load_options(path: &Path) -> Result<ProcessingOptions, ConfigError> {
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    resolve_options(Some(value))
}
