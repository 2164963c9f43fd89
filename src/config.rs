//! Service and layout configuration.
//!
//! Service settings come from the environment (with `.env` support). Layout
//! settings have built-in defaults and can be overridden by a JSON file named
//! in `VIZ_LAYOUT_CONFIG`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_PORT: u16 = 8080;

/// Where the inventory export is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    File(PathBuf),
    Url(String),
}

/// Settings for the HTTP service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub source: SourceConfig,
    pub layout: LayoutConfig,
}

impl AppConfig {
    /// Read settings from environment variables.
    ///
    /// - `PORT` (default 8080)
    /// - `INVENTORY_CSV_PATH` or `INVENTORY_CSV_URL` (path wins if both set)
    /// - `VIZ_LAYOUT_CONFIG` (optional JSON file)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = match lookup("PORT").filter(|p| !p.is_empty()) {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("PORT is not a valid port: {:?}", raw))?,
            None => DEFAULT_PORT,
        };

        let source = if let Some(path) = lookup("INVENTORY_CSV_PATH").filter(|p| !p.is_empty()) {
            SourceConfig::File(PathBuf::from(path))
        } else if let Some(url) = lookup("INVENTORY_CSV_URL").filter(|u| !u.is_empty()) {
            SourceConfig::Url(url)
        } else {
            anyhow::bail!("Set INVENTORY_CSV_PATH or INVENTORY_CSV_URL");
        };

        let layout = match lookup("VIZ_LAYOUT_CONFIG").filter(|p| !p.is_empty()) {
            Some(path) => LayoutConfig::load(Path::new(&path))?,
            None => LayoutConfig::default(),
        };

        Ok(Self {
            port,
            source,
            layout,
        })
    }
}

/// Canvas margins, in pixels. Missing sides keep their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Default for Margin {
    fn default() -> Self {
        Self {
            top: 40.0,
            right: 45.0,
            bottom: 30.0,
            left: 150.0,
        }
    }
}

/// Tree diagram geometry and transition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Full canvas width including margins.
    pub width: f64,
    /// Full canvas height including margins.
    pub height: f64,
    pub margin: Margin,
    /// Distance between tree levels along the depth axis.
    pub depth_spacing: f64,
    pub duration_ms: u64,
    /// Prefix joined with each resource type's icon key.
    pub icon_base: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width: 2500.0,
            height: 2540.0,
            margin: Margin::default(),
            depth_spacing: 180.0,
            duration_ms: 500,
            icon_base: "icons/".to_string(),
        }
    }
}

impl LayoutConfig {
    /// Load a layout config from a JSON file. Missing fields keep defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read layout config: {:?}", path))?;
        let config: LayoutConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse layout config: {:?}", path))?;
        info!("Loaded layout config from {:?}", path);
        Ok(config)
    }

    /// Drawable extent along the breadth axis.
    pub fn inner_height(&self) -> f64 {
        (self.height - self.margin.top - self.margin.bottom).max(0.0)
    }

    pub fn icon_url(&self, icon_key: &str) -> String {
        format!("{}{}", self.icon_base, icon_key)
    }
}
