use crate::types::LatLng;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub map: MapViewConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
    pub cases: CasesConfig,
}

/// Where the Data Loader fetches its two feeds from.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub countries_url: String,
    pub boundaries_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            countries_url: "http://127.0.0.1:3000/api/countries".to_string(),
            boundaries_url: "http://127.0.0.1:3000/api/boundaries".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Fixed view settings; never derived from the loaded data.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapViewConfig {
    pub container_id: String,
    pub title: String,
    pub center: LatLng,
    pub zoom: u8,
    pub tiles: TileLayerConfig,
}

impl Default for MapViewConfig {
    fn default() -> Self {
        Self {
            container_id: "mapid".to_string(),
            title: "World map".to_string(),
            center: LatLng(35.0023, 78.4559),
            zoom: 2,
            tiles: TileLayerConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TileLayerConfig {
    pub url_template: String,
    pub attribution: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
}

impl Default for TileLayerConfig {
    fn default() -> Self {
        Self {
            url_template: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            attribution: "&copy; <a href=\"https://openstreetmap.org/copyright\">OpenStreetMap contributors</a>"
                .to_string(),
            min_zoom: 0,
            max_zoom: 19,
        }
    }
}

/// Source files for the feed server.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    pub countries_csv: PathBuf,
    pub country_name_column: String,
    pub country_iso_column: String,
    pub boundaries: PathBuf, // .geojson / .json / .shp
    pub boundary_name_property: String,
    pub boundary_iso_property: String,
    pub area_type: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            countries_csv: PathBuf::from("data/countries.csv"),
            country_name_column: "name".to_string(),
            country_iso_column: "iso".to_string(),
            boundaries: PathBuf::from("data/country_boundaries.geojson"),
            boundary_name_property: "ADMIN".to_string(),
            boundary_iso_property: "ISO_A2".to_string(),
            area_type: "country".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub page: PathBuf,
    pub tile_dir: PathBuf,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub stroke_color: String, // Hex code
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            page: PathBuf::from("dist/index.html"),
            tile_dir: PathBuf::from("dist/tiles"),
            min_zoom: 0,
            max_zoom: 4,
            stroke_color: "#3388ff".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// CSSE COVID-19 time series: where `retrieve` downloads them from and where
/// `serve` reads them.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CasesConfig {
    pub source_root: String,
    pub series: Vec<CaseSeriesConfig>,
}

impl Default for CasesConfig {
    fn default() -> Self {
        Self {
            source_root: "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/"
                .to_string(),
            series: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CaseSeriesConfig {
    pub name: String,   // Attribute key on each country
    pub remote: String, // Relative to source_root
    pub csv: PathBuf,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse TOML configuration")
    }
}
