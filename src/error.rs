//! Error taxonomy for loading and rendering.
//!
//! A boundary that matches no country is not an error; see `merge::JoinMismatch`.

use thiserror::Error;

/// Failures of the Data Loader. Any of these aborts the whole load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Invalid payload from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    /// Transport failures and non-OK statuses.
    pub fn is_network(&self) -> bool {
        matches!(self, LoadError::Network { .. } | LoadError::HttpStatus { .. })
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, LoadError::Parse { .. })
    }
}

/// Failures of a render pass. The pass stops at the first one.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Map view is not initialized")]
    NotInitialized,

    #[error("Map view is already initialized")]
    AlreadyInitialized,

    #[error("Invalid tile layer zoom bounds [{min_zoom}, {max_zoom}]")]
    InvalidTileLayer { min_zoom: u8, max_zoom: u8 },

    #[error("Malformed polygon: {0}")]
    MalformedPolygon(String),

    #[error("Failed to draw boundary for {country}: {source}")]
    Overlay {
        country: String,
        #[source]
        source: Box<RenderError>,
    },

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
