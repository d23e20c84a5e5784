//! Data Loader: fetches the countries feed, then the boundaries feed, and
//! returns the countries with their boundaries joined on.

use crate::config::ApiConfig;
use crate::error::LoadError;
use crate::merge::merge_boundaries;
use crate::types::{BoundaryFeed, Country};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

#[async_trait]
pub trait GeographySource: Send + Sync {
    async fn load_geography(&self) -> Result<Vec<Country>, LoadError>;
}

pub struct HttpGeographySource {
    client: reqwest::Client,
    countries_url: String,
    boundaries_url: String,
}

impl HttpGeographySource {
    pub fn new(config: &ApiConfig) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("country-map/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(LoadError::Client)?;

        Ok(Self {
            client,
            countries_url: config.countries_url.clone(),
            boundaries_url: config.boundaries_url.clone(),
        })
    }

    async fn fetch_body(&self, url: &str) -> Result<String, LoadError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| LoadError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        response.text().await.map_err(|source| LoadError::Network {
            url: url.to_string(),
            source,
        })
    }

    pub async fn fetch_countries(&self) -> Result<Vec<Country>, LoadError> {
        let body = self.fetch_body(&self.countries_url).await?;
        parse_countries(&self.countries_url, &body)
    }

    pub async fn fetch_boundaries(&self) -> Result<BoundaryFeed, LoadError> {
        let body = self.fetch_body(&self.boundaries_url).await?;
        parse_boundaries(&self.boundaries_url, &body)
    }
}

#[async_trait]
impl GeographySource for HttpGeographySource {
    async fn load_geography(&self) -> Result<Vec<Country>, LoadError> {
        let mut countries = self.fetch_countries().await?;
        info!("Loaded {} countries", countries.len());

        let feed = self.fetch_boundaries().await?;
        info!("Loaded {} boundary records", feed.len());

        let mismatches = merge_boundaries(&mut countries, &feed);
        if !mismatches.is_empty() {
            info!("{} boundary records matched no country", mismatches.len());
        }

        Ok(countries)
    }
}

// Boundaries only ever come from the boundaries feed.
pub fn parse_countries(url: &str, body: &str) -> Result<Vec<Country>, LoadError> {
    let mut countries: Vec<Country> =
        serde_json::from_str(body).map_err(|source| LoadError::Parse {
            url: url.to_string(),
            source,
        })?;

    for country in &mut countries {
        if country.boundaries.take().is_some() {
            debug!("Ignoring boundaries on countries feed entry {}", country.name);
        }
    }

    Ok(countries)
}

pub fn parse_boundaries(url: &str, body: &str) -> Result<BoundaryFeed, LoadError> {
    serde_json::from_str(body).map_err(|source| LoadError::Parse {
        url: url.to_string(),
        source,
    })
}
