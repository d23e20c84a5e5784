//! Builds the two feeds the map consumes from local source files: a countries
//! CSV and a boundary geometry file (GeoJSON or Shapefile).

use crate::config::InputConfig;
use crate::types::{BoundaryFeed, BoundaryRecord, Country, LatLng, Polygon};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use geo::MultiPolygon;
use shapefile::Reader;
use std::fs::File;
use std::io::BufReader;
use tracing::{debug, info, warn};

/// One boundary-bearing area read from the geometry file.
struct Area {
    name: String,
    iso_code: String,
    geometry: MultiPolygon<f64>,
}

pub fn load_feeds(config: &InputConfig) -> Result<(Vec<Country>, BoundaryFeed)> {
    let countries = load_countries(config)?;
    info!("Loaded {} countries from {:?}", countries.len(), config.countries_csv);

    let boundaries = load_boundaries(config)?;
    info!("Loaded {} boundary records from {:?}", boundaries.len(), config.boundaries);

    Ok((countries, boundaries))
}

pub fn load_countries(config: &InputConfig) -> Result<Vec<Country>> {
    let file = File::open(&config.countries_csv)
        .with_context(|| format!("Failed to open CSV file: {:?}", config.countries_csv))?;
    let mut rdr = ReaderBuilder::new().from_reader(file);
    let headers = rdr.headers()?.clone();

    let name_idx = headers
        .iter()
        .position(|h| h == config.country_name_column)
        .ok_or_else(|| anyhow!("Name column '{}' not found in CSV", config.country_name_column))?;
    let iso_idx = headers
        .iter()
        .position(|h| h == config.country_iso_column)
        .ok_or_else(|| anyhow!("ISO column '{}' not found in CSV", config.country_iso_column))?;

    let mut countries = Vec::new();

    for result in rdr.records() {
        let record = result?;
        let name = record.get(name_idx).unwrap_or("").trim();
        let iso_code = record.get(iso_idx).unwrap_or("").trim();

        if name.is_empty() || iso_code.is_empty() {
            debug!("Skipping country row without name or ISO code: {:?}", record);
            continue;
        }

        let mut country = Country::new(name, iso_code);
        for (i, header) in headers.iter().enumerate() {
            if i == name_idx || i == iso_idx {
                continue;
            }
            country
                .attributes
                .insert(header.to_string(), csv_value(record.get(i).unwrap_or("")));
        }
        countries.push(country);
    }

    Ok(countries)
}

// Numbers stay numbers in the JSON feed; blanks become null.
fn csv_value(raw: &str) -> serde_json::Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return serde_json::Value::Null;
    }
    if let Ok(n) = raw.parse::<i64>() {
        return n.into();
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => f.into(),
        _ => raw.into(),
    }
}

pub fn load_boundaries(config: &InputConfig) -> Result<BoundaryFeed> {
    let extension = config
        .boundaries
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Boundary geometry file has no extension"))?;

    let areas = match extension.as_str() {
        "shp" => load_shapefile_areas(config)?,
        "json" | "geojson" => load_geojson_areas(config)?,
        _ => return Err(anyhow!("Unsupported geometry format: {}", extension)),
    };

    Ok(explode_areas(areas, &config.area_type))
}

/// One record per polygon, keyed `{division}-{iso}-{name}`. Only exterior
/// rings are kept, as (lat, lng).
fn explode_areas(areas: Vec<Area>, area_type: &str) -> BoundaryFeed {
    let mut feed = BoundaryFeed::new();

    for area in areas {
        for (division, polygon) in area.geometry.0.iter().enumerate() {
            let ring: Polygon = polygon
                .exterior()
                .coords()
                .map(|c| LatLng(c.y, c.x))
                .collect();

            feed.insert(
                format!("{}-{}-{}", division, area.iso_code, area.name),
                BoundaryRecord {
                    area_type: area_type.to_string(),
                    name: area.name.clone(),
                    iso_code: area.iso_code.clone(),
                    polygon: ring,
                    division: Some(division as u32),
                },
            );
        }
    }

    feed
}

fn load_shapefile_areas(config: &InputConfig) -> Result<Vec<Area>> {
    let mut reader = Reader::from_path(&config.boundaries)
        .with_context(|| format!("Failed to open Shapefile: {:?}", config.boundaries))?;

    let mut areas = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let name = match record.get(&config.boundary_name_property) {
            Some(shapefile::dbase::FieldValue::Character(Some(s))) => s.trim().to_string(),
            Some(_) => continue,
            None => {
                return Err(anyhow!(
                    "Name field '{}' not found in Shapefile",
                    config.boundary_name_property
                ))
            }
        };
        let iso_code = match record.get(&config.boundary_iso_property) {
            Some(shapefile::dbase::FieldValue::Character(Some(s))) => s.trim().to_string(),
            Some(_) => continue,
            None => {
                return Err(anyhow!(
                    "ISO field '{}' not found in Shapefile",
                    config.boundary_iso_property
                ))
            }
        };

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => continue, // Skip non-polygon shapes
        };

        areas.push(Area {
            name,
            iso_code,
            geometry,
        });
    }

    Ok(areas)
}

fn load_geojson_areas(config: &InputConfig) -> Result<Vec<Area>> {
    use geojson::GeoJson;

    debug!("Loading GeoJSON from {:?}...", config.boundaries);
    let file = File::open(&config.boundaries)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", config.boundaries))?;
    let reader = BufReader::new(file);

    // Parse the GeoJSON. warning: this loads the whole file into memory.
    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut areas = Vec::new();

    for feature in collection.features {
        let property = |key: &str| {
            feature
                .properties
                .as_ref()
                .and_then(|props| props.get(key))
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let (name, iso_code) = match (
            property(&config.boundary_name_property),
            property(&config.boundary_iso_property),
        ) {
            (Some(name), Some(iso)) => (name, iso),
            _ => {
                warn!("Skipping feature without name or ISO property");
                continue;
            }
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let valid_geo: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;

                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue, // Skip points/lines
                }
            }
            None => continue,
        };

        areas.push(Area {
            name,
            iso_code,
            geometry,
        });
    }

    Ok(areas)
}
