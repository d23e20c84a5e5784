//! Map Renderer: draws merged countries through an injected map client.

use crate::config::{MapViewConfig, TileLayerConfig};
use crate::error::RenderError;
use crate::types::{Country, LatLng, Polygon};
use tracing::{error, info};

pub trait MapClient {
    fn set_view(&mut self, center: LatLng, zoom: u8) -> Result<(), RenderError>;

    fn add_tile_layer(&mut self, layer: &TileLayerConfig) -> Result<(), RenderError>;

    fn add_polygon(&mut self, polygon: &Polygon, popup: &str) -> Result<(), RenderError>;
}

/// One overlay per boundary of every country; the first failure aborts the pass.
pub fn render_map<C: MapClient + ?Sized>(
    client: &mut C,
    view: &MapViewConfig,
    countries: &[Country],
) -> Result<(), RenderError> {
    let tiles = &view.tiles;
    if tiles.min_zoom > tiles.max_zoom {
        return Err(RenderError::InvalidTileLayer {
            min_zoom: tiles.min_zoom,
            max_zoom: tiles.max_zoom,
        });
    }

    client.set_view(view.center, view.zoom)?;
    client.add_tile_layer(tiles)?;

    let mut overlays = 0usize;
    for country in countries {
        for polygon in country.boundaries.iter().flatten() {
            client.add_polygon(polygon, &country.name).map_err(|e| {
                error!("Rendering {} failed: {}", country.name, e);
                RenderError::Overlay {
                    country: country.name.clone(),
                    source: Box::new(e),
                }
            })?;
            overlays += 1;
        }
    }

    info!("Rendered {} boundary overlays for {} countries", overlays, countries.len());
    Ok(())
}
