//! A `MapClient` that writes a standalone Leaflet page.

use crate::config::TileLayerConfig;
use crate::error::RenderError;
use crate::render::MapClient;
use crate::types::{LatLng, Polygon};
use askama::Template;
use serde_json::json;
use std::fs;
use std::path::Path;

#[derive(Template)]
#[template(path = "map.html")]
struct MapPageTemplate<'a> {
    title: &'a str,
    container_id: &'a str,
    script: &'a str,
}

/// Collects Leaflet calls; `into_html` wraps them in a page with one container.
#[derive(Debug, Clone)]
pub struct LeafletPage {
    title: String,
    container_id: String,
    script: Vec<String>,
    initialized: bool,
}

impl LeafletPage {
    pub fn new(title: impl Into<String>, container_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            container_id: container_id.into(),
            script: Vec::new(),
            initialized: false,
        }
    }

    pub fn overlay_count(&self) -> usize {
        self.script.iter().filter(|line| line.starts_with("L.polygon(")).count()
    }

    pub fn into_html(self) -> Result<String, RenderError> {
        let script = self.script.join("\n");
        let page = MapPageTemplate {
            title: &self.title,
            container_id: &self.container_id,
            script: &script,
        };
        Ok(page.render()?)
    }

    pub fn write_to(self, path: &Path) -> Result<(), RenderError> {
        let html = self.into_html()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, html)?;
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<(), RenderError> {
        if self.initialized {
            Ok(())
        } else {
            Err(RenderError::NotInitialized)
        }
    }
}

impl MapClient for LeafletPage {
    fn set_view(&mut self, center: LatLng, zoom: u8) -> Result<(), RenderError> {
        if self.initialized {
            return Err(RenderError::AlreadyInitialized);
        }
        self.script.push(format!(
            "var map = L.map({}).setView({}, {});",
            js_value(&json!(self.container_id)),
            js_value(&json!([center.lat(), center.lng()])),
            zoom
        ));
        self.initialized = true;
        Ok(())
    }

    fn add_tile_layer(&mut self, layer: &TileLayerConfig) -> Result<(), RenderError> {
        self.ensure_initialized()?;
        let options = json!({
            "attribution": layer.attribution,
            "minZoom": layer.min_zoom,
            "maxZoom": layer.max_zoom,
        });
        self.script.push(format!(
            "L.tileLayer({}, {}).addTo(map);",
            js_value(&json!(layer.url_template)),
            js_value(&options)
        ));
        Ok(())
    }

    fn add_polygon(&mut self, polygon: &Polygon, popup: &str) -> Result<(), RenderError> {
        self.ensure_initialized()?;
        if let Some(defect) = polygon.defect() {
            return Err(RenderError::MalformedPolygon(defect));
        }
        let points = serde_json::to_value(polygon)
            .map_err(|e| RenderError::MalformedPolygon(e.to_string()))?;
        self.script.push(format!(
            "L.polygon({}).bindPopup({}).addTo(map);",
            js_value(&points),
            js_value(&json!(escape_html(popup)))
        ));
        Ok(())
    }
}

/// JSON literal that is safe inside an inline `<script>`.
fn js_value(value: &serde_json::Value) -> String {
    value.to_string().replace("</", "<\\/")
}

// Leaflet popups take HTML.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
