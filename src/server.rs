use crate::config::AppConfig;
use crate::leaflet::LeafletPage;
use crate::merge::merge_boundaries;
use crate::render::render_map;
use crate::types::{BoundaryFeed, Country};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    response::{Html, Json},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

pub struct AppState {
    /// Served as-is; boundaries are only joined for the page.
    pub countries: Vec<Country>,
    pub boundaries: BoundaryFeed,
    pub page: String,
    pub config: AppConfig,
}

impl AppState {
    /// Joins the feeds in memory and renders the index page from the result.
    pub fn build(
        config: AppConfig,
        countries: Vec<Country>,
        boundaries: BoundaryFeed,
    ) -> Result<Self> {
        let mut merged = countries.clone();
        let mismatches = merge_boundaries(&mut merged, &boundaries);
        if !mismatches.is_empty() {
            info!("{} boundary records matched no country", mismatches.len());
        }

        let mut page = LeafletPage::new(&config.map.title, &config.map.container_id);
        render_map(&mut page, &config.map, &merged).context("Failed to render index page")?;
        let page = page.into_html().context("Failed to render index page")?;

        Ok(Self {
            countries,
            boundaries,
            page,
            config,
        })
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let tile_service = ServeDir::new(&state.config.output.tile_dir);

    Router::new()
        .route("/", get(index_handler))
        .route("/api/countries", get(countries_handler))
        .route("/api/boundaries", get(boundaries_handler))
        .nest_service("/tiles", tile_service)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port)
        .parse()
        .context("Invalid server host/port")?;
    let app = create_router(Arc::new(state));

    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    info!("loading / route");
    Html(state.page.clone())
}

async fn countries_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Country>> {
    info!("retrieving country data");
    Json(state.countries.clone())
}

async fn boundaries_handler(State(state): State<Arc<AppState>>) -> Json<BoundaryFeed> {
    info!("retrieving boundary data");
    Json(state.boundaries.clone())
}
