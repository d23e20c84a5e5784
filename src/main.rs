pub mod cases;
pub mod component;
pub mod config;
pub mod data;
pub mod error;
pub mod leaflet;
pub mod loader;
pub mod merge;
pub mod render;
pub mod server;
pub mod tiles;
pub mod types;

use anyhow::Context;
use clap::{Parser, Subcommand};
use component::{Lifecycle, MapComponent, Phase};
use leaflet::LeafletPage;
use loader::HttpGeographySource;
use std::path::PathBuf;
use tiles::TileRasterizer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load both feeds and write the Leaflet map page
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Overrides `output.page`
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Load both feeds and write boundary preview tiles
    Preview {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Download the configured COVID-19 case series into their local CSVs
    Retrieve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the countries and boundaries feeds built from local data files
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

/// Tear the component down on Ctrl-C so a pending load never draws.
fn unmount_on_ctrl_c(lifecycle: Lifecycle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; unmounting map component");
            lifecycle.unmount();
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render { config, output } => {
            info!("Rendering map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(&config)?;
            let page_path = output.unwrap_or_else(|| app_config.output.page.clone());

            let source = HttpGeographySource::new(&app_config.api)?;
            let page = LeafletPage::new(&app_config.map.title, &app_config.map.container_id);
            let mut component = MapComponent::new(source, page, app_config.map.clone());
            unmount_on_ctrl_c(component.lifecycle());

            if component.mount().await? == &Phase::Rendered {
                component
                    .into_client()
                    .write_to(&page_path)
                    .with_context(|| format!("Failed to write map page {:?}", page_path))?;
                info!("Map page written to {:?}", page_path);
            }
        }
        Commands::Preview { config } => {
            info!("Rendering preview tiles with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(&config)?;

            let source = HttpGeographySource::new(&app_config.api)?;
            let rasterizer = TileRasterizer::new(&app_config.output)?;
            let mut component = MapComponent::new(source, rasterizer, app_config.map.clone());
            unmount_on_ctrl_c(component.lifecycle());

            if component.mount().await? == &Phase::Rendered {
                let tile_dir = &app_config.output.tile_dir;
                let rasterizer = component.into_client();
                tokio::task::block_in_place(|| rasterizer.write_tiles(tile_dir))?;
            }
        }
        Commands::Retrieve { config } => {
            info!("Retrieving case series with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(&config)?;

            let count =
                cases::retrieve_case_series(&app_config.cases, app_config.api.timeout_secs).await?;
            info!("Retrieved {} case series", count);
        }
        Commands::Serve { config } => {
            info!("Serving feeds with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(&config)?;

            let (mut countries, boundaries) = data::load_feeds(&app_config.input)?;
            cases::attach_configured_series(&app_config.cases, &mut countries)?;
            let state = server::AppState::build(app_config, countries, boundaries)?;

            server::start_server(state).await?;
        }
    }

    Ok(())
}
