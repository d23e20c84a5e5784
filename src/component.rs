//! Map component lifecycle: load, then render, with a "still mounted" guard
//! checked after every await.

use crate::config::MapViewConfig;
use crate::error::{LoadError, RenderError};
use crate::loader::GeographySource;
use crate::render::{render_map, MapClient};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Unmounted,
    Loading,
    Loaded,
    Rendered,
    Failed(String),
}

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("Component was already mounted")]
    AlreadyMounted,

    #[error("Could not load map data: {0}")]
    Load(#[from] LoadError),

    #[error("Could not draw the map: {0}")]
    Render(#[from] RenderError),
}

#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    unmounted: Arc<AtomicBool>,
}

impl Lifecycle {
    pub fn unmount(&self) {
        self.unmounted.store(true, Ordering::SeqCst);
    }

    pub fn is_mounted(&self) -> bool {
        !self.unmounted.load(Ordering::SeqCst)
    }
}

pub struct MapComponent<S, C> {
    source: S,
    client: C,
    view: MapViewConfig,
    phase: Phase,
    lifecycle: Lifecycle,
}

impl<S: GeographySource, C: MapClient> MapComponent<S, C> {
    pub fn new(source: S, client: C, view: MapViewConfig) -> Self {
        Self {
            source,
            client,
            view,
            phase: Phase::Unmounted,
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn into_client(self) -> C {
        self.client
    }

    /// Returns `Unmounted` if torn down while the load was in flight.
    pub async fn mount(&mut self) -> Result<&Phase, ComponentError> {
        if self.phase != Phase::Unmounted || !self.lifecycle.is_mounted() {
            return Err(ComponentError::AlreadyMounted);
        }

        self.phase = Phase::Loading;
        let loaded = self.source.load_geography().await;

        if !self.lifecycle.is_mounted() {
            warn!("Map component unmounted while loading; skipping render");
            self.phase = Phase::Unmounted;
            return Ok(&self.phase);
        }

        let countries = match loaded {
            Ok(countries) => countries,
            Err(e) => {
                let err = ComponentError::from(e);
                self.phase = Phase::Failed(err.to_string());
                return Err(err);
            }
        };
        self.phase = Phase::Loaded;

        if let Err(e) = render_map(&mut self.client, &self.view, &countries) {
            let err = ComponentError::from(e);
            self.phase = Phase::Failed(err.to_string());
            return Err(err);
        }

        self.phase = Phase::Rendered;
        info!("Map component rendered {} countries", countries.len());
        Ok(&self.phase)
    }
}
