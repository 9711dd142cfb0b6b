//! The stages of a viewing session, composed explicitly:
//! resolve run -> acquire -> materialize -> (resolve selection -> render)*.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use aerosol_forecast::{
    Archive, CachedFetchResult, Clock, ForecastCache, ForecastField, ModelRun, Selection,
};
use anyhow::Context;
use tracing::debug;

use crate::render::Renderer;

pub struct Pipeline<A, C> {
    cache: ForecastCache<A, C>,
    renderer: Renderer,
    /// The field decoded from the current download, tagged with its model run.
    field: Option<(ModelRun, Arc<ForecastField>)>,
}

impl<A: Archive, C: Clock> Pipeline<A, C> {
    pub fn new(cache: ForecastCache<A, C>, renderer: Renderer) -> Self {
        Self {
            cache,
            renderer,
            field: None,
        }
    }

    /// Download the forecast, unless this session already has it.
    pub async fn acquire(&self) -> anyhow::Result<CachedFetchResult> {
        self.cache
            .get_forecast()
            .await
            .context("Failed to download the forecast")
    }

    /// Decode the downloaded file. Decoding happens once per download; later
    /// calls return the same field as long as the cache returns the same run.
    pub async fn materialize(&mut self) -> anyhow::Result<Arc<ForecastField>> {
        let fetched = self.acquire().await?;
        if let Some((run, field)) = &self.field {
            if *run == fetched.model_run {
                debug!(%run, "Reusing decoded field");
                return Ok(field.clone());
            }
        }
        let path = fetched.path.clone();
        let field = tokio::task::spawn_blocking(move || ForecastField::open(&path))
            .await?
            .with_context(|| format!("Failed to decode {}", fetched.path.display()))?;
        let field = Arc::new(field);
        self.field = Some((fetched.model_run, field.clone()));
        Ok(field)
    }

    /// Resolve `selection` against `field` and write the image. Never touches the network.
    pub async fn render(
        &self,
        field: &ForecastField,
        selection: &Selection,
        out: Option<&Path>,
    ) -> anyhow::Result<PathBuf> {
        let slice = field.resolve(selection)?;
        println!("Selected Pressure Level: {} hPa", slice.level_hpa);
        println!("Selected Time: {}", slice.label);
        let title = slice.title();
        let renderer = self.renderer.clone();
        let out = out.map(Path::to_path_buf);
        // Encoding and writing the PNG is blocking work.
        let path = tokio::task::spawn_blocking(move || match out {
            Some(out) => renderer.render_to(&slice, &out).map(|()| out),
            None => renderer.render(&slice),
        })
        .await??;
        println!("{title} -> {}", path.display());
        Ok(path)
    }
}
