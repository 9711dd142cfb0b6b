//! The Copernicus Atmosphere Data Store (ADS).
//! https://ads.atmosphere.copernicus.eu
//!
//! A retrieval is an asynchronous job on the ADS side:
//!
//! 1. `POST retrieve/v1/processes/<dataset>/execution` submits the request.
//! 2. `GET retrieve/v1/jobs/<id>` is polled until the job has finished.
//! 3. `GET retrieve/v1/jobs/<id>/results` gives the URL of the produced file.
//! 4. That URL is streamed to disk.

use std::{path::Path, time::Duration};

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, Response};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use url::Url;

use super::{partial_path, Archive, Credentials};
use crate::{
    error::{ForecastError, Result},
    request::RetrievalRequest,
};

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum JobState {
    Accepted,
    Running,
    Successful,
    Failed,
    Rejected,
    Dismissed,
    #[serde(other)]
    Unknown,
}

impl JobState {
    fn is_finished(&self) -> bool {
        !matches!(self, Self::Accepted | Self::Running)
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Running => "running",
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::Dismissed => "dismissed",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Job {
    #[serde(rename = "jobID")]
    job_id: String,
    status: JobState,
}

#[derive(Debug, Deserialize)]
struct JobResults {
    asset: Asset,
}

#[derive(Debug, Deserialize)]
struct Asset {
    value: AssetValue,
}

#[derive(Debug, Deserialize)]
struct AssetValue {
    href: String,
    #[serde(rename = "file:size")]
    size: Option<u64>,
}

pub struct AdsArchive {
    client: Client,
    credentials: Credentials,
    poll_interval: Duration,
    show_progress: bool,
}

impl AdsArchive {
    pub fn new(credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("aerosol_forecast/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            credentials,
            poll_interval: DEFAULT_POLL_INTERVAL,
            show_progress: true,
        })
    }

    /// Use `client` instead of the default one, e.g. to change proxies or timeouts.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_progress_bar(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        endpoint(&self.credentials.url, segments)
    }

    async fn submit(&self, request: &RetrievalRequest) -> Result<Job> {
        let url = self.endpoint(&[
            "retrieve",
            "v1",
            "processes",
            request.dataset,
            "execution",
        ])?;
        let body = serde_json::json!({ "inputs": request.to_inputs() });
        debug!(%url, %body, "Submitting retrieval request");
        let response = self
            .client
            .post(url)
            .header(TOKEN_HEADER, &self.credentials.key)
            .json(&body)
            .send()
            .await?;
        Ok(error_for_status(response).await?.json().await?)
    }

    async fn poll(&self, job_id: &str) -> Result<Job> {
        let url = self.endpoint(&["retrieve", "v1", "jobs", job_id])?;
        let response = self
            .client
            .get(url)
            .header(TOKEN_HEADER, &self.credentials.key)
            .send()
            .await?;
        Ok(error_for_status(response).await?.json().await?)
    }

    /// Poll until the job leaves the queue. Errors if it did not succeed.
    async fn wait_for(&self, mut job: Job) -> Result<String> {
        let mut last_state = job.status;
        info!(job_id = %job.job_id, status = last_state.as_str(), "Retrieval job submitted");
        while !job.status.is_finished() {
            tokio::time::sleep(self.poll_interval).await;
            job = self.poll(&job.job_id).await?;
            if job.status != last_state {
                info!(job_id = %job.job_id, status = job.status.as_str(), "Retrieval job status changed");
                last_state = job.status;
            }
        }
        if job.status == JobState::Successful {
            return Ok(job.job_id);
        }
        let detail = self.results_text(&job.job_id).await;
        Err(ForecastError::JobFailed {
            job_id: job.job_id,
            status: job.status.as_str().to_string(),
            detail,
        })
    }

    /// The results document of a failed job describes the failure. Best effort only.
    async fn results_text(&self, job_id: &str) -> String {
        let Ok(url) = self.endpoint(&["retrieve", "v1", "jobs", job_id, "results"]) else {
            return String::new();
        };
        match self
            .client
            .get(url)
            .header(TOKEN_HEADER, &self.credentials.key)
            .send()
            .await
        {
            Ok(response) => response.text().await.unwrap_or_default(),
            Err(e) => e.to_string(),
        }
    }

    async fn asset(&self, job_id: &str) -> Result<AssetValue> {
        let url = self.endpoint(&["retrieve", "v1", "jobs", job_id, "results"])?;
        let response = self
            .client
            .get(url)
            .header(TOKEN_HEADER, &self.credentials.key)
            .send()
            .await?;
        let results: JobResults = error_for_status(response).await?.json().await?;
        Ok(results.asset.value)
    }

    /// Stream `asset` into a `.partial` file, then move it over `target`.
    /// On failure the partial file is removed and `target` is left as it was.
    async fn download(&self, asset: &AssetValue, target: &Path) -> Result<u64> {
        let href = Url::parse(&asset.href)?;
        let response = error_for_status(self.client.get(href).send().await?).await?;
        let total = response.content_length().or(asset.size);
        let progress = self.progress_bar(total);

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target);
        match write_then_rename(response, &partial, target, &progress).await {
            Ok(written) => {
                progress.finish_and_clear();
                Ok(written)
            }
            Err(e) => {
                progress.abandon();
                tokio::fs::remove_file(&partial).await.ok();
                Err(e)
            }
        }
    }

    fn progress_bar(&self, total: Option<u64>) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let (bar, template) = match total {
            Some(total) => (
                ProgressBar::new(total),
                "{spinner} [{elapsed_precise}] [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec})",
            ),
            None => (
                ProgressBar::new_spinner(),
                "{spinner} [{elapsed_precise}] {bytes} ({bytes_per_sec})",
            ),
        };
        if let Ok(style) = ProgressStyle::with_template(template) {
            bar.set_style(style);
        }
        bar
    }
}

impl Archive for AdsArchive {
    #[instrument(skip_all, fields(run = %request.model_run, target = %target.display()))]
    async fn retrieve(&self, request: &RetrievalRequest, target: &Path) -> Result<u64> {
        let job = self.submit(request).await?;
        let job_id = self.wait_for(job).await?;
        let asset = self.asset(&job_id).await?;
        info!(href = %asset.href, size = ?asset.size, "Downloading forecast file");
        let written = self.download(&asset, target).await?;
        info!(bytes = written, "Download complete");
        Ok(written)
    }
}

async fn write_then_rename(
    response: Response,
    partial: &Path,
    target: &Path,
    progress: &ProgressBar,
) -> Result<u64> {
    let mut file = tokio::fs::File::create(partial).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        progress.inc(chunk.len() as u64);
    }
    file.flush().await?;
    drop(file);
    tokio::fs::rename(partial, target).await?;
    Ok(written)
}

/// Append `segments` to the path of `base`, whether or not it ends in a slash.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ForecastError::Credentials(format!("{base} cannot be used as a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn error_for_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(ForecastError::Archive {
        status: status.as_u16(),
        url,
        body,
    })
}
