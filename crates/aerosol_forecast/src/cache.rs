//! Session-scoped memoization of the forecast download.
//!
//! A viewing session re-renders every time the user moves a selector. Fetching
//! from the archive takes minutes, so [`ForecastCache::get_forecast`] downloads a
//! given [`ModelRun`] at most once and hands back the same [`CachedFetchResult`]
//! afterwards. The cache is keyed on the model run itself and holds a single
//! entry, because every genuine fetch overwrites the same local file.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    archive::Archive,
    error::Result,
    model_run::{Clock, ModelRun, SystemClock},
    request::RetrievalRequest,
};

pub const DEFAULT_DOWNLOAD_PATH: &str = "forecast.grib";

/// What to do when the clock moves on to a newer model run mid-session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Re-resolve the model run on every call; a newer run replaces the cached one.
    #[default]
    FollowClock,
    /// Keep whatever run was fetched first for the rest of the session.
    Session,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFetchResult {
    pub path: PathBuf,
    pub model_run: ModelRun,
    pub bytes: u64,
}

impl CachedFetchResult {
    pub fn forecast_date(&self) -> String {
        self.model_run.forecast_date()
    }

    pub fn forecast_hour(&self) -> String {
        self.model_run.forecast_hour()
    }
}

/// Memoizes [`Archive::retrieve`] for one viewing session.
///
/// Under [`RefreshPolicy::Session`] any number of calls make exactly one
/// transfer. The default [`RefreshPolicy::FollowClock`] makes one transfer per
/// model run instead: a session that crosses 00Z or 12Z downloads the newer
/// run once more, and never downloads the same run twice.
pub struct ForecastCache<A, C = SystemClock> {
    archive: A,
    clock: C,
    path: PathBuf,
    policy: RefreshPolicy,
    entry: Mutex<Option<CachedFetchResult>>,
}

impl<A: Archive> ForecastCache<A, SystemClock> {
    pub fn new(archive: A, path: impl Into<PathBuf>) -> Self {
        Self::with_clock(archive, SystemClock, path)
    }
}

impl<A: Archive, C: Clock> ForecastCache<A, C> {
    pub fn with_clock(archive: A, clock: C, path: impl Into<PathBuf>) -> Self {
        Self {
            archive,
            clock,
            path: path.into(),
            policy: RefreshPolicy::default(),
            entry: Mutex::new(None),
        }
    }

    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// The currently cached result, if any. Never touches the network.
    pub async fn cached(&self) -> Option<CachedFetchResult> {
        self.entry.lock().await.clone()
    }

    /// Forget the cached result so that the next call fetches again.
    pub async fn invalidate(&self) {
        self.entry.lock().await.take();
    }

    /// Return the forecast for the applicable model run, downloading it only if
    /// this session has not already done so.
    ///
    /// Errors from the archive are returned as-is and leave the cache empty.
    pub async fn get_forecast(&self) -> Result<CachedFetchResult> {
        // Holding the lock across the download means concurrent callers wait for
        // the one transfer instead of starting their own.
        let mut entry = self.entry.lock().await;

        if let (RefreshPolicy::Session, Some(cached)) = (self.policy, entry.as_ref()) {
            debug!(run = %cached.model_run, "Cache hit (session policy)");
            return Ok(cached.clone());
        }

        let now = self.clock.now();
        let model_run = ModelRun::resolve(now);
        if let Some(cached) = entry.as_ref().filter(|c| c.model_run == model_run) {
            debug!(run = %model_run, "Cache hit");
            return Ok(cached.clone());
        }

        info!(%now, run = %model_run, "Using model run from {}", model_run.reference_datetime());
        if let Some(stale) = entry.take() {
            info!(stale = %stale.model_run, fresh = %model_run, "Newer model run available; refetching");
        }
        let request = RetrievalRequest::for_run(model_run);
        let bytes = self.archive.retrieve(&request, &self.path).await?;
        let result = CachedFetchResult {
            path: self.path.clone(),
            model_run,
            bytes,
        };
        info!(
            "Loaded forecast for {} {}",
            result.forecast_date(),
            result.forecast_hour()
        );
        *entry = Some(result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use super::*;
    use crate::{error::ForecastError, model_run::RunHour};

    /// Writes the model run into `target` and counts transfers.
    #[derive(Default)]
    struct FakeArchive {
        transfers: AtomicUsize,
        requests: std::sync::Mutex<Vec<RetrievalRequest>>,
    }

    impl FakeArchive {
        fn transfers(&self) -> usize {
            self.transfers.load(Ordering::SeqCst)
        }
    }

    impl Archive for FakeArchive {
        async fn retrieve(&self, request: &RetrievalRequest, target: &Path) -> Result<u64> {
            self.transfers.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            let contents = request.model_run.to_string();
            tokio::fs::write(target, &contents).await?;
            Ok(contents.len() as u64)
        }
    }

    struct FailingArchive;

    impl Archive for FailingArchive {
        async fn retrieve(&self, _request: &RetrievalRequest, _target: &Path) -> Result<u64> {
            Err(ForecastError::Archive {
                status: 401,
                url: "https://example.com/api".to_string(),
                body: "invalid token".to_string(),
            })
        }
    }

    /// A clock the test can move forwards.
    struct SteppingClock(Cell<DateTime<Utc>>);

    impl SteppingClock {
        fn advance(&self, delta: TimeDelta) {
            self.0.set(self.0.get() + delta);
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            self.0.get()
        }
    }

    fn morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_fetches_at_most_once() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let archive = FakeArchive::default();
        let cache = ForecastCache::with_clock(
            &archive,
            crate::model_run::FixedClock(morning()),
            dir.path().join("forecast.grib"),
        );

        let first = cache.get_forecast().await?;
        for _ in 0..9 {
            assert_eq!(cache.get_forecast().await?, first);
        }
        assert_eq!(archive.transfers(), 1);
        assert_eq!(first.forecast_date(), "2024-03-09");
        assert_eq!(first.forecast_hour(), "12:00");
        assert_eq!(first.path, dir.path().join("forecast.grib"));
        assert_eq!(std::fs::read_to_string(&first.path)?, "2024-03-09 12:00");

        let requests = archive.requests.lock().unwrap();
        assert_eq!(requests[0].pressure_levels_hpa.len(), 6);
        assert_eq!(requests[0].lead_times.len(), 17);
        Ok(())
    }

    #[tokio::test]
    async fn test_follow_clock_refetches_on_new_run() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let archive = FakeArchive::default();
        let clock = SteppingClock(Cell::new(morning()));
        let cache = ForecastCache::with_clock(&archive, &clock, dir.path().join("f.grib"));

        let first = cache.get_forecast().await?;
        clock.advance(TimeDelta::hours(3)); // 11:00, same run
        assert_eq!(cache.get_forecast().await?, first);
        assert_eq!(archive.transfers(), 1);

        clock.advance(TimeDelta::hours(2)); // 13:00, today's 00Z run
        let second = cache.get_forecast().await?;
        assert_eq!(archive.transfers(), 2);
        assert_eq!(second.model_run.hour, RunHour::T00);
        assert_eq!(second.forecast_date(), "2024-03-10");
        assert_eq!(cache.cached().await, Some(second.clone()));
        assert_eq!(std::fs::read_to_string(&second.path)?, "2024-03-10 00:00");

        assert_eq!(cache.get_forecast().await?, second);
        assert_eq!(archive.transfers(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_session_policy_keeps_first_run() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let archive = FakeArchive::default();
        let clock = SteppingClock(Cell::new(morning()));
        let cache = ForecastCache::with_clock(&archive, &clock, dir.path().join("f.grib"))
            .with_policy(RefreshPolicy::Session);

        let first = cache.get_forecast().await?;
        clock.advance(TimeDelta::hours(12));
        assert_eq!(cache.get_forecast().await?, first);
        assert_eq!(archive.transfers(), 1);

        cache.invalidate().await;
        let second = cache.get_forecast().await?;
        assert_ne!(second.model_run, first.model_run);
        assert_eq!(archive.transfers(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_propagates_and_is_not_cached() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = ForecastCache::with_clock(
            FailingArchive,
            crate::model_run::FixedClock(morning()),
            dir.path().join("f.grib"),
        );
        let err = cache.get_forecast().await.unwrap_err();
        assert!(matches!(err, ForecastError::Archive { status: 401, .. }));
        assert_eq!(cache.cached().await, None);
        Ok(())
    }
}
