#![doc = include_str!("../README.md")]

pub mod archive;
pub mod cache;
pub mod error;
pub mod field;
pub mod model_run;
pub mod request;
pub mod selection;

pub use archive::{AdsArchive, Archive, Credentials};
pub use cache::{CachedFetchResult, ForecastCache, RefreshPolicy};
pub use error::{ForecastError, Result};
pub use field::{ForecastField, GridMessage, TimeRow};
pub use model_run::{Clock, FixedClock, ModelRun, RunHour, SystemClock};
pub use request::RetrievalRequest;
pub use selection::{Selection, SelectionChange, SelectionState, Slice};
