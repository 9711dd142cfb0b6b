//! The decoded forecast: aerosol extinction on a (time, level, lat, lon) grid.

mod decode;

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, TimeDelta, Utc};
use ndarray::{s, Array4, ArrayView2};
use tracing::info;

use crate::error::{ForecastError, Result};

/// Name of the extinction variable once decoded.
pub const VARIABLE_SHORT_NAME: &str = "aerext1064";

/// Two levels closer than this (in hPa) are the same level.
const LEVEL_TOLERANCE_HPA: f64 = 1e-6;

/// One decoded 2-D GRIB message on an isobaric surface.
#[derive(Debug, Clone, PartialEq)]
pub struct GridMessage {
    pub level_hpa: f64,
    pub reference_time: DateTime<Utc>,
    pub valid_time: DateTime<Utc>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    /// Row-major: one row per latitude.
    pub values: Vec<f32>,
}

impl GridMessage {
    pub fn step(&self) -> TimeDelta {
        self.valid_time - self.reference_time
    }
}

/// One entry of the time axis. For a single model run, valid time and step are 1:1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeRow {
    pub valid_time: DateTime<Utc>,
    pub step: TimeDelta,
}

#[derive(Debug, Clone)]
pub struct ForecastField {
    reference_time: DateTime<Utc>,
    levels: Vec<f64>,
    times: Vec<TimeRow>,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    /// Indexed by `[time, level, lat, lon]`. (time, level) pairs absent from the file are NaN.
    data: Array4<f32>,
}

impl ForecastField {
    /// Decode the isobaric messages of the GRIB file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let messages = decode::read_isobaric_messages(&bytes)?;
        if messages.is_empty() {
            return Err(ForecastError::EmptyField(path.display().to_string()));
        }
        let field = Self::from_messages(messages)?;
        info!(
            path = %path.display(),
            n_levels = field.levels.len(),
            n_times = field.times.len(),
            shape = ?field.data.shape(),
            "Opened forecast field"
        );
        Ok(field)
    }

    /// Assemble decoded messages into a field. The message order does not matter.
    pub fn from_messages(messages: Vec<GridMessage>) -> Result<Self> {
        let first = messages
            .first()
            .ok_or_else(|| ForecastError::EmptyField("decoded messages".to_string()))?;
        let reference_time = first.reference_time;
        let latitudes = first.latitudes.clone();
        let longitudes = first.longitudes.clone();
        let grid_shape = (latitudes.len(), longitudes.len());

        let mut levels: Vec<f64> = messages.iter().map(|m| m.level_hpa).collect();
        levels.sort_by(f64::total_cmp);
        levels.dedup_by(|a, b| (*a - *b).abs() < LEVEL_TOLERANCE_HPA);

        let times: Vec<TimeRow> = messages
            .iter()
            .map(|m| (m.valid_time, m.step()))
            .collect::<BTreeMap<_, _>>()
            .into_iter()
            .map(|(valid_time, step)| TimeRow { valid_time, step })
            .collect();

        let mut data = Array4::from_elem(
            (times.len(), levels.len(), grid_shape.0, grid_shape.1),
            f32::NAN,
        );
        for (index, message) in messages.iter().enumerate() {
            let found = (message.latitudes.len(), message.longitudes.len());
            if found != grid_shape {
                return Err(ForecastError::GridMismatch {
                    expected: grid_shape,
                    found,
                });
            }
            let values = ArrayView2::from_shape(grid_shape, &message.values)
                .map_err(|e| ForecastError::decode(index, e.to_string()))?;
            let time_index = times
                .binary_search_by(|row| row.valid_time.cmp(&message.valid_time))
                .map_err(|_| ForecastError::decode(index, "valid time missing from axis"))?;
            let level_index = nearest_index(&levels, message.level_hpa)
                .ok_or_else(|| ForecastError::decode(index, "level missing from axis"))?;
            data.slice_mut(s![time_index, level_index, .., ..])
                .assign(&values);
        }

        Ok(Self {
            reference_time,
            levels,
            times,
            latitudes,
            longitudes,
            data,
        })
    }

    pub fn reference_time(&self) -> DateTime<Utc> {
        self.reference_time
    }

    /// Pressure levels in hPa, ascending.
    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    /// Time axis, ascending by valid time.
    pub fn times(&self) -> &[TimeRow] {
        &self.times
    }

    pub fn valid_times(&self) -> Vec<DateTime<Utc>> {
        self.times.iter().map(|row| row.valid_time).collect()
    }

    /// Exact lookup of the step that produced `valid_time`.
    pub fn step_for(&self, valid_time: DateTime<Utc>) -> Option<TimeDelta> {
        self.times
            .iter()
            .find(|row| row.valid_time == valid_time)
            .map(|row| row.step)
    }

    pub fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    pub fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }

    pub fn data(&self) -> &Array4<f32> {
        &self.data
    }
}

/// Index of the axis value closest to `value`. `None` only for an empty axis.
pub fn nearest_index(axis: &[f64], value: f64) -> Option<usize> {
    axis.iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - value).abs().total_cmp(&(*b - value).abs()))
        .map(|(i, _)| i)
}


#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;

    #[test]
    fn test_axes_are_sorted_and_complete() {
        let field = synthetic_field();
        assert_eq!(field.levels(), &LEVELS);
        assert_eq!(field.times().len(), 17);
        let valid_times = field.valid_times();
        assert!(valid_times.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(valid_times[0], valid_time(0));
        assert_eq!(field.times()[16].step, TimeDelta::hours(51));
        assert_eq!(field.data().shape(), &[17, 6, N_LAT, N_LON]);
        assert_eq!(field.reference_time(), reference_time());
    }

    #[test]
    fn test_values_land_in_their_cell() {
        let field = synthetic_field();
        for t in 0..17 {
            for l in 0..6 {
                assert_eq!(field.data()[[t, l, 1, 2]], marker(t, l));
            }
        }
    }

    #[test]
    fn test_missing_messages_are_nan() {
        let field = ForecastField::from_messages(vec![message(0, 0), message(1, 1)]).unwrap();
        assert_eq!(field.levels(), &[800.0, 850.0]);
        assert_eq!(field.data()[[0, 0, 0, 0]], marker(0, 0));
        assert!(field.data()[[0, 1, 0, 0]].is_nan());
        assert!(field.data()[[1, 0, 0, 0]].is_nan());
    }

    #[test]
    fn test_step_for() {
        let field = synthetic_field();
        assert_eq!(field.step_for(valid_time(5)), Some(TimeDelta::hours(18)));
        assert_eq!(field.step_for(reference_time()), None);
    }

    #[test]
    fn test_empty_and_mismatched_inputs() {
        assert!(matches!(
            ForecastField::from_messages(vec![]),
            Err(ForecastError::EmptyField(_))
        ));
        let mut odd = message(1, 0);
        odd.longitudes.pop();
        assert!(matches!(
            ForecastField::from_messages(vec![message(0, 0), odd]),
            Err(ForecastError::GridMismatch { .. })
        ));
        let mut short = message(0, 0);
        short.values.pop();
        assert!(matches!(
            ForecastField::from_messages(vec![short]),
            Err(ForecastError::Decode { .. })
        ));
    }

    #[test]
    fn test_nearest_index() {
        assert_eq!(nearest_index(&LEVELS, 925.0), Some(3));
        assert_eq!(nearest_index(&LEVELS, 925.00001), Some(3));
        assert_eq!(nearest_index(&LEVELS, 10.0), Some(0));
        assert_eq!(nearest_index(&LEVELS, 5000.0), Some(5));
        assert_eq!(nearest_index(&[], 925.0), None);
    }

    #[test]
    fn test_open_missing_file() {
        let err = ForecastField::open(Path::new("does/not/exist.grib")).unwrap_err();
        assert!(matches!(err, ForecastError::Io(_)));
    }

    #[test]
    fn test_open_empty_file() -> anyhow::Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        let err = ForecastField::open(file.path()).unwrap_err();
        assert!(matches!(err, ForecastError::EmptyField(_)));
        Ok(())
    }
}
