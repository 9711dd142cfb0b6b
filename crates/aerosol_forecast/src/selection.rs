//! Choosing a (pressure level, valid time) pair and cutting the 2-D slice for it.
//!
//! The options a user can choose from are the field's own axis values, so a
//! [`SelectionState`] can only ever hold a selection that resolves.

use chrono::{DateTime, TimeDelta, Utc};
use ndarray::{s, Array2};

use crate::{
    error::{ForecastError, Result},
    field::{nearest_index, ForecastField},
};

/// Format of the valid-time label shown next to a rendered slice.
pub const TIME_LABEL_FORMAT: &str = "%m/%d %H:%M";

pub fn format_valid_time(valid_time: DateTime<Utc>) -> String {
    valid_time.format(TIME_LABEL_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub pressure_level: f64,
    pub valid_time: DateTime<Utc>,
}

/// A single lat x lon grid, resolved from a [`Selection`].
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub level_hpa: f64,
    pub valid_time: DateTime<Utc>,
    pub step: TimeDelta,
    /// `MM/DD HH:MM` of `valid_time`.
    pub label: String,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    /// Indexed by `[lat, lon]`.
    pub values: Array2<f32>,
}

impl Slice {
    pub fn title(&self) -> String {
        format!(
            "Aerosol extinction at 1064nm at {} at {}mb",
            self.label, self.level_hpa
        )
    }
}

impl ForecastField {
    /// Resolve `selection` to one 2-D slice.
    ///
    /// The valid time must be one of the field's own (exact match, then mapped to
    /// its step). The pressure level snaps to the nearest level on the axis, which
    /// absorbs floating point noise such as `925.00001`.
    pub fn resolve(&self, selection: &Selection) -> Result<Slice> {
        let step = self.step_for(selection.valid_time).ok_or_else(|| {
            ForecastError::Selection(format!(
                "valid time {} is not on the time axis",
                selection.valid_time
            ))
        })?;
        let time_index = self
            .times()
            .iter()
            .position(|row| row.step == step)
            .ok_or_else(|| ForecastError::Selection(format!("step {step} is not on the time axis")))?;
        let level_index = nearest_index(self.levels(), selection.pressure_level)
            .ok_or_else(|| ForecastError::Selection("the level axis is empty".to_string()))?;

        Ok(Slice {
            level_hpa: self.levels()[level_index],
            valid_time: selection.valid_time,
            step,
            label: format_valid_time(selection.valid_time),
            latitudes: self.latitudes().to_vec(),
            longitudes: self.longitudes().to_vec(),
            values: self.data().slice(s![time_index, level_index, .., ..]).to_owned(),
        })
    }
}

/// A request to move one of the two selectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionChange {
    /// Snap to the level closest to this value (hPa).
    Level(f64),
    /// One step towards higher pressure (lower altitude).
    LevelUp,
    LevelDown,
    /// Must be one of the field's valid times.
    ValidTime(DateTime<Utc>),
    TimeIndex(usize),
    NextTime,
    PrevTime,
}

/// The two selectors, bound to the option lists of one [`ForecastField`].
#[derive(Debug, Clone)]
pub struct SelectionState {
    levels: Vec<f64>,
    valid_times: Vec<DateTime<Utc>>,
    level_index: usize,
    time_index: usize,
}

impl SelectionState {
    /// Start at the lowest level and the earliest valid time, as sliders would.
    pub fn new(field: &ForecastField) -> Result<Self> {
        let levels = field.levels().to_vec();
        let valid_times = field.valid_times();
        if levels.is_empty() || valid_times.is_empty() {
            return Err(ForecastError::Selection(
                "the field has an empty axis".to_string(),
            ));
        }
        Ok(Self {
            levels,
            valid_times,
            level_index: 0,
            time_index: 0,
        })
    }

    /// Start as close as possible to `previous`, which was chosen on another
    /// field: the nearest level and the nearest valid time.
    pub fn near(field: &ForecastField, previous: &Selection) -> Result<Self> {
        let mut state = Self::new(field)?;
        state.apply(SelectionChange::Level(previous.pressure_level))?;
        let nearest_time = state
            .valid_times
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| (**t - previous.valid_time).abs())
            .map(|(index, _)| index);
        if let Some(index) = nearest_time {
            state.apply(SelectionChange::TimeIndex(index))?;
        }
        Ok(state)
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn valid_times(&self) -> &[DateTime<Utc>] {
        &self.valid_times
    }

    pub fn current(&self) -> Selection {
        Selection {
            pressure_level: self.levels[self.level_index],
            valid_time: self.valid_times[self.time_index],
        }
    }

    /// Apply `change`. Returns the new selection if it differs from the old one,
    /// which is the cue to re-render; `None` means nothing needs redrawing.
    pub fn apply(&mut self, change: SelectionChange) -> Result<Option<Selection>> {
        let before = (self.level_index, self.time_index);
        match change {
            SelectionChange::Level(level) => {
                // `new` guarantees a non-empty axis.
                self.level_index = nearest_index(&self.levels, level).unwrap_or(self.level_index);
            }
            SelectionChange::LevelUp => {
                self.level_index = (self.level_index + 1).min(self.levels.len() - 1);
            }
            SelectionChange::LevelDown => {
                self.level_index = self.level_index.saturating_sub(1);
            }
            SelectionChange::ValidTime(valid_time) => {
                self.time_index = self
                    .valid_times
                    .iter()
                    .position(|t| *t == valid_time)
                    .ok_or_else(|| {
                        ForecastError::Selection(format!("{valid_time} is not a valid time option"))
                    })?;
            }
            SelectionChange::TimeIndex(index) => {
                if index >= self.valid_times.len() {
                    return Err(ForecastError::Selection(format!(
                        "time index {index} is out of range 0..{}",
                        self.valid_times.len()
                    )));
                }
                self.time_index = index;
            }
            SelectionChange::NextTime => {
                self.time_index = (self.time_index + 1).min(self.valid_times.len() - 1);
            }
            SelectionChange::PrevTime => {
                self.time_index = self.time_index.saturating_sub(1);
            }
        }
        Ok(((self.level_index, self.time_index) != before).then(|| self.current()))
    }

    /// Look up a valid time by its `MM/DD HH:MM` label.
    pub fn valid_time_by_label(&self, label: &str) -> Option<DateTime<Utc>> {
        self.valid_times
            .iter()
            .copied()
            .find(|t| format_valid_time(*t) == label.trim())
    }
}
