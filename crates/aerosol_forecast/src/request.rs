//! The retrieval request sent to the Atmosphere Data Store.
//!
//! Everything except the model run is fixed: one variable, six pressure levels,
//! seventeen lead times and one bounding box.

use chrono::TimeDelta;
use serde::Serialize;

use crate::model_run::ModelRun;

/// The ADS dataset that holds the CAMS global forecasts.
pub const DATASET: &str = "cams-global-atmospheric-composition-forecasts";

pub const VARIABLE: &str = "aerosol_extinction_coefficient_1064nm";

/// Pressure levels in hPa, in ascending order.
pub const PRESSURE_LEVELS_HPA: [u16; 6] = [800, 850, 900, 925, 950, 1000];

/// Lead times in hours: every 3 hours from 3 to 51 inclusive.
pub const LEAD_TIME_HOURS: [u16; 17] = [
    3, 6, 9, 12, 15, 18, 21, 24, 27, 30, 33, 36, 39, 42, 45, 48, 51,
];

pub const AREA: BoundingBox = BoundingBox {
    north: 30.0,
    west: 30.0,
    south: 9.0,
    east: 50.0,
};

/// Geographic extent of the retrieved grid, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

impl BoundingBox {
    /// The `[north, west, south, east]` order used by the archive's `area` keyword.
    pub fn to_area(&self) -> [f64; 4] {
        [self.north, self.west, self.south, self.east]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Forecast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Grib,
}

/// One retrieval from the archive. Fully determined by the [`ModelRun`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub dataset: &'static str,
    pub variables: Vec<&'static str>,
    pub pressure_levels_hpa: Vec<u16>,
    pub model_run: ModelRun,
    pub lead_times: Vec<TimeDelta>,
    pub product_type: ProductType,
    pub data_format: DataFormat,
    pub area: BoundingBox,
}

impl RetrievalRequest {
    pub fn for_run(model_run: ModelRun) -> Self {
        Self {
            dataset: DATASET,
            variables: vec![VARIABLE],
            pressure_levels_hpa: PRESSURE_LEVELS_HPA.to_vec(),
            model_run,
            lead_times: LEAD_TIME_HOURS
                .iter()
                .map(|h| TimeDelta::hours(i64::from(*h)))
                .collect(),
            product_type: ProductType::Forecast,
            data_format: DataFormat::Grib,
            area: AREA,
        }
    }

    /// The JSON `inputs` object understood by the archive's retrieve API.
    pub fn to_inputs(&self) -> RequestInputs {
        RequestInputs {
            variable: self.variables.iter().map(|v| v.to_string()).collect(),
            pressure_level: self
                .pressure_levels_hpa
                .iter()
                .map(|p| p.to_string())
                .collect(),
            date: vec![self.model_run.forecast_date()],
            time: vec![self.model_run.forecast_hour()],
            leadtime_hour: self
                .lead_times
                .iter()
                .map(|step| step.num_hours().to_string())
                .collect(),
            product_type: vec![self.product_type],
            data_format: self.data_format,
            area: self.area.to_area(),
        }
    }
}

/// Wire representation of a [`RetrievalRequest`].
#[derive(Debug, Serialize, PartialEq)]
pub struct RequestInputs {
    pub variable: Vec<String>,
    pub pressure_level: Vec<String>,
    pub date: Vec<String>,
    pub time: Vec<String>,
    pub leadtime_hour: Vec<String>,
    #[serde(rename = "type")]
    pub product_type: Vec<ProductType>,
    pub data_format: DataFormat,
    pub area: [f64; 4],
}
