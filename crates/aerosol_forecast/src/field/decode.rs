//! Turning raw GRIB bytes into [`GridMessage`]s, using `gribberish`.
//!
//! Only messages on isobaric surfaces are kept: the CAMS file is opened the same
//! way as filtering on `typeOfLevel = isobaricInhPa`.

use gribberish::{message::read_messages, templates::product::tables::FixedSurfaceType};
use tracing::debug;

use super::GridMessage;
use crate::error::{ForecastError, Result};

/// Isobaric surfaces are stored in Pa.
const PA_PER_HPA: f64 = 100.0;

const START_MARKER: &[u8] = b"GRIB";
const END_MARKER: &[u8] = b"7777";
/// Indicator section (16 octets in edition 2) plus the end section.
const MIN_MESSAGE_LEN: u64 = 20;

pub(crate) fn read_isobaric_messages(data: &[u8]) -> Result<Vec<GridMessage>> {
    let n_framed = count_framed_messages(data)?;
    let mut grid_messages = Vec::new();
    let mut n_messages = 0;
    for (index, message) in read_messages(data).enumerate() {
        n_messages += 1;
        let err = decode_error(index);

        let (surface, value) = message.first_fixed_surface().map_err(&err)?;
        if !matches!(surface, FixedSurfaceType::IsobaricSurface) {
            debug!(index, surface = ?surface, "Skipping non-isobaric message");
            continue;
        }
        let pascals = value.ok_or_else(|| {
            ForecastError::decode(index, "isobaric surface has no pressure value")
        })?;

        let reference_time = message.reference_date().map_err(&err)?;
        let valid_time = message.forecast_date().map_err(&err)?;
        let (n_rows, n_cols) = message.grid_dimensions().map_err(&err)?;
        let (lats, lons) = message.latitude_longitude_arrays().map_err(&err)?;
        let (latitudes, longitudes) = split_coords(lats, lons, n_rows, n_cols)
            .ok_or_else(|| ForecastError::decode(index, "unexpected coordinate array lengths"))?;
        let values: Vec<f32> = message
            .data()
            .map_err(&err)?
            .into_iter()
            .map(|v| v as f32)
            .collect();

        grid_messages.push(GridMessage {
            level_hpa: pascals / PA_PER_HPA,
            reference_time,
            valid_time,
            latitudes,
            longitudes,
            values,
        });
    }
    if n_messages != n_framed {
        return Err(ForecastError::decode(
            n_messages,
            format!("only {n_messages} of {n_framed} GRIB messages could be read"),
        ));
    }
    debug!(n_messages, n_isobaric = grid_messages.len(), "Decoded GRIB file");
    Ok(grid_messages)
}

/// Walk the indicator sections and check that complete messages tile `data`
/// exactly, with nothing cut off and nothing left over. Returns the message count.
fn count_framed_messages(data: &[u8]) -> Result<usize> {
    let mut offset = 0;
    let mut index = 0;
    while offset < data.len() {
        let rest = &data[offset..];
        if !rest.starts_with(START_MARKER) {
            return Err(ForecastError::decode(
                index,
                format!("{} bytes at offset {offset} are not a GRIB message", rest.len()),
            ));
        }
        let length = message_length(rest).ok_or_else(|| {
            ForecastError::decode(index, "truncated or unsupported indicator section")
        })?;
        if length < MIN_MESSAGE_LEN {
            return Err(ForecastError::decode(
                index,
                format!("implausible message length {length}"),
            ));
        }
        if length > rest.len() as u64 {
            return Err(ForecastError::decode(
                index,
                format!(
                    "truncated message: {length} bytes declared, {} available",
                    rest.len()
                ),
            ));
        }
        let length = length as usize;
        if !rest[..length].ends_with(END_MARKER) {
            return Err(ForecastError::decode(index, "message does not end with 7777"));
        }
        offset += length;
        index += 1;
    }
    Ok(index)
}

/// Total message length from the indicator section: octets 5-7 in edition 1,
/// octets 9-16 in edition 2.
fn message_length(message: &[u8]) -> Option<u64> {
    match *message.get(7)? {
        1 => {
            let b = message.get(4..7)?;
            Some(u64::from_be_bytes([0, 0, 0, 0, 0, b[0], b[1], b[2]]))
        }
        2 => Some(u64::from_be_bytes(message.get(8..16)?.try_into().ok()?)),
        _ => None,
    }
}

fn decode_error<E: std::fmt::Debug>(index: usize) -> impl Fn(E) -> ForecastError {
    move |e| ForecastError::decode(index, format!("{e:?}"))
}

/// Reduce coordinate arrays to one latitude per row and one longitude per column.
///
/// Regular lat/lon grids may report either the 1-D axes or the full 2-D mesh
/// flattened in row-major order.
fn split_coords(
    lats: Vec<f64>,
    lons: Vec<f64>,
    n_rows: usize,
    n_cols: usize,
) -> Option<(Vec<f64>, Vec<f64>)> {
    let n_points = n_rows * n_cols;
    let latitudes = match lats.len() {
        n if n == n_rows => lats,
        n if n == n_points && n_cols > 0 => lats.into_iter().step_by(n_cols).collect(),
        _ => return None,
    };
    let longitudes = match lons.len() {
        n if n == n_cols => lons,
        n if n == n_points => lons.into_iter().take(n_cols).collect(),
        _ => return None,
    };
    Some((latitudes, longitudes))
}
