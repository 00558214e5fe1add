//! Coordinates, great-circle distance and H3 cell id helpers.

use h3o::CellIndex;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_009.0;

/// A concrete point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn of_cell(cell: CellIndex) -> Self {
        let center: h3o::LatLng = cell.into();
        Self {
            lon: center.lng(),
            lat: center.lat(),
        }
    }
}

/// Great-circle (haversine) distance in meters.
pub fn great_circle_m(a: LonLat, b: LonLat) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
    let sin_dlat = ((lat2 - lat1) * 0.5).sin();
    let sin_dlon = ((lon2 - lon1) * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Distance between two cell centers in meters.
pub fn cell_distance_m(a: CellIndex, b: CellIndex) -> f64 {
    great_circle_m(LonLat::of_cell(a), LonLat::of_cell(b))
}

/// Parse a cell id written as hexadecimal (`8a1fb46622dffff`, optional `0x`).
pub fn parse_cell(raw: &str) -> SimResult<CellIndex> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let value =
        u64::from_str_radix(digits, 16).map_err(|_| SimError::InvalidCell(raw.to_string()))?;
    CellIndex::try_from(value).map_err(|_| SimError::InvalidCell(raw.to_string()))
}

pub fn format_cell(cell: CellIndex) -> String {
    format!("{:x}", u64::from(cell))
}

/// Serde adapter storing a [CellIndex] as its hexadecimal id.
pub mod cell_hex {
    use h3o::CellIndex;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(cell: &CellIndex, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_cell(*cell))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<CellIndex, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_cell(&raw).map_err(serde::de::Error::custom)
    }
}
