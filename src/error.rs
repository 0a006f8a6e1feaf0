use std::fmt;

use thiserror::Error;

/// Failure talking to the photo service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, TLS, timeout or body read failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success HTTP status.
    #[error("unexpected http status {0}")]
    Status(u16),

    /// The body was not the JSON shape we expect.
    #[error("malformed response: {0}")]
    Parse(String),

    /// The service reported an API-level failure (`stat: "fail"`).
    #[error("service error {code}: {message}")]
    Service { code: i64, message: String },
}

/// Which coordinate a geo input error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    pub const fn limit(self) -> f64 {
        match self {
            Self::Latitude => 90.0,
            Self::Longitude => 180.0,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latitude => f.write_str("latitude"),
            Self::Longitude => f.write_str("longitude"),
        }
    }
}

/// Rejected geo search input. The `Display` text is shown to the user as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeoInputError {
    #[error("{0} must be a number")]
    NotANumber(Axis),

    #[error("{0} must be between -{limit} and {limit}", limit = .0.limit())]
    OutOfRange(Axis),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("result buffer capacity must be at least 1")]
    ZeroCapacity,
}
