//! Timestamp helpers
//!
//! The helpdesk API emits ISO-8601 strings with an explicit UTC offset
//! (`2021-01-01T00:00:00Z`, `2021-01-01T02:00:00+02:00`). Everything is
//! normalised to [`DateTime<Utc>`] before it reaches the warehouse.

use chrono::{DateTime, Utc};

use crate::error::{Result, ZdwhError};

/// Parse an ISO-8601 / RFC 3339 timestamp carrying a UTC offset.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ZdwhError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}
