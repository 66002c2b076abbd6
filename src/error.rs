use thiserror::Error;

/// Raised where bad data enters the model: catalog songs, market quotes,
/// venue mappings, model configs and historical events.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{entity}: field `{field}` must not be empty")]
    EmptyField { entity: String, field: &'static str },

    #[error("{entity}: field `{field}` = {value} outside [{min}, {max}]")]
    OutOfRange {
        entity: String,
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error(
        "song {song_id}: featuredArtist must be set exactly when isSolo is false (isSolo = {is_solo})"
    )]
    FeaturedArtistMismatch { song_id: String, is_solo: bool },

    #[error("duplicate song id `{0}` in catalog")]
    DuplicateSongId(String),

    #[error("duplicate venue mapping key `{0}`")]
    DuplicateMapping(String),

    #[error("invalid model config {version}: {reason}")]
    InvalidConfig { version: String, reason: String },
}

/// Raised by the backtest harness before any scoring happens.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("malformed historical event record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("historical event {event_id} rejected: {source}")]
    InvalidEvent {
        event_id: String,
        #[source]
        source: ValidationError,
    },

    #[error("synthetic catalog for event {event_id} is invalid: {source}")]
    SyntheticCatalog {
        event_id: String,
        #[source]
        source: ValidationError,
    },
}

pub(crate) fn check_unit_interval(
    entity: &str,
    field: &'static str,
    value: f64,
) -> Result<(), ValidationError> {
    check_range(entity, field, value, 0.0, 1.0)
}

pub(crate) fn check_range(
    entity: &str,
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ValidationError> {
    // NaN fails both comparisons, so it is rejected here too.
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            entity: entity.to_string(),
            field,
            value,
            min,
            max,
        })
    }
}

pub(crate) const MIN_YEAR: i32 = 1900;
pub(crate) const MAX_YEAR: i32 = 2200;

pub(crate) fn check_year(
    entity: &str,
    field: &'static str,
    year: i32,
) -> Result<(), ValidationError> {
    check_range(
        entity,
        field,
        f64::from(year),
        f64::from(MIN_YEAR),
        f64::from(MAX_YEAR),
    )
}

pub(crate) fn check_not_empty(
    entity: &str,
    field: &'static str,
    value: &str,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::EmptyField {
            entity: entity.to_string(),
            field,
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_interval_rejects_nan_and_outliers() {
        assert!(check_unit_interval("s", "energyScore", 0.0).is_ok());
        assert!(check_unit_interval("s", "energyScore", 1.0).is_ok());
        assert!(check_unit_interval("s", "energyScore", 1.01).is_err());
        assert!(check_unit_interval("s", "energyScore", -0.01).is_err());
        assert!(check_unit_interval("s", "energyScore", f64::NAN).is_err());
    }

    #[test]
    fn year_window_is_inclusive() {
        assert!(check_year("e", "year", MIN_YEAR).is_ok());
        assert!(check_year("e", "year", MAX_YEAR).is_ok());
        assert!(check_year("e", "year", MIN_YEAR - 1).is_err());
        assert!(check_year("e", "year", i32::MIN).is_err());
        assert!(check_year("e", "year", i32::MAX).is_err());
    }

    #[test]
    fn out_of_range_message_names_field() {
        let err = check_unit_interval("song x", "midpoint", 1.5).unwrap_err();
        assert!(err.to_string().contains("midpoint"));
        assert!(err.to_string().contains("song x"));
    }
}
