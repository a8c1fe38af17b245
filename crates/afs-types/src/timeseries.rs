use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Value type carried by a time series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeSeriesDataType {
    Double,
    String,
}

impl fmt::Display for TimeSeriesDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Double => write!(f, "DOUBLE"),
            Self::String => write!(f, "STRING"),
        }
    }
}

/// Regular time index: points from `start_time` to `end_time` inclusive,
/// every `spacing` milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSeriesIndex {
    pub start_time: i64,
    pub end_time: i64,
    pub spacing: i64,
}

impl TimeSeriesIndex {
    /// Build a validated regular index.
    pub fn new(start_time: i64, end_time: i64, spacing: i64) -> Result<Self, TypeError> {
        if spacing <= 0 {
            return Err(TypeError::InvalidIndex(format!(
                "spacing must be positive, got {spacing}"
            )));
        }
        if end_time < start_time {
            return Err(TypeError::InvalidIndex(format!(
                "end time {end_time} is before start time {start_time}"
            )));
        }
        if (end_time - start_time) % spacing != 0 {
            return Err(TypeError::InvalidIndex(format!(
                "interval [{start_time}, {end_time}] is not a multiple of spacing {spacing}"
            )));
        }
        Ok(Self {
            start_time,
            end_time,
            spacing,
        })
    }

    /// Number of points described by the index.
    pub fn point_count(&self) -> usize {
        ((self.end_time - self.start_time) / self.spacing) as usize + 1
    }

    /// Timestamp of the point at `offset`, if within the index.
    pub fn time_at(&self, offset: usize) -> Option<i64> {
        (offset < self.point_count()).then(|| self.start_time + offset as i64 * self.spacing)
    }
}

/// Metadata of a time series, created once per `(node, name)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesMetadata {
    pub name: String,
    pub data_type: TimeSeriesDataType,
    pub tags: BTreeMap<String, String>,
    pub index: TimeSeriesIndex,
}

impl TimeSeriesMetadata {
    pub fn new(
        name: impl Into<String>,
        data_type: TimeSeriesDataType,
        tags: BTreeMap<String, String>,
        index: TimeSeriesIndex,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            tags,
            index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_point_count() {
        let index = TimeSeriesIndex::new(0, 30, 10).unwrap();
        assert_eq!(index.point_count(), 4);
        assert_eq!(index.time_at(3), Some(30));
        assert_eq!(index.time_at(4), None);
    }

    #[test]
    fn single_point_index() {
        let index = TimeSeriesIndex::new(100, 100, 5).unwrap();
        assert_eq!(index.point_count(), 1);
    }

    #[test]
    fn index_rejects_bad_spacing() {
        assert!(TimeSeriesIndex::new(0, 10, 0).is_err());
        assert!(TimeSeriesIndex::new(0, 10, -1).is_err());
        assert!(TimeSeriesIndex::new(0, 10, 3).is_err());
    }

    #[test]
    fn index_rejects_reversed_interval() {
        let err = TimeSeriesIndex::new(10, 0, 1).unwrap_err();
        assert!(matches!(err, TypeError::InvalidIndex(_)));
    }

    #[test]
    fn data_type_display() {
        assert_eq!(TimeSeriesDataType::Double.to_string(), "DOUBLE");
        assert_eq!(TimeSeriesDataType::String.to_string(), "STRING");
    }
}
