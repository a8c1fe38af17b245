//! Time-series data chunks.
//!
//! A chunk is a contiguous slice of a series starting at `offset` (a point
//! index into the series' [`TimeSeriesIndex`]). It is stored either as a flat
//! array of values or as a run-length encoding: parallel arrays of distinct
//! step values and step lengths whose lengths sum to the logical length.
//!
//! [`TimeSeriesIndex`]: crate::TimeSeriesIndex

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::timeseries::TimeSeriesDataType;

/// Size in bytes charged per step length in size estimates.
const STEP_LENGTH_SIZE: usize = 4;

/// A value type that can be carried by a [`DataChunk`].
pub trait ChunkValue: Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync {
    /// The series data type this value belongs to.
    const DATA_TYPE: TimeSeriesDataType;

    /// Approximate in-memory size of one value.
    fn estimated_size(&self) -> usize;

    /// Whether two consecutive values belong to the same run.
    fn same_run(&self, other: &Self) -> bool {
        self == other
    }
}

impl ChunkValue for f64 {
    const DATA_TYPE: TimeSeriesDataType = TimeSeriesDataType::Double;

    fn estimated_size(&self) -> usize {
        8
    }

    // Bitwise so that runs of NaN compress like any other value.
    fn same_run(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl ChunkValue for String {
    const DATA_TYPE: TimeSeriesDataType = TimeSeriesDataType::String;

    fn estimated_size(&self) -> usize {
        self.len()
    }
}

/// A slice of a time series, either flat or run-length encoded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DataChunk<T> {
    Uncompressed {
        offset: usize,
        values: Vec<T>,
    },
    Compressed {
        offset: usize,
        uncompressed_length: usize,
        step_values: Vec<T>,
        step_lengths: Vec<usize>,
    },
}

pub type DoubleDataChunk = DataChunk<f64>;
pub type StringDataChunk = DataChunk<String>;

impl<T: ChunkValue> DataChunk<T> {
    /// Build a flat chunk.
    pub fn uncompressed(offset: usize, values: Vec<T>) -> Self {
        Self::Uncompressed { offset, values }
    }

    /// Build a run-length encoded chunk, validating its shape.
    pub fn compressed(
        offset: usize,
        uncompressed_length: usize,
        step_values: Vec<T>,
        step_lengths: Vec<usize>,
    ) -> Result<Self, TypeError> {
        let chunk = Self::Compressed {
            offset,
            uncompressed_length,
            step_values,
            step_lengths,
        };
        chunk.validate()?;
        Ok(chunk)
    }

    pub fn offset(&self) -> usize {
        match self {
            Self::Uncompressed { offset, .. } | Self::Compressed { offset, .. } => *offset,
        }
    }

    /// Logical (uncompressed) number of points.
    pub fn length(&self) -> usize {
        match self {
            Self::Uncompressed { values, .. } => values.len(),
            Self::Compressed {
                uncompressed_length,
                ..
            } => *uncompressed_length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Compressed { .. })
    }

    pub fn data_type(&self) -> TimeSeriesDataType {
        T::DATA_TYPE
    }

    /// Check the run-length arrays are parallel and add up.
    pub fn validate(&self) -> Result<(), TypeError> {
        if let Self::Compressed {
            uncompressed_length,
            step_values,
            step_lengths,
            ..
        } = self
        {
            if step_values.len() != step_lengths.len() {
                return Err(TypeError::InvalidChunk(format!(
                    "{} step values but {} step lengths",
                    step_values.len(),
                    step_lengths.len()
                )));
            }
            if step_lengths.iter().any(|l| *l == 0) {
                return Err(TypeError::InvalidChunk("zero step length".into()));
            }
            let total: usize = step_lengths.iter().sum();
            if total != *uncompressed_length {
                return Err(TypeError::InvalidChunk(format!(
                    "step lengths sum to {total}, expected {uncompressed_length}"
                )));
            }
        }
        Ok(())
    }

    /// Approximate stored size, used to decide whether compression pays.
    pub fn estimated_size(&self) -> usize {
        match self {
            Self::Uncompressed { values, .. } => values.iter().map(T::estimated_size).sum(),
            Self::Compressed {
                step_values,
                step_lengths,
                ..
            } => {
                step_values.iter().map(T::estimated_size).sum::<usize>()
                    + step_lengths.len() * STEP_LENGTH_SIZE
            }
        }
    }

    /// The expanded values of this chunk.
    pub fn values(&self) -> Vec<T> {
        match self {
            Self::Uncompressed { values, .. } => values.clone(),
            Self::Compressed {
                uncompressed_length,
                step_values,
                step_lengths,
                ..
            } => {
                let mut out = Vec::with_capacity(*uncompressed_length);
                for (value, len) in step_values.iter().zip(step_lengths) {
                    out.extend(std::iter::repeat(value).take(*len).cloned());
                }
                out
            }
        }
    }

    /// Run-length encode this chunk. Already compressed chunks are cloned.
    pub fn compress(&self) -> Self {
        match self {
            Self::Compressed { .. } => self.clone(),
            Self::Uncompressed { offset, values } => {
                let mut step_values: Vec<T> = Vec::new();
                let mut step_lengths: Vec<usize> = Vec::new();
                for value in values {
                    match step_values.last() {
                        Some(last) if last.same_run(value) => {
                            if let Some(len) = step_lengths.last_mut() {
                                *len += 1;
                            }
                        }
                        _ => {
                            step_values.push(value.clone());
                            step_lengths.push(1);
                        }
                    }
                }
                Self::Compressed {
                    offset: *offset,
                    uncompressed_length: values.len(),
                    step_values,
                    step_lengths,
                }
            }
        }
    }

    /// Expand a run-length encoded chunk. Flat chunks are cloned.
    pub fn uncompress(&self) -> Self {
        match self {
            Self::Uncompressed { .. } => self.clone(),
            Self::Compressed { offset, .. } => Self::Uncompressed {
                offset: *offset,
                values: self.values(),
            },
        }
    }

    /// Compress only if the encoding is estimated to be smaller.
    pub fn try_compress(self) -> Self {
        if self.is_compressed() {
            return self;
        }
        let compressed = self.compress();
        if compressed.estimated_size() < self.estimated_size() {
            compressed
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn compressed_chunk_accessors() {
        let chunk = DoubleDataChunk::compressed(2, 2, vec![1.0, 2.0], vec![1, 1]).unwrap();
        assert_eq!(chunk.offset(), 2);
        assert_eq!(chunk.length(), 2);
        assert!(chunk.is_compressed());
        assert_eq!(chunk.values(), vec![1.0, 2.0]);
    }

    #[test]
    fn compressed_rejects_mismatched_arrays() {
        let err = DoubleDataChunk::compressed(0, 2, vec![1.0], vec![1, 1]).unwrap_err();
        assert!(matches!(err, TypeError::InvalidChunk(_)));
    }

    #[test]
    fn compressed_rejects_wrong_total() {
        assert!(DoubleDataChunk::compressed(0, 5, vec![1.0], vec![3]).is_err());
        assert!(DoubleDataChunk::compressed(0, 0, vec![1.0], vec![0]).is_err());
    }

    #[test]
    fn compress_collapses_runs() {
        let chunk = DoubleDataChunk::uncompressed(0, vec![1.0, 1.0, 1.0, 2.0, 2.0, 3.0]);
        match chunk.compress() {
            DataChunk::Compressed {
                uncompressed_length,
                step_values,
                step_lengths,
                ..
            } => {
                assert_eq!(uncompressed_length, 6);
                assert_eq!(step_values, vec![1.0, 2.0, 3.0]);
                assert_eq!(step_lengths, vec![3, 2, 1]);
            }
            other => panic!("expected compressed chunk, got {other:?}"),
        }
    }

    #[test]
    fn nan_runs_compress() {
        let chunk = DoubleDataChunk::uncompressed(0, vec![f64::NAN; 4]).compress();
        match chunk {
            DataChunk::Compressed { step_lengths, .. } => assert_eq!(step_lengths, vec![4]),
            other => panic!("expected compressed chunk, got {other:?}"),
        }
    }

    #[test]
    fn try_compress_keeps_smaller_encoding() {
        let repetitive = StringDataChunk::uncompressed(0, vec!["aaaa".to_string(); 10]);
        assert!(repetitive.try_compress().is_compressed());

        let distinct = DoubleDataChunk::uncompressed(0, vec![1.0, 2.0, 3.0]);
        assert!(!distinct.try_compress().is_compressed());
    }

    #[test]
    fn empty_chunk_is_empty() {
        assert!(DoubleDataChunk::uncompressed(3, vec![]).is_empty());
        assert!(DoubleDataChunk::uncompressed(3, vec![]).compress().is_empty());
    }

    #[test]
    fn data_type_follows_value_type() {
        assert_eq!(
            DoubleDataChunk::uncompressed(0, vec![]).data_type(),
            TimeSeriesDataType::Double
        );
        assert_eq!(
            StringDataChunk::uncompressed(0, vec![]).data_type(),
            TimeSeriesDataType::String
        );
    }

    proptest! {
        #[test]
        fn compress_preserves_values(
            values in proptest::collection::vec(0u8..4, 0..64),
            offset in 0usize..100,
        ) {
            let values: Vec<f64> = values.into_iter().map(f64::from).collect();
            let chunk = DoubleDataChunk::uncompressed(offset, values.clone());
            let compressed = chunk.compress();
            prop_assert!(compressed.validate().is_ok());
            prop_assert_eq!(compressed.offset(), offset);
            prop_assert_eq!(compressed.length(), values.len());
            prop_assert_eq!(compressed.uncompress(), chunk);
        }
    }
}
