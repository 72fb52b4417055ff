//! Turning downloaded bytes into tables.
//!
//! The service's native format is netCDF, which is decoded outside this crate
//! by plugging a [`Decoder`] in. Columnar result files are decoded here with
//! arrow/parquet.

use arrow::{
    array::{Array, ArrayRef, AsArray},
    compute::cast,
    datatypes::{DataType as ArrowType, Float64Type, Int64Type, TimeUnit},
};
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::debug;

use crate::{
    error::Result,
    table::{Column, RawTable},
};

/// Decodes one result file into its variables.
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: Bytes) -> Result<RawTable>;
}

pub struct ParquetDecoder;

impl Decoder for ParquetDecoder {
    fn decode(&self, bytes: Bytes) -> Result<RawTable> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
        let schema = builder.schema().clone();
        let reader = builder.build()?;

        let mut raw = RawTable::default();
        for batch in reader {
            let batch = batch?;
            for (field, array) in schema.fields().iter().zip(batch.columns()) {
                let Some(column) = column_from_array(array)? else {
                    debug!(name = %field.name(), data_type = %field.data_type(), "skipping unsupported variable");
                    continue;
                };
                match raw.columns.get_mut(field.name()) {
                    Some(existing) => existing.append(&column).map_err(|_| {
                        crate::Error::Decode(format!("`{}` changed type between batches", field.name()))
                    })?,
                    None => {
                        raw.columns.insert(field.name().clone(), column);
                    }
                }
            }
        }

        Ok(raw)
    }
}

fn column_from_array(array: &ArrayRef) -> Result<Option<Column>> {
    let column = match array.data_type() {
        ArrowType::Float16 | ArrowType::Float32 | ArrowType::Float64 => {
            let floats = cast(array, &ArrowType::Float64)?;
            Column::Float64(floats.as_primitive::<Float64Type>().iter().collect())
        }
        ArrowType::Int8
        | ArrowType::Int16
        | ArrowType::Int32
        | ArrowType::Int64
        | ArrowType::UInt8
        | ArrowType::UInt16
        | ArrowType::UInt32
        | ArrowType::UInt64 => {
            let ints = cast(array, &ArrowType::Int64)?;
            Column::Int64(ints.as_primitive::<Int64Type>().iter().collect())
        }
        ArrowType::Timestamp(unit, _) => {
            let per_second = match unit {
                TimeUnit::Second => 1.0,
                TimeUnit::Millisecond => 1e3,
                TimeUnit::Microsecond => 1e6,
                TimeUnit::Nanosecond => 1e9,
            };
            let ticks = cast(array, &ArrowType::Int64)?;
            Column::Float64(
                ticks
                    .as_primitive::<Int64Type>()
                    .iter()
                    .map(|t| t.map(|t| t as f64 / per_second))
                    .collect(),
            )
        }
        ArrowType::Utf8 | ArrowType::LargeUtf8 => {
            let strings = cast(array, &ArrowType::Utf8)?;
            Column::Utf8(
                strings
                    .as_string::<i32>()
                    .iter()
                    .map(|s| s.map(str::to_string))
                    .collect(),
            )
        }
        _ => return Ok(None),
    };
    debug_assert_eq!(column.len(), array.len());

    Ok(Some(column))
}

// -- Tests -------------------------------------------------------------------
