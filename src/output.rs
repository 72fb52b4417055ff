//! Save a merged dataset to a parquet file.

use std::{fs::File, path::Path, sync::Arc};

use arrow::{
    array::{ArrayRef, Float64Array, Int64Array, StringArray},
    datatypes::{DataType as ArrowType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{
    arrow::ArrowWriter,
    basic::{Compression, ZstdLevel},
    file::properties::WriterProperties,
};

use crate::{
    error::Result,
    pipeline::MergedDataset,
    table::{Column, TIME},
};

/// Writes the merged table. The merge counts are not stored.
pub fn save_dataset(dataset: &MergedDataset, file_path: &Path) -> Result<()> {
    let table = &dataset.table;
    let mut fields = vec![Field::new(TIME, ArrowType::Float64, false)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(Float64Array::from(table.time().to_vec()))];

    for (name, column) in table.columns() {
        let (data_type, array): (ArrowType, ArrayRef) = match column {
            Column::Float64(v) => (ArrowType::Float64, Arc::new(Float64Array::from(v.clone()))),
            Column::Int64(v) => (ArrowType::Int64, Arc::new(Int64Array::from(v.clone()))),
            Column::Utf8(v) => (ArrowType::Utf8, Arc::new(StringArray::from(v.clone()))),
        };
        fields.push(Field::new(name, data_type, true));
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .set_dictionary_enabled(true)
        .build();

    let file = File::create(file_path)?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

// -- Tests -------------------------------------------------------------------
