//! Time-indexed tables decoded from result files.

use std::collections::BTreeMap;

use crate::{error::Result, Error};

/// Name of the variable re-based into the time axis.
pub const TIME: &str = "time";

/// Bookkeeping variables with no scientific value downstream.
pub const BOOKKEEPING: [&str; 5] = [
    "obs",
    "id",
    "provenance",
    "driver_timestamp",
    "ingestion_timestamp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Float64,
    Int64,
    Utf8,
}

/// One variable's values, aligned to a time axis. `None` is missing.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float64(Vec<Option<f64>>),
    Int64(Vec<Option<i64>>),
    Utf8(Vec<Option<String>>),
}

impl Column {
    pub fn data_type(&self) -> DataType {
        match self {
            Column::Float64(_) => DataType::Float64,
            Column::Int64(_) => DataType::Int64,
            Column::Utf8(_) => DataType::Utf8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Float64(v) => v.len(),
            Column::Int64(v) => v.len(),
            Column::Utf8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn nulls(data_type: DataType, len: usize) -> Self {
        match data_type {
            DataType::Float64 => Column::Float64(vec![None; len]),
            DataType::Int64 => Column::Int64(vec![None; len]),
            DataType::Utf8 => Column::Utf8(vec![None; len]),
        }
    }

    /// Gathers rows by index; a `None` index produces a missing value.
    pub fn gather(&self, indices: &[Option<usize>]) -> Self {
        fn pick<T: Clone>(values: &[Option<T>], indices: &[Option<usize>]) -> Vec<Option<T>> {
            indices
                .iter()
                .map(|i| i.and_then(|i| values[i].clone()))
                .collect()
        }

        match self {
            Column::Float64(v) => Column::Float64(pick(v, indices)),
            Column::Int64(v) => Column::Int64(pick(v, indices)),
            Column::Utf8(v) => Column::Utf8(pick(v, indices)),
        }
    }

    pub fn take(&self, indices: &[usize]) -> Self {
        let indices: Vec<Option<usize>> = indices.iter().copied().map(Some).collect();
        self.gather(&indices)
    }

    /// Appends `other`; fails without touching `self` if the types differ.
    pub fn append(&mut self, other: &Column) -> std::result::Result<(), DataType> {
        match (self, other) {
            (Column::Float64(a), Column::Float64(b)) => a.extend_from_slice(b),
            (Column::Int64(a), Column::Int64(b)) => a.extend_from_slice(b),
            (Column::Utf8(a), Column::Utf8(b)) => a.extend_from_slice(b),
            (_, other) => return Err(other.data_type()),
        }
        Ok(())
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            Column::Float64(v) => v[row].is_none(),
            Column::Int64(v) => v[row].is_none(),
            Column::Utf8(v) => v[row].is_none(),
        }
    }

    /// Widens integers so a column can serve as a time axis.
    fn to_f64(&self) -> Option<Vec<Option<f64>>> {
        match self {
            Column::Float64(v) => Some(v.clone()),
            Column::Int64(v) => Some(v.iter().map(|x| x.map(|x| x as f64)).collect()),
            Column::Utf8(_) => None,
        }
    }
}

pub type Schema = BTreeMap<String, DataType>;

/// A variable whose type differs between two tables.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMismatch {
    pub variable: String,
    pub left: DataType,
    pub right: DataType,
}

/// A file's variables as decoded, still on the file's own row dimension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: BTreeMap<String, Column>,
}

/// A single ascending time axis and the variables aligned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTable {
    time: Vec<f64>,
    columns: BTreeMap<String, Column>,
}

impl NormalizedTable {
    pub fn new(time: Vec<f64>, columns: BTreeMap<String, Column>) -> Result<Self> {
        if let Some((name, column)) = columns.iter().find(|(_, c)| c.len() != time.len()) {
            return Err(Error::Decode(format!(
                "variable `{}` has {} rows, time axis has {}",
                name,
                column.len(),
                time.len()
            )));
        }
        Ok(NormalizedTable { time, columns })
    }

    /// Re-bases `raw` onto its `time` variable, sorts by time and drops
    /// bookkeeping variables.
    pub fn from_raw(mut raw: RawTable) -> Result<Self> {
        let time = raw
            .columns
            .remove(TIME)
            .ok_or_else(|| Error::Decode("no `time` variable".to_string()))?;
        let time = time
            .to_f64()
            .ok_or_else(|| Error::Decode("`time` is not numeric".to_string()))?
            .into_iter()
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| Error::Decode("missing values in `time`".to_string()))?;

        for name in BOOKKEEPING {
            raw.columns.remove(name);
        }

        let mut table = NormalizedTable::new(time, raw.columns)?;
        table.sort_by_time();
        Ok(table)
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn columns(&self) -> &BTreeMap<String, Column> {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn schema(&self) -> Schema {
        self.columns
            .iter()
            .map(|(name, column)| (name.clone(), column.data_type()))
            .collect()
    }

    pub fn take(&self, indices: &[usize]) -> Self {
        NormalizedTable {
            time: indices.iter().map(|&i| self.time[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(name, column)| (name.clone(), column.take(indices)))
                .collect(),
        }
    }

    /// Stable sort, so equal times keep their relative order.
    pub fn sort_by_time(&mut self) {
        if self.time.windows(2).all(|w| w[0] <= w[1]) {
            return;
        }
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.time[a].total_cmp(&self.time[b]));
        *self = self.take(&order);
    }

    /// Keeps the first row of each run of equal times. Expects sorted input.
    pub fn dedup_time(&mut self) {
        let keep: Vec<usize> = (0..self.len())
            .filter(|&i| i == 0 || self.time[i] != self.time[i - 1])
            .collect();
        if keep.len() != self.len() {
            *self = self.take(&keep);
        }
    }

    /// Appends `other` row-wise. Callers check schemas first.
    pub(crate) fn append(&mut self, other: &NormalizedTable) -> std::result::Result<(), TypeMismatch> {
        let mut columns = self.columns.clone();
        for (name, column) in columns.iter_mut() {
            let left = column.data_type();
            let rows = match other.columns.get(name) {
                Some(rows) => column.append(rows),
                None => column.append(&Column::nulls(left, other.len())),
            };
            rows.map_err(|right| TypeMismatch {
                variable: name.clone(),
                left,
                right,
            })?;
        }
        self.columns = columns;
        self.time.extend_from_slice(&other.time);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn into_parts(self) -> (Vec<f64>, BTreeMap<String, Column>) {
        (self.time, self.columns)
    }
}

// -- Tests -------------------------------------------------------------------
