//! Combining per-file tables into one dataset.
//!
//! The fast path stacks every table along the time axis, which needs all of
//! them to carry the same variables with the same types. When they don't,
//! tables are folded in one at a time: stacked where the pair is compatible,
//! otherwise merged on time with the newer table's values winning. Tables
//! that survive neither are counted and left out.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

use tracing::{debug, info, warn};

use crate::{
    error::Result,
    table::{Column, DataType, NormalizedTable, Schema, TypeMismatch},
    Error,
};

/// The merged result and what was left out of it.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedDataset {
    pub table: NormalizedTable,
    /// Tables rejected by both merge strategies.
    pub failed_tables: usize,
    /// Inputs that were missing because their download or decode failed.
    pub skipped_inputs: usize,
}

/// Why two tables could not be combined.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeFailure {
    /// Variable present in one table only; stacking is impossible.
    SchemaMismatch { variable: String },
    /// Variable present in both with different types.
    TypeConflict {
        variable: String,
        left: DataType,
        right: DataType,
    },
}

impl From<TypeMismatch> for MergeFailure {
    fn from(m: TypeMismatch) -> Self {
        MergeFailure::TypeConflict {
            variable: m.variable,
            left: m.left,
            right: m.right,
        }
    }
}

impl fmt::Display for MergeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeFailure::SchemaMismatch { variable } => {
                write!(f, "variable `{}` is not in every table", variable)
            }
            MergeFailure::TypeConflict {
                variable,
                left,
                right,
            } => write!(f, "variable `{}` is {:?} in one table and {:?} in another", variable, left, right),
        }
    }
}

pub fn merge(tables: Vec<Option<NormalizedTable>>) -> Result<MergedDataset> {
    let total = tables.len();
    let frames: Vec<NormalizedTable> = tables.into_iter().flatten().collect();
    let skipped_inputs = total - frames.len();
    if skipped_inputs > 0 {
        warn!(skipped = skipped_inputs, total, "some result files could not be used");
    }

    if frames.is_empty() {
        return Err(Error::AllEmpty);
    }

    if frames.len() == 1 {
        let mut table = frames.into_iter().next().ok_or(Error::AllEmpty)?;
        table.sort_by_time();
        return Ok(MergedDataset {
            table,
            failed_tables: 0,
            skipped_inputs,
        });
    }

    let (mut table, failed_tables) = match concat_all(&frames) {
        Ok(table) => (table, 0),
        Err(reason) => {
            debug!(%reason, "bulk concatenation not possible, merging pairwise");
            let mut frames = frames;
            let rest = frames.split_off(1);
            merge_pairwise(frames.remove(0), rest)
        }
    };
    if failed_tables > 0 {
        warn!(failed = failed_tables, "tables failed to merge");
    }

    table.sort_by_time();
    table.dedup_time();
    info!(rows = table.len(), variables = table.columns().len(), "merged dataset");

    Ok(MergedDataset {
        table,
        failed_tables,
        skipped_inputs,
    })
}

/// Checks that `right` can be stacked under `left`.
pub fn check_concat(left: &Schema, right: &Schema) -> std::result::Result<(), MergeFailure> {
    check_types(left, right)?;
    if let Some(variable) = left
        .keys()
        .find(|k| !right.contains_key(*k))
        .or_else(|| right.keys().find(|k| !left.contains_key(*k)))
    {
        return Err(MergeFailure::SchemaMismatch {
            variable: variable.clone(),
        });
    }
    Ok(())
}

fn check_types(left: &Schema, right: &Schema) -> std::result::Result<(), MergeFailure> {
    for (variable, &l) in left {
        if let Some(&r) = right.get(variable) {
            if l != r {
                return Err(MergeFailure::TypeConflict {
                    variable: variable.clone(),
                    left: l,
                    right: r,
                });
            }
        }
    }
    Ok(())
}

fn concat_all(frames: &[NormalizedTable]) -> std::result::Result<NormalizedTable, MergeFailure> {
    let schema = frames[0].schema();
    for frame in &frames[1..] {
        check_concat(&schema, &frame.schema())?;
    }

    let mut out = frames[0].clone();
    for frame in &frames[1..] {
        out.append(frame)?;
    }
    Ok(out)
}

/// Folds `rest` into `data` one table at a time, counting failures.
fn merge_pairwise(mut data: NormalizedTable, rest: Vec<NormalizedTable>) -> (NormalizedTable, usize) {
    let mut failed = 0;
    for frame in rest {
        let combined = check_concat(&data.schema(), &frame.schema())
            .and_then(|_| {
                let mut stacked = data.clone();
                stacked.append(&frame)?;
                Ok(stacked)
            })
            .or_else(|_| merge_override(&data, &frame));

        match combined {
            Ok(table) => data = table,
            Err(reason) => {
                warn!(%reason, rows = frame.len(), "dropping table");
                failed += 1;
            }
        }
    }

    (data, failed)
}

/// Outer-joins two tables on time. Where `new` has a value it wins.
pub fn merge_override(
    base: &NormalizedTable,
    new: &NormalizedTable,
) -> std::result::Result<NormalizedTable, MergeFailure> {
    check_types(&base.schema(), &new.schema())?;

    let mut time: Vec<f64> = base.time().iter().chain(new.time()).copied().collect();
    time.sort_by(f64::total_cmp);
    time.dedup();

    let base_rows = row_lookup(base.time(), &time);
    let new_rows = row_lookup(new.time(), &time);

    let names: BTreeSet<&String> = base.columns().keys().chain(new.columns().keys()).collect();
    let mut columns = std::collections::BTreeMap::new();
    for name in names {
        let column = match (base.column(name), new.column(name)) {
            (Some(b), None) => b.gather(&base_rows),
            (None, Some(n)) => n.gather(&new_rows),
            (Some(b), Some(n)) => overlay(name, b, n, &base_rows, &new_rows)?,
            (None, None) => continue,
        };
        columns.insert(name.clone(), column);
    }

    NormalizedTable::new(time, columns).map_err(|_| MergeFailure::SchemaMismatch {
        variable: "time".to_string(),
    })
}

/// Values of `new` where present, falling back to `base`.
fn overlay(
    variable: &str,
    base: &Column,
    new: &Column,
    base_rows: &[Option<usize>],
    new_rows: &[Option<usize>],
) -> std::result::Result<Column, MergeFailure> {
    let offset = base.len();
    let mut stacked = base.clone();
    stacked
        .append(new)
        .map_err(|right| MergeFailure::TypeConflict {
            variable: variable.to_string(),
            left: base.data_type(),
            right,
        })?;

    let picks: Vec<Option<usize>> = base_rows
        .iter()
        .zip(new_rows)
        .map(|(&b, &n)| match n {
            Some(n) if !new.is_null(n) => Some(offset + n),
            _ => b,
        })
        .collect();

    Ok(stacked.gather(&picks))
}

/// For every time in `axis`, the first row of `times` holding it.
fn row_lookup(times: &[f64], axis: &[f64]) -> Vec<Option<usize>> {
    let mut first: HashMap<u64, usize> = HashMap::with_capacity(times.len());
    for (row, t) in times.iter().enumerate() {
        first.entry(time_key(*t)).or_insert(row);
    }
    axis.iter().map(|t| first.get(&time_key(*t)).copied()).collect()
}

fn time_key(t: f64) -> u64 {
    // 0.0 and -0.0 compare equal but differ in bits.
    if t == 0.0 {
        0
    } else {
        t.to_bits()
    }
}

// -- Tests -------------------------------------------------------------------
