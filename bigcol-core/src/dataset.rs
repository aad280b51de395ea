//! Read-only joins of equal-length columns.
//!
//! A [`Dataset`] presents several columns of one [`File`] as a single record
//! sequence. Rows are materialized as Arrow [`RecordBatch`]es whose schema is
//! the ordered list of member `(name, dtype)` pairs. Membership and sizes are
//! captured when the dataset is built; later changes to the file are not seen.

use std::{
    ops::{Range, RangeFrom, RangeFull, RangeTo},
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{
    array::ArrayRef,
    datatypes::{Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use indexmap::IndexMap;

use crate::{
    column::Column,
    error::{BigColError, BigColResult},
    file::File,
    layout::NAME_SEPARATOR,
    range::RowRange,
};

/// One or several member names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameSelector {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for NameSelector {
    fn from(value: &str) -> Self {
        NameSelector::One(value.to_string())
    }
}

impl From<String> for NameSelector {
    fn from(value: String) -> Self {
        NameSelector::One(value)
    }
}

impl From<Vec<&str>> for NameSelector {
    fn from(value: Vec<&str>) -> Self {
        NameSelector::Many(value.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for NameSelector {
    fn from(value: Vec<String>) -> Self {
        NameSelector::Many(value)
    }
}

/// Argument of [`Dataset::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Names(NameSelector),
    Index(usize),
    Rows(RowRange),
    NamesRows(NameSelector, RowRange),
}

impl From<usize> for Selector {
    fn from(value: usize) -> Self {
        Selector::Index(value)
    }
}

macro_rules! impl_selector_from {
    (names: $($name:ty),+) => {
        $(
            impl From<$name> for Selector {
                fn from(value: $name) -> Self {
                    Selector::Names(value.into())
                }
            }
        )+
    };
    (rows: $($range:ty),+) => {
        $(
            impl From<$range> for Selector {
                fn from(value: $range) -> Self {
                    Selector::Rows(value.into())
                }
            }
        )+
    };
    (pair: $name:ty => $($range:ty),+) => {
        $(
            impl From<($name, $range)> for Selector {
                fn from((names, rows): ($name, $range)) -> Self {
                    Selector::NamesRows(names.into(), rows.into())
                }
            }

            impl From<($range, $name)> for Selector {
                fn from((rows, names): ($range, $name)) -> Self {
                    Selector::NamesRows(names.into(), rows.into())
                }
            }
        )+
    };
}

impl_selector_from!(names: &str, String, Vec<&str>, Vec<String>, NameSelector);
impl_selector_from!(rows: Range<usize>, RangeFrom<usize>, RangeTo<usize>, RangeFull, RowRange);
impl_selector_from!(pair: &str => Range<usize>, RangeFrom<usize>, RangeTo<usize>, RangeFull, RowRange);
impl_selector_from!(pair: String => Range<usize>, RangeFrom<usize>, RangeTo<usize>, RangeFull, RowRange);
impl_selector_from!(pair: Vec<&str> => Range<usize>, RangeFrom<usize>, RangeTo<usize>, RangeFull, RowRange);
impl_selector_from!(pair: Vec<String> => Range<usize>, RangeFrom<usize>, RangeTo<usize>, RangeFull, RowRange);

/// Result of [`Dataset::get`].
#[derive(Debug, Clone)]
pub enum DatasetItem {
    /// A single member column.
    Column(Arc<Column>),
    /// A narrowed dataset.
    Dataset(Dataset),
    /// One composite record as a single-row batch.
    Record(RecordBatch),
    /// A row range of a single column.
    Array(ArrayRef),
    /// A row range of several columns.
    Batch(RecordBatch),
}

impl DatasetItem {
    pub fn into_column(self) -> Option<Arc<Column>> {
        match self {
            DatasetItem::Column(column) => Some(column),
            _ => None,
        }
    }

    pub fn into_dataset(self) -> Option<Dataset> {
        match self {
            DatasetItem::Dataset(dataset) => Some(dataset),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<ArrayRef> {
        match self {
            DatasetItem::Array(array) => Some(array),
            _ => None,
        }
    }

    /// Returns the batch of a `Record` or `Batch` item.
    pub fn into_batch(self) -> Option<RecordBatch> {
        match self {
            DatasetItem::Record(batch) | DatasetItem::Batch(batch) => Some(batch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    path: PathBuf,
    members: IndexMap<String, Arc<Column>>,
    size: usize,
    schema: SchemaRef,
}

impl Dataset {
    /// Joins `blocks` of `file` (all cached blocks when `None`).
    pub fn new(file: &File, blocks: Option<Vec<String>>) -> BigColResult<Self> {
        let names = blocks.unwrap_or_else(|| file.blocks().to_vec());
        if names.is_empty() {
            return Err(BigColError::Configuration(
                "a dataset needs at least one column".to_string(),
            ));
        }

        let mut members = IndexMap::with_capacity(names.len());
        for name in names {
            if name.contains(NAME_SEPARATOR) {
                return Err(BigColError::Configuration(format!(
                    "'{name}' lives in a subfile and cannot be a dataset member"
                )));
            }
            if members.contains_key(&name) {
                return Err(BigColError::Configuration(format!(
                    "column '{name}' is listed twice"
                )));
            }
            let column = Arc::new(file.open_column(&name)?);
            members.insert(name, column);
        }

        Self::from_members(file.path(), members)
    }

    fn from_members(path: &Path, members: IndexMap<String, Arc<Column>>) -> BigColResult<Self> {
        let mut iter = members.iter();
        let Some((first_name, first)) = iter.next() else {
            return Err(BigColError::Configuration(
                "a dataset needs at least one column".to_string(),
            ));
        };
        let size = first.size();
        for (name, column) in iter {
            if column.size() != size {
                return Err(BigColError::LengthMismatch {
                    expected_name: first_name.clone(),
                    expected: size,
                    name: name.clone(),
                    actual: column.size(),
                });
            }
        }

        let fields: Vec<Field> = members
            .iter()
            .map(|(name, column)| Field::new(name, column.dtype().arrow_type(), false))
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            members,
            size,
            schema: Arc::new(Schema::new(fields)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Member names in declared order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// Record schema: one field per member, in declared order.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn column(&self, name: &str) -> BigColResult<Arc<Column>> {
        self.members
            .get(name)
            .cloned()
            .ok_or_else(|| BigColError::NotFound {
                name: name.to_string(),
                path: self.path.clone(),
            })
    }

    /// Dataset restricted to `names`, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> BigColResult<Dataset> {
        let mut members = IndexMap::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            if members.contains_key(name) {
                return Err(BigColError::Configuration(format!(
                    "column '{name}' is listed twice"
                )));
            }
            members.insert(name.to_string(), self.column(name)?);
        }
        Self::from_members(&self.path, members)
    }

    fn range_error(&self, start: usize, stop: usize) -> BigColError {
        BigColError::Range {
            name: self.names().collect::<Vec<_>>().join(","),
            start,
            stop,
            size: self.size,
        }
    }

    /// Materializes the records in `rows`.
    pub fn slice(&self, rows: impl Into<RowRange>) -> BigColResult<RecordBatch> {
        let range = rows
            .into()
            .resolve(self.size)
            .map_err(|(start, stop)| self.range_error(start, stop))?;

        let columns = self
            .members
            .values()
            .map(|column| column.read(range.clone()))
            .collect::<BigColResult<Vec<_>>>()?;
        Ok(RecordBatch::try_new(self.schema.clone(), columns)?)
    }

    /// Record `index` as a single-row batch.
    pub fn record(&self, index: usize) -> BigColResult<RecordBatch> {
        if index >= self.size {
            return Err(self.range_error(index, index.saturating_add(1)));
        }
        self.slice(index..index + 1)
    }

    /// Selection in the style of indexing: by name(s), index, row range, or a
    /// name/row-range pair in either order.
    pub fn get(&self, selector: impl Into<Selector>) -> BigColResult<DatasetItem> {
        match selector.into() {
            Selector::Names(NameSelector::One(name)) => self.column(&name).map(DatasetItem::Column),
            Selector::Names(NameSelector::Many(names)) => {
                self.select(&names).map(DatasetItem::Dataset)
            }
            Selector::Index(index) => self.record(index).map(DatasetItem::Record),
            Selector::Rows(rows) => self.slice(rows).map(DatasetItem::Batch),
            Selector::NamesRows(NameSelector::One(name), rows) => {
                let column = self.column(&name)?;
                column.read(rows).map(DatasetItem::Array)
            }
            Selector::NamesRows(NameSelector::Many(names), rows) => {
                self.select(&names)?.slice(rows).map(DatasetItem::Batch)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use arrow::{
        array::{AsArray, Float64Array, Int32Array},
        datatypes::{Float64Type, Int32Type},
    };

    use super::*;

    fn sample_file(dir: &Path) -> File {
        let mut file = File::create(dir).unwrap();
        file.create_from_array(
            "x",
            &Float64Array::from_iter_values((0..6).map(|i| i as f64 * 0.5)),
            Some(2),
            None,
        )
        .unwrap();
        file.create_from_array("label", &Int32Array::from_iter_values(0..6), None, None)
            .unwrap();
        file
    }

    #[test]
    fn defaults_to_all_blocks_in_sorted_order() {
        let tmp = tempfile::tempdir().unwrap();
        let file = sample_file(tmp.path());
        let dataset = Dataset::new(&file, None).unwrap();
        assert_eq!(dataset.names().collect::<Vec<_>>(), vec!["label", "x"]);
        assert_eq!(dataset.len(), 6);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut file = sample_file(tmp.path());
        file.create_from_array("short", &Int32Array::from(vec![1, 2]), None, None)
            .unwrap();
        let err = Dataset::new(&file, None).unwrap_err();
        assert!(matches!(
            err,
            BigColError::LengthMismatch {
                expected: 6,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn nested_members_are_a_configuration_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut file = sample_file(tmp.path());
        file.subfile("group")
            .unwrap()
            .create_from_array("y", &Int32Array::from_iter_values(0..6), None, None)
            .unwrap();
        file.refresh().unwrap();

        let err = Dataset::new(&file, None).unwrap_err();
        assert!(matches!(err, BigColError::Configuration(_)));
    }

    #[test]
    fn selectors_cover_names_indices_and_ranges() {
        let tmp = tempfile::tempdir().unwrap();
        let file = sample_file(tmp.path());
        let dataset = Dataset::new(&file, Some(vec!["x".into(), "label".into()])).unwrap();

        let column = dataset.get("label").unwrap().into_column().unwrap();
        assert_eq!(column.name(), "label");

        let narrowed = dataset.get(vec!["label"]).unwrap().into_dataset().unwrap();
        assert_eq!(narrowed.names().collect::<Vec<_>>(), vec!["label"]);

        let record = dataset.get(3usize).unwrap().into_batch().unwrap();
        assert_eq!(record.num_rows(), 1);
        assert_eq!(record.column(0).as_primitive::<Float64Type>().value(0), 1.5);
        assert_eq!(record.column(1).as_primitive::<Int32Type>().value(0), 3);

        let batch = dataset.get(2usize..4).unwrap().into_batch().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(0).name(), "x");

        let forward = dataset.get(("x", 1usize..3)).unwrap().into_array().unwrap();
        let backward = dataset.get((1usize..3, "x")).unwrap().into_array().unwrap();
        assert_eq!(forward.as_primitive::<Float64Type>().values(), &[0.5, 1.0]);
        assert_eq!(&forward, &backward);

        let pair = dataset
            .get((vec!["label"], 4usize..))
            .unwrap()
            .into_batch()
            .unwrap();
        assert_eq!(pair.num_columns(), 1);
        assert_eq!(pair.column(0).as_primitive::<Int32Type>().values(), &[4, 5]);
    }

    #[test]
    fn selecting_a_name_twice_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let file = sample_file(tmp.path());
        let dataset = Dataset::new(&file, None).unwrap();

        assert!(matches!(
            dataset.select(&["x", "label", "x"]),
            Err(BigColError::Configuration(_))
        ));
        assert!(matches!(
            dataset.get((vec!["label", "label"], 0usize..2)),
            Err(BigColError::Configuration(_))
        ));
        assert_eq!(dataset.select(&["x"]).unwrap().names().count(), 1);
    }

    #[test]
    fn out_of_range_access_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let file = sample_file(tmp.path());
        let dataset = Dataset::new(&file, None).unwrap();
        assert!(matches!(dataset.record(6), Err(BigColError::Range { .. })));
        assert!(matches!(dataset.slice(4..9), Err(BigColError::Range { .. })));
        assert!(matches!(dataset.get("nope"), Err(BigColError::NotFound { .. })));
    }

    #[test]
    fn dataset_is_a_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let mut file = sample_file(tmp.path());
        let dataset = Dataset::new(&file, None).unwrap();
        file.create_from_array("later", &Int32Array::from_iter_values(0..6), None, None)
            .unwrap();
        assert_eq!(dataset.schema().fields().len(), 2);
    }
}
