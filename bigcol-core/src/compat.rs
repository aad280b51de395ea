//! Constructors kept under their historical names.
//!
//! Each one logs a deprecation warning and forwards to the current type.

use std::path::Path;

use crate::{column::Column, dataset::Dataset, error::BigColResult, file::File};

/// Former name of [`File::open`] / [`File::create`].
#[deprecated(note = "use `File::open` or `File::create`")]
pub fn big_file(path: impl AsRef<Path>, create: bool) -> BigColResult<File> {
    tracing::warn!("big_file is deprecated, use File::open or File::create");
    if create {
        File::create(path)
    } else {
        File::open(path)
    }
}

/// Former name of [`Column::open`].
#[deprecated(note = "use `Column::open` or `File::open_column`")]
pub fn big_block(container: impl AsRef<Path>, name: &str) -> BigColResult<Column> {
    tracing::warn!("big_block is deprecated, use Column::open");
    Column::open(container, name)
}

/// Former name of [`Dataset::new`].
#[deprecated(note = "use `Dataset::new`")]
pub fn big_data(file: &File, blocks: Option<Vec<String>>) -> BigColResult<Dataset> {
    tracing::warn!("big_data is deprecated, use Dataset::new");
    Dataset::new(file, blocks)
}

#[cfg(test)]
#[allow(deprecated)]
mod tests {
    use arrow::array::Int64Array;

    use super::*;

    #[test]
    fn aliases_delegate_to_current_types() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(big_file(tmp.path().join("new"), false).is_err());

        let mut file = big_file(tmp.path().join("new"), true).unwrap();
        file.create_from_array("x", &Int64Array::from(vec![1, 2, 3]), None, None)
            .unwrap();

        let column = big_block(file.path(), "x").unwrap();
        assert_eq!(column.size(), 3);

        let dataset = big_data(&file, None).unwrap();
        assert_eq!(dataset.len(), 3);
    }
}
