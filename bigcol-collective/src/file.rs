use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::array::Array;
use bigcol_core::{column::default_nfile, Column, DType, File};

use crate::{
    column::CollectiveColumn,
    comm::Communicator,
    error::{CollectiveError, CollectiveResult},
    ops::{agree, all_reduce_sum, broadcast, exclusive_prefix_sum},
    unique::{check_unique, path_value},
};

const ROOT: usize = 0;

/// A [`File`] shared by every rank of a communicator.
///
/// Metadata changes happen on rank 0 only and are followed by a collective
/// refresh, so all ranks see the same block listing.
#[derive(Debug)]
pub struct CollectiveFile {
    comm: Arc<dyn Communicator>,
    inner: File,
}

impl CollectiveFile {
    /// Opens `path` on every rank. With `create`, rank 0 creates the directory first.
    pub fn open(
        comm: Arc<dyn Communicator>,
        path: impl AsRef<Path>,
        create: bool,
    ) -> CollectiveResult<Self> {
        let path = path.as_ref();
        check_unique("file path", &(path_value(path), create), comm.as_ref())?;
        let name = path.display().to_string();

        if create {
            let created = if comm.rank() == ROOT {
                File::create(path).map(|_| ())
            } else {
                Ok(())
            };
            agree(comm.as_ref(), "create", &name, created)?;
        }

        let local = File::with_blocks(path, Vec::new());
        let inner = agree(comm.as_ref(), "open", &name, local)?;
        let mut file = Self { comm, inner };
        file.refresh()?;
        tracing::debug!(
            "Rank {} opened file {} with {} blocks",
            file.comm.rank(),
            name,
            file.inner.blocks().len()
        );
        Ok(file)
    }

    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// The local handle, e.g. for building a [`bigcol_core::Dataset`].
    pub fn local(&self) -> &File {
        &self.inner
    }

    /// Block names as of the last collective refresh.
    pub fn blocks(&self) -> &[String] {
        self.inner.blocks()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains(name)
    }

    /// Scans storage on rank 0 and hands the listing to every rank.
    pub fn list_blocks(&self) -> CollectiveResult<Vec<String>> {
        let scanned = if self.comm.rank() == ROOT {
            Some(self.inner.list_blocks().map_err(|err| err.to_string()))
        } else {
            None
        };
        match broadcast::<Result<Vec<String>, String>>(self.comm.as_ref(), ROOT, scanned.as_ref())? {
            Ok(blocks) => Ok(blocks),
            Err(reason) => Err(CollectiveError::CollectiveFailure {
                operation: "list".to_string(),
                name: self.path().display().to_string(),
                failed_ranks: vec![ROOT],
                reasons: vec![format!("rank {ROOT}: {reason}")],
            }),
        }
    }

    /// Replaces the cached listing on every rank with rank 0's scan.
    pub fn refresh(&mut self) -> CollectiveResult<&[String]> {
        let blocks = self.list_blocks()?;
        self.inner.set_cached_blocks(blocks);
        Ok(self.inner.blocks())
    }

    pub fn open_column(&self, name: &str) -> CollectiveResult<CollectiveColumn> {
        CollectiveColumn::open(self.comm.clone(), self.path(), name)
    }

    /// Rank 0 allocates the column, then every rank opens it.
    pub fn create_column(
        &mut self,
        name: &str,
        dtype: DType,
        size: usize,
        nfile: usize,
    ) -> CollectiveResult<CollectiveColumn> {
        check_unique("column layout", &(name, dtype, size, nfile), self.comm.as_ref())?;

        let created = if self.comm.rank() == ROOT {
            Column::create(self.path(), name, dtype, size, nfile).and_then(|mut column| column.close())
        } else {
            Ok(())
        };
        agree(self.comm.as_ref(), "create", name, created)?;
        self.refresh()?;
        self.open_column(name)
    }

    /// Creates column `name` from the concatenation of every rank's `local`
    /// array in rank order.
    ///
    /// Ranks must agree on the dtype and on `nfile`. Each rank writes its own
    /// part at the sum of the lengths of the lower ranks.
    pub fn create_from_array(
        &mut self,
        name: &str,
        local: &dyn Array,
        nfile: Option<usize>,
        memory_limit: Option<usize>,
    ) -> CollectiveResult<CollectiveColumn> {
        let dtype = agree(
            self.comm.as_ref(),
            "create",
            name,
            DType::from_arrow(local.data_type()),
        )?;
        check_unique("dtype", &dtype, self.comm.as_ref())?;

        let size = all_reduce_sum(self.comm.as_ref(), local.len())?;
        let offset = exclusive_prefix_sum(self.comm.as_ref(), local.len())?;

        let config = &*bigcol_config::CONFIG;
        let nfile = nfile.unwrap_or_else(|| default_nfile(size, config.elements_per_shard()));
        let memory_limit = memory_limit.unwrap_or_else(|| config.memory_limit());

        let mut column = self.create_column(name, dtype, size, nfile)?;
        let written = column
            .write_chunked(offset, local, memory_limit)
            .and_then(|_| column.flush());
        agree(self.comm.as_ref(), "write", name, written)?;
        tracing::debug!(
            "Rank {} wrote {} elements of '{}' at offset {}",
            self.comm.rank(),
            local.len(),
            name,
            offset
        );
        Ok(column)
    }

    /// Nested file `name`, created by rank 0 if missing.
    pub fn subfile(&self, name: &str) -> CollectiveResult<CollectiveFile> {
        check_unique("subfile name", name, self.comm.as_ref())?;
        let created = if self.comm.rank() == ROOT {
            self.inner.subfile(name).map(|_| ())
        } else {
            Ok(())
        };
        agree(self.comm.as_ref(), "subfile", name, created)?;
        let path: PathBuf = self.path().join(name.trim_end_matches('/'));
        CollectiveFile::open(self.comm.clone(), path, false)
    }

    /// Waits until every rank has finished with the file.
    pub fn close(self) -> CollectiveResult<()> {
        self.comm.barrier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{spawn_world, SelfComm};
    use bigcol_core::ScalarKind;

    #[test]
    fn refresh_distributes_rank_zero_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let results = spawn_world(3, |comm| {
            let mut file = CollectiveFile::open(comm, tmp.path(), true).unwrap();
            file.create_column("b", DType::scalar(ScalarKind::U8), 4, 1)
                .unwrap()
                .close()
                .unwrap();
            file.create_column("a", DType::scalar(ScalarKind::U8), 4, 1)
                .unwrap()
                .close()
                .unwrap();
            file.refresh().unwrap().to_vec()
        })
        .unwrap();
        for blocks in results {
            assert_eq!(blocks, vec!["a", "b"]);
        }
    }

    #[test]
    fn open_without_create_requires_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let err = CollectiveFile::open(Arc::new(SelfComm), tmp.path().join("absent"), false)
            .unwrap_err();
        assert!(matches!(err, CollectiveError::CollectiveFailure { .. }));
    }

    #[test]
    fn duplicate_create_fails_uniformly() {
        let tmp = tempfile::tempdir().unwrap();
        let results = spawn_world(2, |comm| {
            let mut file = CollectiveFile::open(comm, tmp.path(), true).unwrap();
            file.create_column("x", DType::scalar(ScalarKind::I8), 2, 1)
                .unwrap()
                .close()
                .unwrap();
            file.create_column("x", DType::scalar(ScalarKind::I8), 2, 1)
                .map(|_| ())
        })
        .unwrap();
        for result in results {
            match result {
                Err(CollectiveError::CollectiveFailure { failed_ranks, .. }) => {
                    assert_eq!(failed_ranks, vec![0]);
                }
                other => panic!("expected a collective failure, got {other:?}"),
            }
        }
    }

    #[test]
    fn subfiles_are_shared() {
        let tmp = tempfile::tempdir().unwrap();
        spawn_world(2, |comm| {
            let file = CollectiveFile::open(comm, tmp.path(), true).unwrap();
            let mut group = file.subfile("group/").unwrap();
            group
                .create_column("y", DType::scalar(ScalarKind::F32), 3, 1)
                .unwrap()
                .close()
                .unwrap();
            file.close().unwrap();
        })
        .unwrap();
        assert_eq!(
            File::open(tmp.path()).unwrap().blocks(),
            &["group/y".to_string()]
        );
    }
}
