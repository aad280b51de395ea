use std::{ops::Range, path::Path, sync::Arc};

use arrow::array::{Array, ArrayRef};
use bigcol_core::{AttrSet, Column, DType, RowRange};

use crate::{
    comm::Communicator,
    error::CollectiveResult,
    ops::agree,
    unique::{check_unique, path_value},
};

/// A [`Column`] opened by every rank of a communicator.
///
/// Opening and closing are collective. Reads, writes and `flush` act on the
/// local handle only; ranks are expected to write disjoint element ranges.
/// Attribute changes are persisted by rank 0.
#[derive(Debug)]
pub struct CollectiveColumn {
    comm: Arc<dyn Communicator>,
    inner: Column,
}

impl CollectiveColumn {
    pub fn open(
        comm: Arc<dyn Communicator>,
        container: impl AsRef<Path>,
        name: &str,
    ) -> CollectiveResult<Self> {
        let container = container.as_ref();
        check_unique("block", &(path_value(container), name), comm.as_ref())?;
        comm.barrier()?;

        let local =
            Column::open(container, name).map(|column| column.with_attr_persistence(comm.rank() == 0));
        let inner = agree(comm.as_ref(), "open", name, local)?;
        tracing::debug!("Rank {} opened column '{}'", comm.rank(), name);
        Ok(Self { comm, inner })
    }

    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    /// The local handle.
    pub fn local(&self) -> &Column {
        &self.inner
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    pub fn dtype(&self) -> DType {
        self.inner.dtype()
    }

    pub fn size(&self) -> usize {
        self.inner.size()
    }

    pub fn nfile(&self) -> usize {
        self.inner.nfile()
    }

    pub fn shard_ranges(&self) -> Vec<Range<usize>> {
        self.inner.shard_ranges()
    }

    pub fn read(&self, range: impl Into<RowRange>) -> CollectiveResult<ArrayRef> {
        Ok(self.inner.read(range)?)
    }

    pub fn write(&mut self, offset: usize, array: &dyn Array) -> CollectiveResult<()> {
        Ok(self.inner.write(offset, array)?)
    }

    pub fn write_chunked(
        &mut self,
        offset: usize,
        array: &dyn Array,
        memory_limit: usize,
    ) -> CollectiveResult<()> {
        Ok(self.inner.write_chunked(offset, array, memory_limit)?)
    }

    pub fn attrs_loaded(&self) -> bool {
        self.inner.attrs_loaded()
    }

    /// Attributes of the column. Every rank should apply the same changes.
    pub fn attrs(&mut self) -> CollectiveResult<&mut AttrSet> {
        Ok(self.inner.attrs()?)
    }

    /// Flushes this rank's writes. Not collective.
    pub fn flush(&mut self) -> CollectiveResult<()> {
        Ok(self.inner.flush()?)
    }

    /// Closes the local handle on every rank; fails everywhere if any rank failed.
    pub fn close(self) -> CollectiveResult<()> {
        let Self { comm, mut inner } = self;
        let closed = inner.close();
        agree(comm.as_ref(), "close", inner.name(), closed)
    }
}
