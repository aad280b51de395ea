use std::path::{Component, Path};

use arrow::array::{Array, ArrayRef};

use crate::{
    attrs::AttrSet,
    codec::ShardedBlock,
    dtype::DType,
    encoding,
    error::{BigColError, BigColResult},
    layout::{ATTRS_FILE, HEADER_FILE, NAME_SEPARATOR},
    range::RowRange,
};

/// Chunks written by [`Column::write_chunked`] are rounded down to this many elements.
pub const CHUNK_ALIGNMENT: usize = 1024;

/// Elements per chunk so that one chunk stays within `memory_limit` bytes.
/// Never less than [`CHUNK_ALIGNMENT`] elements.
pub fn chunk_len(dtype: &DType, memory_limit: usize) -> usize {
    let items = memory_limit / dtype.itemsize() / CHUNK_ALIGNMENT * CHUNK_ALIGNMENT;
    items.max(CHUNK_ALIGNMENT)
}

/// Shard count for `size` elements with at most `elements_per_shard` per shard.
pub fn default_nfile(size: usize, elements_per_shard: usize) -> usize {
    size.div_ceil(elements_per_shard.max(1)).max(1)
}

/// Rejects empty names, absolute names and `.`/`..` components.
pub(crate) fn validate_name(name: &str) -> BigColResult<()> {
    let invalid = |reason: &str| BigColError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.starts_with(NAME_SEPARATOR) || Path::new(name).is_absolute() {
        return Err(invalid("name must be relative"));
    }
    let parts: Vec<&str> = name
        .trim_end_matches(NAME_SEPARATOR)
        .split(NAME_SEPARATOR)
        .collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(invalid("name has an empty component"));
    }
    if parts.iter().any(|part| *part == "." || *part == "..")
        || Path::new(name)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(invalid("'.' and '..' components are not allowed"));
    }
    Ok(())
}

/// Rejects names that would place a column inside another column, or on top
/// of a non-empty subfile directory. An existing column of the same name is
/// left for the allocator to report as `AlreadyExists`.
fn check_namespace(container: &Path, name: &str) -> BigColResult<()> {
    let invalid = |reason: String| BigColError::InvalidName {
        name: name.to_string(),
        reason,
    };
    let parts: Vec<&str> = name
        .trim_end_matches(NAME_SEPARATOR)
        .split(NAME_SEPARATOR)
        .collect();

    let mut ancestor = container.to_path_buf();
    for (depth, part) in parts.iter().enumerate().take(parts.len().saturating_sub(1)) {
        ancestor.push(part);
        if ancestor.join(HEADER_FILE).exists() {
            return Err(invalid(format!(
                "'{}' is a column",
                parts[..=depth].join(&NAME_SEPARATOR.to_string())
            )));
        }
    }

    let dir = container.join(name);
    if !dir.exists() || dir.join(HEADER_FILE).exists() {
        return Ok(());
    }
    if !dir.is_dir() {
        return Err(invalid("a file with this name exists".to_string()));
    }
    let mut entries = std::fs::read_dir(&dir).map_err(|e| BigColError::io(&dir, e))?;
    if entries.next().is_some() {
        return Err(invalid("a subfile with this name exists".to_string()));
    }
    Ok(())
}

/// One named array stored over one or more shard files.
///
/// Writes go straight to the shard files; [`Column::flush`] makes them durable
/// and [`Column::close`] releases the handle. A column that is dropped while
/// still open is flushed first.
#[derive(Debug)]
pub struct Column {
    name: String,
    block: ShardedBlock,
    /// `None` until attributes are first requested.
    attrs: Option<AttrSet>,
    persist_attrs: bool,
    closed: bool,
}

impl Column {
    /// Allocates a new column `name` of `size` elements inside `container`.
    pub fn create(
        container: impl AsRef<Path>,
        name: &str,
        dtype: DType,
        size: usize,
        nfile: usize,
    ) -> BigColResult<Self> {
        validate_name(name)?;
        check_namespace(container.as_ref(), name)?;
        let dir = container.as_ref().join(name);
        let block = ShardedBlock::allocate(&dir, name, &dtype, size, nfile)?;
        tracing::info!(
            "Created column '{}' ({} x {}, {} shards) in {}",
            name,
            size,
            dtype,
            nfile,
            container.as_ref().display()
        );
        Ok(Self::from_block(name, block))
    }

    /// Opens the existing column `name` inside `container`.
    pub fn open(container: impl AsRef<Path>, name: &str) -> BigColResult<Self> {
        validate_name(name)?;
        let dir = container.as_ref().join(name);
        let block = ShardedBlock::open(&dir, name)?;
        tracing::debug!("Opened column '{}' at {}", name, dir.display());
        Ok(Self::from_block(name, block))
    }

    fn from_block(name: &str, block: ShardedBlock) -> Self {
        Self {
            name: name.trim_end_matches(NAME_SEPARATOR).to_string(),
            block,
            attrs: None,
            persist_attrs: true,
            closed: false,
        }
    }

    /// Controls whether `flush`/`close` write attribute changes back to disk.
    pub fn with_attr_persistence(mut self, enabled: bool) -> Self {
        self.persist_attrs = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding the column metadata and shards.
    pub fn path(&self) -> &Path {
        self.block.dir()
    }

    pub fn dtype(&self) -> DType {
        self.block.dtype()
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        self.block.size()
    }

    pub fn len(&self) -> usize {
        self.size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Number of shard files.
    pub fn nfile(&self) -> usize {
        self.block.nfile()
    }

    /// Element range stored by each shard, in shard order.
    pub fn shard_ranges(&self) -> Vec<std::ops::Range<usize>> {
        self.block.shard_ranges()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> BigColResult<()> {
        if self.closed {
            return Err(BigColError::Closed {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    fn check_write(&self, offset: usize, array: &dyn Array) -> BigColResult<()> {
        self.ensure_open()?;
        let expected = self.dtype();
        match DType::from_arrow(array.data_type()) {
            Ok(actual) if actual == expected => {}
            Ok(actual) => {
                return Err(BigColError::DTypeMismatch {
                    name: self.name.clone(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                })
            }
            Err(_) => {
                return Err(BigColError::DTypeMismatch {
                    name: self.name.clone(),
                    expected: expected.to_string(),
                    actual: array.data_type().to_string(),
                })
            }
        }

        let stop = offset.saturating_add(array.len());
        if stop > self.size() {
            return Err(BigColError::Range {
                name: self.name.clone(),
                start: offset,
                stop,
                size: self.size(),
            });
        }
        Ok(())
    }

    /// Writes `array` starting at element `offset`.
    pub fn write(&mut self, offset: usize, array: &dyn Array) -> BigColResult<()> {
        self.check_write(offset, array)?;
        if array.is_empty() {
            return Ok(());
        }
        let dtype = self.dtype();
        let bytes = encoding::encode(&dtype, array)?;
        self.block
            .write((offset * dtype.itemsize()) as u64, &bytes)?;
        tracing::trace!(
            "Wrote {} elements to column '{}' at offset {}",
            array.len(),
            self.name,
            offset
        );
        Ok(())
    }

    /// Writes `array` at `offset` in chunks of at most `memory_limit` bytes so
    /// that only one chunk is encoded at a time.
    pub fn write_chunked(
        &mut self,
        offset: usize,
        array: &dyn Array,
        memory_limit: usize,
    ) -> BigColResult<()> {
        self.check_write(offset, array)?;
        let chunk = chunk_len(&self.dtype(), memory_limit);
        let mut start = 0;
        while start < array.len() {
            let len = chunk.min(array.len() - start);
            let part = array.slice(start, len);
            self.write(offset + start, part.as_ref())?;
            start += len;
        }
        Ok(())
    }

    /// Reads the elements in `range` into a newly allocated array.
    pub fn read(&self, range: impl Into<RowRange>) -> BigColResult<ArrayRef> {
        self.ensure_open()?;
        let range = range
            .into()
            .resolve(self.size())
            .map_err(|(start, stop)| BigColError::Range {
                name: self.name.clone(),
                start,
                stop,
                size: self.size(),
            })?;
        let itemsize = self.dtype().itemsize() as u64;
        let bytes = self
            .block
            .read(range.start as u64 * itemsize, range.end as u64 * itemsize)?;
        encoding::decode(&self.dtype(), &bytes)
    }

    /// Reads every element.
    pub fn read_all(&self) -> BigColResult<ArrayRef> {
        self.read(..)
    }

    /// Whether attributes have been loaded from disk yet.
    pub fn attrs_loaded(&self) -> bool {
        self.attrs.is_some()
    }

    /// Attribute set of the column, loaded on first use.
    pub fn attrs(&mut self) -> BigColResult<&mut AttrSet> {
        self.ensure_open()?;
        if self.attrs.is_none() {
            let loaded = AttrSet::load(&self.block.dir().join(ATTRS_FILE))?;
            self.attrs = Some(loaded);
        }
        Ok(self.attrs.get_or_insert_with(AttrSet::default))
    }

    /// Makes all written data and attribute changes durable.
    pub fn flush(&mut self) -> BigColResult<()> {
        self.ensure_open()?;
        self.block.sync()?;
        if let Some(attrs) = &mut self.attrs {
            if self.persist_attrs {
                attrs.persist(&self.block.dir().join(ATTRS_FILE))?;
            } else {
                attrs.mark_clean();
            }
        }
        Ok(())
    }

    /// Flushes and invalidates the handle. Later calls fail with [`BigColError::Closed`].
    pub fn close(&mut self) -> BigColResult<()> {
        self.ensure_open()?;
        let flushed = self.flush();
        self.block.release();
        self.closed = true;
        tracing::debug!("Closed column '{}'", self.name);
        flushed
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.flush() {
            tracing::warn!("Failed to flush column '{}' on drop: {}", self.name, err);
        }
    }
}
