use std::path::{Path, PathBuf};

use arrow::array::Array;

use crate::{
    column::{default_nfile, validate_name, Column},
    dtype::DType,
    error::{BigColError, BigColResult},
    layout::{HEADER_FILE, NAME_SEPARATOR},
};

/// A value addressed by [`File::entry`].
#[derive(Debug)]
pub enum Entry {
    Column(Column),
    Subfile(File),
}

/// Directory of columns.
///
/// The list of block names is scanned when the handle is built and afterwards
/// only on [`File::refresh`] (or after this handle creates a column). Two handles
/// on the same directory may therefore disagree until both are refreshed.
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
    blocks: Vec<String>,
}

impl File {
    /// Opens an existing directory.
    pub fn open(path: impl AsRef<Path>) -> BigColResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_dir() {
            tracing::error!("Failed to open file: {}", path.display());
            return Err(BigColError::NotFound {
                name: path.display().to_string(),
                path,
            });
        }
        let mut file = Self {
            path,
            blocks: Vec::new(),
        };
        file.refresh()?;
        tracing::debug!("Opened file {} with {} blocks", file.path.display(), file.blocks.len());
        Ok(file)
    }

    /// Opens `path`, creating the directory (and its parents) if needed.
    pub fn create(path: impl AsRef<Path>) -> BigColResult<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            std::fs::create_dir_all(path).map_err(|e| BigColError::io(path, e))?;
            tracing::info!("Created file {}", path.display());
        }
        Self::open(path)
    }

    /// Wraps an existing directory with a block listing obtained elsewhere,
    /// without scanning.
    pub fn with_blocks(path: impl AsRef<Path>, blocks: Vec<String>) -> BigColResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_dir() {
            return Err(BigColError::NotFound {
                name: path.display().to_string(),
                path,
            });
        }
        let mut file = Self {
            path,
            blocks: Vec::new(),
        };
        file.set_cached_blocks(blocks);
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scans storage and returns the sorted names of all columns below this
    /// directory. Nested names use `/`.
    pub fn list_blocks(&self) -> BigColResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in walkdir::WalkDir::new(&self.path)
            .min_depth(2)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|err| {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.path.clone());
                BigColError::io(path, err.into())
            })?;
            if !entry.file_type().is_file() || entry.file_name() != HEADER_FILE {
                continue;
            }
            let Some(block_dir) = entry.path().parent() else {
                continue;
            };
            let Ok(relative) = block_dir.strip_prefix(&self.path) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join(&NAME_SEPARATOR.to_string());
            names.push(name);
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Cached block names as of the last refresh.
    pub fn blocks(&self) -> &[String] {
        &self.blocks
    }

    /// Rescans storage and updates the cached block names.
    pub fn refresh(&mut self) -> BigColResult<&[String]> {
        self.blocks = self.list_blocks()?;
        Ok(&self.blocks)
    }

    /// Replaces the cached block names, e.g. with a listing broadcast by another process.
    pub fn set_cached_blocks(&mut self, mut blocks: Vec<String>) {
        blocks.sort();
        blocks.dedup();
        self.blocks = blocks;
    }

    /// Whether `name` is in the cached listing.
    pub fn contains(&self, name: &str) -> bool {
        self.blocks.iter().any(|b| b == name)
    }

    pub fn open_column(&self, name: &str) -> BigColResult<Column> {
        Column::open(&self.path, name)
    }

    /// Allocates a new column and refreshes the cached listing.
    pub fn create_column(
        &mut self,
        name: &str,
        dtype: DType,
        size: usize,
        nfile: usize,
    ) -> BigColResult<Column> {
        let column = Column::create(&self.path, name, dtype, size, nfile)?;
        self.refresh()?;
        Ok(column)
    }

    /// Creates column `name` holding a copy of `array`.
    ///
    /// `nfile` defaults to one shard per `BIGCOL_ELEMENTS_PER_SHARD` elements and
    /// `memory_limit` (bytes encoded per write) to `BIGCOL_MEMORY_LIMIT`.
    pub fn create_from_array(
        &mut self,
        name: &str,
        array: &dyn Array,
        nfile: Option<usize>,
        memory_limit: Option<usize>,
    ) -> BigColResult<Column> {
        let config = &*bigcol_config::CONFIG;
        let dtype = DType::from_arrow(array.data_type())?;
        let nfile =
            nfile.unwrap_or_else(|| default_nfile(array.len(), config.elements_per_shard()));
        let memory_limit = memory_limit.unwrap_or_else(|| config.memory_limit());

        let mut column = self.create_column(name, dtype, array.len(), nfile)?;
        column.write_chunked(0, array, memory_limit)?;
        column.close()?;
        self.open_column(name)
    }

    /// Nested file `name` one level below this one, created if missing.
    pub fn subfile(&self, name: &str) -> BigColResult<File> {
        let key = name.trim_end_matches(NAME_SEPARATOR);
        validate_name(key)?;
        let dir = self.path.join(key);
        if dir.join(HEADER_FILE).exists() {
            return Err(BigColError::InvalidName {
                name: name.to_string(),
                reason: "a column with this name exists".to_string(),
            });
        }
        File::create(dir)
    }

    /// Resolves `key`: a trailing `/` selects a subfile, anything else a column.
    pub fn entry(&self, key: &str) -> BigColResult<Entry> {
        if key.ends_with(NAME_SEPARATOR) {
            self.subfile(key).map(Entry::Subfile)
        } else {
            self.open_column(key).map(Entry::Column)
        }
    }
}
