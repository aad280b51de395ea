//! Local filesystem codec for sharded blocks.
//!
//! A block is a directory holding `header.json` and one raw data file per
//! shard. The header is written first with a no-clobber rename so that it
//! claims the block name atomically; shard files are allocated afterwards at
//! their final length.
//!
//! ```text
//! <block>/
//!     ├── header.json   {"version":1,"dtype":"<i8","nmemb":1,"size":10,"shard_bytes":[40,40]}
//!     ├── 000000        elements [0, 5)
//!     └── 000001        elements [5, 10)
//! ```

use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Read, Seek, SeekFrom, Write},
    ops::Range,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    dtype::{DType, ScalarKind},
    error::{BigColError, BigColResult},
    layout::{shard_file_name, FORMAT_VERSION, HEADER_FILE},
};

/// JSON envelope stored as `header.json` inside a block directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    /// Scalar code, e.g. `<f8`.
    pub dtype: String,
    /// Scalars per element.
    pub nmemb: usize,
    /// Number of elements.
    pub size: usize,
    /// Byte length of every shard, in shard order.
    pub shard_bytes: Vec<u64>,
}

impl BlockHeader {
    /// Fails with `InvalidArgument` when the block would exceed `u64::MAX` bytes.
    pub fn new(dtype: &DType, size: usize, nfile: usize) -> BigColResult<Self> {
        let itemsize = dtype.itemsize() as u64;
        if (size as u64).checked_mul(itemsize).is_none() {
            return Err(BigColError::InvalidArgument(format!(
                "{size} elements of {dtype} do not fit in a block"
            )));
        }
        Ok(Self {
            version: FORMAT_VERSION,
            dtype: dtype.kind().code().to_string(),
            nmemb: dtype.nmemb(),
            size,
            shard_bytes: shard_sizes(size, nfile)
                .into_iter()
                .map(|n| n as u64 * itemsize)
                .collect(),
        })
    }

    /// Checks the internal consistency of the record and returns its dtype.
    fn validate(&self, path: &Path) -> BigColResult<DType> {
        if self.version != FORMAT_VERSION {
            return Err(BigColError::format(
                path,
                format!(
                    "unsupported format version {} (expected {})",
                    self.version, FORMAT_VERSION
                ),
            ));
        }
        let kind: ScalarKind = self
            .dtype
            .parse()
            .map_err(|err| BigColError::format(path, format!("{err}")))?;
        let dtype = DType::fixed(kind, self.nmemb)
            .map_err(|err| BigColError::format(path, format!("{err}")))?;

        if self.shard_bytes.is_empty() {
            return Err(BigColError::format(path, "block has no shards"));
        }
        let itemsize = dtype.itemsize() as u64;
        if let Some(bad) = self.shard_bytes.iter().find(|b| *b % itemsize != 0) {
            return Err(BigColError::format(
                path,
                format!("shard length {bad} is not a multiple of item size {itemsize}"),
            ));
        }
        let expected = (self.size as u64)
            .checked_mul(itemsize)
            .ok_or_else(|| BigColError::format(path, format!("size {} overflows", self.size)))?;
        let total = self
            .shard_bytes
            .iter()
            .try_fold(0u64, |acc, bytes| acc.checked_add(*bytes));
        if total != Some(expected) {
            let total = total.map_or_else(|| "more than u64::MAX".to_string(), |t| t.to_string());
            return Err(BigColError::format(
                path,
                format!("shards hold {total} bytes but {} elements of {dtype} need {expected}", self.size),
            ));
        }
        Ok(dtype)
    }
}

/// Splits `size` elements over `nfile` shards as evenly as possible.
/// Shard `i` receives `(i+1)*size/nfile - i*size/nfile` elements.
pub fn shard_sizes(size: usize, nfile: usize) -> Vec<usize> {
    let size = size as u128;
    let nfile_wide = nfile as u128;
    (0..nfile as u128)
        .map(|i| ((i + 1) * size / nfile_wide - i * size / nfile_wide) as usize)
        .collect()
}

/// Serializes `value` as JSON next to `path` and renames it into place.
/// With `clobber == false` an existing target yields `ErrorKind::AlreadyExists`.
pub(crate) fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
    clobber: bool,
) -> BigColResult<Result<(), std::io::Error>> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| BigColError::io(dir, e))?;
    serde_json::to_writer_pretty(&mut tmp, value)
        .map_err(|e| BigColError::format(path, format!("failed to serialize: {e}")))?;
    tmp.flush().map_err(|e| BigColError::io(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| BigColError::io(path, e))?;

    let persisted = if clobber {
        tmp.persist(path)
    } else {
        tmp.persist_noclobber(path)
    };
    Ok(persisted.map(|_| ()).map_err(|e| e.error))
}

fn read_header(dir: &Path, name: &str) -> BigColResult<BlockHeader> {
    let header_path = dir.join(HEADER_FILE);
    let file = match fs::File::open(&header_path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(BigColError::NotFound {
                name: name.to_string(),
                path: dir.to_path_buf(),
            })
        }
        Err(err) => return Err(BigColError::io(header_path, err)),
    };
    serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| BigColError::format(&header_path, format!("unreadable header: {e}")))
}

/// Byte window of one shard touched by an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShardSpan {
    shard: usize,
    /// Offset inside the shard file.
    local_offset: u64,
    /// Offset inside the caller's buffer.
    buffer_offset: usize,
    len: usize,
}

/// Open handle on a sharded block.
///
/// Reads open the shard files on demand. Writers are opened lazily and kept
/// until the handle is dropped so that [`ShardedBlock::sync`] can flush them.
#[derive(Debug)]
pub struct ShardedBlock {
    dir: PathBuf,
    header: BlockHeader,
    dtype: DType,
    /// Cumulative byte offsets; `byte_offsets[i]..byte_offsets[i + 1]` is shard `i`.
    byte_offsets: Vec<u64>,
    writers: Vec<Option<fs::File>>,
}

impl ShardedBlock {
    /// Allocates a new block of `size` elements over `nfile` shards.
    pub fn allocate(
        dir: &Path,
        name: &str,
        dtype: &DType,
        size: usize,
        nfile: usize,
    ) -> BigColResult<Self> {
        if nfile == 0 {
            return Err(BigColError::InvalidArgument(format!(
                "block '{name}' needs at least one shard"
            )));
        }
        let header = BlockHeader::new(dtype, size, nfile)?;
        fs::create_dir_all(dir).map_err(|e| BigColError::io(dir, e))?;

        let header_path = dir.join(HEADER_FILE);
        match write_json_atomic(&header_path, &header, false)? {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(BigColError::AlreadyExists {
                    name: name.to_string(),
                    path: dir.to_path_buf(),
                })
            }
            Err(err) => return Err(BigColError::io(header_path, err)),
        }

        for (index, bytes) in header.shard_bytes.iter().enumerate() {
            let shard_path = dir.join(shard_file_name(index));
            let file = fs::File::create(&shard_path).map_err(|e| BigColError::io(&shard_path, e))?;
            file.set_len(*bytes)
                .map_err(|e| BigColError::io(&shard_path, e))?;
        }
        tracing::debug!(
            "Allocated block {} ({} x {}, {} shards)",
            dir.display(),
            size,
            dtype,
            nfile
        );

        Self::from_header(dir, header, *dtype)
    }

    /// Attaches to an existing block, validating its header and shard files.
    pub fn open(dir: &Path, name: &str) -> BigColResult<Self> {
        let header = read_header(dir, name)?;
        let dtype = header.validate(&dir.join(HEADER_FILE))?;

        for (index, bytes) in header.shard_bytes.iter().enumerate() {
            let shard_path = dir.join(shard_file_name(index));
            let metadata = match fs::metadata(&shard_path) {
                Ok(metadata) => metadata,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    return Err(BigColError::format(
                        &shard_path,
                        format!("shard {index} of block '{name}' is missing"),
                    ))
                }
                Err(err) => return Err(BigColError::io(&shard_path, err)),
            };
            if metadata.len() < *bytes {
                return Err(BigColError::format(
                    &shard_path,
                    format!(
                        "shard {index} holds {} bytes, header expects {bytes}",
                        metadata.len()
                    ),
                ));
            }
        }

        Self::from_header(dir, header, dtype)
    }

    /// Reads the dtype and element count of a block without keeping a handle.
    pub fn stat(dir: &Path, name: &str) -> BigColResult<(DType, usize)> {
        let header = read_header(dir, name)?;
        let dtype = header.validate(&dir.join(HEADER_FILE))?;
        Ok((dtype, header.size))
    }

    fn from_header(dir: &Path, header: BlockHeader, dtype: DType) -> BigColResult<Self> {
        let mut byte_offsets = Vec::with_capacity(header.shard_bytes.len() + 1);
        byte_offsets.push(0u64);
        for bytes in &header.shard_bytes {
            let last = byte_offsets.last().copied().unwrap_or(0);
            byte_offsets.push(last + bytes);
        }
        let writers = header.shard_bytes.iter().map(|_| None).collect();
        Ok(Self {
            dir: dir.to_path_buf(),
            header,
            dtype,
            byte_offsets,
            writers,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn size(&self) -> usize {
        self.header.size
    }

    pub fn nfile(&self) -> usize {
        self.header.shard_bytes.len()
    }

    pub fn byte_len(&self) -> u64 {
        self.byte_offsets.last().copied().unwrap_or(0)
    }

    /// Element range covered by each shard.
    pub fn shard_ranges(&self) -> Vec<Range<usize>> {
        let itemsize = self.dtype.itemsize() as u64;
        self.byte_offsets
            .windows(2)
            .map(|w| (w[0] / itemsize) as usize..(w[1] / itemsize) as usize)
            .collect()
    }

    fn shard_path(&self, shard: usize) -> PathBuf {
        self.dir.join(shard_file_name(shard))
    }

    fn spans(&self, start: u64, stop: u64) -> Vec<ShardSpan> {
        let mut spans = Vec::new();
        for (shard, window) in self.byte_offsets.windows(2).enumerate() {
            let (lo, hi) = (window[0], window[1]);
            if hi <= start || lo == hi {
                continue;
            }
            if lo >= stop {
                break;
            }
            let from = start.max(lo);
            let to = stop.min(hi);
            spans.push(ShardSpan {
                shard,
                local_offset: from - lo,
                buffer_offset: (from - start) as usize,
                len: (to - from) as usize,
            });
        }
        spans
    }

    /// Writes `bytes` at absolute byte offset `offset`, crossing shard boundaries as needed.
    pub fn write(&mut self, offset: u64, bytes: &[u8]) -> BigColResult<()> {
        let stop = offset + bytes.len() as u64;
        if stop > self.byte_len() {
            return Err(BigColError::InvalidArgument(format!(
                "byte range {offset}..{stop} exceeds block length {}",
                self.byte_len()
            )));
        }

        for span in self.spans(offset, stop) {
            let shard_path = self.shard_path(span.shard);
            let writer = match &mut self.writers[span.shard] {
                Some(writer) => writer,
                slot @ None => {
                    let file = OpenOptions::new()
                        .write(true)
                        .open(&shard_path)
                        .map_err(|e| BigColError::io(&shard_path, e))?;
                    slot.insert(file)
                }
            };
            writer
                .seek(SeekFrom::Start(span.local_offset))
                .map_err(|e| BigColError::io(&shard_path, e))?;
            writer
                .write_all(&bytes[span.buffer_offset..span.buffer_offset + span.len])
                .map_err(|e| BigColError::io(&shard_path, e))?;
        }
        Ok(())
    }

    /// Reads the byte range `start..stop` into a new buffer.
    pub fn read(&self, start: u64, stop: u64) -> BigColResult<Vec<u8>> {
        if start > stop || stop > self.byte_len() {
            return Err(BigColError::InvalidArgument(format!(
                "byte range {start}..{stop} exceeds block length {}",
                self.byte_len()
            )));
        }

        let mut buffer = vec![0u8; (stop - start) as usize];
        for span in self.spans(start, stop) {
            let shard_path = self.shard_path(span.shard);
            let mut file = fs::File::open(&shard_path).map_err(|e| BigColError::io(&shard_path, e))?;
            file.seek(SeekFrom::Start(span.local_offset))
                .map_err(|e| BigColError::io(&shard_path, e))?;
            file.read_exact(&mut buffer[span.buffer_offset..span.buffer_offset + span.len])
                .map_err(|e| BigColError::io(&shard_path, e))?;
        }
        Ok(buffer)
    }

    /// Flushes every shard opened for writing to stable storage.
    pub fn sync(&mut self) -> BigColResult<()> {
        for (shard, writer) in self.writers.iter_mut().enumerate() {
            if let Some(writer) = writer {
                writer
                    .sync_all()
                    .map_err(|e| BigColError::io(self.dir.join(shard_file_name(shard)), e))?;
            }
        }
        Ok(())
    }

    /// Drops all cached writers.
    pub fn release(&mut self) {
        self.writers.iter_mut().for_each(|w| *w = None);
    }
}
