//! Shared on-disk layout constants.
//!
//! These constants define file names used by the codec, the column handle and
//! the file scanner. Keeping them in one place avoids drift between writers,
//! readers and tests.

/// Version stamped into every `header.json`.
pub const FORMAT_VERSION: u32 = 1;

/// JSON metadata record inside a column directory. Its presence marks a directory as a column.
pub const HEADER_FILE: &str = "header.json";

/// Optional JSON attribute map inside a column directory.
pub const ATTRS_FILE: &str = "attrs.json";

/// Separator used in nested block names, independent of the host platform.
pub const NAME_SEPARATOR: char = '/';

/// Shard data file name: six upper-case hex digits.
pub fn shard_file_name(index: usize) -> String {
    format!("{:06X}", index)
}
