//! Sharded columnar storage on a local or shared filesystem.
//!
//! A [`File`] is a directory of named [`Column`]s. Each column is one fixed
//! dtype array of fixed size, split over one or more shard files so that very
//! large arrays can be written and read piecewise. A [`Dataset`] joins several
//! equal-length columns into Arrow record batches for reading.
//!
//! Format Overview
//!
//! ```text
//! /data/                       File
//!     ├── x/                   Column "x"
//!     │   ├── header.json      dtype, element count, byte length of each shard
//!     │   ├── attrs.json       optional attributes
//!     │   ├── 000000           shard 0, raw little endian elements
//!     │   └── 000001           shard 1
//!     └── group/               subfile
//!         └── y/               Column "group/y"
//! ```
//!
//! Handles do no locking. Writers sharing a column must write disjoint element
//! ranges; coordinated multi-process access lives in `bigcol-collective`.

pub mod attrs;
pub mod codec;
pub mod column;
pub mod compat;
pub mod dataset;
pub mod dtype;
pub mod encoding;
pub mod error;
pub mod file;
pub mod layout;
pub mod range;

pub use attrs::{AttrSet, AttrValue};
pub use column::Column;
pub use dataset::{Dataset, DatasetItem, NameSelector, Selector};
pub use dtype::{DType, ScalarKind};
pub use error::{BigColError, BigColResult};
pub use file::{Entry, File};
pub use range::RowRange;
