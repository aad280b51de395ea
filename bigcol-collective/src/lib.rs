//! Collective access to bigcol files from a group of cooperating ranks.
//!
//! All ranks of a [`Communicator`] call the same operations in the same order.
//! Metadata changes are made by rank 0 only, arguments are checked for
//! agreement with [`check_unique`] before any change, and a failure on any
//! rank is reported as the same [`CollectiveError`] on every rank.
//!
//! ```no_run
//! use arrow::array::Int64Array;
//! use bigcol_collective::{spawn_world, CollectiveFile};
//!
//! spawn_world(4, |comm| {
//!     let rank = comm.rank() as i64;
//!     let mut file = CollectiveFile::open(comm, "/tmp/out", true)?;
//!     let column = file.create_from_array("rank", &Int64Array::from(vec![rank; 5]), None, None)?;
//!     column.close()
//! })
//! .unwrap();
//! ```

pub mod column;
pub mod comm;
pub mod compat;
pub mod error;
pub mod file;
pub mod ops;
pub mod unique;

pub use column::CollectiveColumn;
pub use comm::{spawn_world, Communicator, SelfComm, ThreadComm};
pub use error::{CollectiveError, CollectiveResult};
pub use file::CollectiveFile;
pub use unique::check_unique;
