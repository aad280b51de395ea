use std::{path::Path, sync::Arc};

use crate::{comm::Communicator, error::CollectiveResult, file::CollectiveFile};

/// Former name of [`CollectiveFile::open`].
#[deprecated(note = "use `CollectiveFile::open`")]
pub fn big_file_mpi(
    comm: Arc<dyn Communicator>,
    path: impl AsRef<Path>,
    create: bool,
) -> CollectiveResult<CollectiveFile> {
    tracing::warn!("big_file_mpi is deprecated, use CollectiveFile::open");
    CollectiveFile::open(comm, path, create)
}
