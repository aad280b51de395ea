//! Byte-level collective communication between cooperating ranks.
//!
//! Every rank of a communicator must call the collective methods in the same
//! order. A rank that never arrives blocks the others indefinitely.

mod self_comm;
mod thread;

pub use self_comm::SelfComm;
pub use thread::{spawn_world, ThreadComm};

use crate::error::{CollectiveError, CollectiveResult};

pub trait Communicator: Send + Sync + std::fmt::Debug {
    /// Rank of the calling process, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of ranks.
    fn size(&self) -> usize;

    /// Collects one buffer from every rank; the result is indexed by rank and
    /// identical on all ranks.
    fn all_gather_bytes(&self, local: Vec<u8>) -> CollectiveResult<Vec<Vec<u8>>>;

    /// Returns once every rank has called `barrier`.
    fn barrier(&self) -> CollectiveResult<()> {
        self.all_gather_bytes(Vec::new()).map(|_| ())
    }

    /// Distributes the buffer supplied by `root` to every rank. Values passed
    /// by other ranks are ignored.
    fn broadcast_bytes(&self, root: usize, value: Option<Vec<u8>>) -> CollectiveResult<Vec<u8>> {
        if root >= self.size() {
            return Err(CollectiveError::Communicator(format!(
                "broadcast root {} is outside a world of size {}",
                root,
                self.size()
            )));
        }
        let supplied = value.is_some();
        let mut local = vec![u8::from(supplied)];
        local.extend(value.unwrap_or_default());

        let mut gathered = self.all_gather_bytes(local)?;
        let mut payload = gathered.swap_remove(root);
        match payload.first() {
            Some(1) => Ok(payload.split_off(1)),
            _ => Err(CollectiveError::Communicator(format!(
                "broadcast root {} did not supply a value",
                root
            ))),
        }
    }
}
