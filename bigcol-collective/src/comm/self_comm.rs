use super::Communicator;
use crate::error::CollectiveResult;

/// Communicator of a single rank. Every collective returns immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfComm;

impl Communicator for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather_bytes(&self, local: Vec<u8>) -> CollectiveResult<Vec<Vec<u8>>> {
        Ok(vec![local])
    }
}
