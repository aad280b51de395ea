//! Typed collectives on top of the byte-level [`Communicator`].
//!
//! Values travel as `serde_json` documents.

use std::fmt::Display;

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    comm::Communicator,
    error::{CollectiveError, CollectiveResult},
};

const SERIALIZED: u8 = 1;
const UNSERIALIZABLE: u8 = 0;

/// Every rank's `value`, in rank order.
///
/// A rank whose value fails to serialize still takes part in the exchange, so
/// every rank returns the same [`CollectiveError::CollectiveFailure`].
pub fn all_gather<T>(comm: &dyn Communicator, value: &T) -> CollectiveResult<Vec<T>>
where
    T: Serialize + DeserializeOwned,
{
    let local = match serde_json::to_vec(value) {
        Ok(bytes) => [vec![SERIALIZED], bytes].concat(),
        Err(err) => [vec![UNSERIALIZABLE], err.to_string().into_bytes()].concat(),
    };
    let gathered = comm.all_gather_bytes(local)?;

    let (failed_ranks, reasons): (Vec<usize>, Vec<String>) = gathered
        .iter()
        .enumerate()
        .filter(|(_, bytes)| bytes.first() != Some(&SERIALIZED))
        .map(|(rank, bytes)| {
            let reason = String::from_utf8_lossy(bytes.get(1..).unwrap_or_default());
            (rank, format!("rank {rank}: {reason}"))
        })
        .unzip();
    if !failed_ranks.is_empty() {
        return Err(CollectiveError::CollectiveFailure {
            operation: "exchange".to_string(),
            name: "value".to_string(),
            failed_ranks,
            reasons,
        });
    }

    gathered
        .iter()
        .map(|bytes| serde_json::from_slice(&bytes[1..]).map_err(CollectiveError::from))
        .collect()
}

/// The value supplied by `root`. Other ranks pass `None`.
///
/// If the root's value fails to serialize, the root still joins the
/// broadcast and every rank fails.
pub fn broadcast<T>(comm: &dyn Communicator, root: usize, value: Option<&T>) -> CollectiveResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let (local, failure) = match value.map(serde_json::to_vec).transpose() {
        Ok(local) => (local, None),
        Err(err) => (None, Some(err)),
    };
    let bytes = comm.broadcast_bytes(root, local);
    if let Some(err) = failure {
        return Err(err.into());
    }
    Ok(serde_json::from_slice(&bytes?)?)
}

pub fn all_reduce_sum(comm: &dyn Communicator, value: usize) -> CollectiveResult<usize> {
    Ok(all_gather(comm, &value)?.into_iter().sum())
}

/// Sum of the values of all lower-ranked processes; 0 on rank 0.
pub fn exclusive_prefix_sum(comm: &dyn Communicator, value: usize) -> CollectiveResult<usize> {
    Ok(all_gather(comm, &value)?
        .into_iter()
        .take(comm.rank())
        .sum())
}

/// Turns the local outcome of `operation` on `name` into an outcome shared by
/// all ranks: if any rank failed, every rank returns the same
/// [`CollectiveError::CollectiveFailure`] and the local value is dropped.
pub fn agree<T, E>(
    comm: &dyn Communicator,
    operation: &str,
    name: &str,
    local: Result<T, E>,
) -> CollectiveResult<T>
where
    E: Display,
{
    let status = local.as_ref().err().map(|err| err.to_string());
    let statuses: Vec<Option<String>> = all_gather(comm, &status)?;

    let (failed_ranks, reasons): (Vec<usize>, Vec<String>) = statuses
        .into_iter()
        .enumerate()
        .filter_map(|(rank, status)| status.map(|reason| (rank, format!("rank {rank}: {reason}"))))
        .unzip();
    if !failed_ranks.is_empty() {
        tracing::debug!(
            "Collective {} of '{}' failed on ranks {:?}",
            operation,
            name,
            failed_ranks
        );
        return Err(CollectiveError::CollectiveFailure {
            operation: operation.to_string(),
            name: name.to_string(),
            failed_ranks,
            reasons,
        });
    }
    match local {
        Ok(value) => Ok(value),
        // Unreachable: this rank reported its failure above.
        Err(err) => Err(CollectiveError::Communicator(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::comm::spawn_world;

    #[test]
    fn sums_and_prefix_sums() {
        let results = spawn_world(4, |comm| {
            let local = comm.rank() + 1;
            (
                all_reduce_sum(comm.as_ref(), local).unwrap(),
                exclusive_prefix_sum(comm.as_ref(), local).unwrap(),
            )
        })
        .unwrap();
        assert_eq!(results, vec![(10, 0), (10, 1), (10, 3), (10, 6)]);
    }

    #[test]
    fn typed_broadcast() {
        let results = spawn_world(2, |comm| {
            let value = (comm.rank() == 0).then(|| vec!["a".to_string(), "b".to_string()]);
            broadcast::<Vec<String>>(comm.as_ref(), 0, value.as_ref()).unwrap()
        })
        .unwrap();
        assert!(results.iter().all(|v| v == &["a", "b"]));
    }

    #[test]
    fn unserializable_value_on_one_rank_fails_every_rank() {
        // serde_json cannot write maps with non-string keys.
        let results = spawn_world(3, |comm| {
            let mut value = BTreeMap::new();
            if comm.rank() == 1 {
                value.insert((1u8, 2u8), 3u8);
            }
            all_gather(comm.as_ref(), &value).map(|_| ())
        })
        .unwrap();

        for result in results {
            match result {
                Err(CollectiveError::CollectiveFailure {
                    operation,
                    failed_ranks,
                    ..
                }) => {
                    assert_eq!(operation, "exchange");
                    assert_eq!(failed_ranks, vec![1]);
                }
                other => panic!("expected a collective failure, got {other:?}"),
            }
        }
    }

    #[test]
    fn unserializable_root_value_fails_every_rank() {
        let results = spawn_world(2, |comm| {
            let value = (comm.rank() == 0).then(|| BTreeMap::from([((0u8, 0u8), 1u8)]));
            broadcast(comm.as_ref(), 0, value.as_ref()).map(|_| ())
        })
        .unwrap();
        assert!(results.iter().all(Result::is_err));
    }

    #[test]
    fn one_failure_fails_every_rank() {
        let results = spawn_world(3, |comm| {
            let local: Result<usize, String> = if comm.rank() == 1 {
                Err("disk full".to_string())
            } else {
                Ok(comm.rank())
            };
            agree(comm.as_ref(), "open", "x", local)
        })
        .unwrap();

        for result in results {
            match result {
                Err(CollectiveError::CollectiveFailure {
                    operation,
                    failed_ranks,
                    reasons,
                    ..
                }) => {
                    assert_eq!(operation, "open");
                    assert_eq!(failed_ranks, vec![1]);
                    assert_eq!(reasons, vec!["rank 1: disk full".to_string()]);
                }
                other => panic!("expected a collective failure, got {other:?}"),
            }
        }
    }
}
