use std::path::Path;

use serde::Serialize;

use crate::{
    comm::Communicator,
    error::{CollectiveError, CollectiveResult},
    ops::all_gather,
};

/// Verifies that every rank passed the same `value`.
///
/// Values are compared by their serialized form. On a mismatch every rank gets
/// [`CollectiveError::InconsistentArgument`] listing the distinct values in
/// order of first appearance.
pub fn check_unique<T>(what: &str, value: &T, comm: &dyn Communicator) -> CollectiveResult<()>
where
    T: Serialize + ?Sized,
{
    let local = serde_json::to_string(value).map_err(|err| err.to_string());
    let gathered: Vec<Result<String, String>> = all_gather(comm, &local)?;

    let (failed_ranks, reasons): (Vec<usize>, Vec<String>) = gathered
        .iter()
        .enumerate()
        .filter_map(|(rank, value)| {
            value
                .as_ref()
                .err()
                .map(|reason| (rank, format!("rank {rank}: {reason}")))
        })
        .unzip();
    if !failed_ranks.is_empty() {
        return Err(CollectiveError::CollectiveFailure {
            operation: "check_unique".to_string(),
            name: what.to_string(),
            failed_ranks,
            reasons,
        });
    }

    let mut values: Vec<String> = gathered.into_iter().flatten().collect();
    let mut seen = Vec::with_capacity(values.len());
    values.retain(|value| {
        if seen.contains(value) {
            false
        } else {
            seen.push(value.clone());
            true
        }
    });
    if values.len() > 1 {
        tracing::debug!("Ranks disagree on {}: {:?}", what, values);
        return Err(CollectiveError::InconsistentArgument {
            what: what.to_string(),
            values,
        });
    }
    Ok(())
}

/// A lossless text form of `path` for [`check_unique`].
///
/// Paths need not be valid UTF-8, so the raw bytes are escaped instead.
pub(crate) fn path_value(path: &Path) -> String {
    path.as_os_str().as_encoded_bytes().escape_ascii().to_string()
}
