use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::Communicator;
use crate::error::{CollectiveError, CollectiveResult};

#[derive(Debug)]
struct State {
    /// Incremented each time a gather round completes.
    generation: u64,
    arrived: usize,
    slots: Vec<Option<Vec<u8>>>,
    /// Output of the last completed round.
    results: Vec<Vec<u8>>,
    /// Set once a rank panicked; no further round can complete.
    poisoned: bool,
}

#[derive(Debug)]
struct World {
    size: usize,
    state: Mutex<State>,
    round_done: Condvar,
}

impl World {
    fn poison(&self) {
        self.state.lock().poisoned = true;
        self.round_done.notify_all();
    }
}

fn poisoned_error() -> CollectiveError {
    CollectiveError::Communicator("a rank of this world panicked".to_string())
}

/// Poisons its world when dropped during a panic.
struct PanicGuard(Arc<World>);

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.poison();
        }
    }
}

/// Communicator whose ranks are threads of the current process.
#[derive(Debug, Clone)]
pub struct ThreadComm {
    rank: usize,
    world: Arc<World>,
}

impl ThreadComm {
    /// One handle per rank of a new world of `size` ranks.
    pub fn world(size: usize) -> CollectiveResult<Vec<ThreadComm>> {
        if size == 0 {
            return Err(CollectiveError::Communicator(
                "a world needs at least one rank".to_string(),
            ));
        }
        let world = Arc::new(World {
            size,
            state: Mutex::new(State {
                generation: 0,
                arrived: 0,
                slots: vec![None; size],
                results: Vec::new(),
                poisoned: false,
            }),
            round_done: Condvar::new(),
        });
        Ok((0..size)
            .map(|rank| ThreadComm {
                rank,
                world: world.clone(),
            })
            .collect())
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.world.size
    }

    fn all_gather_bytes(&self, local: Vec<u8>) -> CollectiveResult<Vec<Vec<u8>>> {
        let mut state = self.world.state.lock();
        if state.poisoned {
            return Err(poisoned_error());
        }
        let generation = state.generation;
        if state.slots[self.rank].is_some() {
            return Err(CollectiveError::Communicator(format!(
                "rank {} entered a collective twice",
                self.rank
            )));
        }
        state.slots[self.rank] = Some(local);
        state.arrived += 1;

        if state.arrived == self.world.size {
            let gathered = state
                .slots
                .iter_mut()
                .map(|slot| slot.take().unwrap_or_default())
                .collect();
            state.results = gathered;
            state.arrived = 0;
            state.generation += 1;
            self.world.round_done.notify_all();
        } else {
            while state.generation == generation && !state.poisoned {
                self.world.round_done.wait(&mut state);
            }
            if state.generation == generation {
                return Err(poisoned_error());
            }
        }
        Ok(state.results.clone())
    }
}

/// Runs `f` once per rank of a new [`ThreadComm`] world, each on its own
/// thread, and returns the results in rank order.
///
/// If a rank panics, collectives on the remaining ranks fail with
/// [`CollectiveError::Communicator`] instead of blocking, and the panic is
/// resumed once every rank has returned.
pub fn spawn_world<T, F>(size: usize, f: F) -> CollectiveResult<Vec<T>>
where
    T: Send,
    F: Fn(Arc<dyn Communicator>) -> T + Sync,
{
    let comms = ThreadComm::world(size)?;
    let f = &f;
    let results = std::thread::scope(|scope| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let guard = PanicGuard(comm.world.clone());
                let comm: Arc<dyn Communicator> = Arc::new(comm);
                scope.spawn(move || {
                    let _guard = guard;
                    f(comm)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect::<Vec<_>>()
    });
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_is_rank_ordered_and_repeatable() {
        let results = spawn_world(4, |comm| {
            let first = comm.all_gather_bytes(vec![comm.rank() as u8]).unwrap();
            let second = comm
                .all_gather_bytes(vec![comm.rank() as u8 * 10])
                .unwrap();
            (first, second)
        })
        .unwrap();

        for (first, second) in results {
            assert_eq!(first, vec![vec![0], vec![1], vec![2], vec![3]]);
            assert_eq!(second, vec![vec![0], vec![10], vec![20], vec![30]]);
        }
    }

    #[test]
    fn broadcast_takes_the_root_value() {
        let results = spawn_world(3, |comm| {
            let value = (comm.rank() == 2).then(|| b"root".to_vec());
            comm.broadcast_bytes(2, value).unwrap()
        })
        .unwrap();
        assert!(results.iter().all(|value| value == b"root"));
    }

    #[test]
    fn panicking_rank_releases_the_others() {
        let failed = parking_lot::Mutex::new(Vec::new());
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            spawn_world(3, |comm| {
                if comm.rank() == 1 {
                    panic!("rank 1 gave up");
                }
                let result = comm.barrier();
                failed.lock().push((comm.rank(), result.is_err()));
            })
        }));

        assert!(outcome.is_err());
        let mut failed = failed.into_inner();
        failed.sort();
        assert_eq!(failed, vec![(0, true), (2, true)]);
    }

    #[test]
    fn empty_world_is_rejected() {
        assert!(ThreadComm::world(0).is_err());
    }
}
