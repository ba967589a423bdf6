/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

struct PoolState {
    max: u32,
    pre_allocated: u32,
    allocated: u32,
    idle: Vec<u32>,
    max_in_use: u32,
}
impl PoolState {
    fn in_use(&self) -> u32 {
        self.allocated - self.idle.len() as u32
    }
}

/// A bounded pool of workers (virtual users).
///
/// `pre_allocated` workers exist from the start. When all of them are busy the pool grows one
/// worker at a time up to `max`; beyond that `try_lease` refuses.
#[derive(Clone)]
pub struct WorkerPool {
    state: Arc<Mutex<PoolState>>,
}

impl WorkerPool {
    pub fn new(pre_allocated: u32, max: u32) -> Self {
        let max = max.max(1);
        let pre_allocated = pre_allocated.min(max);

        // reversed so that worker 0 is handed out first
        let idle = (0..pre_allocated).rev().collect();

        WorkerPool {
            state: Arc::new(Mutex::new(PoolState {
                max,
                pre_allocated,
                allocated: pre_allocated,
                idle,
                max_in_use: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Leases an idle worker, allocating a new one if the pool has not reached its maximum.
    /// Returns `None` when every worker is busy.
    pub fn try_lease(&self) -> Option<WorkerLease> {
        let mut state = self.lock();

        let id = match state.idle.pop() {
            Some(id) => id,
            None if state.allocated < state.max => {
                if state.allocated == state.pre_allocated {
                    warn!(
                        "All {} pre-allocated workers are busy, allocating more (max {})",
                        state.pre_allocated, state.max
                    );
                }
                let id = state.allocated;
                state.allocated += 1;
                id
            }
            None => return None,
        };

        state.max_in_use = state.max_in_use.max(state.in_use());

        Some(WorkerLease {
            id,
            state: self.state.clone(),
        })
    }

    pub fn allocated(&self) -> u32 {
        self.lock().allocated
    }

    pub fn in_use(&self) -> u32 {
        self.lock().in_use()
    }

    /// The highest number of workers that were busy at the same time.
    pub fn max_in_use(&self) -> u32 {
        self.lock().max_in_use
    }
}

/// A worker on loan from a [`WorkerPool`]. The worker becomes idle again when the lease is dropped.
pub struct WorkerLease {
    id: u32,
    state: Arc<Mutex<PoolState>>,
}
impl WorkerLease {
    pub fn id(&self) -> u32 {
        self.id
    }
}
impl Drop for WorkerLease {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.idle.push(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hands_out_pre_allocated_workers_first() {
        let pool = WorkerPool::new(2, 4);
        assert_eq!(pool.allocated(), 2);

        let a = pool.try_lease().expect("worker 0");
        let b = pool.try_lease().expect("worker 1");
        assert_eq!((a.id(), b.id()), (0, 1));
        assert_eq!(pool.allocated(), 2);
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn grows_up_to_max_then_refuses() {
        let pool = WorkerPool::new(1, 3);

        let leases = (0..3)
            .map(|_| pool.try_lease().expect("pool should grow"))
            .collect::<Vec<_>>();
        assert_eq!(pool.allocated(), 3);
        assert!(pool.try_lease().is_none());

        drop(leases);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.max_in_use(), 3);
    }

    #[test]
    fn dropped_lease_is_reused() {
        let pool = WorkerPool::new(1, 1);

        let lease = pool.try_lease().expect("worker 0");
        assert!(pool.try_lease().is_none());

        drop(lease);
        let lease = pool.try_lease().expect("worker 0 again");
        assert_eq!(lease.id(), 0);
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn pre_allocation_is_capped_by_max() {
        let pool = WorkerPool::new(10, 2);
        assert_eq!(pool.allocated(), 2);
    }
}
