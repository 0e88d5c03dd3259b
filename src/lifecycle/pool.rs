//! Unbounded, non-blocking pool of idle resources.

use parking_lot::Mutex;

use super::Resource;

struct PoolState<C, W> {
    idle: Vec<Resource<C, W>>,
    closed: bool,
}

/// Thread-safe multiset of idle resources.
///
/// The lock is only held to push or pop, never across an `.await`, so no
/// caller ever waits on another caller's resource. There is no capacity
/// bound and no ordering guarantee.
pub struct ResourcePool<C, W> {
    state: Mutex<PoolState<C, W>>,
}

impl<C, W> ResourcePool<C, W> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Take an idle resource, if any.
    pub fn checkout(&self) -> Option<Resource<C, W>> {
        self.state.lock().idle.pop()
    }

    /// Return a resource to the pool.
    ///
    /// Once the pool is closed the resource is handed back so the caller
    /// can close it.
    pub fn checkin(&self, resource: Resource<C, W>) -> Result<(), Resource<C, W>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(resource);
        }
        state.idle.push(resource);
        Ok(())
    }

    /// Refuse further check-ins. Idle resources stay until checked out.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }
}

impl<C, W> Default for ResourcePool<C, W> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConnection, FakeWorker, Journal};

    fn resource(id: usize, journal: &Journal) -> Resource<FakeConnection, FakeWorker> {
        Resource::new(
            FakeConnection::new(id, journal.clone()),
            FakeWorker::new(id, journal.clone()),
        )
    }

    #[test]
    fn test_checkout_empty() {
        let pool: ResourcePool<FakeConnection, FakeWorker> = ResourcePool::new();
        assert!(pool.checkout().is_none());
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_checkin_then_checkout() {
        let journal = Journal::default();
        let pool = ResourcePool::new();
        let first = resource(1, &journal);
        let id = first.id();

        assert!(pool.checkin(first).is_ok());
        assert_eq!(pool.idle_count(), 1);

        let again = pool.checkout().unwrap();
        assert_eq!(again.id(), id);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_grows_without_bound() {
        let journal = Journal::default();
        let pool = ResourcePool::new();
        for id in 0..64 {
            assert!(pool.checkin(resource(id, &journal)).is_ok());
        }
        assert_eq!(pool.idle_count(), 64);
    }

    #[test]
    fn test_closed_pool_rejects_checkin() {
        let journal = Journal::default();
        let pool = ResourcePool::new();
        assert!(pool.checkin(resource(1, &journal)).is_ok());

        pool.close();

        assert!(pool.is_closed());
        let rejected = pool.checkin(resource(2, &journal)).unwrap_err();
        assert_eq!(rejected.connection().id(), 2);
        // Already pooled resources remain available for draining.
        assert!(pool.checkout().is_some());
        assert!(pool.checkout().is_none());
    }
}
