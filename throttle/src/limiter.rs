use std::sync::atomic::{AtomicUsize, Ordering};

/// Counting admission gate shared by every level of a recursive move.
///
/// The gate is always handed around as `Arc<Limiter>`: cloning the `Arc` shares the same pool of
/// slots, so the bound holds for the whole tree no matter how deep the recursion goes.
#[derive(Debug)]
pub struct Limiter {
    capacity: usize,
    sem: std::sync::Arc<tokio::sync::Semaphore>,
    outstanding: AtomicUsize,
    peak: AtomicUsize,
}

impl Limiter {
    /// Creates a gate admitting at most `capacity` concurrent holders.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; such a gate would never admit anything.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "limiter capacity must be greater than zero");
        Self {
            capacity,
            sem: std::sync::Arc::new(tokio::sync::Semaphore::new(capacity)),
            outstanding: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Waits until a slot is free and takes it.
    ///
    /// The returned permit owns the slot and may be moved into a spawned task; the slot is
    /// released when the permit is dropped.
    pub async fn acquire(self: &std::sync::Arc<Self>) -> Permit {
        let permit = self
            .sem
            .clone()
            .acquire_owned()
            .await
            .expect("limiter semaphore is never closed");
        let now = self.outstanding.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);
        tracing::trace!("limiter: acquired slot, outstanding: {}", now);
        Permit {
            limiter: self.clone(),
            _permit: permit,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of permits currently held.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Highest number of permits ever held at the same time.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }
}

/// A slot taken from a [`Limiter`].
#[derive(Debug)]
pub struct Permit {
    limiter: std::sync::Arc<Limiter>,
    // dropped after `Drop::drop` runs, so the count is lowered before the slot is handed over
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl Permit {
    /// Gives the slot back. Equivalent to dropping the permit.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        let now = self.limiter.outstanding.fetch_sub(1, Ordering::AcqRel) - 1;
        tracing::trace!("limiter: released slot, outstanding: {}", now);
    }
}
