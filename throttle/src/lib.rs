//! Bounded admission of concurrent file moves
//!
//! This crate provides the counting gate `rmv` uses to cap the number of file moves that run at
//! the same time. A single [`Limiter`] is created per top-level move and shared by reference
//! (`Arc<Limiter>`) with every recursive directory walk and every spawned file-move task, so the
//! bound is global to the whole tree rather than per directory.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use throttle::Limiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(Limiter::new(throttle::DEFAULT_CAPACITY));
//!
//! // acquiring may wait until another holder releases its slot
//! let permit = limiter.acquire().await;
//! tokio::spawn(async move {
//!     // move the file here - the slot is released when `permit` is dropped
//!     drop(permit);
//! });
//! # }
//! ```
//!
//! # Guarantees
//!
//! - At most [`Limiter::capacity`] permits are held at any instant.
//! - Acquiring blocks the caller (asynchronously) until a slot frees up; releasing never blocks
//!   and wakes at most one waiter.
//! - [`Limiter::peak`] records the largest number of simultaneously held permits, which makes the
//!   bound observable in tests and debug logs.

mod limiter;

pub use limiter::{Limiter, Permit};

/// Number of concurrent file moves allowed when none is configured.
pub const DEFAULT_CAPACITY: usize = 10;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn release_returns_slot() {
        let limiter = Arc::new(Limiter::new(2));
        let first = limiter.acquire().await;
        let second = limiter.acquire().await;
        assert_eq!(limiter.outstanding(), 2);
        first.release();
        assert_eq!(limiter.outstanding(), 1);
        drop(second);
        assert_eq!(limiter.outstanding(), 0);
        assert_eq!(limiter.peak(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_blocks_when_full() {
        let limiter = Arc::new(Limiter::new(1));
        let held = limiter.acquire().await;
        let waiting = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            limiter.acquire(),
        )
        .await;
        assert!(waiting.is_err(), "second acquire must wait for a free slot");
        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let _permit = limiter.acquire().await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(held);
        waiter.await.unwrap();
        assert_eq!(limiter.outstanding(), 0);
        assert_eq!(limiter.peak(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bound_holds_across_many_tasks() {
        let limiter = Arc::new(Limiter::new(4));
        let mut join_set = tokio::task::JoinSet::new();
        for _ in 0..50 {
            let limiter = limiter.clone();
            join_set.spawn(async move {
                let _permit = limiter.acquire().await;
                assert!(limiter.outstanding() <= limiter.capacity());
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            });
        }
        while let Some(res) = join_set.join_next().await {
            res.unwrap();
        }
        assert_eq!(limiter.outstanding(), 0);
        assert_eq!(limiter.peak(), 4);
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than zero")]
    fn zero_capacity_is_rejected() {
        let _ = Limiter::new(0);
    }
}
