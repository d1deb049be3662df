//! # cancellable_loops
//!
//! A small utility crate for creating cancellable parallel loops.
//!
//! Every loop checks an [`AbortHook`] before each item and stops early once the hook fires,
//! reporting the interruption as [`Cancelled`]. Parallel loops are meant to be driven by
//! coarse items (rows, row chunks, matrix rows) so that the check happens once per chunk
//! and not once per pixel.
//!
//! ## Features
//!
//! - Parallel loop with cancellation support using Rayon
//! - Parallel map-reduce with cancellation support
//!
//! ## Example
//!
//! ```
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use cancellable_loops::{par_for_each_cancellable, Cancelled};
//!
//! let abort_flag = AtomicBool::new(false);
//! assert!(par_for_each_cancellable(0..1000, &abort_flag, |_| {}).is_ok());
//!
//! abort_flag.store(true, Ordering::Relaxed);
//! assert_eq!(par_for_each_cancellable(0..1000, &abort_flag, |_| {}), Err(Cancelled));
//! ```

use rayon::prelude::*;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation check, polled between loop items.
pub trait AbortHook: Sync {
    /// Returns `true` once the running computation should stop.
    fn should_abort(&self) -> bool;
}

impl AbortHook for AtomicBool {
    fn should_abort(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Wraps a callback so it can be used as an [`AbortHook`].
///
/// ```
/// use cancellable_loops::{AbortFn, AbortHook};
///
/// let hook = AbortFn(|| false);
/// assert!(!hook.should_abort());
/// ```
pub struct AbortFn<F>(pub F);

impl<F> AbortHook for AbortFn<F>
where
    F: Fn() -> bool + Sync,
{
    fn should_abort(&self) -> bool {
        (self.0)()
    }
}

/// A hook that never fires.
#[derive(Debug, Default, Clone, Copy)]
pub struct Never;

impl AbortHook for Never {
    fn should_abort(&self) -> bool {
        false
    }
}

/// Returned by every loop in this crate when its hook fired before all items were processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl Display for Cancelled {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "loop cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Executes a parallel loop that can be cancelled via an abort hook.
///
/// Items already handed to a worker run to completion; remaining items are skipped once the
/// hook fires.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
/// use cancellable_loops::par_for_each_cancellable;
///
/// let abort_flag = AtomicBool::new(false);
/// let counter = AtomicUsize::new(0);
///
/// let outcome = par_for_each_cancellable(0..100, &abort_flag, |_| {
///     counter.fetch_add(1, Ordering::Relaxed);
/// });
///
/// assert!(outcome.is_ok());
/// assert_eq!(counter.load(Ordering::Relaxed), 100);
/// ```
pub fn par_for_each_cancellable<I, F, A>(iter: I, abort: &A, func: F) -> Result<(), Cancelled>
where
    I: IntoParallelIterator,
    F: Fn(I::Item) + Sync + Send,
    I::Item: Send,
    A: AbortHook + ?Sized,
{
    iter.into_par_iter().try_for_each(|item| {
        if abort.should_abort() {
            Err(Cancelled)
        } else {
            func(item);
            Ok(())
        }
    })
}

/// Executes a parallel map-reduce that can be cancelled via an abort hook.
///
/// Partial results are combined with `reducer`, starting from `identity()` in every worker,
/// so the reduction needs no locking.
///
/// # Examples
///
/// ```
/// use cancellable_loops::{par_map_reduce_cancellable, Never};
///
/// let sum = par_map_reduce_cancellable(1..=100u64, &Never, |i| i, || 0, |a, b| a + b);
/// assert_eq!(sum, Ok(5050));
/// ```
pub fn par_map_reduce_cancellable<I, F, R, ID, OP, A>(
    iter: I,
    abort: &A,
    func: F,
    identity: ID,
    reducer: OP,
) -> Result<R, Cancelled>
where
    I: IntoParallelIterator,
    I::Item: Send,
    F: Fn(I::Item) -> R + Sync + Send,
    R: Send,
    ID: Fn() -> R + Sync + Send,
    OP: Fn(R, R) -> R + Sync + Send,
    A: AbortHook + ?Sized,
{
    iter.into_par_iter()
        .map(|item| {
            if abort.should_abort() {
                Err(Cancelled)
            } else {
                Ok(func(item))
            }
        })
        .try_reduce(identity, |a, b| Ok(reducer(a, b)))
}
