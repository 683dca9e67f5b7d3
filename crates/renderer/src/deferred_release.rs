//! Serial-gated deferred destruction.
//!
//! Resource managers never destroy a native object the GPU might still be
//! reading. They hand a closure to a [`DeferredReleaseQueue`] tagged with the
//! serial of the submission that last used the object, and the queue runs the
//! closure once the completed serial has moved far enough past it.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_renderer::deferred_release::DeferredReleaseQueue;
//!
//! let mut queue = DeferredReleaseQueue::new(3);
//! queue.enqueue(10, || println!("buffer destroyed"));
//!
//! assert_eq!(queue.collect(12), 0);
//! assert_eq!(queue.collect(13), 1);
//! ```

use std::collections::VecDeque;
use std::fmt;

use tracing::debug;

/// Submission serial. Compared with wrapping arithmetic.
pub type Serial = u32;

/// Ages at or beyond this are treated as serials from the future.
const FUTURE_AGE: Serial = 1 << 31;

/// Returns true when something retired at `retired` may be released once
/// `completed` has finished, given an in-flight `window`.
///
/// The age `completed - retired` is computed modulo 2^32. Ages in
/// `[window, 2^31)` are due; anything else has not aged enough or was
/// retired after `completed`.
#[inline]
pub fn is_due(retired: Serial, completed: Serial, window: Serial) -> bool {
    let age = completed.wrapping_sub(retired);
    age >= window && age < FUTURE_AGE
}

/// Boxed one-shot release action.
pub type ReleaseFn = Box<dyn FnOnce() + Send>;

struct Entry {
    retired: Serial,
    release: ReleaseFn,
}

/// FIFO of release closures keyed by retirement serial.
pub struct DeferredReleaseQueue {
    entries: VecDeque<Entry>,
    window: Serial,
}

impl DeferredReleaseQueue {
    /// Creates a queue that waits `window` serials past retirement.
    ///
    /// A window of zero releases as soon as `completed >= retired`.
    pub fn new(window: Serial) -> Self {
        Self {
            entries: VecDeque::new(),
            window,
        }
    }

    /// Returns the in-flight window.
    #[inline]
    pub fn window(&self) -> Serial {
        self.window
    }

    /// Stores `release` to run once `retired` is old enough.
    pub fn enqueue<F>(&mut self, retired: Serial, release: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.entries.push_back(Entry {
            retired,
            release: Box::new(release),
        });
    }

    /// Runs and removes every due entry, in enqueue order.
    ///
    /// Entries that are not due keep their relative order. Returns how many
    /// closures ran.
    pub fn collect(&mut self, completed: Serial) -> usize {
        let pending = self.entries.len();
        let mut ran = 0;
        for _ in 0..pending {
            let Some(entry) = self.entries.pop_front() else {
                break;
            };
            if is_due(entry.retired, completed, self.window) {
                (entry.release)();
                ran += 1;
            } else {
                self.entries.push_back(entry);
            }
        }
        if ran > 0 {
            debug!(
                "Released {} deferred resource(s) at serial {} ({} pending)",
                ran,
                completed,
                self.entries.len()
            );
        }
        ran
    }

    /// Runs every pending entry now, regardless of serial.
    ///
    /// Only valid once the GPU is idle.
    pub fn clear(&mut self) -> usize {
        let ran = self.entries.len();
        while let Some(entry) = self.entries.pop_front() {
            (entry.release)();
        }
        if ran > 0 {
            debug!("Flushed {} deferred resource(s)", ran);
        }
        ran
    }

    /// Number of pending entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is pending.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for DeferredReleaseQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredReleaseQueue")
            .field("pending", &self.entries.len())
            .field("window", &self.window)
            .finish()
    }
}

impl Drop for DeferredReleaseQueue {
    fn drop(&mut self) {
        self.clear();
    }
}
