use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use eyetribe_protocol::GazeFrame;
use tracing::warn;

use crate::config::SessionConfig;
use crate::pending::PendingTable;
use crate::queue::FrameQueue;

/// Decides whether a pushed frame is queued (`true`) or discarded.
///
/// Runs on the receiver thread; it must not block or call back into the
/// session.
pub type FrameFilter = Arc<dyn Fn(&GazeFrame) -> bool + Send + Sync>;

/// State shared by the caller side of a connection and its receiver thread.
pub(crate) struct Link {
    pub(crate) pending: PendingTable,
    pub(crate) frames: FrameQueue,
    streaming: AtomicBool,
    closed: AtomicBool,
    filter: Mutex<Option<FrameFilter>>,
    rebase: bool,
    origin: Mutex<Option<f64>>,
}

impl Link {
    pub(crate) fn new(config: &SessionConfig) -> Self {
        Self {
            pending: PendingTable::new(),
            frames: FrameQueue::new(config.frame_queue_capacity),
            streaming: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            filter: Mutex::new(None),
            rebase: config.rebase_push_time,
            origin: Mutex::new(None),
        }
    }

    pub(crate) fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Start or stop accepting unsolicited frames.
    ///
    /// Starting also installs `filter` and restarts the `dT` origin.
    pub(crate) fn set_streaming(&self, streaming: bool, filter: Option<FrameFilter>) {
        *lock(&self.filter) = filter;
        if streaming {
            *lock(&self.origin) = None;
        }
        self.streaming.store(streaming, Ordering::Release);
    }

    /// Replace the filter without touching the streaming flag.
    pub(crate) fn replace_filter(&self, filter: FrameFilter) {
        *lock(&self.filter) = Some(filter);
    }

    /// Queue a pushed frame, after optional rebasing and filtering.
    pub(crate) fn accept_frame(&self, frame: GazeFrame) {
        let frame = if self.rebase {
            let origin = *lock(&self.origin).get_or_insert(frame.time());
            frame.rebased(origin)
        } else {
            frame
        };

        let filter = lock(&self.filter).clone();
        if let Some(filter) = filter {
            if !filter(&frame) {
                return;
            }
        }

        let evicted = self.frames.push(frame);
        if evicted > 0 {
            warn!(evicted, "frame queue full, dropped oldest frames");
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the link dead: fail pending requests and close the queue.
    ///
    /// Returns `true` for the call that actually closed it.
    pub(crate) fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        self.streaming.store(false, Ordering::Release);
        self.pending.close();
        self.frames.close();
        first
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
