use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use eyetribe_protocol::GazeFrame;

/// Outcome of taking a frame off the queue.
#[derive(Debug)]
pub(crate) enum Pop {
    Frame(GazeFrame),
    Empty,
    Closed,
}

/// FIFO of pushed frames shared between the receiver and the caller.
///
/// Once closed, frames already queued can still be drained; after that every
/// pop reports [`Pop::Closed`].
pub(crate) struct FrameQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    capacity: Option<usize>,
}

#[derive(Default)]
struct QueueState {
    frames: VecDeque<GazeFrame>,
    closed: bool,
}

impl FrameQueue {
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            ready: Condvar::new(),
            capacity: capacity.map(|cap| cap.max(1)),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a frame. Returns the number of old frames evicted to make room.
    pub(crate) fn push(&self, frame: GazeFrame) -> usize {
        let mut state = self.state();
        if state.closed {
            return 0;
        }

        let mut evicted = 0;
        if let Some(capacity) = self.capacity {
            while state.frames.len() >= capacity {
                state.frames.pop_front();
                evicted += 1;
            }
        }
        state.frames.push_back(frame);
        drop(state);

        self.ready.notify_one();
        evicted
    }

    /// Take the oldest frame, waiting up to `timeout` for one to arrive.
    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Pop {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        loop {
            if let Some(frame) = state.frames.pop_front() {
                return Pop::Frame(frame);
            }
            if state.closed {
                return Pop::Closed;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Pop::Empty;
            }
            state = self
                .ready
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Take the oldest frame without waiting.
    pub(crate) fn try_pop(&self) -> Pop {
        let mut state = self.state();
        match state.frames.pop_front() {
            Some(frame) => Pop::Frame(frame),
            None if state.closed => Pop::Closed,
            None => Pop::Empty,
        }
    }

    /// Stop accepting frames and wake every waiter.
    pub(crate) fn close(&self) {
        self.state().closed = true;
        self.ready.notify_all();
    }

    pub(crate) fn len(&self) -> usize {
        self.state().frames.len()
    }
}
