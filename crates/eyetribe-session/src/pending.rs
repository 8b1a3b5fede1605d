use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Mutex, MutexGuard, PoisonError};

use eyetribe_protocol::{is_notice, MessageKind, ProtocolMessage, Request};

use crate::error::{Result, SessionError};

/// Requests awaiting a reply, keyed by correlation id.
///
/// Each slot owns the sending half of a one-shot handoff; the caller blocks on
/// the receiving half. Closing the table drops every sender, so waiters wake
/// with a disconnect instead of waiting for their timeout.
pub(crate) struct PendingTable {
    inner: Mutex<Slots>,
}

#[derive(Default)]
struct Slots {
    by_id: HashMap<u64, Slot>,
    closed: bool,
}

struct Slot {
    category: &'static str,
    verb: &'static str,
    handshake: bool,
    expects_frame: bool,
    reply: SyncSender<ProtocolMessage>,
}

impl Slot {
    fn answers(&self, msg: &ProtocolMessage, verb: &str) -> bool {
        !is_notice(msg.status)
            && self.category == msg.category
            && self.verb == verb
            && (msg.kind == MessageKind::Error || self.expects_frame == msg.is_frame_bearing())
    }
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Slots::default()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve a slot for `request` before it is written.
    pub(crate) fn register(&self, request: &Request) -> Result<Receiver<ProtocolMessage>> {
        let mut slots = self.slots();
        if slots.closed {
            return Err(SessionError::ConnectionClosed);
        }

        let (tx, rx) = mpsc::sync_channel(1);
        slots.by_id.insert(
            request.id(),
            Slot {
                category: request.category(),
                verb: request.verb(),
                handshake: request.kind() == MessageKind::HandshakeRequest,
                expects_frame: request.expects_frame(),
                reply: tx,
            },
        );
        Ok(rx)
    }

    /// Forget a request whose caller gave up (timeout or failed write).
    pub(crate) fn cancel(&self, id: u64) {
        self.slots().by_id.remove(&id);
    }

    /// Hand `msg` to the request it answers.
    ///
    /// An echoed id selects the slot directly. Without one, the oldest
    /// outstanding request with the same category and verb wins, provided the
    /// message carries a frame exactly when the request asked for one.
    /// Unmatched messages are handed back.
    pub(crate) fn resolve(&self, msg: ProtocolMessage) -> std::result::Result<(), ProtocolMessage> {
        let mut slots = self.slots();

        let id = match (msg.id, msg.request.as_deref()) {
            (Some(id), _) => slots.by_id.contains_key(&id).then_some(id),
            (None, Some(verb)) => slots
                .by_id
                .iter()
                .filter(|(_, slot)| slot.answers(&msg, verb))
                .map(|(id, _)| *id)
                .min(),
            (None, None) => None,
        };

        let Some(slot) = id.and_then(|id| slots.by_id.remove(&id)) else {
            return Err(msg);
        };
        drop(slots);

        let msg = if slot.handshake && msg.kind == MessageKind::Reply {
            msg.with_kind(MessageKind::HandshakeReply)
        } else {
            msg
        };
        // The receiver is gone only if the caller already timed out.
        let _ = slot.reply.try_send(msg);
        Ok(())
    }

    /// Fail every outstanding request and refuse new ones.
    pub(crate) fn close(&self) {
        let mut slots = self.slots();
        slots.closed = true;
        slots.by_id.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.slots().by_id.len()
    }
}
