//! Correlation table for in-flight requests.
//!
//! Slots are keyed by [`RequestId`]. A reply echoing its ID goes to that
//! slot; a reply without one goes to the oldest slot, since the backend
//! answers frames in the order it reads them. A slot whose caller gave up
//! (timeout, cancel) stays in line until its reply arrives and is discarded
//! with it, so later replies still reach their own callers.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use mailagent_core::{InboundFrame, RequestId};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::errors::RealtimeError;

/// Outcome delivered to a waiting request.
pub(crate) type Reply = Result<InboundFrame, RealtimeError>;

/// Sender half held by the table.
pub(crate) type ReplyTx = oneshot::Sender<Reply>;

enum Slot {
    Live(ReplyTx),
    /// The caller gave up. Kept in wire order so the reply it is still owed
    /// is consumed here instead of reaching the next caller.
    Abandoned,
}

impl Slot {
    fn into_live(self) -> Option<ReplyTx> {
        match self {
            Self::Live(tx) if !tx.is_closed() => Some(tx),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Slots {
    by_id: HashMap<RequestId, Slot>,
    order: VecDeque<RequestId>,
}

impl Slots {
    /// Claim the slot a reply belongs to. `None` when the reply is owed to
    /// an abandoned slot (which is consumed) or nobody at all.
    fn take(&mut self, id: Option<&RequestId>) -> Option<ReplyTx> {
        if let Some(id) = id {
            let slot = self.by_id.remove(id)?;
            self.order.retain(|queued| queued != id);
            return slot.into_live();
        }
        while let Some(oldest) = self.order.pop_front() {
            if let Some(slot) = self.by_id.remove(&oldest) {
                return slot.into_live();
            }
        }
        None
    }
}

/// Pending requests awaiting their reply.
#[derive(Default)]
pub(crate) struct PendingTable {
    slots: Mutex<Slots>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a slot, in wire order.
    pub(crate) fn insert(&self, id: RequestId, tx: ReplyTx) {
        let mut slots = self.slots.lock();
        slots.order.push_back(id.clone());
        let _ = slots.by_id.insert(id, Slot::Live(tx));
    }

    /// Deliver a decoded reply. Returns `false` if nobody was waiting.
    pub(crate) fn resolve(&self, frame: InboundFrame) -> bool {
        let tx = self.slots.lock().take(frame.request_id.as_ref());
        tx.is_some_and(|tx| tx.send(Ok(frame)).is_ok())
    }

    /// Fail the slot for `id`, or the oldest slot when `id` is `None`.
    pub(crate) fn fail(&self, id: Option<&RequestId>, err: RealtimeError) -> bool {
        let tx = self.slots.lock().take(id);
        tx.is_some_and(|tx| tx.send(Err(err)).is_ok())
    }

    /// Fail every live slot and forget abandoned ones. Returns how many
    /// callers were notified.
    pub(crate) fn fail_all(&self, err: &RealtimeError) -> usize {
        let drained: Vec<Slot> = {
            let mut slots = self.slots.lock();
            slots.order.clear();
            slots.by_id.drain().map(|(_, slot)| slot).collect()
        };
        drained
            .into_iter()
            .filter_map(Slot::into_live)
            .map(|tx| tx.send(Err(err.clone())))
            .filter(Result::is_ok)
            .count()
    }

    /// Mark the slot for `id` abandoned. Its reply, when it comes, is
    /// discarded. No-op if the slot was already resolved.
    pub(crate) fn abandon(&self, id: &RequestId) -> bool {
        match self.slots.lock().by_id.get_mut(id) {
            Some(slot) => {
                *slot = Slot::Abandoned;
                true
            }
            None => false,
        }
    }

    /// Live slots; abandoned ones awaiting their reply are not counted.
    pub(crate) fn len(&self) -> usize {
        self.slots
            .lock()
            .by_id
            .values()
            .filter(|slot| matches!(slot, Slot::Live(tx) if !tx.is_closed()))
            .count()
    }
}

/// Abandons a request's slot when the request future is dropped before its
/// reply arrived (timeout, cancel). After a reply the slot is already gone.
pub(crate) struct PendingGuard {
    table: Arc<PendingTable>,
    id: RequestId,
}

impl PendingGuard {
    pub(crate) fn new(table: &Arc<PendingTable>, id: RequestId) -> Self {
        Self {
            table: Arc::clone(table),
            id,
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let _ = self.table.abandon(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn frame(id: Option<&RequestId>, content: &str) -> InboundFrame {
        InboundFrame {
            request_id: id.cloned(),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn resolves_by_id_in_any_order() {
        let table = PendingTable::new();
        let (a, b) = (RequestId::new(), RequestId::new());
        let (a_tx, a_rx) = oneshot::channel();
        let (b_tx, b_rx) = oneshot::channel();
        table.insert(a.clone(), a_tx);
        table.insert(b.clone(), b_tx);

        assert!(table.resolve(frame(Some(&b), "for b")));
        assert!(table.resolve(frame(Some(&a), "for a")));

        assert_eq!(a_rx.await.unwrap().unwrap().content.as_deref(), Some("for a"));
        assert_eq!(b_rx.await.unwrap().unwrap().content.as_deref(), Some("for b"));
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn uncorrelated_replies_are_fifo() {
        let table = PendingTable::new();
        let (a_tx, a_rx) = oneshot::channel();
        let (b_tx, b_rx) = oneshot::channel();
        table.insert(RequestId::new(), a_tx);
        table.insert(RequestId::new(), b_tx);

        assert!(table.resolve(frame(None, "first")));
        assert!(table.resolve(frame(None, "second")));

        assert_eq!(a_rx.await.unwrap().unwrap().content.as_deref(), Some("first"));
        assert_eq!(b_rx.await.unwrap().unwrap().content.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn uncorrelated_reply_for_abandoned_slot_is_discarded() {
        let table = PendingTable::new();
        let a = RequestId::new();
        let (a_tx, _a_rx) = oneshot::channel();
        let (b_tx, b_rx) = oneshot::channel();
        table.insert(a.clone(), a_tx);
        table.insert(RequestId::new(), b_tx);
        assert!(table.abandon(&a));
        assert_eq!(table.len(), 1);

        assert!(!table.resolve(frame(None, "late for a")));
        assert!(table.resolve(frame(None, "for b")));
        assert_eq!(b_rx.await.unwrap().unwrap().content.as_deref(), Some("for b"));
        assert!(table.slots.lock().order.is_empty());
    }

    #[tokio::test]
    async fn closed_receiver_still_holds_its_place() {
        let table = PendingTable::new();
        let (a_tx, a_rx) = oneshot::channel();
        let (b_tx, b_rx) = oneshot::channel();
        table.insert(RequestId::new(), a_tx);
        table.insert(RequestId::new(), b_tx);
        drop(a_rx);

        assert!(!table.resolve(frame(None, "late for a")));
        assert!(table.resolve(frame(None, "for b")));
        assert_eq!(b_rx.await.unwrap().unwrap().content.as_deref(), Some("for b"));
    }

    #[tokio::test]
    async fn correlated_reply_clears_abandoned_slot() {
        let table = PendingTable::new();
        let a = RequestId::new();
        let (a_tx, _a_rx) = oneshot::channel();
        let (b_tx, b_rx) = oneshot::channel();
        table.insert(a.clone(), a_tx);
        table.insert(RequestId::new(), b_tx);
        assert!(table.abandon(&a));

        assert!(!table.resolve(frame(Some(&a), "late for a")));
        assert!(table.resolve(frame(None, "for b")));
        assert_eq!(b_rx.await.unwrap().unwrap().content.as_deref(), Some("for b"));
    }

    #[tokio::test]
    async fn malformed_uncorrelated_frame_consumes_abandoned_slot() {
        let table = PendingTable::new();
        let a = RequestId::new();
        let (a_tx, _a_rx) = oneshot::channel();
        let (b_tx, b_rx) = oneshot::channel();
        table.insert(a.clone(), a_tx);
        table.insert(RequestId::new(), b_tx);
        assert!(table.abandon(&a));

        assert!(!table.fail(None, RealtimeError::Decode("bad".into())));
        assert_eq!(table.len(), 1);
        assert!(table.resolve(frame(None, "for b")));
        assert!(b_rx.await.unwrap().is_ok());
    }

    #[test]
    fn fail_all_forgets_abandoned_slots() {
        let table = PendingTable::new();
        let a = RequestId::new();
        let (a_tx, _a_rx) = oneshot::channel();
        table.insert(a.clone(), a_tx);
        assert!(table.abandon(&a));

        assert_eq!(table.fail_all(&RealtimeError::ConnectionClosed), 0);
        let slots = table.slots.lock();
        assert!(slots.by_id.is_empty());
        assert!(slots.order.is_empty());
    }

    #[test]
    fn unknown_id_is_dropped() {
        let table = PendingTable::new();
        let (tx, _rx) = oneshot::channel();
        table.insert(RequestId::new(), tx);
        assert!(!table.resolve(frame(Some(&RequestId::new()), "stray")));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn fail_all_notifies_everyone() {
        let table = PendingTable::new();
        let (a_tx, a_rx) = oneshot::channel();
        let (b_tx, b_rx) = oneshot::channel();
        table.insert(RequestId::new(), a_tx);
        table.insert(RequestId::new(), b_tx);

        assert_eq!(table.fail_all(&RealtimeError::ConnectionClosed), 2);
        assert_matches!(a_rx.await.unwrap(), Err(RealtimeError::ConnectionClosed));
        assert_matches!(b_rx.await.unwrap(), Err(RealtimeError::ConnectionClosed));
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn fail_targets_oldest_without_id() {
        let table = PendingTable::new();
        let (a_tx, a_rx) = oneshot::channel();
        let (b_tx, _b_rx) = oneshot::channel();
        table.insert(RequestId::new(), a_tx);
        table.insert(RequestId::new(), b_tx);

        assert!(table.fail(None, RealtimeError::Decode("bad".into())));
        assert_matches!(a_rx.await.unwrap(), Err(RealtimeError::Decode(_)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn guard_abandons_unanswered_slot() {
        let table = Arc::new(PendingTable::new());
        let id = RequestId::new();
        let (tx, _rx) = oneshot::channel();
        table.insert(id.clone(), tx);
        {
            let _guard = PendingGuard::new(&table, id.clone());
            assert_eq!(table.len(), 1);
        }
        assert_eq!(table.len(), 0);
        assert!(matches!(table.slots.lock().by_id.get(&id), Some(Slot::Abandoned)));
    }

    #[test]
    fn guard_after_reply_is_noop() {
        let table = Arc::new(PendingTable::new());
        let id = RequestId::new();
        let (tx, _rx) = oneshot::channel();
        table.insert(id.clone(), tx);
        let guard = PendingGuard::new(&table, id.clone());
        assert!(table.resolve(frame(Some(&id), "done")));
        drop(guard);
        assert!(table.slots.lock().by_id.is_empty());
    }
}
