use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use cql_protocol::frame::{Frame, StreamId, Version};
use crossbeam::queue::ArrayQueue;
use fxhash::FxHashMap;
use tokio::sync::oneshot;

use crate::{Error, Result};

/// Upper bound of concurrent requests on a single connection, regardless of the protocol limit.
pub const MAX_STREAMS_PER_CONNECTION: usize = 2048;

pub type ResponseHandler = oneshot::Sender<Result<Frame>>;

#[derive(Default)]
struct PendingRequests {
    handlers: FxHashMap<StreamId, ResponseHandler>,
    closed: Option<Error>,
}

/// Maps in-flight stream ids to their waiting callers. Ids are handed out from a lock-free queue
/// and returned to it once the response arrives, the request is abandoned or the table closes.
pub struct StreamTable {
    free: ArrayQueue<StreamId>,
    pending: Mutex<PendingRequests>,
    inflight: AtomicUsize,
}

impl StreamTable {
    pub fn new(version: Version) -> Self {
        let count = version.max_streams().min(MAX_STREAMS_PER_CONNECTION);
        let free = ArrayQueue::new(count);
        for stream_id in 0..count as StreamId {
            let _ = free.push(stream_id);
        }

        StreamTable {
            free,
            pending: Default::default(),
            inflight: AtomicUsize::new(0),
        }
    }

    /// Reserves a stream id for given handler. Fails with the closing error once the table is
    /// closed, or with [`Error::StreamIdsExhausted`] when all ids are taken.
    pub fn store(&self, handler: ResponseHandler) -> Result<StreamId> {
        let mut pending = self.pending();
        if let Some(error) = &pending.closed {
            return Err(error.clone());
        }

        let stream_id = self.free.pop().ok_or(Error::StreamIdsExhausted)?;

        pending.handlers.insert(stream_id, handler);
        self.inflight.fetch_add(1, Ordering::Relaxed);

        Ok(stream_id)
    }

    /// Removes the handler waiting on given stream and recycles the id.
    pub fn load_and_delete(&self, stream_id: StreamId) -> Result<ResponseHandler> {
        let handler = self
            .pending()
            .handlers
            .remove(&stream_id)
            .ok_or(Error::UnmatchedStreamId(stream_id))?;

        self.release_id(stream_id);
        Ok(handler)
    }

    /// Drops the handler of an abandoned request, e.g. one which could not be written.
    pub fn release(&self, stream_id: StreamId) {
        if self.pending().handlers.remove(&stream_id).is_some() {
            self.release_id(stream_id);
        }
    }

    /// Delivers given error to every pending caller and rejects all further stores. Returns the
    /// number of callers notified.
    pub fn closing(&self, error: Error) -> usize {
        let handlers = {
            let mut pending = self.pending();
            if pending.closed.is_none() {
                pending.closed = Some(error.clone());
            }

            pending.handlers.drain().collect::<Vec<_>>()
        };

        let count = handlers.len();
        for (stream_id, handler) in handlers {
            let _ = handler.send(Err(error.clone()));
            self.release_id(stream_id);
        }

        count
    }

    #[inline]
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Relaxed)
    }

    fn release_id(&self, stream_id: StreamId) {
        // capacity covers every id, so this never overflows
        let _ = self.free.push(stream_id);
        self.inflight.fetch_sub(1, Ordering::Relaxed);
    }

    fn pending(&self) -> MutexGuard<'_, PendingRequests> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases a reserved stream id when a request is abandoned before it reached the wire.
pub struct StreamGuard<'a> {
    table: &'a StreamTable,
    stream_id: StreamId,
    armed: bool,
}

impl<'a> StreamGuard<'a> {
    pub fn new(table: &'a StreamTable, stream_id: StreamId) -> Self {
        StreamGuard {
            table,
            stream_id,
            armed: true,
        }
    }

    /// The request has been handed to the writer; the response path owns the id now.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.table.release(self.stream_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn should_limit_ids_by_version() {
        let table = StreamTable::new(Version::V2);
        let ids = (0..128)
            .map(|_| table.store(oneshot::channel().0).unwrap())
            .collect::<HashSet<_>>();

        assert_eq!(ids.len(), 128);
        assert!(ids.iter().all(|id| (0..128).contains(id)));
        assert!(matches!(
            table.store(oneshot::channel().0),
            Err(Error::StreamIdsExhausted)
        ));
        assert_eq!(table.inflight(), 128);
    }

    #[test]
    fn should_hand_out_unique_ids_concurrently() {
        let table = std::sync::Arc::new(StreamTable::new(Version::V2));
        let workers = (0..4)
            .map(|_| {
                let table = table.clone();
                std::thread::spawn(move || {
                    (0..32)
                        .map(|_| table.store(oneshot::channel().0).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();

        let ids = workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect::<HashSet<_>>();

        assert_eq!(ids.len(), 128);
        assert_eq!(table.inflight(), 128);
        assert!(matches!(
            table.store(oneshot::channel().0),
            Err(Error::StreamIdsExhausted)
        ));
    }

    #[test]
    fn should_cap_ids_per_connection() {
        let table = StreamTable::new(Version::V4);
        for _ in 0..MAX_STREAMS_PER_CONNECTION {
            table.store(oneshot::channel().0).unwrap();
        }

        assert!(matches!(
            table.store(oneshot::channel().0),
            Err(Error::StreamIdsExhausted)
        ));
    }

    #[tokio::test]
    async fn should_recycle_ids() {
        let table = StreamTable::new(Version::V2);
        let (sender, receiver) = oneshot::channel();
        let stream_id = table.store(sender).unwrap();

        let handler = table.load_and_delete(stream_id).unwrap();
        let _ = handler.send(Err(Error::AlreadyClosed));
        assert!(matches!(receiver.await.unwrap(), Err(Error::AlreadyClosed)));
        assert_eq!(table.inflight(), 0);

        assert!(matches!(
            table.load_and_delete(stream_id),
            Err(Error::UnmatchedStreamId(id)) if id == stream_id
        ));

        // all ids are usable again
        for _ in 0..128 {
            table.store(oneshot::channel().0).unwrap();
        }
    }

    #[tokio::test]
    async fn should_fail_pending_and_future_requests_on_close() {
        let table = StreamTable::new(Version::V4);
        let (first, first_receiver) = oneshot::channel();
        let (second, second_receiver) = oneshot::channel();
        table.store(first).unwrap();
        table.store(second).unwrap();

        assert_eq!(table.closing(Error::ConnectionClosed("test".into())), 2);
        assert_eq!(table.inflight(), 0);

        assert!(matches!(first_receiver.await.unwrap(), Err(Error::ConnectionClosed(_))));
        assert!(matches!(second_receiver.await.unwrap(), Err(Error::ConnectionClosed(_))));
        assert!(matches!(
            table.store(oneshot::channel().0),
            Err(Error::ConnectionClosed(reason)) if reason == "test"
        ));

        assert_eq!(table.closing(Error::AlreadyClosed), 0);
    }

    #[test]
    fn should_release_id_from_armed_guard() {
        let table = StreamTable::new(Version::V4);
        let stream_id = table.store(oneshot::channel().0).unwrap();
        drop(StreamGuard::new(&table, stream_id));
        assert_eq!(table.inflight(), 0);

        let stream_id = table.store(oneshot::channel().0).unwrap();
        StreamGuard::new(&table, stream_id).disarm();
        assert_eq!(table.inflight(), 1);
    }
}
