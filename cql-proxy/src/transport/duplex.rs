use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use cql_protocol::frame::Frame;
use tokio::io::{split, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::*;

use crate::future::BoxFuture;
use crate::{Error, Result};

/// Number of requests which can wait for the writer before callers get suspended.
pub const WRITE_QUEUE_CAPACITY: usize = 1024;
/// Queued requests are coalesced into a single write until the buffer reaches this size.
pub const COALESCE_BUFFER_LIMIT: usize = 16 * 1024;

/// Something which can serialize itself into the outgoing buffer.
pub trait FrameSender: Send {
    fn send(&self, buffer: &mut Vec<u8>);
}

impl FrameSender for Frame {
    #[inline]
    fn send(&self, buffer: &mut Vec<u8>) {
        self.encode_into(buffer);
    }
}

pub type ConnectionReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;

/// Consumer of the incoming side of a connection.
pub trait ConnectionReceiver: Send + Sync {
    /// Reads and handles a single message. An error closes the connection.
    fn receive<'a>(&'a self, reader: &'a mut ConnectionReader) -> BoxFuture<'a, Result<()>>;

    /// Called exactly once, when the connection closes for any reason.
    fn closing(&self, error: Error);
}

struct ConnectionState {
    address: SocketAddr,
    error: Mutex<Option<Error>>,
    closed: watch::Sender<bool>,
    receiver: Arc<dyn ConnectionReceiver>,
}

impl ConnectionState {
    /// Returns false if the connection was already closed.
    fn close_with(&self, error: Error) -> bool {
        {
            let mut current = self.error.lock().unwrap_or_else(PoisonError::into_inner);
            if current.is_some() {
                return false;
            }

            *current = Some(error.clone());
        }

        debug!(address = %self.address, %error, "Closing connection.");

        self.closed.send_replace(true);
        self.receiver.closing(error);

        true
    }

    fn error(&self) -> Option<Error> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A full duplex connection: a writer task draining a bounded queue of outgoing requests and
/// a reader task feeding a [`ConnectionReceiver`]. Both stop when the connection closes, which
/// happens at most once.
pub struct DuplexConnection {
    address: SocketAddr,
    writes: mpsc::Sender<Box<dyn FrameSender>>,
    state: Arc<ConnectionState>,
    writer_handle: JoinHandle<()>,
    reader_handle: JoinHandle<()>,
}

impl DuplexConnection {
    pub fn new<S>(stream: S, address: SocketAddr, receiver: Arc<dyn ConnectionReceiver>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = split(stream);
        let (writes, write_receiver) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let (closed, _) = watch::channel(false);

        let state = Arc::new(ConnectionState {
            address,
            error: Mutex::new(None),
            closed,
            receiver,
        });

        let reader: ConnectionReader = BufReader::new(Box::new(read_half));

        let writer_handle = tokio::spawn(Self::start_writing(
            write_half,
            write_receiver,
            state.clone(),
        ));
        let reader_handle = tokio::spawn(Self::start_reading(reader, state.clone()));

        DuplexConnection {
            address,
            writes,
            state,
            writer_handle,
            reader_handle,
        }
    }

    #[inline]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Queues a request for writing. Fails fast once the connection is closed.
    pub async fn write<F: FrameSender + 'static>(&self, request: F) -> Result<()> {
        if let Some(error) = self.state.error() {
            return Err(error);
        }

        let mut closed = self.state.closed.subscribe();
        tokio::select! {
            result = self.writes.send(Box::new(request)) => result
                .map_err(|_| Error::ConnectionClosed("Connection writer stopped".into())),
            _ = closed.wait_for(|closed| *closed) => {
                Err(self.state.error().unwrap_or(Error::AlreadyClosed))
            }
        }
    }

    /// Closes the connection. Closing twice yields [`Error::AlreadyClosed`].
    pub fn close(&self) -> Result<()> {
        if self
            .state
            .close_with(Error::ConnectionClosed("Closed by client".into()))
        {
            Ok(())
        } else {
            Err(Error::AlreadyClosed)
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        *self.state.closed.borrow()
    }

    /// The reason the connection closed, if it did.
    #[inline]
    pub fn error(&self) -> Option<Error> {
        self.state.error()
    }

    /// Resolves when the connection closes.
    pub async fn closed(&self) {
        let mut closed = self.state.closed.subscribe();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    async fn start_writing<W: AsyncWrite + Unpin>(
        mut write_half: W,
        mut write_receiver: mpsc::Receiver<Box<dyn FrameSender>>,
        state: Arc<ConnectionState>,
    ) {
        let mut closed = state.closed.subscribe();
        let mut buffer = Vec::with_capacity(COALESCE_BUFFER_LIMIT);

        loop {
            let request = tokio::select! {
                request = write_receiver.recv() => request,
                _ = closed.wait_for(|closed| *closed) => return,
            };

            let Some(request) = request else {
                return;
            };

            buffer.clear();
            request.send(&mut buffer);

            while buffer.len() < COALESCE_BUFFER_LIMIT {
                match write_receiver.try_recv() {
                    Ok(request) => request.send(&mut buffer),
                    Err(_) => break,
                }
            }

            let result = match write_half.write_all(&buffer).await {
                Ok(_) => write_half.flush().await,
                Err(error) => Err(error),
            };

            if let Err(error) = result {
                error!(address = %state.address, %error, "Error writing to connection!");
                state.close_with(error.into());
                return;
            }
        }
    }

    async fn start_reading(mut reader: ConnectionReader, state: Arc<ConnectionState>) {
        let mut closed = state.closed.subscribe();

        loop {
            let result = tokio::select! {
                result = state.receiver.receive(&mut reader) => result,
                _ = closed.wait_for(|closed| *closed) => return,
            };

            if let Err(error) = result {
                debug!(address = %state.address, %error, "Connection read loop finished.");
                state.close_with(error);
                return;
            }
        }
    }
}

impl Drop for DuplexConnection {
    fn drop(&mut self) {
        self.state
            .close_with(Error::ConnectionClosed("Connection dropped".into()));

        self.writer_handle.abort();
        self.reader_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cql_protocol::frame::message_response::ResponseBody;
    use cql_protocol::frame::Version;
    use futures::FutureExt;
    use tokio::io::{duplex, AsyncReadExt};

    use super::*;
    use crate::frame_parser::parse_frame;

    #[derive(Default)]
    struct CollectingReceiver {
        frames: Mutex<Vec<Frame>>,
        closing: Mutex<Vec<Error>>,
    }

    impl ConnectionReceiver for CollectingReceiver {
        fn receive<'a>(&'a self, reader: &'a mut ConnectionReader) -> BoxFuture<'a, Result<()>> {
            async move {
                let frame = parse_frame(reader).await?;
                self.frames.lock().unwrap().push(frame);
                Ok(())
            }
            .boxed()
        }

        fn closing(&self, error: Error) {
            self.closing.lock().unwrap().push(error);
        }
    }

    fn address() -> SocketAddr {
        "127.0.0.1:9042".parse().unwrap()
    }

    #[tokio::test]
    async fn should_write_queued_frames_in_order() {
        let (local, mut remote) = duplex(64 * 1024);
        let receiver = Arc::new(CollectingReceiver::default());
        let connection = DuplexConnection::new(local, address(), receiver.clone());

        for stream in 0..3 {
            let mut frame = Frame::new_req_options(Version::V4);
            frame.stream = stream;
            connection.write(frame).await.unwrap();
        }

        for stream in 0..3 {
            let frame = parse_frame(&mut remote).await.unwrap();
            assert_eq!(frame.stream, stream);
        }

        remote
            .write_all(&Frame::new_response(Version::V4, 7, &ResponseBody::Ready).encode())
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while receiver.frames.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(receiver.frames.lock().unwrap()[0].stream, 7);
        assert!(!connection.is_closed());
    }

    #[tokio::test]
    async fn should_close_once_when_peer_disconnects() {
        let (local, remote) = duplex(1024);
        let receiver = Arc::new(CollectingReceiver::default());
        let connection = DuplexConnection::new(local, address(), receiver.clone());

        drop(remote);

        tokio::time::timeout(Duration::from_secs(5), connection.closed())
            .await
            .unwrap();

        assert!(connection.is_closed());
        assert!(connection.error().is_some());
        assert!(matches!(connection.close(), Err(Error::AlreadyClosed)));
        assert!(connection.write(Frame::new_req_options(Version::V4)).await.is_err());
        assert_eq!(receiver.closing.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_close_on_request() {
        let (local, mut remote) = duplex(1024);
        let receiver = Arc::new(CollectingReceiver::default());
        let connection = DuplexConnection::new(local, address(), receiver.clone());

        connection.close().unwrap();
        assert!(connection.is_closed());
        assert!(matches!(connection.close(), Err(Error::AlreadyClosed)));
        assert!(matches!(
            connection.write(Frame::new_req_options(Version::V4)).await,
            Err(Error::ConnectionClosed(_))
        ));

        drop(connection);

        let mut buffer = vec![];
        assert_eq!(remote.read_to_end(&mut buffer).await.unwrap(), 0);
        assert_eq!(receiver.closing.lock().unwrap().len(), 1);
    }
}
