//! Connections to cluster nodes.
//!
//! [`CqlTransport`] is the request/response view of a single node connection used by pools,
//! the control connection and sessions. [`RequestConnection`] is the default implementation,
//! multiplexing concurrent requests over one [`DuplexConnection`] by stream id. TLS is available
//! with the `rust-tls` feature.
use std::net::SocketAddr;
use std::sync::Arc;

use cql_protocol::authenticators::{SaslAuthenticator, SaslAuthenticatorProvider};
use cql_protocol::frame::events::ServerEvent;
use cql_protocol::frame::message_response::ResponseBody;
use cql_protocol::frame::{Frame, Opcode, Version, EVENT_STREAM_ID};
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
#[cfg(feature = "rust-tls")]
use tokio_rustls::TlsConnector as RustlsConnector;
use tracing::*;

use crate::cluster::Endpoint;
use crate::frame_parser::parse_frame;
use crate::future::BoxFuture;
use crate::{Error, Result};

pub mod duplex;
pub mod stream_table;

use duplex::{ConnectionReader, ConnectionReceiver, DuplexConnection};
use stream_table::{StreamGuard, StreamTable};

/// General transport trait for node connections.
pub trait CqlTransport: Send + Sync {
    /// Sends a request and waits for its response. Server error responses are returned as
    /// [`Error::Server`].
    fn send_and_receive(&self, frame: Frame) -> BoxFuture<'_, Result<Frame>>;

    /// Number of requests waiting for responses.
    fn inflight(&self) -> usize;

    fn is_closed(&self) -> bool;

    /// Resolves when the connection closes.
    fn closed(&self) -> BoxFuture<'_, ()>;

    fn close(&self) -> Result<()>;

    /// Returns associated node address
    fn address(&self) -> SocketAddr;

    /// Protocol version negotiated for this connection.
    fn version(&self) -> Version;
}

struct RequestState {
    address: SocketAddr,
    streams: StreamTable,
    event_handler: Option<mpsc::Sender<ServerEvent>>,
}

impl RequestState {
    /// Forwards a server event without waiting on the consumer, so responses queued behind it
    /// keep flowing. Events which do not fit into the channel are dropped.
    fn handle_event(&self, frame: Frame) {
        let Some(event_handler) = &self.event_handler else {
            return;
        };

        match frame
            .response_body()
            .map(|body| body.into_server_event().map(|event| event.event))
        {
            Ok(Some(event)) => match event_handler.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    warn!(address = %self.address, ?event, "Event consumer lagging - dropping server event.")
                }
                Err(TrySendError::Closed(_)) => {}
            },
            Ok(None) => {
                warn!(address = %self.address, opcode = %frame.opcode, "Unexpected message on event stream.")
            }
            Err(error) => warn!(address = %self.address, %error, "Error decoding server event."),
        }
    }
}

impl ConnectionReceiver for RequestState {
    fn receive<'a>(&'a self, reader: &'a mut ConnectionReader) -> BoxFuture<'a, Result<()>> {
        async move {
            let frame = parse_frame(reader).await?;

            if frame.stream == EVENT_STREAM_ID {
                self.handle_event(frame);
                return Ok(());
            }

            // unmatched stream - probably a bug somewhere
            let handler = self.streams.load_and_delete(frame.stream)?;
            let _ = handler.send(Ok(frame));

            Ok(())
        }
        .boxed()
    }

    fn closing(&self, error: Error) {
        let count = self.streams.closing(error);
        if count > 0 {
            debug!(address = %self.address, count, "Failed pending requests of closed connection.");
        }
    }
}

/// Multiplexed request/response connection to a single node.
pub struct RequestConnection {
    duplex: DuplexConnection,
    state: Arc<RequestState>,
    version: Version,
}

impl RequestConnection {
    /// Wraps an already established stream. Server events, if any, are forwarded to
    /// `event_handler`.
    pub fn new<S>(
        stream: S,
        address: SocketAddr,
        version: Version,
        event_handler: Option<mpsc::Sender<ServerEvent>>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let state = Arc::new(RequestState {
            address,
            streams: StreamTable::new(version),
            event_handler,
        });

        RequestConnection {
            duplex: DuplexConnection::new(stream, address, state.clone()),
            state,
            version,
        }
    }

    /// Opens a TCP (or TLS) connection to given endpoint. No messages are exchanged yet.
    pub async fn connect(
        endpoint: &Endpoint,
        version: Version,
        event_handler: Option<mpsc::Sender<ServerEvent>>,
    ) -> Result<Self> {
        let address = endpoint.address();
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;

        #[cfg(feature = "rust-tls")]
        if let Some(tls) = endpoint.tls() {
            let connector = RustlsConnector::from(tls.config.clone());
            let stream = connector.connect(tls.server_name.clone(), stream).await?;
            return Ok(Self::new(stream, address, version, event_handler));
        }

        Ok(Self::new(stream, address, version, event_handler))
    }

    /// Performs STARTUP and, if requested by the server, SASL authentication. A server which
    /// does not speak our version makes this fail with [`Error::UnsupportedVersion`].
    pub async fn handshake(
        &self,
        authenticator_provider: Option<&(dyn SaslAuthenticatorProvider + Send + Sync)>,
    ) -> Result<()> {
        let response = match self.send(Frame::new_req_startup(self.version)).await {
            Err(Error::Server { body, .. }) if body.is_unsupported_protocol_version() => {
                return Err(Error::UnsupportedVersion(self.version));
            }
            result => result?,
        };

        match response.opcode {
            Opcode::Ready => Ok(()),
            Opcode::Authenticate => {
                let body = response.response_body()?;
                let authenticator = body
                    .authenticator()
                    .ok_or(Error::UnexpectedStartupResponse(Opcode::Authenticate))?;

                let provider = authenticator_provider
                    .ok_or_else(|| Error::MissingAuthenticator(authenticator.to_string()))?;

                self.authenticate(provider.create_authenticator(), authenticator)
                    .await
            }
            opcode => Err(Error::UnexpectedStartupResponse(opcode)),
        }
    }

    async fn authenticate(
        &self,
        mut authenticator: Box<dyn SaslAuthenticator + Send>,
        authenticator_name: &str,
    ) -> Result<()> {
        let mut token = authenticator.initial_response(authenticator_name)?;

        loop {
            let response = self
                .send(Frame::new_req_auth_response(token, self.version))
                .await?;

            match response.response_body()? {
                ResponseBody::AuthChallenge(challenge) => {
                    token = authenticator.evaluate_challenge(challenge.data)?;
                }
                ResponseBody::AuthSuccess(success) => {
                    return authenticator.handle_success(success.data);
                }
                body => return Err(Error::UnexpectedAuthResponse(body.opcode())),
            }
        }
    }

    async fn send(&self, mut frame: Frame) -> Result<Frame> {
        let (sender, receiver) = oneshot::channel();
        let stream_id = self.state.streams.store(sender)?;
        let guard = StreamGuard::new(&self.state.streams, stream_id);

        frame.stream = stream_id;
        self.duplex.write(frame).await?;
        guard.disarm();

        let response = receiver.await.map_err(|_| {
            Error::ConnectionClosed("Connection closed while waiting for response!".into())
        })??;

        if response.opcode == Opcode::Error {
            let body = response
                .response_body()?
                .into_error()
                .ok_or_else(|| Error::General("Error opcode without error body!".into()))?;

            return Err(Error::Server {
                body,
                addr: self.state.address,
            });
        }

        Ok(response)
    }
}

impl CqlTransport for RequestConnection {
    #[inline]
    fn send_and_receive(&self, frame: Frame) -> BoxFuture<'_, Result<Frame>> {
        self.send(frame).boxed()
    }

    #[inline]
    fn inflight(&self) -> usize {
        self.state.streams.inflight()
    }

    #[inline]
    fn is_closed(&self) -> bool {
        self.duplex.is_closed()
    }

    fn closed(&self) -> BoxFuture<'_, ()> {
        self.duplex.closed().boxed()
    }

    #[inline]
    fn close(&self) -> Result<()> {
        self.duplex.close()
    }

    #[inline]
    fn address(&self) -> SocketAddr {
        self.state.address
    }

    #[inline]
    fn version(&self) -> Version {
        self.version
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::watch;

    use super::*;

    type Responder = Box<dyn Fn(&Frame) -> Result<ResponseBody> + Send + Sync>;

    /// In-memory transport answering requests with a closure.
    pub struct FakeTransport {
        address: SocketAddr,
        version: Version,
        closed: Arc<watch::Sender<bool>>,
        pub inflight: AtomicUsize,
        responder: Responder,
    }

    impl FakeTransport {
        pub fn new(
            address: SocketAddr,
            version: Version,
            responder: impl Fn(&Frame) -> Result<ResponseBody> + Send + Sync + 'static,
        ) -> Self {
            FakeTransport {
                address,
                version,
                closed: Arc::new(watch::channel(false).0),
                inflight: AtomicUsize::new(0),
                responder: Box::new(responder),
            }
        }

        pub fn ready(address: SocketAddr, version: Version) -> Self {
            Self::new(address, version, |_| Ok(ResponseBody::Ready))
        }

        pub fn with_inflight(self, inflight: usize) -> Self {
            self.inflight.store(inflight, Ordering::Relaxed);
            self
        }

        /// Allows closing the transport after it has been moved away.
        pub fn close_handle(&self) -> Arc<watch::Sender<bool>> {
            self.closed.clone()
        }
    }

    impl CqlTransport for FakeTransport {
        fn send_and_receive(&self, frame: Frame) -> BoxFuture<'_, Result<Frame>> {
            async move {
                if self.is_closed() {
                    return Err(Error::ConnectionClosed("fake closed".into()));
                }

                match (self.responder)(&frame)? {
                    ResponseBody::Error(body) => Err(Error::Server {
                        body,
                        addr: self.address,
                    }),
                    body => Ok(Frame::new_response(self.version, frame.stream, &body)),
                }
            }
            .boxed()
        }

        fn inflight(&self) -> usize {
            self.inflight.load(Ordering::Relaxed)
        }

        fn is_closed(&self) -> bool {
            *self.closed.borrow()
        }

        fn closed(&self) -> BoxFuture<'_, ()> {
            let mut closed = self.closed.subscribe();
            async move {
                let _ = closed.wait_for(|closed| *closed).await;
            }
            .boxed()
        }

        fn close(&self) -> Result<()> {
            if self.closed.send_replace(true) {
                Err(Error::AlreadyClosed)
            } else {
                Ok(())
            }
        }

        fn address(&self) -> SocketAddr {
            self.address
        }

        fn version(&self) -> Version {
            self.version
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cql_protocol::authenticators::StaticPasswordAuthenticatorProvider;
    use cql_protocol::frame::message_auth_challenge::BodyResAuthChallenge;
    use cql_protocol::frame::message_auth_success::BodyResAuthSuccess;
    use cql_protocol::frame::message_authenticate::BodyResAuthenticate;
    use cql_protocol::frame::message_error::{AdditionalErrorInfo, ErrorBody};
    use cql_protocol::frame::message_event::BodyResEvent;
    use cql_protocol::frame::events::{StatusChange, StatusChangeType};
    use cql_protocol::authenticators::DSE_AUTHENTICATOR;
    use cql_protocol::types::CBytes;
    use tokio::io::{duplex, split, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    use super::*;

    fn address() -> SocketAddr {
        "127.0.0.1:9042".parse().unwrap()
    }

    struct Peer {
        reader: ReadHalf<DuplexStream>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Peer {
        async fn read(&mut self) -> Frame {
            parse_frame(&mut self.reader).await.unwrap()
        }

        async fn reply(&mut self, request: &Frame, body: ResponseBody) {
            self.send(Frame::new_response(request.version, request.stream, &body))
                .await;
        }

        async fn send(&mut self, frame: Frame) {
            self.writer.write_all(&frame.encode()).await.unwrap();
        }
    }

    fn connection(
        version: Version,
        event_handler: Option<mpsc::Sender<ServerEvent>>,
    ) -> (RequestConnection, Peer) {
        let (local, remote) = duplex(64 * 1024);
        let (reader, writer) = split(remote);
        (
            RequestConnection::new(local, address(), version, event_handler),
            Peer { reader, writer },
        )
    }

    #[tokio::test]
    async fn should_match_out_of_order_responses() {
        let (connection, mut peer) = connection(Version::V4, None);
        let connection = Arc::new(connection);

        let first = tokio::spawn({
            let connection = connection.clone();
            async move { connection.send_and_receive(Frame::new_req_options(Version::V4)).await }
        });
        let first_request = peer.read().await;

        let second = tokio::spawn({
            let connection = connection.clone();
            async move { connection.send_and_receive(Frame::new_req_options(Version::V4)).await }
        });
        let second_request = peer.read().await;

        assert_ne!(first_request.stream, second_request.stream);
        assert_eq!(connection.inflight(), 2);

        peer.reply(&second_request, ResponseBody::Ready).await;
        assert_eq!(
            second.await.unwrap().unwrap().stream,
            second_request.stream
        );

        peer.reply(
            &first_request,
            ResponseBody::Error(ErrorBody::new("boom", AdditionalErrorInfo::Overloaded)),
        )
        .await;
        assert!(matches!(
            first.await.unwrap(),
            Err(Error::Server { body, addr }) if body.message == "boom" && addr == address()
        ));

        assert_eq!(connection.inflight(), 0);
    }

    #[tokio::test]
    async fn should_forward_events() {
        let (sender, mut receiver) = mpsc::channel(4);
        let (_connection, mut peer) = connection(Version::V4, Some(sender));

        let event = ServerEvent::StatusChange(StatusChange {
            change_type: StatusChangeType::Up,
            addr: address(),
        });

        peer.send(Frame::new_response(
            Version::V4,
            EVENT_STREAM_ID,
            &ResponseBody::Event(BodyResEvent {
                event: event.clone(),
            }),
        ))
        .await;

        assert_eq!(receiver.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn should_deliver_responses_past_undrained_events() {
        let (sender, mut receiver) = mpsc::channel(1);
        let (connection, mut peer) = connection(Version::V4, Some(sender));
        let connection = Arc::new(connection);

        let request = tokio::spawn({
            let connection = connection.clone();
            async move { connection.send_and_receive(Frame::new_req_options(Version::V4)).await }
        });
        let options = peer.read().await;

        for port in [9043, 9044, 9045] {
            peer.send(Frame::new_response(
                Version::V4,
                EVENT_STREAM_ID,
                &ResponseBody::Event(BodyResEvent {
                    event: ServerEvent::StatusChange(StatusChange {
                        change_type: StatusChangeType::Up,
                        addr: SocketAddr::from(([127, 0, 0, 1], port)),
                    }),
                }),
            ))
            .await;
        }
        peer.reply(&options, ResponseBody::Ready).await;

        let response = tokio::time::timeout(Duration::from_secs(5), request)
            .await
            .expect("response stuck behind events")
            .unwrap()
            .unwrap();
        assert_eq!(response.opcode, Opcode::Ready);

        // only the first event fit into the channel
        match receiver.recv().await.unwrap() {
            ServerEvent::StatusChange(change) => assert_eq!(change.addr.port(), 9043),
            event => panic!("unexpected event {event:?}"),
        }
        assert!(receiver.try_recv().is_err());
        assert!(!connection.is_closed());
    }

    #[tokio::test]
    async fn should_fail_pending_requests_on_close() {
        let (connection, mut peer) = connection(Version::V3, None);
        let connection = Arc::new(connection);

        let request = tokio::spawn({
            let connection = connection.clone();
            async move { connection.send_and_receive(Frame::new_req_options(Version::V3)).await }
        });
        peer.read().await;

        drop(peer);

        let result = tokio::time::timeout(Duration::from_secs(5), request)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_err());
        assert!(connection.is_closed());
        assert!(connection
            .send_and_receive(Frame::new_req_options(Version::V3))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn should_report_unsupported_version() {
        let (connection, mut peer) = connection(Version::V4, None);

        let server = tokio::spawn(async move {
            let startup = peer.read().await;
            peer.reply(
                &startup,
                ResponseBody::Error(ErrorBody::new(
                    "Invalid or unsupported protocol version (4); supported versions are (3/v3)",
                    AdditionalErrorInfo::Protocol,
                )),
            )
            .await;
            peer
        });

        assert!(matches!(
            connection.handshake(None).await,
            Err(Error::UnsupportedVersion(Version::V4))
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn should_require_authenticator() {
        let (connection, mut peer) = connection(Version::V4, None);

        let server = tokio::spawn(async move {
            let startup = peer.read().await;
            peer.reply(
                &startup,
                ResponseBody::Authenticate(BodyResAuthenticate {
                    data: "org.apache.cassandra.auth.PasswordAuthenticator".into(),
                }),
            )
            .await;
            peer
        });

        assert!(matches!(
            connection.handshake(None).await,
            Err(Error::MissingAuthenticator(name)) if name.ends_with("PasswordAuthenticator")
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn should_authenticate_with_dse_plain() {
        let (connection, mut peer) = connection(Version::Dse1, None);

        let server = tokio::spawn(async move {
            let startup = peer.read().await;
            assert_eq!(startup.opcode, Opcode::Startup);
            peer.reply(
                &startup,
                ResponseBody::Authenticate(BodyResAuthenticate {
                    data: DSE_AUTHENTICATOR.into(),
                }),
            )
            .await;

            let mechanism = peer.read().await;
            assert_eq!(mechanism.opcode, Opcode::AuthResponse);
            peer.reply(
                &mechanism,
                ResponseBody::AuthChallenge(BodyResAuthChallenge {
                    data: CBytes::new(b"PLAIN-START".to_vec()),
                }),
            )
            .await;

            let credentials = peer.read().await;
            assert!(credentials.body.ends_with(b"\0user\0secret"));
            peer.reply(
                &credentials,
                ResponseBody::AuthSuccess(BodyResAuthSuccess {
                    data: CBytes::new_empty(),
                }),
            )
            .await;
            peer
        });

        let provider = StaticPasswordAuthenticatorProvider::new("user", "secret");
        connection.handshake(Some(&provider)).await.unwrap();
        server.await.unwrap();
    }
}
