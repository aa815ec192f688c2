use std::sync::Arc;
use std::time::Duration;

use cql_protocol::authenticators::SaslAuthenticatorProvider;
use cql_protocol::consistency::Consistency;
use cql_protocol::frame::events::ServerEvent;
use cql_protocol::frame::{Frame, Version};
use futures::FutureExt;
use tokio::sync::mpsc::Sender;
use tracing::*;

use crate::cluster::Endpoint;
use crate::future::{with_timeout, BoxFuture};
use crate::transport::{CqlTransport, RequestConnection};
use crate::{Error, Result};

/// Manages establishing connections to nodes.
pub trait ConnectionManager<T: CqlTransport>: Send + Sync {
    /// Tries to establish a new, ready to use connection at exactly given protocol version, with
    /// an optional server event handler. A server rejecting the version yields
    /// [`Error::UnsupportedVersion`].
    fn connection<'a>(
        &'a self,
        endpoint: &'a Endpoint,
        version: Version,
        event_handler: Option<Sender<ServerEvent>>,
    ) -> BoxFuture<'a, Result<T>>;
}

/// Creates [`RequestConnection`]s: dials, optionally over TLS, and performs the handshake.
#[derive(Clone, Default)]
pub struct RequestConnectionManager {
    authenticator_provider: Option<Arc<dyn SaslAuthenticatorProvider + Send + Sync>>,
    connect_timeout: Option<Duration>,
}

impl RequestConnectionManager {
    pub fn new(
        authenticator_provider: Option<Arc<dyn SaslAuthenticatorProvider + Send + Sync>>,
        connect_timeout: Option<Duration>,
    ) -> Self {
        RequestConnectionManager {
            authenticator_provider,
            connect_timeout,
        }
    }

    async fn establish_connection(
        &self,
        endpoint: &Endpoint,
        version: Version,
        event_handler: Option<Sender<ServerEvent>>,
    ) -> Result<RequestConnection> {
        let connection = RequestConnection::connect(endpoint, version, event_handler).await?;
        connection
            .handshake(self.authenticator_provider.as_deref())
            .await?;

        Ok(connection)
    }
}

impl ConnectionManager<RequestConnection> for RequestConnectionManager {
    fn connection<'a>(
        &'a self,
        endpoint: &'a Endpoint,
        version: Version,
        event_handler: Option<Sender<ServerEvent>>,
    ) -> BoxFuture<'a, Result<RequestConnection>> {
        with_timeout(
            self.connect_timeout,
            move || format!("Timeout waiting for connection to: {endpoint}"),
            self.establish_connection(endpoint, version, event_handler),
        )
        .boxed()
    }
}

/// Connects at the highest version accepted by the node, stepping down from `max_version`.
/// Every version is tried with a fresh connection, once.
pub async fn negotiate_connection<T: CqlTransport, CM: ConnectionManager<T> + ?Sized>(
    connection_manager: &CM,
    endpoint: &Endpoint,
    max_version: Version,
    event_handler: Option<Sender<ServerEvent>>,
) -> Result<T> {
    let mut version = max_version;

    loop {
        match connection_manager
            .connection(endpoint, version, event_handler.clone())
            .await
        {
            Err(Error::UnsupportedVersion(rejected)) => {
                let downgraded = rejected
                    .downgrade()
                    .ok_or(Error::UnsupportedVersion(rejected))?;

                debug!(%endpoint, %rejected, %downgraded, "Downgrading protocol version.");
                version = downgraded;
            }
            result => return result,
        }
    }
}

/// Sets current keyspace of a connection.
pub async fn set_keyspace<T: CqlTransport + ?Sized>(transport: &T, keyspace: &str) -> Result<()> {
    let frame = Frame::new_req_query(
        format!("USE {}", quote(keyspace)),
        Consistency::One,
        transport.version(),
    );

    transport.send_and_receive(frame).await.map(|_| ())
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::net::SocketAddr;
    use std::sync::Mutex;

    use cql_protocol::frame::message_query::BodyReqQuery;
    use cql_protocol::frame::message_response::ResponseBody;
    use cql_protocol::frame::message_result::ResResultBody;
    use cql_protocol::frame::{FromCursor, Opcode};

    use super::*;
    use crate::transport::fake::FakeTransport;

    /// Accepts only versions up to `max_version` and remembers every attempt.
    pub struct FakeConnectionManager {
        pub max_version: Version,
        pub attempts: Mutex<Vec<Version>>,
    }

    impl FakeConnectionManager {
        pub fn new(max_version: Version) -> Self {
            FakeConnectionManager {
                max_version,
                attempts: Default::default(),
            }
        }
    }

    impl ConnectionManager<FakeTransport> for FakeConnectionManager {
        fn connection<'a>(
            &'a self,
            endpoint: &'a Endpoint,
            version: Version,
            _event_handler: Option<Sender<ServerEvent>>,
        ) -> BoxFuture<'a, Result<FakeTransport>> {
            async move {
                self.attempts.lock().unwrap().push(version);
                if version > self.max_version {
                    Err(Error::UnsupportedVersion(version))
                } else {
                    Ok(FakeTransport::ready(endpoint.address(), version))
                }
            }
            .boxed()
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::new(SocketAddr::from(([127, 0, 0, 1], 9042)))
    }

    #[tokio::test]
    async fn should_downgrade_one_version_at_a_time() {
        let manager = FakeConnectionManager::new(Version::V2);

        let connection = negotiate_connection(&manager, &endpoint(), Version::V4, None)
            .await
            .unwrap();

        assert_eq!(connection.version(), Version::V2);
        assert_eq!(
            *manager.attempts.lock().unwrap(),
            vec![Version::V4, Version::V3, Version::V2]
        );
    }

    #[tokio::test]
    async fn should_walk_dse_ladder() {
        let manager = FakeConnectionManager::new(Version::V4);

        negotiate_connection(&manager, &endpoint(), Version::Dse2, None)
            .await
            .unwrap();

        assert_eq!(
            *manager.attempts.lock().unwrap(),
            vec![Version::Dse2, Version::Dse1, Version::V4]
        );
    }

    #[tokio::test]
    async fn should_fail_below_lowest_version() {
        struct RejectingManager;

        impl ConnectionManager<FakeTransport> for RejectingManager {
            fn connection<'a>(
                &'a self,
                _endpoint: &'a Endpoint,
                version: Version,
                _event_handler: Option<Sender<ServerEvent>>,
            ) -> BoxFuture<'a, Result<FakeTransport>> {
                async move { Err(Error::UnsupportedVersion(version)) }.boxed()
            }
        }

        assert!(matches!(
            negotiate_connection(&RejectingManager, &endpoint(), Version::V3, None).await,
            Err(Error::UnsupportedVersion(Version::V2))
        ));
    }

    #[tokio::test]
    async fn should_quote_keyspace() {
        let transport = FakeTransport::new(endpoint().address(), Version::V4, |frame| {
            assert_eq!(frame.opcode, Opcode::Query);
            let mut cursor: std::io::Cursor<&[u8]> = std::io::Cursor::new(&frame.body);
            let query = BodyReqQuery::from_cursor(&mut cursor, frame.version)?;
            assert_eq!(query.query, r#"USE "My""Keyspace""#);
            Ok(ResponseBody::Result(ResResultBody::SetKeyspace(
                "My\"Keyspace".into(),
            )))
        });

        set_keyspace(&transport, "My\"Keyspace").await.unwrap();
    }
}
