use crate::error::{Error, Result};
use crate::types::CBytes;

/// Plain Cassandra password authentication.
pub const PASSWORD_AUTHENTICATOR: &str = "org.apache.cassandra.auth.PasswordAuthenticator";
/// DSE unified authenticator, which negotiates the SASL mechanism first.
pub const DSE_AUTHENTICATOR: &str = "com.datastax.bdp.cassandra.auth.DseAuthenticator";
/// Legacy DSE password authenticator.
pub const DSE_PASSWORD_AUTHENTICATOR: &str = "com.datastax.bdp.cassandra.auth.PasswordAuthenticator";

const PLAIN_MECHANISM: &[u8] = b"PLAIN";
const PLAIN_START_CHALLENGE: &[u8] = b"PLAIN-START";

/// Handles SASL authentication.
///
/// The lifecycle of an authenticator consists of:
/// - The `initial_response` function will be called with the authenticator class announced by
///   the server. The initial return value will be sent to the server to initiate the handshake.
/// - The server will respond to each client response by either issuing a challenge or indicating
///   that the authentication is complete (successfully or not). If a new challenge is issued,
///   the authenticator's `evaluate_challenge` function will be called to produce a response
///   that will be sent to the server. This challenge/response negotiation will continue until
///   the server responds that authentication is successful or an error is raised.
/// - On success, the `handle_success` will be called with data returned by the server.
pub trait SaslAuthenticator {
    fn initial_response(&mut self, authenticator: &str) -> Result<CBytes>;

    fn evaluate_challenge(&mut self, challenge: CBytes) -> Result<CBytes>;

    fn handle_success(&mut self, data: CBytes) -> Result<()>;
}

/// Provides authenticators per new connection.
pub trait SaslAuthenticatorProvider {
    fn create_authenticator(&self) -> Box<dyn SaslAuthenticator + Send>;
}

/// Username and password authentication. Understands both the Cassandra password authenticator
/// and the DSE authenticators, which require the `PLAIN` mechanism to be selected first.
#[derive(Debug, Clone)]
pub struct StaticPasswordAuthenticator {
    username: String,
    password: String,
}

impl StaticPasswordAuthenticator {
    pub fn new<S: ToString>(username: S, password: S) -> StaticPasswordAuthenticator {
        StaticPasswordAuthenticator {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    fn credentials(&self) -> CBytes {
        let mut token = vec![0];
        token.extend_from_slice(self.username.as_bytes());
        token.push(0);
        token.extend_from_slice(self.password.as_bytes());

        CBytes::new(token)
    }
}

impl SaslAuthenticator for StaticPasswordAuthenticator {
    fn initial_response(&mut self, authenticator: &str) -> Result<CBytes> {
        match authenticator {
            DSE_AUTHENTICATOR => Ok(CBytes::new(PLAIN_MECHANISM.to_vec())),
            PASSWORD_AUTHENTICATOR | DSE_PASSWORD_AUTHENTICATOR => Ok(self.credentials()),
            _ => Err(Error::General(format!(
                "Unsupported authenticator: {authenticator}"
            ))),
        }
    }

    fn evaluate_challenge(&mut self, challenge: CBytes) -> Result<CBytes> {
        if challenge.as_slice() == Some(PLAIN_START_CHALLENGE) {
            return Ok(self.credentials());
        }

        Err("Unexpected server challenge for password authentication".into())
    }

    fn handle_success(&mut self, _data: CBytes) -> Result<()> {
        Ok(())
    }
}

/// Authentication provider with a username and password.
#[derive(Debug, Clone)]
pub struct StaticPasswordAuthenticatorProvider {
    username: String,
    password: String,
}

impl SaslAuthenticatorProvider for StaticPasswordAuthenticatorProvider {
    fn create_authenticator(&self) -> Box<dyn SaslAuthenticator + Send> {
        Box::new(StaticPasswordAuthenticator::new(
            self.username.clone(),
            self.password.clone(),
        ))
    }
}

impl StaticPasswordAuthenticatorProvider {
    pub fn new<S: ToString>(username: S, password: S) -> Self {
        StaticPasswordAuthenticatorProvider {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}
