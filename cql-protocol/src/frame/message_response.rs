use std::io::Cursor;

use crate::error::{Error, Result};
use crate::frame::message_auth_challenge::BodyResAuthChallenge;
use crate::frame::message_auth_success::BodyResAuthSuccess;
use crate::frame::message_authenticate::BodyResAuthenticate;
use crate::frame::message_error::ErrorBody;
use crate::frame::message_event::BodyResEvent;
use crate::frame::message_result::ResResultBody;
use crate::frame::message_supported::BodyResSupported;
use crate::frame::traits::FromCursor;
use crate::frame::{Opcode, Serialize, Version};

/// Decoded message of a response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResponseBody {
    Error(ErrorBody),
    Ready,
    Authenticate(BodyResAuthenticate),
    Supported(BodyResSupported),
    Result(ResResultBody),
    Event(BodyResEvent),
    AuthChallenge(BodyResAuthChallenge),
    AuthSuccess(BodyResAuthSuccess),
}

impl Serialize for ResponseBody {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        match self {
            ResponseBody::Error(error_body) => error_body.serialize(cursor, version),
            ResponseBody::Ready => {}
            ResponseBody::Authenticate(auth) => auth.serialize(cursor, version),
            ResponseBody::Supported(supported) => supported.serialize(cursor, version),
            ResponseBody::Result(result) => result.serialize(cursor, version),
            ResponseBody::Event(event) => event.serialize(cursor, version),
            ResponseBody::AuthChallenge(challenge) => challenge.serialize(cursor, version),
            ResponseBody::AuthSuccess(success) => success.serialize(cursor, version),
        }
    }
}

impl ResponseBody {
    pub fn try_from(bytes: &[u8], response_type: Opcode, version: Version) -> Result<ResponseBody> {
        let mut cursor: Cursor<&[u8]> = Cursor::new(bytes);
        match response_type {
            Opcode::Error => ErrorBody::from_cursor(&mut cursor, version).map(ResponseBody::Error),
            Opcode::Ready => Ok(ResponseBody::Ready),
            Opcode::Authenticate => BodyResAuthenticate::from_cursor(&mut cursor, version)
                .map(ResponseBody::Authenticate),
            Opcode::Supported => {
                BodyResSupported::from_cursor(&mut cursor, version).map(ResponseBody::Supported)
            }
            Opcode::Result => {
                ResResultBody::from_cursor(&mut cursor, version).map(ResponseBody::Result)
            }
            Opcode::Event => BodyResEvent::from_cursor(&mut cursor, version).map(ResponseBody::Event),
            Opcode::AuthChallenge => BodyResAuthChallenge::from_cursor(&mut cursor, version)
                .map(ResponseBody::AuthChallenge),
            Opcode::AuthSuccess => BodyResAuthSuccess::from_cursor(&mut cursor, version)
                .map(ResponseBody::AuthSuccess),
            _ => Err(Error::NonResponseOpcode(response_type)),
        }
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            ResponseBody::Error(_) => Opcode::Error,
            ResponseBody::Ready => Opcode::Ready,
            ResponseBody::Authenticate(_) => Opcode::Authenticate,
            ResponseBody::Supported(_) => Opcode::Supported,
            ResponseBody::Result(_) => Opcode::Result,
            ResponseBody::Event(_) => Opcode::Event,
            ResponseBody::AuthChallenge(_) => Opcode::AuthChallenge,
            ResponseBody::AuthSuccess(_) => Opcode::AuthSuccess,
        }
    }

    pub fn into_error(self) -> Option<ErrorBody> {
        match self {
            ResponseBody::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn into_result(self) -> Option<ResResultBody> {
        match self {
            ResponseBody::Result(result) => Some(result),
            _ => None,
        }
    }

    pub fn into_server_event(self) -> Option<BodyResEvent> {
        match self {
            ResponseBody::Event(event) => Some(event),
            _ => None,
        }
    }

    pub fn authenticator(&self) -> Option<&str> {
        match self {
            ResponseBody::Authenticate(auth) => Some(auth.data.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::message_error::AdditionalErrorInfo;

    #[test]
    fn test_request_opcode_is_rejected() {
        assert!(matches!(
            ResponseBody::try_from(&[], Opcode::Query, Version::V4),
            Err(Error::NonResponseOpcode(Opcode::Query))
        ));
    }

    #[test]
    fn test_error_body() {
        let body = ResponseBody::Error(ErrorBody::new(
            "Invalid or unsupported protocol version (66)",
            AdditionalErrorInfo::Protocol,
        ));

        let encoded = body.serialize_to_vec(Version::V4);
        let decoded = ResponseBody::try_from(&encoded, Opcode::Error, Version::V4).unwrap();
        assert_eq!(decoded, body);
        assert!(decoded.into_error().unwrap().is_unsupported_protocol_version());
    }

    #[test]
    fn test_authenticator() {
        let body = ResponseBody::Authenticate(BodyResAuthenticate {
            data: "org.apache.cassandra.auth.PasswordAuthenticator".into(),
        });

        assert_eq!(body.opcode(), Opcode::Authenticate);
        assert_eq!(
            body.authenticator(),
            Some("org.apache.cassandra.auth.PasswordAuthenticator")
        );
    }
}
