use crate::frame::message_error::{AdditionalErrorInfo, ErrorBody};
use crate::frame::{Opcode, StreamId, Version};
use crate::types::{CInt, CIntShort};
use std::fmt::Display;
use std::io;
use std::net::SocketAddr;
use std::result;
use std::str::Utf8Error;
use std::string::FromUtf8Error;
use thiserror::Error as ThisError;
use uuid::Error as UuidError;

pub type Result<T> = result::Result<T, Error>;

/// Common error type. There are two kinds of errors: the ones returned by a server in error
/// frames and the internal ones raised by the codec or the connection machinery. `Server` errors
/// carry the decoded body and the address of the node which returned them.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Internal IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Internal error that may be raised during `uuid::Uuid::from_bytes`
    #[error("Uuid parse error: {0}")]
    UuidParse(#[from] UuidError),
    /// General error
    #[error("General error: {0}")]
    General(String),
    /// Internal error that may be raised during `String::from_utf8`
    #[error("FromUtf8 error: {0}")]
    FromUtf8(#[from] FromUtf8Error),
    /// Internal error that may be raised during `str::from_utf8`
    #[error("Utf8 error: {0}")]
    Utf8(#[from] Utf8Error),
    /// Server error.
    #[error("Server {addr} error: {body:?}")]
    Server { body: ErrorBody, addr: SocketAddr },
    /// Timed out waiting for an operation to complete.
    #[error("Timeout: {0}")]
    Timeout(String),
    /// The connection has been closed; carries the reason.
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),
    /// The connection was already closed when close was requested.
    #[error("Connection already closed")]
    AlreadyClosed,
    /// All stream ids of a connection are taken by in-flight requests.
    #[error("Stream ids exhausted")]
    StreamIdsExhausted,
    /// A response arrived for a stream id with no pending request.
    #[error("Unmatched stream id: {0}")]
    UnmatchedStreamId(StreamId),
    /// No pool or no live connection exists for the given host.
    #[error("No connection for host: {0}")]
    NoConnection(String),
    /// The server rejected the protocol version used in a handshake.
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(Version),
    /// Negotiated protocol version differs from the one required for the node.
    #[error("Invalid protocol used when communicating with a node: {0}")]
    InvalidProtocol(SocketAddr),
    /// The server requires authentication, but no authenticator was configured.
    #[error("Server requires authentication with {0}, but no authenticator was provided")]
    MissingAuthenticator(String),
    /// Partitioner reported by the cluster has no token implementation.
    #[error("Unsupported partitioner: {0}")]
    UnsupportedPartitioner(String),
    /// Replication strategy class has no replica placement implementation.
    #[error("Unsupported replication strategy: {0}")]
    UnsupportedReplicationStrategy(String),
    /// Invalid format found for given keyspace replication strategy.
    #[error("Invalid replication format for: {keyspace}")]
    InvalidReplicationFormat { keyspace: String },
    /// Keyspace has no replication information.
    #[error("Unknown keyspace: {0}")]
    UnknownKeyspace(String),
    /// Unknown consistency.
    #[error("Unknown consistency: {0}")]
    UnknownConsistency(CIntShort),
    /// Unknown server event.
    #[error("Unknown server event: {0}")]
    UnknownServerEvent(String),
    /// Unexpected topology change event type.
    #[error("Unexpected topology change type: {0}")]
    UnexpectedTopologyChangeType(String),
    /// Unexpected status change event type.
    #[error("Unexpected status change type: {0}")]
    UnexpectedStatusChangeType(String),
    /// Unexpected schema change event type.
    #[error("Unexpected schema change type: {0}")]
    UnexpectedSchemaChangeType(String),
    /// Unexpected schema change event target.
    #[error("Unexpected schema change target: {0}")]
    UnexpectedSchemaChangeTarget(String),
    /// Unexpected additional error info.
    #[error("Unexpected error code: {0}")]
    UnexpectedErrorCode(CInt),
    /// Unexpected write type.
    #[error("Unexpected write type: {0}")]
    UnexpectedWriteType(String),
    /// Expected a response opcode, got something else.
    #[error("Opcode is not a response: {0}")]
    NonResponseOpcode(Opcode),
    /// Unexpected result kind.
    #[error("Unexpected result kind: {0}")]
    UnexpectedResultKind(CInt),
    /// Unexpected column type.
    #[error("Unexpected column type: {0}")]
    UnexpectedColumnType(CIntShort),
    /// Unexpected response to auth message.
    #[error("Unexpected auth response: {0}")]
    UnexpectedAuthResponse(Opcode),
    /// Unexpected startup response.
    #[error("Unexpected startup response: {0}")]
    UnexpectedStartupResponse(Opcode),
}

impl Error {
    /// Errors caused by configuration which cannot be fixed by reconnecting.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Error::InvalidProtocol(_)
            | Error::MissingAuthenticator(_)
            | Error::UnsupportedPartitioner(_)
            | Error::UnsupportedReplicationStrategy(_)
            | Error::InvalidReplicationFormat { .. } => true,
            Error::Server { body, .. } => {
                matches!(body.additional_info, AdditionalErrorInfo::Authentication)
            }
            _ => false,
        }
    }
}

pub fn column_is_empty_err<T: Display>(column_name: T) -> Error {
    Error::General(format!("Column '{column_name}' is empty"))
}

impl From<String> for Error {
    fn from(err: String) -> Error {
        Error::General(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Error {
        Error::General(err.to_string())
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::Io(error) => Error::Io(io::Error::new(
                error.kind(),
                error
                    .get_ref()
                    .map(|error| error.to_string())
                    .unwrap_or_default(),
            )),
            Error::UuidParse(error) => Error::UuidParse(error.clone()),
            Error::General(error) => Error::General(error.clone()),
            Error::FromUtf8(error) => Error::FromUtf8(error.clone()),
            Error::Utf8(error) => Error::Utf8(*error),
            Error::Server { body, addr } => Error::Server {
                body: body.clone(),
                addr: *addr,
            },
            Error::Timeout(error) => Error::Timeout(error.clone()),
            Error::ConnectionClosed(reason) => Error::ConnectionClosed(reason.clone()),
            Error::AlreadyClosed => Error::AlreadyClosed,
            Error::StreamIdsExhausted => Error::StreamIdsExhausted,
            Error::UnmatchedStreamId(stream) => Error::UnmatchedStreamId(*stream),
            Error::NoConnection(host) => Error::NoConnection(host.clone()),
            Error::UnsupportedVersion(version) => Error::UnsupportedVersion(*version),
            Error::InvalidProtocol(addr) => Error::InvalidProtocol(*addr),
            Error::MissingAuthenticator(name) => Error::MissingAuthenticator(name.clone()),
            Error::UnsupportedPartitioner(name) => Error::UnsupportedPartitioner(name.clone()),
            Error::UnsupportedReplicationStrategy(name) => {
                Error::UnsupportedReplicationStrategy(name.clone())
            }
            Error::InvalidReplicationFormat { keyspace } => Error::InvalidReplicationFormat {
                keyspace: keyspace.clone(),
            },
            Error::UnknownKeyspace(keyspace) => Error::UnknownKeyspace(keyspace.clone()),
            Error::UnknownConsistency(value) => Error::UnknownConsistency(*value),
            Error::UnknownServerEvent(value) => Error::UnknownServerEvent(value.clone()),
            Error::UnexpectedTopologyChangeType(value) => {
                Error::UnexpectedTopologyChangeType(value.clone())
            }
            Error::UnexpectedStatusChangeType(value) => {
                Error::UnexpectedStatusChangeType(value.clone())
            }
            Error::UnexpectedSchemaChangeType(value) => {
                Error::UnexpectedSchemaChangeType(value.clone())
            }
            Error::UnexpectedSchemaChangeTarget(value) => {
                Error::UnexpectedSchemaChangeTarget(value.clone())
            }
            Error::UnexpectedErrorCode(value) => Error::UnexpectedErrorCode(*value),
            Error::UnexpectedWriteType(value) => Error::UnexpectedWriteType(value.clone()),
            Error::NonResponseOpcode(value) => Error::NonResponseOpcode(*value),
            Error::UnexpectedResultKind(value) => Error::UnexpectedResultKind(*value),
            Error::UnexpectedColumnType(value) => Error::UnexpectedColumnType(*value),
            Error::UnexpectedAuthResponse(value) => Error::UnexpectedAuthResponse(*value),
            Error::UnexpectedStartupResponse(value) => Error::UnexpectedStartupResponse(*value),
        }
    }
}
