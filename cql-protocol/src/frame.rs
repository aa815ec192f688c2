//! `frame` module contains general Frame functionality.
use bitflags::bitflags;
use derive_more::Display;
use std::convert::TryFrom;
use std::io::Cursor;
use uuid::Uuid;

use crate::consistency::Consistency;
use crate::error::{Error, Result};
use crate::frame::events::SimpleServerEvent;
use crate::frame::message_auth_response::BodyReqAuthResponse;
use crate::frame::message_query::BodyReqQuery;
use crate::frame::message_register::BodyReqRegister;
use crate::frame::message_response::ResponseBody;
use crate::frame::message_startup::BodyReqStartup;
use crate::types::{from_cursor_str, from_cursor_string_list, CBytes, CIntShort, UUID_LEN};
pub use crate::frame::traits::*;

/// Number of body length bytes in accordance to protocol.
pub const LENGTH_LEN: usize = 4;
/// Largest body accepted by Cassandra.
pub const MAX_FRAME_BODY_SIZE: usize = 256 * 1024 * 1024;

pub mod events;
pub mod message_auth_challenge;
pub mod message_auth_response;
pub mod message_auth_success;
pub mod message_authenticate;
pub mod message_error;
pub mod message_event;
pub mod message_query;
pub mod message_register;
pub mod message_response;
pub mod message_result;
pub mod message_startup;
pub mod message_supported;
pub mod traits;

pub type StreamId = i16;

/// Stream id used by the server for pushed events.
pub const EVENT_STREAM_ID: StreamId = -1;

/// A single protocol frame. The body is kept exactly as received, including any tracing id,
/// warnings or custom payload prefix, so frames can be forwarded without re-encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    pub version: Version,
    pub direction: Direction,
    pub flags: Flags,
    pub opcode: Opcode,
    pub stream: StreamId,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(
        version: Version,
        direction: Direction,
        flags: Flags,
        opcode: Opcode,
        stream: StreamId,
        body: Vec<u8>,
    ) -> Self {
        Frame {
            version,
            direction,
            flags,
            opcode,
            stream,
            body,
        }
    }

    fn new_req(version: Version, opcode: Opcode, body: Vec<u8>) -> Self {
        Frame::new(
            version,
            Direction::Request,
            Flags::empty(),
            opcode,
            0,
            body,
        )
    }

    pub fn new_req_startup(version: Version) -> Self {
        let body = BodyReqStartup::default();
        Frame::new_req(version, Opcode::Startup, body.serialize_to_vec(version))
    }

    pub fn new_req_options(version: Version) -> Self {
        Frame::new_req(version, Opcode::Options, vec![])
    }

    pub fn new_req_auth_response(token: CBytes, version: Version) -> Self {
        let body = BodyReqAuthResponse::new(token);
        Frame::new_req(version, Opcode::AuthResponse, body.serialize_to_vec(version))
    }

    pub fn new_req_query(query: String, consistency: Consistency, version: Version) -> Self {
        let body = BodyReqQuery::new(query, consistency);
        Frame::new_req(version, Opcode::Query, body.serialize_to_vec(version))
    }

    pub fn new_req_register(events: Vec<SimpleServerEvent>, version: Version) -> Self {
        let body = BodyReqRegister::new(events);
        Frame::new_req(version, Opcode::Register, body.serialize_to_vec(version))
    }

    /// Creates a response frame for given stream.
    pub fn new_response(version: Version, stream: StreamId, body: &ResponseBody) -> Self {
        Frame::new(
            version,
            Direction::Response,
            Flags::empty(),
            body.opcode(),
            stream,
            body.serialize_to_vec(version),
        )
    }

    /// Decodes the message carried by a response frame.
    pub fn response_body(&self) -> Result<ResponseBody> {
        if self.flags.contains(Flags::COMPRESSION) {
            return Err(Error::General(
                "Compressed frames are not supported".to_string(),
            ));
        }

        let offset = self.message_offset()?;
        ResponseBody::try_from(&self.body[offset..], self.opcode, self.version)
    }

    /// Tracing id of a traced response.
    pub fn tracing_id(&self) -> Result<Option<Uuid>> {
        if self.direction != Direction::Response || !self.flags.contains(Flags::TRACING) {
            return Ok(None);
        }

        let bytes = self
            .body
            .get(..UUID_LEN)
            .ok_or_else(|| Error::from("Frame too short for a tracing id"))?;
        Uuid::from_slice(bytes).map(Some).map_err(Into::into)
    }

    /// Warnings attached to a response.
    pub fn warnings(&self) -> Result<Vec<String>> {
        if self.direction != Direction::Response || !self.flags.contains(Flags::WARNING) {
            return Ok(vec![]);
        }

        let mut cursor = Cursor::new(self.body.as_slice());
        if self.flags.contains(Flags::TRACING) {
            cursor.set_position(UUID_LEN as u64);
        }

        from_cursor_string_list(&mut cursor)
    }

    fn message_offset(&self) -> Result<usize> {
        let mut cursor = Cursor::new(self.body.as_slice());
        if self.direction == Direction::Response && self.flags.contains(Flags::TRACING) {
            cursor.set_position(UUID_LEN as u64);
        }

        if self.flags.contains(Flags::WARNING) {
            from_cursor_string_list(&mut cursor)?;
        }

        if self.flags.contains(Flags::CUSTOM_PAYLOAD) {
            let len = CIntShort::from_cursor(&mut cursor, self.version)?;
            for _ in 0..len {
                from_cursor_str(&mut cursor)?;
                CBytes::from_cursor(&mut cursor, self.version)?;
            }
        }

        let offset = cursor.position() as usize;
        if offset > self.body.len() {
            return Err(Error::from("Frame body shorter than its flags imply"));
        }

        Ok(offset)
    }

    /// Appends the encoded frame to given buffer.
    pub fn encode_into(&self, buffer: &mut Vec<u8>) {
        let combined_version_byte = u8::from(self.version) | u8::from(self.direction);

        buffer.reserve(self.version.header_len() + self.body.len());
        buffer.push(combined_version_byte);
        buffer.push(self.flags.bits());

        if self.version.stream_len() == 1 {
            buffer.push(self.stream as i8 as u8);
        } else {
            buffer.extend_from_slice(&self.stream.to_be_bytes());
        }

        buffer.push(u8::from(self.opcode));
        buffer.extend_from_slice(&(self.body.len() as i32).to_be_bytes());
        buffer.extend_from_slice(&self.body);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.version.header_len() + self.body.len());
        self.encode_into(&mut buffer);
        buffer
    }
}

/// Decoded frame header, used by readers before the body is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: Version,
    pub direction: Direction,
    pub flags: Flags,
    pub opcode: Opcode,
    pub stream: StreamId,
    pub length: usize,
}

impl FrameHeader {
    /// Parses a complete header. The first byte selects the header layout.
    pub fn decode(header: &[u8]) -> Result<Self> {
        let first = *header
            .first()
            .ok_or_else(|| Error::from("Empty frame header"))?;
        let version = Version::try_from(first)?;
        if header.len() < version.header_len() {
            return Err(Error::General(format!(
                "Frame header too short for {version}: {}",
                header.len()
            )));
        }

        let direction = Direction::from(first);
        let flags = Flags::from_bits_truncate(header[1]);
        let (stream, opcode_index) = if version.stream_len() == 1 {
            (header[2] as i8 as StreamId, 3)
        } else {
            (StreamId::from_be_bytes([header[2], header[3]]), 4)
        };

        let opcode = Opcode::try_from(header[opcode_index])?;
        let length_bytes = [
            header[opcode_index + 1],
            header[opcode_index + 2],
            header[opcode_index + 3],
            header[opcode_index + 4],
        ];

        let length = i32::from_be_bytes(length_bytes);
        if length < 0 || length as usize > MAX_FRAME_BODY_SIZE {
            return Err(Error::General(format!("Invalid frame body length: {length}")));
        }

        Ok(FrameHeader {
            version,
            direction,
            flags,
            opcode,
            stream,
            length: length as usize,
        })
    }

    pub fn into_frame(self, body: Vec<u8>) -> Frame {
        Frame::new(
            self.version,
            self.direction,
            self.flags,
            self.opcode,
            self.stream,
            body,
        )
    }
}

/// Protocol versions understood by the codec, ordered from the oldest.
#[derive(Debug, PartialEq, Copy, Clone, Ord, PartialOrd, Eq, Hash, Display)]
pub enum Version {
    V2,
    V3,
    V4,
    #[display("DSE_V1")]
    Dse1,
    #[display("DSE_V2")]
    Dse2,
}

impl From<Version> for u8 {
    fn from(value: Version) -> Self {
        match value {
            Version::V2 => 0x02,
            Version::V3 => 0x03,
            Version::V4 => 0x04,
            Version::Dse1 => 0x41,
            Version::Dse2 => 0x42,
        }
    }
}

impl TryFrom<u8> for Version {
    type Error = Error;

    fn try_from(version: u8) -> Result<Self> {
        match version & 0x7F {
            0x02 => Ok(Version::V2),
            0x03 => Ok(Version::V3),
            0x04 => Ok(Version::V4),
            0x41 => Ok(Version::Dse1),
            0x42 => Ok(Version::Dse2),
            v => Err(Error::General(format!("Unknown cassandra version: {v}"))),
        }
    }
}

impl Version {
    /// Number of bytes that represent Cassandra frame's version.
    pub const BYTE_LENGTH: usize = 1;

    /// Number of bytes of the stream id.
    #[inline]
    pub fn stream_len(self) -> usize {
        match self {
            Version::V2 => 1,
            _ => 2,
        }
    }

    /// Full header length: version, flags, stream, opcode and body length.
    #[inline]
    pub fn header_len(self) -> usize {
        Self::BYTE_LENGTH + Flags::BYTE_LENGTH + self.stream_len() + Opcode::BYTE_LENGTH + LENGTH_LEN
    }

    /// Number of non-negative stream ids available to requests.
    #[inline]
    pub fn max_streams(self) -> usize {
        match self {
            Version::V2 => 128,
            _ => 32768,
        }
    }

    /// Next version to try when a server rejects this one.
    pub fn downgrade(self) -> Option<Version> {
        match self {
            Version::Dse2 => Some(Version::Dse1),
            Version::Dse1 => Some(Version::V4),
            Version::V4 => Some(Version::V3),
            Version::V3 => Some(Version::V2),
            Version::V2 => None,
        }
    }

    /// Query flags are encoded as an int starting with DSE v2.
    #[inline]
    pub fn has_int_query_flags(self) -> bool {
        self == Version::Dse2
    }
}

#[derive(Debug, PartialEq, Copy, Clone, Ord, PartialOrd, Eq, Hash, Display)]
pub enum Direction {
    Request,
    Response,
}

impl From<Direction> for u8 {
    fn from(value: Direction) -> u8 {
        match value {
            Direction::Request => 0x00,
            Direction::Response => 0x80,
        }
    }
}

impl From<u8> for Direction {
    fn from(value: u8) -> Self {
        match value & 0x80 {
            0 => Direction::Request,
            _ => Direction::Response,
        }
    }
}

bitflags! {
    /// Frame's flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct Flags: u8 {
        const COMPRESSION = 0x01;
        const TRACING = 0x02;
        const CUSTOM_PAYLOAD = 0x04;
        const WARNING = 0x08;
        const BETA = 0x10;
    }
}

impl Default for Flags {
    #[inline]
    fn default() -> Self {
        Flags::empty()
    }
}

impl Flags {
    // Number of flag bytes in accordance to protocol.
    pub const BYTE_LENGTH: usize = 1;
}

#[derive(Debug, PartialEq, Copy, Clone, Ord, PartialOrd, Eq, Hash, Display)]
pub enum Opcode {
    Error,
    Startup,
    Ready,
    Authenticate,
    Options,
    Supported,
    Query,
    Result,
    Prepare,
    Execute,
    Register,
    Event,
    Batch,
    AuthChallenge,
    AuthResponse,
    AuthSuccess,
}

impl Opcode {
    // Number of opcode bytes in accordance to protocol.
    pub const BYTE_LENGTH: usize = 1;
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Error => 0x00,
            Opcode::Startup => 0x01,
            Opcode::Ready => 0x02,
            Opcode::Authenticate => 0x03,
            Opcode::Options => 0x05,
            Opcode::Supported => 0x06,
            Opcode::Query => 0x07,
            Opcode::Result => 0x08,
            Opcode::Prepare => 0x09,
            Opcode::Execute => 0x0A,
            Opcode::Register => 0x0B,
            Opcode::Event => 0x0C,
            Opcode::Batch => 0x0D,
            Opcode::AuthChallenge => 0x0E,
            Opcode::AuthResponse => 0x0F,
            Opcode::AuthSuccess => 0x10,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Opcode::Error),
            0x01 => Ok(Opcode::Startup),
            0x02 => Ok(Opcode::Ready),
            0x03 => Ok(Opcode::Authenticate),
            0x05 => Ok(Opcode::Options),
            0x06 => Ok(Opcode::Supported),
            0x07 => Ok(Opcode::Query),
            0x08 => Ok(Opcode::Result),
            0x09 => Ok(Opcode::Prepare),
            0x0A => Ok(Opcode::Execute),
            0x0B => Ok(Opcode::Register),
            0x0C => Ok(Opcode::Event),
            0x0D => Ok(Opcode::Batch),
            0x0E => Ok(Opcode::AuthChallenge),
            0x0F => Ok(Opcode::AuthResponse),
            0x10 => Ok(Opcode::AuthSuccess),
            _ => Err(Error::General(format!("Unknown opcode: {value}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_version_as_byte() {
        assert_eq!(u8::from(Version::V2), 0x02);
        assert_eq!(u8::from(Version::V3), 0x03);
        assert_eq!(u8::from(Version::V4), 0x04);
        assert_eq!(u8::from(Version::Dse1), 0x41);
        assert_eq!(u8::from(Version::Dse2), 0x42);

        assert_eq!(u8::from(Direction::Request), 0x00);
        assert_eq!(u8::from(Direction::Response), 0x80);
    }

    #[test]
    fn test_frame_version_from() {
        assert_eq!(Version::try_from(0x02).unwrap(), Version::V2);
        assert_eq!(Version::try_from(0x83).unwrap(), Version::V3);
        assert_eq!(Version::try_from(0x84).unwrap(), Version::V4);
        assert_eq!(Version::try_from(0xC2).unwrap(), Version::Dse2);
        assert!(Version::try_from(0x05).is_err());

        assert_eq!(Direction::from(0x04), Direction::Request);
        assert_eq!(Direction::from(0x84), Direction::Response);
    }

    #[test]
    fn test_downgrade_ladder() {
        let mut ladder = vec![Version::Dse2];
        while let Some(next) = ladder.last().and_then(|version| version.downgrade()) {
            ladder.push(next);
        }

        assert_eq!(
            ladder,
            vec![
                Version::Dse2,
                Version::Dse1,
                Version::V4,
                Version::V3,
                Version::V2
            ]
        );
    }

    #[test]
    fn test_opcode_from() {
        assert_eq!(Opcode::try_from(0x00).unwrap(), Opcode::Error);
        assert_eq!(Opcode::try_from(0x02).unwrap(), Opcode::Ready);
        assert_eq!(Opcode::try_from(0x0C).unwrap(), Opcode::Event);
        assert_eq!(Opcode::try_from(0x10).unwrap(), Opcode::AuthSuccess);
        assert!(Opcode::try_from(0x04).is_err());
    }

    #[test]
    fn test_ready_v4() {
        let frame = Frame::new_response(Version::V4, 5, &ResponseBody::Ready);
        let encoded = frame.encode();
        assert_eq!(encoded, vec![0x84, 0, 0, 5, 2, 0, 0, 0, 0]);

        let header = FrameHeader::decode(&encoded).unwrap();
        assert_eq!(header.stream, 5);
        assert_eq!(header.opcode, Opcode::Ready);
        assert_eq!(header.length, 0);
        assert_eq!(header.into_frame(vec![]), frame);
    }

    #[test]
    fn test_v2_single_byte_stream() {
        let frame = Frame::new_response(Version::V2, EVENT_STREAM_ID, &ResponseBody::Ready);
        let encoded = frame.encode();
        assert_eq!(encoded, vec![0x82, 0, 0xFF, 2, 0, 0, 0, 0]);

        let header = FrameHeader::decode(&encoded).unwrap();
        assert_eq!(header.stream, EVENT_STREAM_ID);
        assert_eq!(Version::V2.header_len(), 8);
        assert_eq!(Version::V4.header_len(), 9);
    }

    #[test]
    fn test_negative_body_length() {
        let encoded = vec![0x84, 0, 0, 1, 2, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(FrameHeader::decode(&encoded).is_err());
    }

    #[test]
    fn test_body_with_warnings() {
        let mut body = vec![0, 1, 0, 2, b'h', b'i'];
        body.extend_from_slice(&ResponseBody::Ready.serialize_to_vec(Version::V4));

        let frame = Frame::new(
            Version::V4,
            Direction::Response,
            Flags::WARNING,
            Opcode::Ready,
            1,
            body,
        );

        assert_eq!(frame.warnings().unwrap(), vec!["hi".to_string()]);
        assert_eq!(frame.response_body().unwrap(), ResponseBody::Ready);
    }
}
