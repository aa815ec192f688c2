use std::convert::TryFrom;
use tokio::io::{AsyncRead, AsyncReadExt};

use cql_protocol::error;
use cql_protocol::frame::{Frame, FrameHeader, Version};

const MAX_HEADER_LEN: usize = 9;

/// Reads a single frame. The first byte selects the header layout, since protocol v2 uses a
/// shorter stream id than the later versions.
pub async fn parse_frame<T: AsyncRead + Unpin + ?Sized>(reader: &mut T) -> error::Result<Frame> {
    let mut header_bytes = [0; MAX_HEADER_LEN];

    // NOTE: order of reads matters
    reader
        .read_exact(&mut header_bytes[..Version::BYTE_LENGTH])
        .await?;

    let version = Version::try_from(header_bytes[0])?;
    let header_len = version.header_len();
    reader
        .read_exact(&mut header_bytes[Version::BYTE_LENGTH..header_len])
        .await?;

    let header = FrameHeader::decode(&header_bytes[..header_len])?;

    let mut body = vec![0; header.length];
    reader.read_exact(&mut body).await?;

    Ok(header.into_frame(body))
}

#[cfg(test)]
mod tests {
    use cql_protocol::frame::message_response::ResponseBody;
    use cql_protocol::frame::{Opcode, EVENT_STREAM_ID};

    use super::*;

    #[tokio::test]
    async fn should_parse_frames_of_mixed_versions() {
        let mut bytes = Frame::new_response(Version::V4, 300, &ResponseBody::Ready).encode();
        bytes.extend(Frame::new_response(Version::V2, EVENT_STREAM_ID, &ResponseBody::Ready).encode());

        let mut reader = bytes.as_slice();

        let first = parse_frame(&mut reader).await.unwrap();
        assert_eq!(first.version, Version::V4);
        assert_eq!(first.stream, 300);
        assert_eq!(first.opcode, Opcode::Ready);

        let second = parse_frame(&mut reader).await.unwrap();
        assert_eq!(second.version, Version::V2);
        assert_eq!(second.stream, EVENT_STREAM_ID);

        assert!(parse_frame(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn should_fail_on_truncated_body() {
        let mut bytes = Frame::new(
            Version::V4,
            cql_protocol::frame::Direction::Response,
            Default::default(),
            Opcode::Result,
            1,
            vec![0, 0, 0, 1],
        )
        .encode();
        bytes.truncate(bytes.len() - 2);

        let mut reader = bytes.as_slice();
        assert!(parse_frame(&mut reader).await.is_err());
    }
}
