use derive_more::Constructor;
use std::io::Cursor;

use crate::consistency::Consistency;
use crate::error::Result;
use crate::frame::{FromCursor, Serialize, Version};
use crate::types::{from_cursor_str_long, serialize_str_long, CInt};

/// Unprepared query without bound values, as issued on control connections.
#[derive(Debug, Constructor, PartialEq, Eq, Clone)]
pub struct BodyReqQuery {
    pub query: String,
    pub consistency: Consistency,
}

impl Serialize for BodyReqQuery {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        serialize_str_long(cursor, &self.query, version);
        self.consistency.serialize(cursor, version);

        if version.has_int_query_flags() {
            0u32.serialize(cursor, version);
        } else {
            0u8.serialize(cursor, version);
        }
    }
}

impl FromCursor for BodyReqQuery {
    /// Reads the query string and consistency. Any values or paging options following the flags
    /// are left unread.
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<BodyReqQuery> {
        let query = from_cursor_str_long(cursor)?.to_string();
        let consistency = Consistency::from_cursor(cursor, version)?;

        if version.has_int_query_flags() {
            CInt::from_cursor(cursor, version)?;
        } else {
            u8::from_cursor(cursor, version)?;
        }

        Ok(BodyReqQuery { query, consistency })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_flags_width() {
        let body = BodyReqQuery::new("SELECT * FROM system.local".into(), Consistency::One);

        let v4 = body.serialize_to_vec(Version::V4);
        let dse2 = body.serialize_to_vec(Version::Dse2);
        assert_eq!(dse2.len(), v4.len() + 3);

        let mut cursor: Cursor<&[u8]> = Cursor::new(&dse2);
        assert_eq!(BodyReqQuery::from_cursor(&mut cursor, Version::Dse2).unwrap(), body);
    }
}
