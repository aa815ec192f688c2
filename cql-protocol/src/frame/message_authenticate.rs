use std::io::Cursor;

use crate::error::Result;
use crate::frame::{FromCursor, Serialize, Version};
use crate::types::{from_cursor_str, serialize_str};

/// A server authentication challenge. `data` is the fully qualified authenticator class name.
#[derive(Debug, PartialEq, Ord, PartialOrd, Eq, Hash, Clone)]
pub struct BodyResAuthenticate {
    pub data: String,
}

impl Serialize for BodyResAuthenticate {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        serialize_str(cursor, &self.data, version);
    }
}

impl FromCursor for BodyResAuthenticate {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, _version: Version) -> Result<BodyResAuthenticate> {
        Ok(BodyResAuthenticate {
            data: from_cursor_str(cursor)?.to_string(),
        })
    }
}
