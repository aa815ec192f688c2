use std::collections::HashMap;
use std::io::Cursor;

use crate::error::Result;
use crate::frame::{FromCursor, Serialize, Version};
use crate::types::{from_cursor_string_multimap, serialize_string_multimap};

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct BodyResSupported {
    pub data: HashMap<String, Vec<String>>,
}

impl Serialize for BodyResSupported {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        serialize_string_multimap(cursor, &self.data, version);
    }
}

impl FromCursor for BodyResSupported {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, _version: Version) -> Result<BodyResSupported> {
        from_cursor_string_multimap(cursor).map(|data| BodyResSupported { data })
    }
}
