use std::io::Cursor;

use crate::error::Result;
use crate::frame::{FromCursor, Serialize, Version};
use crate::types::CBytes;

/// `BodyResAuthSuccess` is a frame that represents a successful authentication response.
#[derive(Debug, PartialEq, Ord, PartialOrd, Eq, Hash, Clone, Default)]
pub struct BodyResAuthSuccess {
    pub data: CBytes,
}

impl Serialize for BodyResAuthSuccess {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        self.data.serialize(cursor, version);
    }
}

impl FromCursor for BodyResAuthSuccess {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<BodyResAuthSuccess> {
        CBytes::from_cursor(cursor, version).map(|data| BodyResAuthSuccess { data })
    }
}
