use std::io::Cursor;

use crate::error::Result;
use crate::frame::{FromCursor, Serialize, Version};
use crate::types::CBytes;

/// Server authentication challenge.
#[derive(Debug, PartialEq, Ord, PartialOrd, Eq, Hash, Clone)]
pub struct BodyResAuthChallenge {
    pub data: CBytes,
}

impl Serialize for BodyResAuthChallenge {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        self.data.serialize(cursor, version);
    }
}

impl FromCursor for BodyResAuthChallenge {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<BodyResAuthChallenge> {
        CBytes::from_cursor(cursor, version).map(|data| BodyResAuthChallenge { data })
    }
}
