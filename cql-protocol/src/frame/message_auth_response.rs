use derive_more::Constructor;
use std::io::Cursor;

use crate::error::Result;
use crate::frame::{FromCursor, Serialize, Version};
use crate::types::CBytes;

#[derive(Debug, Constructor, PartialEq, Eq, Clone)]
pub struct BodyReqAuthResponse {
    pub data: CBytes,
}

impl Serialize for BodyReqAuthResponse {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        self.data.serialize(cursor, version);
    }
}

impl FromCursor for BodyReqAuthResponse {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<Self> {
        CBytes::from_cursor(cursor, version).map(BodyReqAuthResponse::new)
    }
}
