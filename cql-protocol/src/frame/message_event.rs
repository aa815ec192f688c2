use std::io::Cursor;

use crate::error::Result;
use crate::frame::events::ServerEvent;
use crate::frame::{FromCursor, Serialize, Version};

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct BodyResEvent {
    pub event: ServerEvent,
}

impl Serialize for BodyResEvent {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        self.event.serialize(cursor, version);
    }
}

impl FromCursor for BodyResEvent {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<BodyResEvent> {
        ServerEvent::from_cursor(cursor, version).map(|event| BodyResEvent { event })
    }
}
