use derive_more::Constructor;
use std::convert::TryFrom;
use std::io::Cursor;

use crate::error::Result;
use crate::frame::events::SimpleServerEvent;
use crate::frame::{FromCursor, Serialize, Version};
use crate::types::{from_cursor_string_list, serialize_str_list};

/// The structure which represents a body of a frame of type `register`.
#[derive(Debug, Constructor, Default, Ord, PartialOrd, Eq, PartialEq, Hash, Clone)]
pub struct BodyReqRegister {
    pub events: Vec<SimpleServerEvent>,
}

impl Serialize for BodyReqRegister {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        let events = self.events.iter().map(|event| event.as_str());
        serialize_str_list(cursor, events, version);
    }
}

impl FromCursor for BodyReqRegister {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, _version: Version) -> Result<BodyReqRegister> {
        from_cursor_string_list(cursor)?
            .iter()
            .map(|event| SimpleServerEvent::try_from(event.as_str()))
            .collect::<Result<Vec<_>>>()
            .map(BodyReqRegister::new)
    }
}
