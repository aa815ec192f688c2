use std::collections::HashMap;
use std::io::Cursor;

use crate::error::Result;
use crate::frame::{FromCursor, Serialize, Version};
use crate::types::{from_cursor_str_map, serialize_str_map};

const CQL_VERSION: &str = "CQL_VERSION";
const CQL_VERSION_VAL: &str = "3.0.0";
const DRIVER_NAME: &str = "DRIVER_NAME";
const DRIVER_VERSION: &str = "DRIVER_VERSION";

/// Options sent with STARTUP. Compression is never requested.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BodyReqStartup {
    pub map: HashMap<String, String>,
}

impl Default for BodyReqStartup {
    fn default() -> Self {
        let mut map = HashMap::with_capacity(3);
        map.insert(CQL_VERSION.into(), CQL_VERSION_VAL.into());
        map.insert(DRIVER_NAME.into(), env!("CARGO_PKG_NAME").into());
        map.insert(DRIVER_VERSION.into(), env!("CARGO_PKG_VERSION").into());

        BodyReqStartup { map }
    }
}

impl Serialize for BodyReqStartup {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        serialize_str_map(cursor, &self.map, version);
    }
}

impl FromCursor for BodyReqStartup {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, _version: Version) -> Result<Self> {
        from_cursor_str_map(cursor).map(|map| BodyReqStartup { map })
    }
}
