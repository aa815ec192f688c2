use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::error::{Error, Result};
use crate::frame::traits::FromCursor;
use crate::frame::{Serialize, Version};

pub const SHORT_LEN: usize = 2;
pub const INT_LEN: usize = 4;
pub const LONG_LEN: usize = 8;
pub const UUID_LEN: usize = 16;

const NULL_INT_LEN: CInt = -1;
const NULL_SHORT_LEN: CIntShort = -1;

pub mod rows;

/// Cassandra int type.
pub type CInt = i32;

impl FromCursor for CInt {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, _version: Version) -> Result<CInt> {
        let mut buff = [0; INT_LEN];
        cursor.read_exact(&mut buff)?;

        Ok(CInt::from_be_bytes(buff))
    }
}

/// Cassandra short type.
pub type CIntShort = i16;

impl FromCursor for CIntShort {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, _version: Version) -> Result<CIntShort> {
        let mut buff = [0; SHORT_LEN];
        cursor.read_exact(&mut buff)?;

        Ok(CIntShort::from_be_bytes(buff))
    }
}

/// Cassandra long type.
pub type CLong = i64;

impl FromCursor for CLong {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, _version: Version) -> Result<CLong> {
        let mut buff = [0; LONG_LEN];
        cursor.read_exact(&mut buff)?;

        Ok(CLong::from_be_bytes(buff))
    }
}

impl FromCursor for u8 {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, _version: Version) -> Result<u8> {
        let mut buff = [0];
        cursor.read_exact(&mut buff)?;

        Ok(buff[0])
    }
}

pub fn serialize_str(cursor: &mut Cursor<&mut Vec<u8>>, value: &str, version: Version) {
    let len = value.len() as CIntShort;
    len.serialize(cursor, version);
    let _ = cursor.write(value.as_bytes());
}

pub fn serialize_str_long(cursor: &mut Cursor<&mut Vec<u8>>, value: &str, version: Version) {
    let len = value.len() as CInt;
    len.serialize(cursor, version);
    let _ = cursor.write(value.as_bytes());
}

pub fn from_cursor_str<'a>(cursor: &mut Cursor<&'a [u8]>) -> Result<&'a str> {
    let mut buff = [0; SHORT_LEN];
    cursor.read_exact(&mut buff)?;

    let len = CIntShort::from_be_bytes(buff);
    let body_bytes = cursor_next_value_ref(cursor, len.max(0) as usize)?;

    std::str::from_utf8(body_bytes).map_err(Into::into)
}

pub fn from_cursor_str_long<'a>(cursor: &mut Cursor<&'a [u8]>) -> Result<&'a str> {
    let mut buff = [0; INT_LEN];
    cursor.read_exact(&mut buff)?;

    let len = CInt::from_be_bytes(buff);
    let body_bytes = cursor_next_value_ref(cursor, len.max(0) as usize)?;

    std::str::from_utf8(body_bytes).map_err(Into::into)
}

pub fn serialize_str_list<'a>(
    cursor: &mut Cursor<&mut Vec<u8>>,
    list: impl ExactSizeIterator<Item = &'a str>,
    version: Version,
) {
    let len = list.len() as CIntShort;
    len.serialize(cursor, version);

    for string in list {
        serialize_str(cursor, string, version);
    }
}

pub fn from_cursor_string_list(cursor: &mut Cursor<&[u8]>) -> Result<Vec<String>> {
    let mut buff = [0; SHORT_LEN];
    cursor.read_exact(&mut buff)?;

    let len = i16::from_be_bytes(buff);
    let mut list = Vec::with_capacity(len.max(0) as usize);
    for _ in 0..len {
        list.push(from_cursor_str(cursor)?.to_string());
    }

    Ok(list)
}

pub fn serialize_str_map(
    cursor: &mut Cursor<&mut Vec<u8>>,
    map: &HashMap<String, String>,
    version: Version,
) {
    let len = map.len() as CIntShort;
    len.serialize(cursor, version);

    for (key, value) in map {
        serialize_str(cursor, key, version);
        serialize_str(cursor, value, version);
    }
}

pub fn from_cursor_str_map(cursor: &mut Cursor<&[u8]>) -> Result<HashMap<String, String>> {
    let len = CIntShort::from_cursor(cursor, Version::V4)?;
    let mut map = HashMap::with_capacity(len.max(0) as usize);
    for _ in 0..len {
        let key = from_cursor_str(cursor)?.to_string();
        let value = from_cursor_str(cursor)?.to_string();
        map.insert(key, value);
    }

    Ok(map)
}

pub fn serialize_string_multimap(
    cursor: &mut Cursor<&mut Vec<u8>>,
    map: &HashMap<String, Vec<String>>,
    version: Version,
) {
    let len = map.len() as CIntShort;
    len.serialize(cursor, version);

    for (key, values) in map {
        serialize_str(cursor, key, version);
        serialize_str_list(cursor, values.iter().map(String::as_str), version);
    }
}

pub fn from_cursor_string_multimap(
    cursor: &mut Cursor<&[u8]>,
) -> Result<HashMap<String, Vec<String>>> {
    let len = CIntShort::from_cursor(cursor, Version::V4)?;
    let mut map = HashMap::with_capacity(len.max(0) as usize);
    for _ in 0..len {
        let key = from_cursor_str(cursor)?.to_string();
        let values = from_cursor_string_list(cursor)?;
        map.insert(key, values);
    }

    Ok(map)
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, Ord, PartialOrd, Default)]
/// The structure that represents Cassandra byte type.
pub struct CBytes {
    bytes: Option<Vec<u8>>,
}

impl CBytes {
    #[inline]
    pub fn new(bytes: Vec<u8>) -> CBytes {
        CBytes { bytes: Some(bytes) }
    }

    /// Creates Cassandra bytes that represent empty or null value
    #[inline]
    pub fn new_empty() -> CBytes {
        CBytes { bytes: None }
    }

    #[inline]
    pub fn as_slice(&self) -> Option<&[u8]> {
        self.bytes.as_deref()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        match &self.bytes {
            None => true,
            Some(bytes) => bytes.is_empty(),
        }
    }

    #[inline]
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        self.bytes
    }
}

impl FromCursor for CBytes {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<CBytes> {
        let len = CInt::from_cursor(cursor, version)?;
        // null or not set value
        if len < 0 {
            return Ok(CBytes::new_empty());
        }

        cursor_next_value(cursor, len as usize).map(CBytes::new)
    }
}

impl Serialize for CBytes {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        match &self.bytes {
            Some(bytes) => {
                let len = bytes.len() as CInt;
                len.serialize(cursor, version);
                bytes.serialize(cursor, version);
            }
            None => NULL_INT_LEN.serialize(cursor, version),
        }
    }
}

/// Cassandra short bytes
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default)]
pub struct CBytesShort {
    bytes: Option<Vec<u8>>,
}

impl CBytesShort {
    #[inline]
    pub fn new(bytes: Vec<u8>) -> CBytesShort {
        CBytesShort { bytes: Some(bytes) }
    }

    #[inline]
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        self.bytes
    }
}

impl FromCursor for CBytesShort {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<CBytesShort> {
        let len = CIntShort::from_cursor(cursor, version)?;
        if len < 0 {
            return Ok(CBytesShort { bytes: None });
        }

        cursor_next_value(cursor, len as usize).map(CBytesShort::new)
    }
}

impl Serialize for CBytesShort {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        match &self.bytes {
            Some(bytes) => {
                let len = bytes.len() as CIntShort;
                len.serialize(cursor, version);
                bytes.serialize(cursor, version);
            }
            None => NULL_SHORT_LEN.serialize(cursor, version),
        }
    }
}

impl Serialize for SocketAddr {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        match self.ip() {
            IpAddr::V4(v4) => {
                4u8.serialize(cursor, version);
                v4.octets().serialize(cursor, version);
            }
            IpAddr::V6(v6) => {
                16u8.serialize(cursor, version);
                v6.octets().serialize(cursor, version);
            }
        }

        CInt::from(self.port()).serialize(cursor, version);
    }
}

impl FromCursor for SocketAddr {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<SocketAddr> {
        let n = u8::from_cursor(cursor, version)?;
        let ip = decode_inet(cursor_next_value_ref(cursor, n as usize)?)?;
        let port = CInt::from_cursor(cursor, version)?;

        Ok(SocketAddr::new(ip, port as u16))
    }
}

/// Decodes a raw 4 or 16 byte address.
pub fn decode_inet(bytes: &[u8]) -> Result<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().map_err(|_| Error::from("Invalid IPv4"))?;
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().map_err(|_| Error::from("Invalid IPv6"))?;
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        len => Err(Error::General(format!("Invalid inet length: {len}"))),
    }
}

pub fn cursor_next_value(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>> {
    let mut buff = vec![0u8; len];
    cursor.read_exact(&mut buff)?;
    Ok(buff)
}

pub fn cursor_next_value_ref<'a>(cursor: &mut Cursor<&'a [u8]>, len: usize) -> Result<&'a [u8]> {
    let start = cursor.position() as usize;
    let end = start
        .checked_add(len)
        .filter(|end| *end <= cursor.get_ref().len())
        .ok_or_else(|| Error::from("Could not retrieve a full slice from the cursor"))?;

    let slice: &'a [u8] = *cursor.get_ref();
    cursor.set_position(end as u64);

    Ok(&slice[start..end])
}
