use std::io::{Cursor, Write};

use crate::error::{Error, Result};
use crate::frame::Version;

/// Writes a value in its wire representation for given protocol version.
pub trait Serialize {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version);

    /// Encodes into a fresh buffer, e.g. a whole message body.
    fn serialize_to_vec(&self, version: Version) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize(&mut Cursor::new(&mut buf), version);
        buf
    }
}

/// Reads a value from its wire representation, advancing the cursor past it.
pub trait FromCursor: Sized {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<Self>;

    /// Decodes a value which must span all of `bytes`.
    fn from_slice(bytes: &[u8], version: Version) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let value = Self::from_cursor(&mut cursor, version)?;

        let trailing = bytes.len() as u64 - cursor.position();
        if trailing > 0 {
            return Err(Error::General(format!(
                "{trailing} unexpected trailing bytes"
            )));
        }

        Ok(value)
    }
}

fn write_raw(cursor: &mut Cursor<&mut Vec<u8>>, bytes: &[u8]) {
    // writing to a Vec cannot fail
    let _ = cursor.write_all(bytes);
}

impl<const S: usize> Serialize for [u8; S] {
    #[inline]
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, _version: Version) {
        write_raw(cursor, self);
    }
}

impl Serialize for &[u8] {
    #[inline]
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, _version: Version) {
        write_raw(cursor, self);
    }
}

impl Serialize for Vec<u8> {
    #[inline]
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, _version: Version) {
        write_raw(cursor, self);
    }
}

// integers are always big endian on the wire
macro_rules! impl_serialize_be {
    ($($t:ty),+) => {
        $(
            impl Serialize for $t {
                #[inline]
                fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, _version: Version) {
                    write_raw(cursor, &self.to_be_bytes());
                }
            }
        )+
    };
}

impl_serialize_be!(i8, i16, i32, i64, u8, u16, u32, u64);
