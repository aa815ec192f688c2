//! Consistency levels carried by queries and server errors.
use crate::error::{Error, Result};
use crate::frame::{FromCursor, Serialize, Version};
use crate::types::CIntShort;
use derive_more::Display;
use std::convert::TryFrom;
use std::io;

/// Cassandra consistency level. Control queries issued by the proxy use `One`; client queries
/// carry their own level inside the forwarded frame.
#[derive(Debug, PartialEq, Clone, Copy, Display, Ord, PartialOrd, Eq, Hash, Default)]
pub enum Consistency {
    Any,
    #[default]
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    Serial,
    LocalSerial,
    LocalOne,
}

impl Serialize for Consistency {
    fn serialize(&self, cursor: &mut io::Cursor<&mut Vec<u8>>, version: Version) {
        CIntShort::from(*self).serialize(cursor, version)
    }
}

impl FromCursor for Consistency {
    fn from_cursor(cursor: &mut io::Cursor<&[u8]>, version: Version) -> Result<Self> {
        CIntShort::from_cursor(cursor, version).and_then(Consistency::try_from)
    }
}

impl From<Consistency> for CIntShort {
    fn from(value: Consistency) -> Self {
        match value {
            Consistency::Any => 0x0000,
            Consistency::One => 0x0001,
            Consistency::Two => 0x0002,
            Consistency::Three => 0x0003,
            Consistency::Quorum => 0x0004,
            Consistency::All => 0x0005,
            Consistency::LocalQuorum => 0x0006,
            Consistency::EachQuorum => 0x0007,
            Consistency::Serial => 0x0008,
            Consistency::LocalSerial => 0x0009,
            Consistency::LocalOne => 0x000A,
        }
    }
}

impl TryFrom<CIntShort> for Consistency {
    type Error = Error;

    fn try_from(value: CIntShort) -> Result<Self> {
        match value {
            0x0000 => Ok(Consistency::Any),
            0x0001 => Ok(Consistency::One),
            0x0002 => Ok(Consistency::Two),
            0x0003 => Ok(Consistency::Three),
            0x0004 => Ok(Consistency::Quorum),
            0x0005 => Ok(Consistency::All),
            0x0006 => Ok(Consistency::LocalQuorum),
            0x0007 => Ok(Consistency::EachQuorum),
            0x0008 => Ok(Consistency::Serial),
            0x0009 => Ok(Consistency::LocalSerial),
            0x000A => Ok(Consistency::LocalOne),
            _ => Err(Error::UnknownConsistency(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_consistency_from_cursor() {
        let a = &[0, 0x0A];
        let mut cursor: Cursor<&[u8]> = Cursor::new(a);
        assert_eq!(
            Consistency::from_cursor(&mut cursor, Version::V4).unwrap(),
            Consistency::LocalOne
        );
    }

    #[test]
    fn test_unknown_consistency() {
        assert!(matches!(
            Consistency::try_from(0x0B),
            Err(Error::UnknownConsistency(0x0B))
        ));
    }
}
