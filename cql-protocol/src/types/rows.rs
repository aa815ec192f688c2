use std::collections::HashMap;
use std::io::Cursor;
use std::net::IpAddr;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::frame::message_result::RowsMetadata;
use crate::frame::traits::FromCursor;
use crate::frame::{Serialize, Version};
use crate::types::{
    cursor_next_value_ref, decode_inet, CBytes, CInt, CIntShort, CLong, INT_LEN, LONG_LEN,
    UUID_LEN,
};

/// A single row of a rows result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    metadata: Arc<RowsMetadata>,
    row_content: Vec<CBytes>,
    protocol_version: Version,
}

impl Row {
    pub fn new(metadata: Arc<RowsMetadata>, row_content: Vec<CBytes>, version: Version) -> Self {
        Row {
            metadata,
            row_content,
            protocol_version: version,
        }
    }

    /// Checks if a column is present in the row.
    pub fn contains_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Checks if a column is missing or holds null.
    pub fn is_empty_by_name(&self, name: &str) -> bool {
        self.column_index(name)
            .and_then(|index| self.row_content.get(index))
            .and_then(CBytes::as_slice)
            .is_none()
    }

    /// Decodes a column by name. Missing columns are an error, null values are `None`.
    pub fn get<T: ColumnValue>(&self, name: &str) -> Result<Option<T>> {
        let index = self
            .column_index(name)
            .ok_or_else(|| Error::General(format!("Column '{name}' not found")))?;

        match self.row_content.get(index).and_then(CBytes::as_slice) {
            Some(bytes) => T::from_column(bytes, self.protocol_version).map(Some),
            None => Ok(None),
        }
    }

    /// Like `get`, but treats missing columns as null.
    pub fn get_opt<T: ColumnValue>(&self, name: &str) -> Result<Option<T>> {
        if self.contains_column(name) {
            self.get(name)
        } else {
            Ok(None)
        }
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.metadata
            .col_specs
            .iter()
            .position(|spec| spec.name == name)
    }
}

/// Conversion between column bytes and Rust values.
pub trait ColumnValue: Sized {
    fn from_column(bytes: &[u8], version: Version) -> Result<Self>;

    fn to_column(&self, version: Version) -> CBytes;
}

impl ColumnValue for String {
    fn from_column(bytes: &[u8], _version: Version) -> Result<Self> {
        String::from_utf8(bytes.to_vec()).map_err(Into::into)
    }

    fn to_column(&self, _version: Version) -> CBytes {
        CBytes::new(self.as_bytes().to_vec())
    }
}

impl ColumnValue for Uuid {
    fn from_column(bytes: &[u8], _version: Version) -> Result<Self> {
        if bytes.len() != UUID_LEN {
            return Err(Error::General(format!(
                "Invalid uuid length: {}",
                bytes.len()
            )));
        }

        Uuid::from_slice(bytes).map_err(Into::into)
    }

    fn to_column(&self, _version: Version) -> CBytes {
        CBytes::new(self.as_bytes().to_vec())
    }
}

impl ColumnValue for IpAddr {
    fn from_column(bytes: &[u8], _version: Version) -> Result<Self> {
        decode_inet(bytes)
    }

    fn to_column(&self, _version: Version) -> CBytes {
        match self {
            IpAddr::V4(v4) => CBytes::new(v4.octets().to_vec()),
            IpAddr::V6(v6) => CBytes::new(v6.octets().to_vec()),
        }
    }
}

impl ColumnValue for CInt {
    fn from_column(bytes: &[u8], _version: Version) -> Result<Self> {
        let bytes: [u8; INT_LEN] = bytes
            .try_into()
            .map_err(|_| Error::General(format!("Invalid int length: {}", bytes.len())))?;
        Ok(CInt::from_be_bytes(bytes))
    }

    fn to_column(&self, _version: Version) -> CBytes {
        CBytes::new(self.to_be_bytes().to_vec())
    }
}

impl ColumnValue for CLong {
    fn from_column(bytes: &[u8], _version: Version) -> Result<Self> {
        let bytes: [u8; LONG_LEN] = bytes
            .try_into()
            .map_err(|_| Error::General(format!("Invalid bigint length: {}", bytes.len())))?;
        Ok(CLong::from_be_bytes(bytes))
    }

    fn to_column(&self, _version: Version) -> CBytes {
        CBytes::new(self.to_be_bytes().to_vec())
    }
}

/// Lists and sets of text.
impl ColumnValue for Vec<String> {
    fn from_column(bytes: &[u8], version: Version) -> Result<Self> {
        let mut cursor: Cursor<&[u8]> = Cursor::new(bytes);
        let count = read_collection_len(&mut cursor, version)?;
        (0..count)
            .map(|_| {
                read_collection_item(&mut cursor, version)
                    .and_then(|item| String::from_column(item, version))
            })
            .collect()
    }

    fn to_column(&self, version: Version) -> CBytes {
        let mut buffer = vec![];
        let mut cursor = Cursor::new(&mut buffer);
        write_collection_len(&mut cursor, self.len(), version);
        for item in self {
            write_collection_item(&mut cursor, item.as_bytes(), version);
        }

        CBytes::new(buffer)
    }
}

impl ColumnValue for HashMap<String, String> {
    fn from_column(bytes: &[u8], version: Version) -> Result<Self> {
        let mut cursor: Cursor<&[u8]> = Cursor::new(bytes);
        let count = read_collection_len(&mut cursor, version)?;
        (0..count)
            .map(|_| {
                let key = read_collection_item(&mut cursor, version)
                    .and_then(|item| String::from_column(item, version))?;
                let value = read_collection_item(&mut cursor, version)
                    .and_then(|item| String::from_column(item, version))?;
                Ok((key, value))
            })
            .collect()
    }

    fn to_column(&self, version: Version) -> CBytes {
        let mut buffer = vec![];
        let mut cursor = Cursor::new(&mut buffer);
        write_collection_len(&mut cursor, self.len(), version);
        for (key, value) in self {
            write_collection_item(&mut cursor, key.as_bytes(), version);
            write_collection_item(&mut cursor, value.as_bytes(), version);
        }

        CBytes::new(buffer)
    }
}

// Protocol v2 encodes collection sizes as shorts, later versions as ints.
fn read_collection_len(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<usize> {
    let len = if version == Version::V2 {
        CIntShort::from_cursor(cursor, version)? as CInt
    } else {
        CInt::from_cursor(cursor, version)?
    };

    Ok(len.max(0) as usize)
}

fn read_collection_item<'a>(cursor: &mut Cursor<&'a [u8]>, version: Version) -> Result<&'a [u8]> {
    let len = read_collection_len(cursor, version)?;
    cursor_next_value_ref(cursor, len)
}

fn write_collection_len(cursor: &mut Cursor<&mut Vec<u8>>, len: usize, version: Version) {
    if version == Version::V2 {
        (len as CIntShort).serialize(cursor, version);
    } else {
        (len as CInt).serialize(cursor, version);
    }
}

fn write_collection_item(cursor: &mut Cursor<&mut Vec<u8>>, item: &[u8], version: Version) {
    write_collection_len(cursor, item.len(), version);
    item.serialize(cursor, version);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::message_result::{ColSpec, ColType, ColTypeOption};
    use maplit::hashmap;

    fn row(version: Version, values: Vec<CBytes>) -> Row {
        let metadata = RowsMetadata::new(
            "system",
            "local",
            vec![
                ColSpec::new("tokens", ColTypeOption::set_of(ColType::Varchar)),
                ColSpec::new(
                    "replication",
                    ColTypeOption::map_of(ColType::Varchar, ColType::Varchar),
                ),
                ColSpec::new("rpc_address", ColTypeOption::simple(ColType::Inet)),
            ],
        );

        Row::new(Arc::new(metadata), values, version)
    }

    #[test]
    fn test_collections_by_version() {
        let tokens = vec!["-100".to_string(), "200".to_string()];
        let replication = hashmap! {
            "class".to_string() => "SimpleStrategy".to_string(),
        };

        for version in [Version::V2, Version::V3, Version::V4] {
            let row = row(
                version,
                vec![
                    tokens.to_column(version),
                    replication.to_column(version),
                    CBytes::new_empty(),
                ],
            );

            assert_eq!(row.get::<Vec<String>>("tokens").unwrap(), Some(tokens.clone()));
            assert_eq!(
                row.get::<HashMap<String, String>>("replication").unwrap(),
                Some(replication.clone())
            );
            assert_eq!(row.get::<IpAddr>("rpc_address").unwrap(), None);
        }

        let encoded = tokens.to_column(Version::V2).into_bytes().unwrap();
        assert_eq!(&encoded[..4], &[0, 2, 0, 4]);
    }

    #[test]
    fn test_missing_column() {
        let row = row(Version::V4, vec![]);
        assert!(row.get::<String>("host_id").is_err());
        assert_eq!(row.get_opt::<String>("host_id").unwrap(), None);
    }

    #[test]
    fn test_invalid_int() {
        assert!(CInt::from_column(&[0, 1], Version::V4).is_err());
        assert_eq!(CInt::from_column(&[0, 0, 0x23, 0x52], Version::V4).unwrap(), 9042);
    }
}
