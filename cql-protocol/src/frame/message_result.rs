use bitflags::bitflags;
use derive_more::{Constructor, Display};
use std::convert::TryFrom;
use std::io::Cursor;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::frame::events::SchemaChange;
use crate::frame::traits::FromCursor;
use crate::frame::{Serialize, Version};
use crate::types::rows::Row;
use crate::types::{from_cursor_str, serialize_str, CBytes, CInt, CIntShort};

/// `ResultKind` is enum which represents types of result.
#[derive(Debug, PartialEq, Ord, PartialOrd, Eq, Hash, Copy, Clone, Display)]
pub enum ResultKind {
    /// Void result.
    Void,
    /// Rows result.
    Rows,
    /// Set keyspace result.
    SetKeyspace,
    /// Prepared result.
    Prepared,
    /// Schema change result.
    SchemaChange,
}

impl From<ResultKind> for CInt {
    fn from(value: ResultKind) -> Self {
        match value {
            ResultKind::Void => 0x0001,
            ResultKind::Rows => 0x0002,
            ResultKind::SetKeyspace => 0x0003,
            ResultKind::Prepared => 0x0004,
            ResultKind::SchemaChange => 0x0005,
        }
    }
}

impl TryFrom<CInt> for ResultKind {
    type Error = Error;

    fn try_from(value: CInt) -> Result<Self> {
        match value {
            0x0001 => Ok(ResultKind::Void),
            0x0002 => Ok(ResultKind::Rows),
            0x0003 => Ok(ResultKind::SetKeyspace),
            0x0004 => Ok(ResultKind::Prepared),
            0x0005 => Ok(ResultKind::SchemaChange),
            _ => Err(Error::UnexpectedResultKind(value)),
        }
    }
}

/// Body of a RESULT response. Prepared results are kept raw, since the proxy only forwards
/// them.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ResResultBody {
    Void,
    Rows(BodyResResultRows),
    SetKeyspace(String),
    Prepared(Vec<u8>),
    SchemaChange(SchemaChange),
}

impl ResResultBody {
    pub fn kind(&self) -> ResultKind {
        match self {
            ResResultBody::Void => ResultKind::Void,
            ResResultBody::Rows(_) => ResultKind::Rows,
            ResResultBody::SetKeyspace(_) => ResultKind::SetKeyspace,
            ResResultBody::Prepared(_) => ResultKind::Prepared,
            ResResultBody::SchemaChange(_) => ResultKind::SchemaChange,
        }
    }

    /// Converts a rows result into typed rows. Other kinds yield `None`.
    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            ResResultBody::Rows(rows) => Some(rows.into_rows()),
            _ => None,
        }
    }
}

impl Serialize for ResResultBody {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        CInt::from(self.kind()).serialize(cursor, version);
        match self {
            ResResultBody::Void => {}
            ResResultBody::Rows(rows) => rows.serialize(cursor, version),
            ResResultBody::SetKeyspace(keyspace) => serialize_str(cursor, keyspace, version),
            ResResultBody::Prepared(body) => body.serialize(cursor, version),
            ResResultBody::SchemaChange(change) => change.serialize(cursor, version),
        }
    }
}

impl FromCursor for ResResultBody {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<ResResultBody> {
        let kind = ResultKind::try_from(CInt::from_cursor(cursor, version)?)?;
        match kind {
            ResultKind::Void => Ok(ResResultBody::Void),
            ResultKind::Rows => {
                BodyResResultRows::from_cursor(cursor, version).map(ResResultBody::Rows)
            }
            ResultKind::SetKeyspace => {
                Ok(ResResultBody::SetKeyspace(from_cursor_str(cursor)?.to_string()))
            }
            ResultKind::Prepared => {
                let position = cursor.position() as usize;
                Ok(ResResultBody::Prepared(cursor.get_ref()[position..].to_vec()))
            }
            ResultKind::SchemaChange => {
                SchemaChange::from_cursor(cursor, version).map(ResResultBody::SchemaChange)
            }
        }
    }
}

/// Rows result: metadata followed by raw column values.
#[derive(Debug, PartialEq, Eq, Clone, Constructor)]
pub struct BodyResResultRows {
    pub metadata: Arc<RowsMetadata>,
    pub rows_count: CInt,
    pub rows_content: Vec<Vec<CBytes>>,
    pub version: Version,
}

impl BodyResResultRows {
    pub fn into_rows(self) -> Vec<Row> {
        let metadata = self.metadata;
        let version = self.version;
        self.rows_content
            .into_iter()
            .map(|content| Row::new(metadata.clone(), content, version))
            .collect()
    }
}

impl Serialize for BodyResResultRows {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        self.metadata.serialize(cursor, version);
        self.rows_count.serialize(cursor, version);
        for value in self.rows_content.iter().flatten() {
            value.serialize(cursor, version);
        }
    }
}

impl FromCursor for BodyResResultRows {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<BodyResResultRows> {
        let metadata = RowsMetadata::from_cursor(cursor, version)?;
        let rows_count = CInt::from_cursor(cursor, version)?;
        let columns_count = metadata.columns_count.max(0) as usize;

        let mut rows_content = Vec::with_capacity(rows_count.max(0) as usize);
        for _ in 0..rows_count {
            let row = (0..columns_count)
                .map(|_| CBytes::from_cursor(cursor, version))
                .collect::<Result<Vec<_>>>()?;
            rows_content.push(row);
        }

        Ok(BodyResResultRows {
            metadata: Arc::new(metadata),
            rows_count,
            rows_content,
            version,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RowsMetadataFlags: i32 {
        const GLOBAL_TABLE_SPACE = 0x0001;
        const HAS_MORE_PAGES = 0x0002;
        const NO_METADATA = 0x0004;
    }
}

/// Describes the columns of a rows result.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RowsMetadata {
    pub flags: RowsMetadataFlags,
    pub columns_count: CInt,
    pub paging_state: Option<CBytes>,
    pub global_table_spec: Option<TableSpec>,
    pub col_specs: Vec<ColSpec>,
}

impl RowsMetadata {
    /// Metadata with a global table spec, as produced by system table queries.
    pub fn new(keyspace: &str, table: &str, col_specs: Vec<ColSpec>) -> Self {
        RowsMetadata {
            flags: RowsMetadataFlags::GLOBAL_TABLE_SPACE,
            columns_count: col_specs.len() as CInt,
            paging_state: None,
            global_table_spec: Some(TableSpec::new(keyspace.into(), table.into())),
            col_specs,
        }
    }
}

impl Serialize for RowsMetadata {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        self.flags.bits().serialize(cursor, version);
        self.columns_count.serialize(cursor, version);

        if let Some(paging_state) = &self.paging_state {
            paging_state.serialize(cursor, version);
        }

        if let Some(table_spec) = &self.global_table_spec {
            table_spec.serialize(cursor, version);
        }

        for col_spec in &self.col_specs {
            col_spec.serialize(cursor, version);
        }
    }
}

impl FromCursor for RowsMetadata {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<RowsMetadata> {
        let flags = RowsMetadataFlags::from_bits_truncate(CInt::from_cursor(cursor, version)?);
        let columns_count = CInt::from_cursor(cursor, version)?;

        let paging_state = if flags.contains(RowsMetadataFlags::HAS_MORE_PAGES) {
            Some(CBytes::from_cursor(cursor, version)?)
        } else {
            None
        };

        if flags.contains(RowsMetadataFlags::NO_METADATA) {
            return Ok(RowsMetadata {
                flags,
                columns_count,
                paging_state,
                global_table_spec: None,
                col_specs: vec![],
            });
        }

        let global_table_spec = if flags.contains(RowsMetadataFlags::GLOBAL_TABLE_SPACE) {
            Some(TableSpec::from_cursor(cursor, version)?)
        } else {
            None
        };

        let has_global_table_spec = global_table_spec.is_some();
        let col_specs = (0..columns_count)
            .map(|_| ColSpec::parse(cursor, has_global_table_spec, version))
            .collect::<Result<Vec<_>>>()?;

        Ok(RowsMetadata {
            flags,
            columns_count,
            paging_state,
            global_table_spec,
            col_specs,
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Constructor)]
pub struct TableSpec {
    pub ks_name: String,
    pub table_name: String,
}

impl Serialize for TableSpec {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        serialize_str(cursor, &self.ks_name, version);
        serialize_str(cursor, &self.table_name, version);
    }
}

impl FromCursor for TableSpec {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, _version: Version) -> Result<Self> {
        let ks_name = from_cursor_str(cursor)?.to_string();
        let table_name = from_cursor_str(cursor)?.to_string();
        Ok(TableSpec::new(ks_name, table_name))
    }
}

/// Single column specification.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ColSpec {
    /// Present only when the rows metadata has no global table spec.
    pub table_spec: Option<TableSpec>,
    pub name: String,
    pub col_type: ColTypeOption,
}

impl ColSpec {
    pub fn new(name: &str, col_type: ColTypeOption) -> Self {
        ColSpec {
            table_spec: None,
            name: name.into(),
            col_type,
        }
    }

    fn parse(
        cursor: &mut Cursor<&[u8]>,
        has_global_table_spec: bool,
        version: Version,
    ) -> Result<Self> {
        let table_spec = if has_global_table_spec {
            None
        } else {
            Some(TableSpec::from_cursor(cursor, version)?)
        };

        let name = from_cursor_str(cursor)?.to_string();
        let col_type = ColTypeOption::from_cursor(cursor, version)?;

        Ok(ColSpec {
            table_spec,
            name,
            col_type,
        })
    }
}

impl Serialize for ColSpec {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        if let Some(table_spec) = &self.table_spec {
            table_spec.serialize(cursor, version);
        }

        serialize_str(cursor, &self.name, version);
        self.col_type.serialize(cursor, version);
    }
}

/// Cassandra data types.
#[derive(Debug, Clone, Copy, PartialEq, Ord, PartialOrd, Eq, Hash, Display)]
pub enum ColType {
    Custom,
    Ascii,
    Bigint,
    Blob,
    Boolean,
    Counter,
    Decimal,
    Double,
    Float,
    Int,
    Timestamp,
    Uuid,
    Varchar,
    Varint,
    Timeuuid,
    Inet,
    Date,
    Time,
    Smallint,
    Tinyint,
    Duration,
    List,
    Map,
    Set,
    Udt,
    Tuple,
}

impl From<ColType> for CIntShort {
    fn from(value: ColType) -> Self {
        match value {
            ColType::Custom => 0x0000,
            ColType::Ascii => 0x0001,
            ColType::Bigint => 0x0002,
            ColType::Blob => 0x0003,
            ColType::Boolean => 0x0004,
            ColType::Counter => 0x0005,
            ColType::Decimal => 0x0006,
            ColType::Double => 0x0007,
            ColType::Float => 0x0008,
            ColType::Int => 0x0009,
            ColType::Timestamp => 0x000B,
            ColType::Uuid => 0x000C,
            ColType::Varchar => 0x000D,
            ColType::Varint => 0x000E,
            ColType::Timeuuid => 0x000F,
            ColType::Inet => 0x0010,
            ColType::Date => 0x0011,
            ColType::Time => 0x0012,
            ColType::Smallint => 0x0013,
            ColType::Tinyint => 0x0014,
            ColType::Duration => 0x0015,
            ColType::List => 0x0020,
            ColType::Map => 0x0021,
            ColType::Set => 0x0022,
            ColType::Udt => 0x0030,
            ColType::Tuple => 0x0031,
        }
    }
}

impl TryFrom<CIntShort> for ColType {
    type Error = Error;

    fn try_from(value: CIntShort) -> Result<Self> {
        match value {
            0x0000 => Ok(ColType::Custom),
            0x0001 => Ok(ColType::Ascii),
            0x0002 => Ok(ColType::Bigint),
            0x0003 => Ok(ColType::Blob),
            0x0004 => Ok(ColType::Boolean),
            0x0005 => Ok(ColType::Counter),
            0x0006 => Ok(ColType::Decimal),
            0x0007 => Ok(ColType::Double),
            0x0008 => Ok(ColType::Float),
            0x0009 => Ok(ColType::Int),
            0x000B => Ok(ColType::Timestamp),
            0x000C => Ok(ColType::Uuid),
            0x000D => Ok(ColType::Varchar),
            0x000E => Ok(ColType::Varint),
            0x000F => Ok(ColType::Timeuuid),
            0x0010 => Ok(ColType::Inet),
            0x0011 => Ok(ColType::Date),
            0x0012 => Ok(ColType::Time),
            0x0013 => Ok(ColType::Smallint),
            0x0014 => Ok(ColType::Tinyint),
            0x0015 => Ok(ColType::Duration),
            0x0020 => Ok(ColType::List),
            0x0021 => Ok(ColType::Map),
            0x0022 => Ok(ColType::Set),
            0x0030 => Ok(ColType::Udt),
            0x0031 => Ok(ColType::Tuple),
            _ => Err(Error::UnexpectedColumnType(value)),
        }
    }
}

/// Column type with its nested type parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColTypeOption {
    pub id: ColType,
    pub value: Option<ColTypeOptionValue>,
}

impl ColTypeOption {
    pub fn simple(id: ColType) -> Self {
        ColTypeOption { id, value: None }
    }

    pub fn set_of(id: ColType) -> Self {
        ColTypeOption {
            id: ColType::Set,
            value: Some(ColTypeOptionValue::CSet(Box::new(ColTypeOption::simple(id)))),
        }
    }

    pub fn map_of(key: ColType, value: ColType) -> Self {
        ColTypeOption {
            id: ColType::Map,
            value: Some(ColTypeOptionValue::CMap(
                Box::new(ColTypeOption::simple(key)),
                Box::new(ColTypeOption::simple(value)),
            )),
        }
    }
}

impl Serialize for ColTypeOption {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        CIntShort::from(self.id).serialize(cursor, version);
        if let Some(value) = &self.value {
            value.serialize(cursor, version);
        }
    }
}

impl FromCursor for ColTypeOption {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<ColTypeOption> {
        let id = ColType::try_from(CIntShort::from_cursor(cursor, version)?)?;
        let value = match id {
            ColType::Custom => Some(ColTypeOptionValue::CString(
                from_cursor_str(cursor)?.to_string(),
            )),
            ColType::Set => Some(ColTypeOptionValue::CSet(Box::new(
                ColTypeOption::from_cursor(cursor, version)?,
            ))),
            ColType::List => Some(ColTypeOptionValue::CList(Box::new(
                ColTypeOption::from_cursor(cursor, version)?,
            ))),
            ColType::Map => {
                let key = ColTypeOption::from_cursor(cursor, version)?;
                let value = ColTypeOption::from_cursor(cursor, version)?;
                Some(ColTypeOptionValue::CMap(Box::new(key), Box::new(value)))
            }
            ColType::Udt => {
                let ks = from_cursor_str(cursor)?.to_string();
                let udt_name = from_cursor_str(cursor)?.to_string();
                let count = CIntShort::from_cursor(cursor, version)?;
                let descriptions = (0..count)
                    .map(|_| {
                        let name = from_cursor_str(cursor)?.to_string();
                        let col_type = ColTypeOption::from_cursor(cursor, version)?;
                        Ok((name, col_type))
                    })
                    .collect::<Result<Vec<_>>>()?;

                Some(ColTypeOptionValue::UdtType {
                    ks,
                    udt_name,
                    descriptions,
                })
            }
            ColType::Tuple => {
                let count = CIntShort::from_cursor(cursor, version)?;
                let types = (0..count)
                    .map(|_| ColTypeOption::from_cursor(cursor, version))
                    .collect::<Result<Vec<_>>>()?;
                Some(ColTypeOptionValue::TupleType(types))
            }
            _ => None,
        };

        Ok(ColTypeOption { id, value })
    }
}

/// Type parameters of complex column types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColTypeOptionValue {
    CString(String),
    CSet(Box<ColTypeOption>),
    CList(Box<ColTypeOption>),
    CMap(Box<ColTypeOption>, Box<ColTypeOption>),
    UdtType {
        ks: String,
        udt_name: String,
        descriptions: Vec<(String, ColTypeOption)>,
    },
    TupleType(Vec<ColTypeOption>),
}

impl Serialize for ColTypeOptionValue {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        match self {
            ColTypeOptionValue::CString(class) => serialize_str(cursor, class, version),
            ColTypeOptionValue::CSet(inner) | ColTypeOptionValue::CList(inner) => {
                inner.serialize(cursor, version)
            }
            ColTypeOptionValue::CMap(key, value) => {
                key.serialize(cursor, version);
                value.serialize(cursor, version);
            }
            ColTypeOptionValue::UdtType {
                ks,
                udt_name,
                descriptions,
            } => {
                serialize_str(cursor, ks, version);
                serialize_str(cursor, udt_name, version);
                (descriptions.len() as CIntShort).serialize(cursor, version);
                for (name, col_type) in descriptions {
                    serialize_str(cursor, name, version);
                    col_type.serialize(cursor, version);
                }
            }
            ColTypeOptionValue::TupleType(types) => {
                (types.len() as CIntShort).serialize(cursor, version);
                for col_type in types {
                    col_type.serialize(cursor, version);
                }
            }
        }
    }
}
