use derive_more::Display;
use std::convert::TryFrom;
use std::io::Cursor;
use std::net::SocketAddr;

use crate::error::{Error, Result};
use crate::frame::traits::FromCursor;
use crate::frame::{Serialize, Version};
use crate::types::{from_cursor_str, from_cursor_string_list, serialize_str, serialize_str_list};

// Event types
const TOPOLOGY_CHANGE: &str = "TOPOLOGY_CHANGE";
const STATUS_CHANGE: &str = "STATUS_CHANGE";
const SCHEMA_CHANGE: &str = "SCHEMA_CHANGE";

// Topology changes
const NEW_NODE: &str = "NEW_NODE";
const REMOVED_NODE: &str = "REMOVED_NODE";
const MOVED_NODE: &str = "MOVED_NODE";

// Status changes
const UP: &str = "UP";
const DOWN: &str = "DOWN";

// Schema changes
const CREATED: &str = "CREATED";
const UPDATED: &str = "UPDATED";
const DROPPED: &str = "DROPPED";

// Schema change targets
const KEYSPACE: &str = "KEYSPACE";
const TABLE: &str = "TABLE";
const TYPE: &str = "TYPE";
const FUNCTION: &str = "FUNCTION";
const AGGREGATE: &str = "AGGREGATE";

/// Event kind without details, used for subscription.
#[derive(Debug, PartialEq, Copy, Clone, Ord, PartialOrd, Eq, Hash, Display)]
pub enum SimpleServerEvent {
    #[display("TOPOLOGY_CHANGE")]
    TopologyChange,
    #[display("STATUS_CHANGE")]
    StatusChange,
    #[display("SCHEMA_CHANGE")]
    SchemaChange,
}

impl SimpleServerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimpleServerEvent::TopologyChange => TOPOLOGY_CHANGE,
            SimpleServerEvent::StatusChange => STATUS_CHANGE,
            SimpleServerEvent::SchemaChange => SCHEMA_CHANGE,
        }
    }
}

impl TryFrom<&str> for SimpleServerEvent {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            TOPOLOGY_CHANGE => Ok(SimpleServerEvent::TopologyChange),
            STATUS_CHANGE => Ok(SimpleServerEvent::StatusChange),
            SCHEMA_CHANGE => Ok(SimpleServerEvent::SchemaChange),
            _ => Err(Error::UnknownServerEvent(value.into())),
        }
    }
}

impl From<&ServerEvent> for SimpleServerEvent {
    fn from(event: &ServerEvent) -> SimpleServerEvent {
        match event {
            ServerEvent::TopologyChange(_) => SimpleServerEvent::TopologyChange,
            ServerEvent::StatusChange(_) => SimpleServerEvent::StatusChange,
            ServerEvent::SchemaChange(_) => SimpleServerEvent::SchemaChange,
        }
    }
}

/// Full server event that contains all details about a concrete change.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub enum ServerEvent {
    /// Events related to change in the cluster topology
    TopologyChange(TopologyChange),
    /// Events related to change of node status.
    StatusChange(StatusChange),
    /// Events related to schema change.
    SchemaChange(SchemaChange),
}

impl Serialize for ServerEvent {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        serialize_str(cursor, SimpleServerEvent::from(self).as_str(), version);
        match self {
            ServerEvent::TopologyChange(change) => change.serialize(cursor, version),
            ServerEvent::StatusChange(change) => change.serialize(cursor, version),
            ServerEvent::SchemaChange(change) => change.serialize(cursor, version),
        }
    }
}

impl FromCursor for ServerEvent {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<ServerEvent> {
        match from_cursor_str(cursor)? {
            TOPOLOGY_CHANGE => {
                TopologyChange::from_cursor(cursor, version).map(ServerEvent::TopologyChange)
            }
            STATUS_CHANGE => {
                StatusChange::from_cursor(cursor, version).map(ServerEvent::StatusChange)
            }
            SCHEMA_CHANGE => {
                SchemaChange::from_cursor(cursor, version).map(ServerEvent::SchemaChange)
            }
            event => Err(Error::UnknownServerEvent(event.into())),
        }
    }
}

/// Events related to change in the cluster topology
#[derive(Debug, Clone, Copy, PartialEq, Ord, PartialOrd, Eq, Hash)]
pub struct TopologyChange {
    pub change_type: TopologyChangeType,
    pub addr: SocketAddr,
}

impl Serialize for TopologyChange {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        let change_type = match self.change_type {
            TopologyChangeType::NewNode => NEW_NODE,
            TopologyChangeType::RemovedNode => REMOVED_NODE,
            TopologyChangeType::MovedNode => MOVED_NODE,
        };

        serialize_str(cursor, change_type, version);
        self.addr.serialize(cursor, version);
    }
}

impl FromCursor for TopologyChange {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<TopologyChange> {
        let change_type = match from_cursor_str(cursor)? {
            NEW_NODE => TopologyChangeType::NewNode,
            REMOVED_NODE => TopologyChangeType::RemovedNode,
            MOVED_NODE => TopologyChangeType::MovedNode,
            change_type => return Err(Error::UnexpectedTopologyChangeType(change_type.into())),
        };

        let addr = SocketAddr::from_cursor(cursor, version)?;
        Ok(TopologyChange { change_type, addr })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Ord, PartialOrd, Eq, Hash, Display)]
pub enum TopologyChangeType {
    NewNode,
    RemovedNode,
    MovedNode,
}

/// Events related to change of node status.
#[derive(Debug, Clone, Copy, PartialEq, Ord, PartialOrd, Eq, Hash)]
pub struct StatusChange {
    pub change_type: StatusChangeType,
    pub addr: SocketAddr,
}

impl Serialize for StatusChange {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        let change_type = match self.change_type {
            StatusChangeType::Up => UP,
            StatusChangeType::Down => DOWN,
        };

        serialize_str(cursor, change_type, version);
        self.addr.serialize(cursor, version);
    }
}

impl FromCursor for StatusChange {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<StatusChange> {
        let change_type = match from_cursor_str(cursor)? {
            UP => StatusChangeType::Up,
            DOWN => StatusChangeType::Down,
            change_type => return Err(Error::UnexpectedStatusChangeType(change_type.into())),
        };

        let addr = SocketAddr::from_cursor(cursor, version)?;
        Ok(StatusChange { change_type, addr })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Ord, PartialOrd, Eq, Hash, Display)]
pub enum StatusChangeType {
    Up,
    Down,
}

/// Events related to schema change.
#[derive(Debug, Clone, PartialEq, Ord, PartialOrd, Eq, Hash)]
pub struct SchemaChange {
    pub change_type: SchemaChangeType,
    pub target: SchemaChangeTarget,
    pub options: SchemaChangeOptions,
}

impl Serialize for SchemaChange {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        serialize_str(cursor, self.change_type.as_str(), version);

        if version == Version::V2 {
            let (keyspace, table) = match &self.options {
                SchemaChangeOptions::Keyspace(keyspace) => (keyspace.as_str(), ""),
                SchemaChangeOptions::TableType { keyspace, name }
                | SchemaChangeOptions::FunctionAggregate { keyspace, name, .. } => {
                    (keyspace.as_str(), name.as_str())
                }
            };

            serialize_str(cursor, keyspace, version);
            serialize_str(cursor, table, version);
            return;
        }

        serialize_str(cursor, self.target.as_str(), version);
        match &self.options {
            SchemaChangeOptions::Keyspace(keyspace) => serialize_str(cursor, keyspace, version),
            SchemaChangeOptions::TableType { keyspace, name } => {
                serialize_str(cursor, keyspace, version);
                serialize_str(cursor, name, version);
            }
            SchemaChangeOptions::FunctionAggregate {
                keyspace,
                name,
                arg_types,
            } => {
                serialize_str(cursor, keyspace, version);
                serialize_str(cursor, name, version);
                serialize_str_list(cursor, arg_types.iter().map(String::as_str), version);
            }
        }
    }
}

impl FromCursor for SchemaChange {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<SchemaChange> {
        let change_type = SchemaChangeType::try_from(from_cursor_str(cursor)?)?;

        if version == Version::V2 {
            let keyspace = from_cursor_str(cursor)?.to_string();
            let table = from_cursor_str(cursor)?;
            let (target, options) = if table.is_empty() {
                (
                    SchemaChangeTarget::Keyspace,
                    SchemaChangeOptions::Keyspace(keyspace),
                )
            } else {
                (
                    SchemaChangeTarget::Table,
                    SchemaChangeOptions::TableType {
                        keyspace,
                        name: table.to_string(),
                    },
                )
            };

            return Ok(SchemaChange {
                change_type,
                target,
                options,
            });
        }

        let target = SchemaChangeTarget::try_from(from_cursor_str(cursor)?)?;
        let options = match target {
            SchemaChangeTarget::Keyspace => {
                SchemaChangeOptions::Keyspace(from_cursor_str(cursor)?.to_string())
            }
            SchemaChangeTarget::Table | SchemaChangeTarget::Type => {
                SchemaChangeOptions::TableType {
                    keyspace: from_cursor_str(cursor)?.to_string(),
                    name: from_cursor_str(cursor)?.to_string(),
                }
            }
            SchemaChangeTarget::Function | SchemaChangeTarget::Aggregate => {
                SchemaChangeOptions::FunctionAggregate {
                    keyspace: from_cursor_str(cursor)?.to_string(),
                    name: from_cursor_str(cursor)?.to_string(),
                    arg_types: from_cursor_string_list(cursor)?,
                }
            }
        };

        Ok(SchemaChange {
            change_type,
            target,
            options,
        })
    }
}

impl SchemaChange {
    /// Keyspace affected by the change.
    pub fn keyspace(&self) -> &str {
        match &self.options {
            SchemaChangeOptions::Keyspace(keyspace)
            | SchemaChangeOptions::TableType { keyspace, .. }
            | SchemaChangeOptions::FunctionAggregate { keyspace, .. } => keyspace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Ord, PartialOrd, Eq, Hash, Display)]
pub enum SchemaChangeType {
    Created,
    Updated,
    Dropped,
}

impl SchemaChangeType {
    fn as_str(&self) -> &'static str {
        match self {
            SchemaChangeType::Created => CREATED,
            SchemaChangeType::Updated => UPDATED,
            SchemaChangeType::Dropped => DROPPED,
        }
    }
}

impl TryFrom<&str> for SchemaChangeType {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            CREATED => Ok(SchemaChangeType::Created),
            UPDATED => Ok(SchemaChangeType::Updated),
            DROPPED => Ok(SchemaChangeType::Dropped),
            _ => Err(Error::UnexpectedSchemaChangeType(value.into())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Ord, PartialOrd, Eq, Hash, Display)]
pub enum SchemaChangeTarget {
    Keyspace,
    Table,
    Type,
    Function,
    Aggregate,
}

impl SchemaChangeTarget {
    fn as_str(&self) -> &'static str {
        match self {
            SchemaChangeTarget::Keyspace => KEYSPACE,
            SchemaChangeTarget::Table => TABLE,
            SchemaChangeTarget::Type => TYPE,
            SchemaChangeTarget::Function => FUNCTION,
            SchemaChangeTarget::Aggregate => AGGREGATE,
        }
    }
}

impl TryFrom<&str> for SchemaChangeTarget {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            KEYSPACE => Ok(SchemaChangeTarget::Keyspace),
            TABLE => Ok(SchemaChangeTarget::Table),
            TYPE => Ok(SchemaChangeTarget::Type),
            FUNCTION => Ok(SchemaChangeTarget::Function),
            AGGREGATE => Ok(SchemaChangeTarget::Aggregate),
            _ => Err(Error::UnexpectedSchemaChangeTarget(value.into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Ord, PartialOrd, Eq, Hash)]
pub enum SchemaChangeOptions {
    /// Name of the changed keyspace.
    Keyspace(String),
    /// Changed table or user type.
    TableType { keyspace: String, name: String },
    /// Changed function or aggregate.
    FunctionAggregate {
        keyspace: String,
        name: String,
        arg_types: Vec<String>,
    },
}
