/// This modules contains [Cassandra's errors](<https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec>)
/// which server could respond to client.
use derive_more::Display;
use std::io::Cursor;

use crate::consistency::Consistency;
use crate::error::{Error, Result};
use crate::frame::traits::FromCursor;
use crate::frame::{Serialize, Version};
use crate::types::*;

/// Error returned by a server as a response. As in the protocol description, it contains an
/// error code and a message. Depending on the kind of error, it can also carry additional
/// information represented by `additional_info`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ErrorBody {
    /// Error message string.
    pub message: String,
    /// Additional information.
    pub additional_info: AdditionalErrorInfo,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>, additional_info: AdditionalErrorInfo) -> Self {
        ErrorBody {
            message: message.into(),
            additional_info,
        }
    }

    /// Protocol error sent by a server which does not speak the requested protocol version.
    pub fn is_unsupported_protocol_version(&self) -> bool {
        matches!(self.additional_info, AdditionalErrorInfo::Protocol)
            && self.message.to_lowercase().contains("protocol version")
    }
}

impl Serialize for ErrorBody {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        self.additional_info.error_code().serialize(cursor, version);
        serialize_str(cursor, &self.message, version);
        self.additional_info.serialize(cursor, version);
    }
}

impl FromCursor for ErrorBody {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<ErrorBody> {
        let error_code = CInt::from_cursor(cursor, version)?;
        let message = from_cursor_str(cursor)?.to_string();
        let additional_info =
            AdditionalErrorInfo::from_cursor_with_code(cursor, error_code, version)?;

        Ok(ErrorBody {
            message,
            additional_info,
        })
    }
}

/// Additional error info in accordance to
/// [Cassandra protocol v4]
/// (<https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec>).
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum AdditionalErrorInfo {
    Server,
    Protocol,
    Authentication,
    Unavailable(UnavailableError),
    Overloaded,
    IsBootstrapping,
    Truncate,
    WriteTimeout(WriteTimeoutError),
    ReadTimeout(ReadTimeoutError),
    ReadFailure(ReadFailureError),
    FunctionFailure(FunctionFailureError),
    WriteFailure(WriteFailureError),
    Syntax,
    Unauthorized,
    Invalid,
    Config,
    AlreadyExists(AlreadyExistsError),
    Unprepared(UnpreparedError),
}

impl Serialize for AdditionalErrorInfo {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        match self {
            AdditionalErrorInfo::Unavailable(unavailable) => unavailable.serialize(cursor, version),
            AdditionalErrorInfo::WriteTimeout(write_timeout) => {
                write_timeout.serialize(cursor, version)
            }
            AdditionalErrorInfo::ReadTimeout(read_timeout) => {
                read_timeout.serialize(cursor, version)
            }
            AdditionalErrorInfo::ReadFailure(read_failure) => {
                read_failure.serialize(cursor, version)
            }
            AdditionalErrorInfo::FunctionFailure(function_failure) => {
                function_failure.serialize(cursor, version)
            }
            AdditionalErrorInfo::WriteFailure(write_failure) => {
                write_failure.serialize(cursor, version)
            }
            AdditionalErrorInfo::AlreadyExists(already_exists) => {
                already_exists.serialize(cursor, version)
            }
            AdditionalErrorInfo::Unprepared(unprepared) => unprepared.serialize(cursor, version),
            AdditionalErrorInfo::Server
            | AdditionalErrorInfo::Protocol
            | AdditionalErrorInfo::Authentication
            | AdditionalErrorInfo::Overloaded
            | AdditionalErrorInfo::IsBootstrapping
            | AdditionalErrorInfo::Truncate
            | AdditionalErrorInfo::Syntax
            | AdditionalErrorInfo::Unauthorized
            | AdditionalErrorInfo::Invalid
            | AdditionalErrorInfo::Config => {}
        }
    }
}

impl AdditionalErrorInfo {
    pub fn error_code(&self) -> CInt {
        match self {
            AdditionalErrorInfo::Server => 0x0000,
            AdditionalErrorInfo::Protocol => 0x000A,
            AdditionalErrorInfo::Authentication => 0x0100,
            AdditionalErrorInfo::Unavailable(_) => 0x1000,
            AdditionalErrorInfo::Overloaded => 0x1001,
            AdditionalErrorInfo::IsBootstrapping => 0x1002,
            AdditionalErrorInfo::Truncate => 0x1003,
            AdditionalErrorInfo::WriteTimeout(_) => 0x1100,
            AdditionalErrorInfo::ReadTimeout(_) => 0x1200,
            AdditionalErrorInfo::ReadFailure(_) => 0x1300,
            AdditionalErrorInfo::FunctionFailure(_) => 0x1400,
            AdditionalErrorInfo::WriteFailure(_) => 0x1500,
            AdditionalErrorInfo::Syntax => 0x2000,
            AdditionalErrorInfo::Unauthorized => 0x2100,
            AdditionalErrorInfo::Invalid => 0x2200,
            AdditionalErrorInfo::Config => 0x2300,
            AdditionalErrorInfo::AlreadyExists(_) => 0x2400,
            AdditionalErrorInfo::Unprepared(_) => 0x2500,
        }
    }

    pub fn from_cursor_with_code(
        cursor: &mut Cursor<&[u8]>,
        error_code: CInt,
        version: Version,
    ) -> Result<AdditionalErrorInfo> {
        match error_code {
            0x0000 => Ok(AdditionalErrorInfo::Server),
            0x000A => Ok(AdditionalErrorInfo::Protocol),
            0x0100 => Ok(AdditionalErrorInfo::Authentication),
            0x1000 => {
                UnavailableError::from_cursor(cursor, version).map(AdditionalErrorInfo::Unavailable)
            }
            0x1001 => Ok(AdditionalErrorInfo::Overloaded),
            0x1002 => Ok(AdditionalErrorInfo::IsBootstrapping),
            0x1003 => Ok(AdditionalErrorInfo::Truncate),
            0x1100 => WriteTimeoutError::from_cursor(cursor, version)
                .map(AdditionalErrorInfo::WriteTimeout),
            0x1200 => {
                ReadTimeoutError::from_cursor(cursor, version).map(AdditionalErrorInfo::ReadTimeout)
            }
            0x1300 => {
                ReadFailureError::from_cursor(cursor, version).map(AdditionalErrorInfo::ReadFailure)
            }
            0x1400 => FunctionFailureError::from_cursor(cursor, version)
                .map(AdditionalErrorInfo::FunctionFailure),
            0x1500 => WriteFailureError::from_cursor(cursor, version)
                .map(AdditionalErrorInfo::WriteFailure),
            0x2000 => Ok(AdditionalErrorInfo::Syntax),
            0x2100 => Ok(AdditionalErrorInfo::Unauthorized),
            0x2200 => Ok(AdditionalErrorInfo::Invalid),
            0x2300 => Ok(AdditionalErrorInfo::Config),
            0x2400 => AlreadyExistsError::from_cursor(cursor, version)
                .map(AdditionalErrorInfo::AlreadyExists),
            0x2500 => {
                UnpreparedError::from_cursor(cursor, version).map(AdditionalErrorInfo::Unprepared)
            }
            _ => Err(Error::UnexpectedErrorCode(error_code)),
        }
    }
}

/// Additional info about
/// [unavailable exception]
/// (<https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec>)
#[derive(Debug, PartialEq, Ord, PartialOrd, Eq, Copy, Clone, Hash)]
pub struct UnavailableError {
    /// Consistency level of query.
    pub cl: Consistency,
    /// Number of nodes that should be available to respect `cl`.
    pub required: CInt,
    /// Number of replicas that we were know to be alive.
    pub alive: CInt,
}

impl Serialize for UnavailableError {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        self.cl.serialize(cursor, version);
        self.required.serialize(cursor, version);
        self.alive.serialize(cursor, version);
    }
}

impl FromCursor for UnavailableError {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<UnavailableError> {
        let cl = Consistency::from_cursor(cursor, version)?;
        let required = CInt::from_cursor(cursor, version)?;
        let alive = CInt::from_cursor(cursor, version)?;

        Ok(UnavailableError {
            cl,
            required,
            alive,
        })
    }
}

/// Timeout exception during a write request.
#[derive(Debug, PartialEq, Copy, Clone, Ord, PartialOrd, Eq, Hash)]
pub struct WriteTimeoutError {
    /// Consistency level of query.
    pub cl: Consistency,
    /// `i32` representing the number of nodes having acknowledged the request.
    pub received: CInt,
    /// `i32` representing the number of replicas whose acknowledgement is required to achieve `cl`.
    pub block_for: CInt,
    /// Describes the type of the write that timed out
    pub write_type: WriteType,
}

impl Serialize for WriteTimeoutError {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        self.cl.serialize(cursor, version);
        self.received.serialize(cursor, version);
        self.block_for.serialize(cursor, version);
        self.write_type.serialize(cursor, version);
    }
}

impl FromCursor for WriteTimeoutError {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<WriteTimeoutError> {
        let cl = Consistency::from_cursor(cursor, version)?;
        let received = CInt::from_cursor(cursor, version)?;
        let block_for = CInt::from_cursor(cursor, version)?;
        let write_type = WriteType::from_cursor(cursor, version)?;

        Ok(WriteTimeoutError {
            cl,
            received,
            block_for,
            write_type,
        })
    }
}

/// Timeout exception during a read request.
#[derive(Debug, PartialEq, Ord, PartialOrd, Eq, Copy, Clone, Hash)]
pub struct ReadTimeoutError {
    /// Consistency level of query.
    pub cl: Consistency,
    /// `i32` representing the number of nodes having acknowledged the request.
    pub received: CInt,
    /// `i32` representing the number of replicas whose acknowledgement is required to achieve `cl`.
    pub block_for: CInt,
    /// Whether the replica asked for data had responded.
    pub data_present: bool,
}

impl Serialize for ReadTimeoutError {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        self.cl.serialize(cursor, version);
        self.received.serialize(cursor, version);
        self.block_for.serialize(cursor, version);
        u8::from(self.data_present).serialize(cursor, version);
    }
}

impl FromCursor for ReadTimeoutError {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<ReadTimeoutError> {
        let cl = Consistency::from_cursor(cursor, version)?;
        let received = CInt::from_cursor(cursor, version)?;
        let block_for = CInt::from_cursor(cursor, version)?;
        let data_present = u8::from_cursor(cursor, version)? != 0;

        Ok(ReadTimeoutError {
            cl,
            received,
            block_for,
            data_present,
        })
    }
}

/// A non-timeout exception during a read request.
#[derive(Debug, PartialEq, Ord, PartialOrd, Eq, Copy, Clone, Hash)]
pub struct ReadFailureError {
    /// Consistency level of query.
    pub cl: Consistency,
    /// The number of nodes having acknowledged the request.
    pub received: CInt,
    /// The number of replicas whose acknowledgement is required to achieve `cl`.
    pub block_for: CInt,
    /// The number of nodes that experienced a failure while executing the request.
    pub num_failures: CInt,
    pub data_present: bool,
}

impl Serialize for ReadFailureError {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        self.cl.serialize(cursor, version);
        self.received.serialize(cursor, version);
        self.block_for.serialize(cursor, version);
        self.num_failures.serialize(cursor, version);
        u8::from(self.data_present).serialize(cursor, version);
    }
}

impl FromCursor for ReadFailureError {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<ReadFailureError> {
        let cl = Consistency::from_cursor(cursor, version)?;
        let received = CInt::from_cursor(cursor, version)?;
        let block_for = CInt::from_cursor(cursor, version)?;
        let num_failures = CInt::from_cursor(cursor, version)?;
        let data_present = u8::from_cursor(cursor, version)? != 0;

        Ok(ReadFailureError {
            cl,
            received,
            block_for,
            num_failures,
            data_present,
        })
    }
}

/// A (user defined) function failed during execution.
#[derive(Debug, PartialEq, Ord, PartialOrd, Eq, Hash, Clone)]
pub struct FunctionFailureError {
    /// The keyspace of the failed function.
    pub keyspace: String,
    /// The name of the failed function
    pub function: String,
    /// One string for each argument type (as CQL type) of the failed function.
    pub arg_types: Vec<String>,
}

impl Serialize for FunctionFailureError {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        serialize_str(cursor, &self.keyspace, version);
        serialize_str(cursor, &self.function, version);
        serialize_str_list(cursor, self.arg_types.iter().map(|x| x.as_str()), version);
    }
}

impl FromCursor for FunctionFailureError {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, _version: Version) -> Result<FunctionFailureError> {
        let keyspace = from_cursor_str(cursor)?.to_string();
        let function = from_cursor_str(cursor)?.to_string();
        let arg_types = from_cursor_string_list(cursor)?;

        Ok(FunctionFailureError {
            keyspace,
            function,
            arg_types,
        })
    }
}

/// A non-timeout exception during a write request.
/// [Read more...](https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec#L1106)
#[derive(Debug, PartialEq, Ord, PartialOrd, Eq, Copy, Clone, Hash)]
pub struct WriteFailureError {
    /// Consistency of the query having triggered the exception.
    pub cl: Consistency,
    /// The number of nodes having answered the request.
    pub received: CInt,
    /// The number of replicas whose response is required to achieve `cl`.
    pub block_for: CInt,
    /// The number of nodes that experienced a failure while executing the request.
    pub num_failures: CInt,
    /// describes the type of the write that failed.
    pub write_type: WriteType,
}

impl Serialize for WriteFailureError {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        self.cl.serialize(cursor, version);
        self.received.serialize(cursor, version);
        self.block_for.serialize(cursor, version);
        self.num_failures.serialize(cursor, version);
        self.write_type.serialize(cursor, version);
    }
}

impl FromCursor for WriteFailureError {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<WriteFailureError> {
        let cl = Consistency::from_cursor(cursor, version)?;
        let received = CInt::from_cursor(cursor, version)?;
        let block_for = CInt::from_cursor(cursor, version)?;
        let num_failures = CInt::from_cursor(cursor, version)?;
        let write_type = WriteType::from_cursor(cursor, version)?;

        Ok(WriteFailureError {
            cl,
            received,
            block_for,
            num_failures,
            write_type,
        })
    }
}

/// Describes the type of the write that failed.
/// [Read more...](https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec#L1118)
#[derive(Debug, PartialEq, Ord, PartialOrd, Eq, Copy, Clone, Hash, Display)]
pub enum WriteType {
    /// The write was a non-batched non-counter write
    Simple,
    /// The write was a (logged) batch write.
    /// If this type is received, it means the batch log
    /// has been successfully written
    Batch,
    /// The write was an unlogged batch. No batch log write has been attempted.
    UnloggedBatch,
    /// The write was a counter write (batched or not)
    Counter,
    /// The failure occurred during the write to the batch log when a (logged) batch
    /// write was requested.
    BatchLog,
    /// The timeout occurred during the write to the CAS table (lightweight transaction).
    Cas,
    /// The timeout occurred when a write involves a materialized view update.
    View,
    /// The timeout occurred during a write to a CDC-enabled table.
    Cdc,
}

impl WriteType {
    fn as_str(&self) -> &'static str {
        match self {
            WriteType::Simple => "SIMPLE",
            WriteType::Batch => "BATCH",
            WriteType::UnloggedBatch => "UNLOGGED_BATCH",
            WriteType::Counter => "COUNTER",
            WriteType::BatchLog => "BATCH_LOG",
            WriteType::Cas => "CAS",
            WriteType::View => "VIEW",
            WriteType::Cdc => "CDC",
        }
    }
}

impl Serialize for WriteType {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        serialize_str(cursor, self.as_str(), version);
    }
}

impl FromCursor for WriteType {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, _version: Version) -> Result<WriteType> {
        match from_cursor_str(cursor)? {
            "SIMPLE" => Ok(WriteType::Simple),
            "BATCH" => Ok(WriteType::Batch),
            "UNLOGGED_BATCH" => Ok(WriteType::UnloggedBatch),
            "COUNTER" => Ok(WriteType::Counter),
            "BATCH_LOG" => Ok(WriteType::BatchLog),
            "CAS" => Ok(WriteType::Cas),
            "VIEW" => Ok(WriteType::View),
            "CDC" => Ok(WriteType::Cdc),
            wt => Err(Error::UnexpectedWriteType(wt.into())),
        }
    }
}

/// The query attempted to create a keyspace or a table that was already existing.
/// [Read more...](https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec#L1140)
#[derive(Debug, PartialEq, Ord, PartialOrd, Eq, Hash, Clone)]
pub struct AlreadyExistsError {
    /// Represents either the keyspace that already exists,
    /// or the keyspace in which the table that already exists is.
    pub ks: String,
    /// Represents the name of the table that already exists.
    pub table: String,
}

impl Serialize for AlreadyExistsError {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        serialize_str(cursor, &self.ks, version);
        serialize_str(cursor, &self.table, version);
    }
}

impl FromCursor for AlreadyExistsError {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, _version: Version) -> Result<AlreadyExistsError> {
        let ks = from_cursor_str(cursor)?.to_string();
        let table = from_cursor_str(cursor)?.to_string();

        Ok(AlreadyExistsError { ks, table })
    }
}

/// Can be thrown while a prepared statement tries to be
/// executed if the provided prepared statement ID is not known by
/// this host. [Read more...]
/// (<https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec#L1150>)
#[derive(Debug, PartialEq, Ord, PartialOrd, Eq, Hash, Clone)]
pub struct UnpreparedError {
    /// Unknown ID.
    pub id: CBytesShort,
}

impl Serialize for UnpreparedError {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>, version: Version) {
        self.id.serialize(cursor, version);
    }
}

impl FromCursor for UnpreparedError {
    fn from_cursor(cursor: &mut Cursor<&[u8]>, version: Version) -> Result<UnpreparedError> {
        let id = CBytesShort::from_cursor(cursor, version)?;

        Ok(UnpreparedError { id })
    }
}
