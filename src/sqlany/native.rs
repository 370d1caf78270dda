//! The native client library boundary.
//!
//! These traits mirror the SQL Anywhere C API (`sacapi.h`): an API context
//! hands out connection handles, connections hand out statement handles, and
//! every call reports success as a flag with details retrieved afterwards
//! through [`NativeConnection::error`]. Freeing a handle is dropping it.
//!
//! All calls except [`NativeCancel::cancel`] may block.

use std::sync::Arc;

use bytes::Bytes;

/// API version requested from the library at init time.
pub const SACAPI_VERSION: u32 = 4;

/// Size of the per-connection error message buffer.
pub const ERROR_SIZE: usize = 256;

/// SQLCODE for "row not found"; the end of a result set.
pub const SQLCODE_NO_DATA: i32 = 100;

/// SQLCODE reported when no further result set exists.
pub const SQLCODE_NO_MORE_RESULTS: i32 = 105;

/// Data types used for bound values and fetched column data
/// (`a_sqlany_data_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DataType {
    #[default]
    Invalid = 0,
    Binary = 1,
    String = 2,
    Double = 3,
    Val64 = 4,
    UVal64 = 5,
    Val32 = 6,
    UVal32 = 7,
    Val16 = 8,
    UVal16 = 9,
    Val8 = 10,
    UVal8 = 11,
    Float = 12,
}

/// Declared column type (`DT_*` from `sqldef.h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeType(pub u16);

impl NativeType {
    pub const NOTYPE: NativeType = NativeType(0);
    pub const DATE: NativeType = NativeType(384);
    pub const TIME: NativeType = NativeType(388);
    pub const TIMESTAMP: NativeType = NativeType(392);
    pub const VARCHAR: NativeType = NativeType(448);
    pub const FIXCHAR: NativeType = NativeType(452);
    pub const LONGVARCHAR: NativeType = NativeType(456);
    pub const STRING: NativeType = NativeType(460);
    pub const DOUBLE: NativeType = NativeType(480);
    pub const FLOAT: NativeType = NativeType(482);
    pub const DECIMAL: NativeType = NativeType(484);
    pub const INT: NativeType = NativeType(496);
    pub const SMALLINT: NativeType = NativeType(500);
    pub const BINARY: NativeType = NativeType(524);
    pub const LONGBINARY: NativeType = NativeType(528);
    pub const TINYINT: NativeType = NativeType(604);
    pub const BIGINT: NativeType = NativeType(608);
    pub const UNSINT: NativeType = NativeType(612);
    pub const UNSSMALLINT: NativeType = NativeType(616);
    pub const UNSBIGINT: NativeType = NativeType(620);
    pub const BIT: NativeType = NativeType(624);
    pub const LONGNVARCHAR: NativeType = NativeType(640);

    /// Check if this is one of the character types
    pub fn is_character(self) -> bool {
        matches!(
            self,
            NativeType::VARCHAR
                | NativeType::FIXCHAR
                | NativeType::LONGVARCHAR
                | NativeType::STRING
                | NativeType::LONGNVARCHAR
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Input,
    Output,
    InputOutput,
}

/// A value crossing the bind boundary (`a_sqlany_data_value`).
///
/// `buffer` is empty and `is_null` set for an explicit null.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindValue {
    pub data_type: DataType,
    pub buffer: Bytes,
    pub is_null: bool,
}

impl BindValue {
    pub fn null() -> Self {
        Self {
            data_type: DataType::Invalid,
            buffer: Bytes::new(),
            is_null: true,
        }
    }

    /// Explicit payload length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// A bind parameter slot as described by the library (`a_sqlany_bind_param`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindParam {
    pub direction: Direction,
    pub name: String,
    pub value: BindValue,
}

/// Column metadata (`a_sqlany_column_info`).
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: DataType,
    pub native_type: NativeType,
    pub max_size: usize,
    pub nullable: bool,
}

/// Fetched column data, borrowed from the statement until the next fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnData<'a> {
    pub data_type: DataType,
    pub buffer: &'a [u8],
    pub is_null: bool,
}

/// Entry point of a native client library.
pub trait NativeLibrary: Send + Sync + 'static {
    /// Initialise the API (`sqlany_init_ex`). On failure, returns the highest
    /// version the library supports.
    fn init(&self, app_name: &str, version: u32) -> Result<Box<dyn NativeContext>, u32>;
}

/// An initialised API context. Dropping it is `sqlany_fini_ex`.
pub trait NativeContext: Send + Sync {
    /// Allocate a connection handle (`sqlany_new_connection_ex`).
    fn new_connection(&self) -> Option<Box<dyn NativeConnection>>;
}

/// Interrupts whatever request is outstanding on one connection.
pub trait NativeCancel: Send + Sync {
    fn cancel(&self);
}

/// A connection handle. Dropping it is `sqlany_free_connection`.
pub trait NativeConnection: Send {
    fn connect(&mut self, dsn: &str) -> bool;
    fn disconnect(&mut self) -> bool;

    fn execute_immediate(&mut self, sql: &str) -> bool;
    fn execute_direct(&mut self, sql: &str) -> Option<Box<dyn NativeStatement>>;
    fn prepare(&mut self, sql: &str) -> Option<Box<dyn NativeStatement>>;

    fn commit(&mut self) -> bool;
    fn rollback(&mut self) -> bool;

    /// Copy the last error message into `buf` (NUL-terminated when it fits)
    /// and return its SQLCODE; 0 when there is no error.
    fn error(&self, buf: &mut [u8]) -> i32;
    fn clear_error(&mut self);

    /// Handle for the cancel primitive, usable while another call is blocked.
    fn canceller(&self) -> Arc<dyn NativeCancel>;
}

/// A prepared or executed statement handle. Dropping it is `sqlany_free_stmt`.
///
/// Errors are reported through the owning connection.
pub trait NativeStatement: Send {
    fn num_params(&self) -> i32;
    fn describe_bind_param(&mut self, index: u32) -> Option<BindParam>;
    fn bind_param(&mut self, index: u32, param: &BindParam) -> bool;
    fn execute(&mut self) -> bool;
    fn reset(&mut self) -> bool;

    fn num_cols(&self) -> i32;
    fn column_info(&self, index: u32) -> Option<ColumnInfo>;
    fn fetch_next(&mut self) -> bool;
    fn fetch_absolute(&mut self, row: i32) -> bool;
    fn get_column(&self, index: u32) -> Option<ColumnData<'_>>;
    fn next_result(&mut self) -> bool;
}
