use core::fmt;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Everything that can go wrong while building, decoding or querying a frame
/// table.
///
/// The variants fall into three groups:
/// - format errors ([`Error::BadMagic`], [`Error::UnsupportedVersion`],
///   [`Error::UnsupportedAbi`], [`Error::Truncated`], [`Error::Malformed`],
///   [`Error::IndexOutOfRange`]) mean the bytes cannot be trusted.
/// - lookup misses ([`Error::NoFunctionFound`], [`Error::NoRowFound`]) are
///   expected outcomes. There is simply no unwind information for that PC.
/// - everything else is encoder misuse, reported at the call that broke the
///   invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    BadMagic {
        found: u32,
    },
    UnsupportedVersion {
        found: u8,
    },
    UnsupportedAbi {
        found: u8,
    },
    /// A declared region of the table reaches past the end of the buffer.
    Truncated {
        what: &'static str,
        needed: usize,
        len: usize,
    },
    /// A field holds a value the format does not define.
    Malformed {
        what: &'static str,
        value: u32,
    },
    IndexOutOfRange {
        index: usize,
        count: usize,
    },
    NoFunctionFound {
        pc_offset: i32,
    },
    NoRowFound {
        function: usize,
    },
    InvalidOrder {
        function: usize,
        previous_start: i32,
        start: i32,
    },
    NonMonotonicRow {
        function: usize,
        row: usize,
        previous_start: u32,
        start: u32,
    },
    /// A row starting at or past the end of its function, or of the
    /// repeating block for [`PcType::Mask`](crate::PcType::Mask) functions.
    RowOutsideFunction {
        function: usize,
        row: usize,
        start: u32,
        limit: u32,
    },
    OffsetOverflow {
        function: usize,
        row: usize,
        value: i64,
        width: u8,
    },
    IncompleteFunction {
        function: usize,
        expected: u32,
        actual: u32,
    },
}

impl Error {
    /// Whether this is a plain "no unwind information here" answer rather
    /// than a broken table.
    pub fn is_lookup_miss(&self) -> bool {
        matches!(self, Error::NoFunctionFound { .. } | Error::NoRowFound { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadMagic { found } => write!(f, "bad frame table magic: {found:#010x}"),
            Error::UnsupportedVersion { found } => {
                write!(f, "unsupported frame table version: {found}")
            }
            Error::UnsupportedAbi { found } => write!(f, "unsupported ABI/arch tag: {found}"),
            Error::Truncated { what, needed, len } => write!(
                f,
                "truncated frame table: {what} needs {needed} bytes but the buffer has {len}"
            ),
            Error::Malformed { what, value } => write!(f, "malformed {what}: {value:#x}"),
            Error::IndexOutOfRange { index, count } => {
                write!(f, "index {index} out of range for {count} entries")
            }
            Error::NoFunctionFound { pc_offset } => {
                write!(f, "no function covers pc offset {pc_offset:#x}")
            }
            Error::NoRowFound { function } => write!(f, "function {function} has no matching row"),
            Error::InvalidOrder {
                function,
                previous_start,
                start,
            } => write!(
                f,
                "function {function} starts at {start:#x}, \
                 before the previous function at {previous_start:#x}"
            ),
            Error::NonMonotonicRow {
                function,
                row,
                previous_start,
                start,
            } => write!(
                f,
                "row {row} of function {function} starts at {start:#x}, \
                 not after the previous row at {previous_start:#x}"
            ),
            Error::RowOutsideFunction {
                function,
                row,
                start,
                limit,
            } => write!(
                f,
                "row {row} of function {function} starts at {start:#x}, \
                 past the {limit:#x} bytes it describes"
            ),
            Error::OffsetOverflow {
                function,
                row,
                value,
                width,
            } => write!(
                f,
                "row {row} of function {function}: {value} does not fit in {width} byte(s)"
            ),
            Error::IncompleteFunction {
                function,
                expected,
                actual,
            } => write!(
                f,
                "function {function} declared {expected} rows but {actual} were added"
            ),
        }
    }
}

impl core::error::Error for Error {}
