//! Static registry of parameter types carried by event records.
//!
//! Every parameter of a record has a declared [`ParamType`], fixed by the
//! event schema. The type determines how many bytes the parameter may occupy
//! on the wire: fixed-width types always have the same size, variable types
//! are bounded only by the width of the length prefix used by the record.

use strum::{Display, EnumIter, FromRepr};
use thiserror::Error;

/// Width in bytes of a single entry of the length-prefix array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixWidth {
    /// Default format, `u16` prefixes.
    Short,
    /// Large payload format, `u32` prefixes.
    Large,
}

impl PrefixWidth {
    /// Resolve a raw prefix size in bytes.
    pub fn from_size(size: usize) -> Result<Self, ParamTypeError> {
        match size {
            2 => Ok(Self::Short),
            4 => Ok(Self::Large),
            size => Err(ParamTypeError::InvalidPrefixWidth(size)),
        }
    }

    pub fn size(self) -> usize {
        match self {
            Self::Short => 2,
            Self::Large => 4,
        }
    }

    /// Largest length which can be stored in one prefix entry.
    pub fn max_len(self) -> u32 {
        match self {
            Self::Short => u16::MAX as u32,
            Self::Large => u32::MAX,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamTypeError {
    #[error("unknown parameter type tag {0}")]
    UnknownTag(u16),
    #[error("invalid length prefix width {0}")]
    InvalidPrefixWidth(usize),
}

/// Parameter types, tagged with their wire value.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, EnumIter, FromRepr)]
#[repr(u16)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ParamType {
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    Uint8 = 5,
    Uint16 = 6,
    Uint32 = 7,
    Uint64 = 8,
    /// NUL terminated string.
    Charbuf = 9,
    /// Opaque data, possibly truncated to the snaplen.
    Bytebuf = 10,
    Errno = 11,
    Sockaddr = 12,
    Socktuple = 13,
    Fd = 14,
    Pid = 15,
    Fdlist = 16,
    /// NUL terminated absolute path.
    Fspath = 17,
    Syscallid = 18,
    Sigtype = 19,
    Reltime = 20,
    Abstime = 21,
    /// One byte variant index followed by the variant value.
    Dyn = 27,
    Flags8 = 28,
    Flags16 = 29,
    Flags32 = 30,
    Uid = 31,
    Gid = 32,
    Sigset = 34,
    Charbufarray = 35,
    Mode = 42,
    /// NUL terminated path, relative to a directory fd.
    Fsrelpath = 43,
    Enumflags8 = 44,
    Enumflags16 = 45,
    Enumflags32 = 46,
}

impl ParamType {
    /// Resolve a raw wire tag.
    pub fn from_tag(tag: u16) -> Result<Self, ParamTypeError> {
        Self::from_repr(tag).ok_or(ParamTypeError::UnknownTag(tag))
    }

    pub fn tag(self) -> u16 {
        self as u16
    }

    /// Size of fixed-width types, `None` for variable length types.
    pub fn fixed_size(self) -> Option<u32> {
        use ParamType::*;
        match self {
            Int8 | Uint8 | Flags8 | Enumflags8 | Sigtype => Some(1),
            Int16 | Uint16 | Flags16 | Enumflags16 | Syscallid => Some(2),
            Int32 | Uint32 | Flags32 | Enumflags32 | Uid | Gid | Mode | Sigset => Some(4),
            Int64 | Uint64 | Reltime | Abstime | Errno | Fd | Pid => Some(8),
            Charbuf | Bytebuf | Sockaddr | Socktuple | Fdlist | Fspath | Fsrelpath
            | Charbufarray | Dyn => None,
        }
    }

    pub fn is_variable(self) -> bool {
        self.fixed_size().is_none()
    }

    /// Types holding a NUL terminated string.
    pub fn is_string(self) -> bool {
        matches!(
            self,
            ParamType::Charbuf | ParamType::Fspath | ParamType::Fsrelpath
        )
    }

    /// Minimum and maximum encoded length of this type.
    pub fn bounds(self, width: PrefixWidth) -> (u32, u32) {
        match self.fixed_size() {
            Some(size) => (size, size),
            None => (0, width.max_len()),
        }
    }
}

/// Look up the length bounds of a raw type tag.
///
/// Fails for unknown tags: this means producer and consumer disagree on the
/// protocol version.
pub fn param_bounds(tag: u16, prefix_size: usize) -> Result<(u32, u32), ParamTypeError> {
    let width = PrefixWidth::from_size(prefix_size)?;
    Ok(ParamType::from_tag(tag)?.bounds(width))
}
