//! Errors raised while decoding an ATOM BIOS image
//!
//! Header errors abort the whole decode. Everything else is local to the
//! table being decoded, so a broken sub-table does not hide its siblings.

use core::fmt::{self, Display};

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub enum AtomError {
    /// The legacy option ROM signature at offset 0 is missing.
    InvalidBiosMagic { found: Vec<u8> },
    /// The ATI marker string at 0x30 is missing.
    InvalidAtiMagic { offset: usize, found: Vec<u8> },
    /// The ATOM ROM table does not carry its signature.
    InvalidAtomMagic { offset: usize, found: Vec<u8> },
    /// A read of `len` bytes at `offset` exceeds the image of `size` bytes.
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
    UnterminatedString { offset: usize },
    /// Module `index` of `count` starting at `offset` could not be read.
    TruncatedModuleChain {
        index: usize,
        count: usize,
        offset: usize,
    },
    MalformedIndexTerminator { offset: usize, found: Vec<u8> },
    UnterminatedDataBlockSequence { offset: usize },
    InvalidDataBlockSize { offset: usize, size: usize },
    UnsupportedSchemaVersion { version: u8 },
}

impl Display for AtomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBiosMagic { found } => {
                write!(f, "invalid BIOS magic @ 00000000, got {found:02x?}")
            }
            Self::InvalidAtiMagic { offset, found } => {
                write!(f, "invalid ATI magic @ {offset:08x}, got {found:02x?}")
            }
            Self::InvalidAtomMagic { offset, found } => {
                write!(f, "invalid ATOM magic @ {offset:08x}, got {found:02x?}")
            }
            Self::OutOfBounds { offset, len, size } => write!(
                f,
                "read of {len} bytes @ {offset:08x} out of bounds, image is {size:08x} bytes"
            ),
            Self::UnterminatedString { offset } => {
                write!(f, "string @ {offset:08x} runs past the end of the image")
            }
            Self::TruncatedModuleChain {
                index,
                count,
                offset,
            } => write!(
                f,
                "VRAM module {index} of {count} @ {offset:08x} is truncated"
            ),
            Self::MalformedIndexTerminator { offset, found } => write!(
                f,
                "register index terminator @ {offset:08x} should be [ff, ff, 00], got {found:02x?}"
            ),
            Self::UnterminatedDataBlockSequence { offset } => write!(
                f,
                "no terminating data block before end of image, last attempt @ {offset:08x}"
            ),
            Self::InvalidDataBlockSize { offset, size } => write!(
                f,
                "register block @ {offset:08x} declares data blocks of {size} bytes"
            ),
            Self::UnsupportedSchemaVersion { version } => {
                write!(f, "VRAM module version {version} is not supported")
            }
        }
    }
}

impl std::error::Error for AtomError {}

pub type Result<T> = core::result::Result<T, AtomError>;
