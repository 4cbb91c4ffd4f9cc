//! Bounds-checked view over a raw firmware image
//!
//! There is no cursor: every read names its absolute offset, so decoders
//! cannot depend on the order in which other decoders ran.

use core::mem::size_of;

use zerocopy::FromBytes;

use crate::error::{AtomError, Result};

#[derive(Clone, Copy, Debug)]
pub struct Image<'a> {
    data: &'a [u8],
}

impl<'a> Image<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get exactly `len` bytes starting at `offset`.
    pub fn read_fixed(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let size = self.data.len();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(&self.data[offset..end]),
            _ => Err(AtomError::OutOfBounds { offset, len, size }),
        }
    }

    /// Get a NUL-terminated string, terminator included.
    pub fn read_cstring(&self, offset: usize) -> Result<&'a [u8]> {
        let rest = self
            .data
            .get(offset..)
            .ok_or(AtomError::UnterminatedString { offset })?;
        match rest.iter().position(|b| *b == 0) {
            Some(p) => Ok(&rest[..=p]),
            None => Err(AtomError::UnterminatedString { offset }),
        }
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        Ok(self.read_fixed(offset, 1)?[0])
    }

    pub fn read_u16(&self, offset: usize) -> Result<u16> {
        let b = self.read_fixed(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        let b = self.read_fixed(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Copy out a fixed layout structure at `offset`.
    pub fn read<T: FromBytes>(&self, offset: usize) -> Result<T> {
        let len = size_of::<T>();
        let b = self.read_fixed(offset, len)?;
        T::read_from_bytes(b).map_err(|_| AtomError::OutOfBounds {
            offset,
            len,
            size: self.data.len(),
        })
    }
}

#[test]
fn read_fixed_within_bounds() {
    let data = [1u8, 2, 3, 4];
    let image = Image::new(&data);
    assert_eq!(image.read_fixed(1, 3).unwrap(), &[2, 3, 4]);
    assert_eq!(image.read_fixed(4, 0).unwrap(), &[] as &[u8]);
}

#[test]
fn read_fixed_out_of_bounds() {
    let data = [0u8; 4];
    let image = Image::new(&data);
    assert_eq!(
        image.read_fixed(2, 3),
        Err(AtomError::OutOfBounds {
            offset: 2,
            len: 3,
            size: 4
        })
    );
    assert!(matches!(
        image.read_fixed(usize::MAX, 2),
        Err(AtomError::OutOfBounds { .. })
    ));
}

#[test]
fn read_cstring_includes_terminator() {
    let data = *b"xxABC\0yy";
    let image = Image::new(&data);
    assert_eq!(image.read_cstring(2).unwrap(), b"ABC\0");
    assert_eq!(image.read_cstring(5).unwrap(), b"\0");
}

#[test]
fn read_cstring_unterminated() {
    let data = *b"ABC";
    let image = Image::new(&data);
    assert_eq!(
        image.read_cstring(0),
        Err(AtomError::UnterminatedString { offset: 0 })
    );
    assert_eq!(
        image.read_cstring(7),
        Err(AtomError::UnterminatedString { offset: 7 })
    );
}

#[test]
fn read_little_endian() {
    let data = [0x34u8, 0x12, 0x78, 0x56];
    let image = Image::new(&data);
    assert_eq!(image.read_u8(1).unwrap(), 0x12);
    assert_eq!(image.read_u16(0).unwrap(), 0x1234);
    assert_eq!(image.read_u32(0).unwrap(), 0x5678_1234);
    assert!(image.read_u32(1).is_err());
}
