//! Register programming blocks (ATOM_INIT_REG_BLOCK)
//!
//! A block starts with a table of register indices, terminated by
//! `ff ff 00`. The size field of the header accounts for the terminator.
//! Then follow memory setting data blocks of a fixed size, one per memory
//! module and clock range. There is no count for those; the sequence ends
//! with a block whose memory ID is all zero.

use core::fmt::{self, Display};

use bitfield_struct::bitfield;
use log::debug;
use serde::{Deserialize, Serialize};
use zerocopy::Ref;
use zerocopy_derive::{FromBytes, Immutable, IntoBytes};

use crate::{
    error::{AtomError, Result},
    image::Image,
};

pub const INDEX_TERMINATOR: &[u8] = &[0xff, 0xff, 0x00];

#[derive(Immutable, IntoBytes, FromBytes, Serialize, Deserialize, Clone, Copy, Debug)]
#[derive(Default, Eq, PartialEq)]
#[repr(C)]
pub struct RegBlockHeader {
    /// Size of the index table in bytes, including its terminator
    pub reg_index_tbl_size: u16,
    pub reg_data_blk_size: u16,
}

const HEADER_SIZE: usize = size_of::<RegBlockHeader>();

/// ATOM_INIT_REG_INDEX_FORMAT
#[derive(Immutable, IntoBytes, FromBytes, Serialize, Deserialize, Clone, Copy, Debug)]
#[derive(Eq, PartialEq)]
#[repr(C, packed)]
pub struct RegIndex {
    pub reg_index: u16,
    pub pre_reg_data_length: u8,
}

const REG_INDEX_SIZE: usize = size_of::<RegIndex>();

impl Display for RegIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let i = self.reg_index;
        let l = self.pre_reg_data_length;
        write!(f, "{i:04x} ({l})")
    }
}

/// ATOM_MEMORY_SETTING_ID_CONFIG
#[bitfield(u32)]
#[derive(Immutable, FromBytes, IntoBytes, Serialize, Deserialize, Eq, PartialEq)]
pub struct MemoryId {
    /// Upper bound of the memory clock, in units of 10 kHz
    #[bits(24)]
    pub clock_range: u32,
    /// Index of the VRAM module this applies to
    pub block_id: u8,
}

// memory ID + access ID
const DATA_BLOCK_MIN_SIZE: usize = 8;

/// ATOM_MEMORY_SETTING_DATA_BLOCK
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct MemorySettingBlock {
    /// Absolute, for display only
    pub offset: usize,
    pub memory_id: MemoryId,
    pub access_id: u32,
    pub data: Vec<u32>,
}

fn u8_slice_to_u32(slice: &[u8]) -> Vec<u32> {
    slice
        .chunks_exact(4)
        .map(|v| u32::from_le_bytes([v[0], v[1], v[2], v[3]]))
        .collect()
}

impl MemorySettingBlock {
    /// `data` must hold at least the memory ID and access ID.
    fn parse(data: &[u8], offset: usize) -> Self {
        let words = u8_slice_to_u32(data);
        Self {
            offset,
            memory_id: MemoryId::from_bits(words[0]),
            access_id: words[1],
            data: words[2..].to_vec(),
        }
    }

    pub fn clock_mhz(&self) -> f64 {
        self.memory_id.clock_range() as f64 / 100.0
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct RegBlock {
    pub offset: usize,
    pub header: RegBlockHeader,
    pub index: Vec<RegIndex>,
    pub blocks: Vec<MemorySettingBlock>,
}

impl RegBlock {
    pub fn parse(image: &Image, offset: usize) -> Result<Self> {
        let header = image.read::<RegBlockHeader>(offset)?;

        // The size covers one more entry, which is the terminator.
        let count = (header.reg_index_tbl_size as usize / REG_INDEX_SIZE).saturating_sub(1);
        let pos = offset + HEADER_SIZE;
        let slice = image.read_fixed(pos, count * REG_INDEX_SIZE)?;
        let index = match Ref::<_, [RegIndex]>::from_prefix_with_elems(slice, count) {
            Ok((r, _)) => r.to_vec(),
            Err(_) => {
                return Err(AtomError::OutOfBounds {
                    offset: pos,
                    len: count * REG_INDEX_SIZE,
                    size: image.len(),
                });
            }
        };

        let pos = pos + count * REG_INDEX_SIZE;
        let t = image.read_fixed(pos, INDEX_TERMINATOR.len())?;
        if !t.eq(INDEX_TERMINATOR) {
            return Err(AtomError::MalformedIndexTerminator {
                offset: pos,
                found: t.to_vec(),
            });
        }

        let size = header.reg_data_blk_size as usize;
        if size < DATA_BLOCK_MIN_SIZE {
            return Err(AtomError::InvalidDataBlockSize { offset, size });
        }
        let mut pos = pos + INDEX_TERMINATOR.len();
        let mut blocks = Vec::new();
        loop {
            let Ok(id) = image.read_fixed(pos, 4) else {
                return Err(AtomError::UnterminatedDataBlockSequence { offset: pos });
            };
            if id.iter().all(|b| *b == 0) {
                break;
            }
            let Ok(b) = image.read_fixed(pos, size) else {
                return Err(AtomError::UnterminatedDataBlockSequence { offset: pos });
            };
            blocks.push(MemorySettingBlock::parse(b, pos));
            pos += size;
        }
        debug!(
            "register block @ {offset:08x}: {count} registers, {} data blocks",
            blocks.len()
        );

        Ok(Self {
            offset,
            header,
            index,
            blocks,
        })
    }

    /// Data blocks for one VRAM module
    pub fn blocks_for(&self, block_id: u8) -> impl Iterator<Item = &MemorySettingBlock> {
        self.blocks
            .iter()
            .filter(move |b| b.memory_id.block_id() == block_id)
    }
}

#[cfg(test)]
use crate::testutil::{self, DataBlock};

#[cfg(test)]
const INDEX: &[(u16, u8)] = &[(0x0a00, 0), (0x0a01, 1), (0x0a02, 2)];

#[cfg(test)]
const BLOCKS: &[DataBlock] = &[
    DataBlock {
        clock_range: 150000,
        block_id: 0,
        access_id: 0x10,
        data: &[0x1111_1111, 0x2222_2222],
    },
    DataBlock {
        clock_range: 175000,
        block_id: 0,
        access_id: 0x20,
        data: &[0x3333_3333, 0x4444_4444],
    },
    DataBlock {
        clock_range: 160000,
        block_id: 1,
        access_id: 0x30,
        data: &[0x5555_5555, 0x6666_6666],
    },
];

#[cfg(test)]
// header + index + terminator
const FIRST_BLOCK: usize = HEADER_SIZE + 3 * REG_INDEX_SIZE + 3;

#[test]
fn memory_id_packing() {
    let id = MemoryId::from_bits(0x0102_49f0);
    assert_eq!(id.clock_range(), 0x0002_49f0);
    assert_eq!(id.clock_range(), 150000);
    assert_eq!(id.block_id(), 1);
}

#[test]
fn index_entries_from_size() {
    let data = testutil::reg_block(INDEX, 16, BLOCKS);
    assert_eq!(u16::from_le_bytes([data[0], data[1]]), 12);
    let rb = RegBlock::parse(&Image::new(&data), 0).unwrap();
    assert_eq!(rb.header.reg_index_tbl_size, 12);
    assert_eq!(rb.index.len(), 3);
    let i = rb.index[2].reg_index;
    let l = rb.index[2].pre_reg_data_length;
    assert_eq!((i, l), (0x0a02, 2));
}

#[test]
fn malformed_index_terminator() {
    let mut data = testutil::reg_block(INDEX, 16, BLOCKS);
    let t = HEADER_SIZE + 3 * REG_INDEX_SIZE;
    data[t + 2] = 0x01;
    let res = RegBlock::parse(&Image::new(&data), 0);
    assert_eq!(
        res,
        Err(AtomError::MalformedIndexTerminator {
            offset: t,
            found: vec![0xff, 0xff, 0x01],
        })
    );
}

#[test]
fn stops_at_zero_block() {
    let data = testutil::reg_block(INDEX, 16, BLOCKS);
    // Nothing beyond the memory ID of the terminating block is needed.
    let end = FIRST_BLOCK + 3 * 16 + 4;
    let rb = RegBlock::parse(&Image::new(&data[..end]), 0).unwrap();
    assert_eq!(rb.blocks.len(), 3);
    for (i, (b, e)) in rb.blocks.iter().zip(BLOCKS).enumerate() {
        assert_eq!(b.offset, FIRST_BLOCK + i * 16);
        assert_eq!(b.memory_id.clock_range(), e.clock_range);
        assert_eq!(b.memory_id.block_id(), e.block_id);
        assert_eq!(b.access_id, e.access_id);
        assert_eq!(b.data, e.data);
    }
    assert_eq!(rb.blocks[1].clock_mhz(), 1750.0);
}

#[test]
fn block_offsets_are_absolute() {
    let block = testutil::reg_block(INDEX, 16, BLOCKS);
    let mut data = vec![0xeeu8; 0x40];
    data.extend_from_slice(&block);
    let rb = RegBlock::parse(&Image::new(&data), 0x40).unwrap();
    assert_eq!(rb.offset, 0x40);
    assert_eq!(rb.blocks[0].offset, 0x40 + FIRST_BLOCK);
}

#[test]
fn missing_zero_block() {
    let data = testutil::reg_block(INDEX, 16, BLOCKS);
    let end = FIRST_BLOCK + 3 * 16;
    let res = RegBlock::parse(&Image::new(&data[..end]), 0);
    assert_eq!(
        res,
        Err(AtomError::UnterminatedDataBlockSequence { offset: end })
    );
}

#[test]
fn truncated_data_block() {
    let data = testutil::reg_block(INDEX, 16, BLOCKS);
    let end = FIRST_BLOCK + 16 + 6;
    let res = RegBlock::parse(&Image::new(&data[..end]), 0);
    assert_eq!(
        res,
        Err(AtomError::UnterminatedDataBlockSequence {
            offset: FIRST_BLOCK + 16
        })
    );
}

#[test]
fn data_block_too_small() {
    let data = testutil::reg_block(INDEX, 4, &[]);
    let res = RegBlock::parse(&Image::new(&data), 0);
    assert_eq!(res, Err(AtomError::InvalidDataBlockSize { offset: 0, size: 4 }));
}

#[test]
fn empty_index_table() {
    let data = testutil::reg_block(&[], 12, &BLOCKS[..1]);
    let rb = RegBlock::parse(&Image::new(&data), 0).unwrap();
    assert!(rb.index.is_empty());
    assert_eq!(rb.blocks.len(), 1);
    assert_eq!(rb.blocks[0].data, vec![0x1111_1111]);
}

#[test]
fn blocks_per_module() {
    let data = testutil::reg_block(INDEX, 16, BLOCKS);
    let rb = RegBlock::parse(&Image::new(&data), 0).unwrap();
    assert_eq!(rb.blocks_for(0).count(), 2);
    assert_eq!(rb.blocks_for(1).count(), 1);
    assert_eq!(rb.blocks_for(2).count(), 0);
}
