//! Synthetic ATOM BIOS images for tests
//!
//! Layout of [`image`]:
//!
//! | Offset | Contents                                        |
//! | ------ | ----------------------------------------------- |
//! | 0x000  | 55 aa, ATI marker at 0x30, ROM table ptr @ 0x48 |
//! | 0x100  | ATOM ROM header                                 |
//! | 0x200  | Master Data Table                               |
//! | 0x2a0  | FirmwareInfo                                    |
//! | 0x300  | VRAM_Info, two v8 modules from 0x314            |
//! | 0x390  | MemClkPatch register block, three data blocks   |

use zerocopy::{FromZeros, IntoBytes};

use crate::{
    header::{ATI_MAGIC, ATI_MAGIC_OFFSET, ATOM_MAGIC, ATOM_MAGIC_OFFSET, BIOS_MAGIC},
    header::{DATA_TABLE_PTR_OFFSET, ROM_TABLE_PTR_OFFSET},
    reg_block::{INDEX_TERMINATOR, RegBlockHeader, RegIndex},
    tables::{DATA_TABLE_COUNT, DataTable, TableHeader},
    vram::{VendorRevision, VramInfoHeader, VramModuleV8},
};

pub const IMAGE_SIZE: usize = 0x1000;
pub const ROM_BASE: usize = 0x100;
pub const DATA_TABLE_BASE: usize = 0x200;
pub const FIRMWARE_INFO: usize = 0x2a0;
pub const FIRMWARE_INFO_PAYLOAD: &[u8] = &[0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03, 0x04];
pub const VRAM_INFO: usize = 0x300;
pub const VRAM_MODULES: usize = VRAM_INFO + 4 + 16;
pub const MODULE_PARTS: [&[u8]; 2] = [b"H5GC4H24AJR\0", b"K4G41325FC\0"];
/// Relative to [`VRAM_INFO`]
pub const MEM_CLK_PATCH: usize = 0x90;
pub const VRAM_INFO_SIZE: usize = 0xe0;

pub struct DataBlock {
    pub clock_range: u32,
    pub block_id: u8,
    pub access_id: u32,
    pub data: &'static [u32],
}

pub const CLK_PATCH_BLOCKS: &[DataBlock] = &[
    DataBlock {
        clock_range: 150000,
        block_id: 0,
        access_id: 0x0000_0001,
        data: &[0x0123_4567, 0x89ab_cdef],
    },
    DataBlock {
        clock_range: 175000,
        block_id: 0,
        access_id: 0x0000_0001,
        data: &[0x0000_0002, 0x0000_0003],
    },
    DataBlock {
        clock_range: 160000,
        block_id: 1,
        access_id: 0x0000_0001,
        data: &[0xffff_0000, 0x0000_ffff],
    },
];

fn put(data: &mut [u8], offset: usize, bytes: &[u8]) {
    data[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn table_header(size: usize, format_revision: u8, content_revision: u8) -> TableHeader {
    TableHeader {
        structure_size: size as u16,
        format_revision,
        content_revision,
    }
}

/// Serialize an ATOM_INIT_REG_BLOCK including the terminating data block.
/// Register values are truncated or zero-padded to fit `block_size`.
pub fn reg_block(index: &[(u16, u8)], block_size: u16, blocks: &[DataBlock]) -> Vec<u8> {
    let header = RegBlockHeader {
        reg_index_tbl_size: ((index.len() + 1) * 3) as u16,
        reg_data_blk_size: block_size,
    };
    let mut res = header.as_bytes().to_vec();
    for (reg_index, pre_reg_data_length) in index {
        let e = RegIndex {
            reg_index: *reg_index,
            pre_reg_data_length: *pre_reg_data_length,
        };
        res.extend_from_slice(e.as_bytes());
    }
    res.extend_from_slice(INDEX_TERMINATOR);
    let size = block_size as usize;
    for b in blocks {
        let mut block = vec![0u8; size];
        let id = b.clock_range | ((b.block_id as u32) << 24);
        let mut words = vec![id, b.access_id];
        words.extend_from_slice(b.data);
        for (i, w) in words.iter().enumerate().take(size / 4) {
            put(&mut block, i * 4, &w.to_le_bytes());
        }
        res.extend_from_slice(&block);
    }
    res.extend_from_slice(&vec![0u8; size]);
    res
}

fn vram_module(memory_type: u8, vendor: u8, density: u8) -> VramModuleV8 {
    let mut m = VramModuleV8::new_zeroed();
    m.memory_type = memory_type;
    m.memory_vendor_id = VendorRevision::from_bits(vendor);
    m.density = density;
    m.memory_size = 4096;
    m.channel_num = 8;
    m.channel_width = 5;
    m.refresh_rate_factor = 1;
    m
}

/// A minimal image with FirmwareInfo and VRAM_Info present
pub fn image() -> Vec<u8> {
    let mut data = vec![0u8; IMAGE_SIZE];
    put(&mut data, 0, BIOS_MAGIC);
    put(&mut data, ATI_MAGIC_OFFSET, ATI_MAGIC);
    put(&mut data, ROM_TABLE_PTR_OFFSET, &(ROM_BASE as u16).to_le_bytes());

    put(&mut data, ROM_BASE, table_header(0x20, 1, 1).as_bytes());
    put(&mut data, ROM_BASE + ATOM_MAGIC_OFFSET, ATOM_MAGIC);
    let o = ROM_BASE + DATA_TABLE_PTR_OFFSET;
    put(&mut data, o, &(DATA_TABLE_BASE as u16).to_le_bytes());

    let h = table_header(2 * DATA_TABLE_COUNT, 1, 1);
    put(&mut data, DATA_TABLE_BASE, h.as_bytes());
    let pointers = [
        (DataTable::FirmwareInfo, FIRMWARE_INFO),
        (DataTable::VRAM_Info, VRAM_INFO),
    ];
    for (name, ptr) in pointers {
        let o = DATA_TABLE_BASE + 4 + 2 * (name as usize);
        put(&mut data, o, &(ptr as u16).to_le_bytes());
    }

    let h = table_header(FIRMWARE_INFO_PAYLOAD.len(), 2, 2);
    put(&mut data, FIRMWARE_INFO, h.as_bytes());
    put(&mut data, FIRMWARE_INFO + 4, FIRMWARE_INFO_PAYLOAD);

    put(&mut data, VRAM_INFO, table_header(VRAM_INFO_SIZE, 2, 1).as_bytes());
    let info = VramInfoHeader {
        mem_clk_patch_tbl_offset: MEM_CLK_PATCH as u16,
        num_of_vram_module: MODULE_PARTS.len() as u8,
        memory_clk_patch_tbl_ver: 1,
        vram_module_ver: 8,
        ..Default::default()
    };
    put(&mut data, VRAM_INFO + 4, info.as_bytes());
    let modules = [vram_module(0x50, 0x36, 0x62), vram_module(0x50, 0x01, 0x00)];
    let mut o = VRAM_MODULES;
    for (m, part) in modules.iter().zip(MODULE_PARTS) {
        put(&mut data, o, m.as_bytes());
        put(&mut data, o + 44, part);
        o += 44 + part.len();
    }

    let index = [(0x0a00, 0), (0x0a01, 0), (0x0a02, 0)];
    let block = reg_block(&index, 16, CLK_PATCH_BLOCKS);
    put(&mut data, VRAM_INFO + MEM_CLK_PATCH, &block);
    data
}
