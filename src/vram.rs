//! VRAM info table
//!
//! ATOM_VRAM_INFO_HEADER_V2_1 is followed by a chain of ATOM_VRAM_MODULE_V8
//! records. The records carry a part number string of arbitrary length, so
//! each record's offset is derived from the end of the one before it.
//! Only version 8 module records are decoded.

use core::fmt::{self, Display};

use bitfield_struct::bitfield;
use log::{debug, warn};
use phf::phf_map;
use serde::{Deserialize, Serialize};
use strum::Display as StrDisplay;
use zerocopy_derive::{FromBytes, Immutable, IntoBytes};

use crate::{
    error::{AtomError, Result},
    image::Image,
    reg_block::RegBlock,
    tables::{TABLE_HEADER_SIZE, TableHeader},
};

pub const MODULE_VERSION_8: u8 = 8;

#[derive(Immutable, IntoBytes, FromBytes, Serialize, Deserialize, Clone, Copy, Debug)]
#[derive(Default, Eq, PartialEq)]
#[repr(C)]
pub struct VramInfoHeader {
    pub mem_adjust_tbl_offset: u16,
    pub mem_clk_patch_tbl_offset: u16,
    pub mc_adjust_per_tile_tbl_offset: u16,
    pub mc_phy_init_table_offset: u16,
    pub dram_data_remap_tbl_offset: u16,
    pub reserved: u16,
    pub num_of_vram_module: u8,
    pub memory_clk_patch_tbl_ver: u8,
    pub vram_module_ver: u8,
    pub mc_phy_tile_num: u8,
}

pub const VRAM_INFO_HEADER_SIZE: usize = size_of::<VramInfoHeader>();

/// Sub-tables of the VRAM info table that use the ATOM_INIT_REG_BLOCK layout
#[derive(StrDisplay, Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegBlockTable {
    MemAdjust,
    MemClkPatch,
    McAdjustPerTile,
    McPhyInit,
}

impl VramInfoHeader {
    /// Offset relative to the start of the VRAM info table, 0 if absent
    pub fn pointer(&self, table: RegBlockTable) -> u16 {
        match table {
            RegBlockTable::MemAdjust => self.mem_adjust_tbl_offset,
            RegBlockTable::MemClkPatch => self.mem_clk_patch_tbl_offset,
            RegBlockTable::McAdjustPerTile => self.mc_adjust_per_tile_tbl_offset,
            RegBlockTable::McPhyInit => self.mc_phy_init_table_offset,
        }
    }
}

/// Vendor in the low nibble, revision in the high nibble
#[bitfield(u8)]
#[derive(Immutable, FromBytes, IntoBytes, Serialize, Deserialize, Eq, PartialEq)]
pub struct VendorRevision {
    #[bits(4)]
    pub vendor: u8,
    #[bits(4)]
    pub revision: u8,
}

#[derive(StrDisplay, Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemoryType {
    DDR,
    DDR2,
    GDDR3,
    GDDR4,
    GDDR5,
    HBM,
    DDR3,
    Unknown(u8),
}

impl From<u8> for MemoryType {
    fn from(t: u8) -> Self {
        match t {
            0x10 => MemoryType::DDR,
            0x20 => MemoryType::DDR2,
            0x30 => MemoryType::GDDR3,
            0x40 => MemoryType::GDDR4,
            0x50 => MemoryType::GDDR5,
            0x60 => MemoryType::HBM,
            0xb0 => MemoryType::DDR3,
            u => MemoryType::Unknown(u),
        }
    }
}

#[derive(StrDisplay, Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemoryVendor {
    #[strum(serialize = "SAMSUNG")]
    Samsung,
    #[strum(serialize = "INFINEON/QIMONDA/KRETON")]
    Infineon,
    #[strum(serialize = "ELPIDA/MEZZA")]
    Elpida,
    #[strum(serialize = "ETRON")]
    Etron,
    #[strum(serialize = "NANYA/ELIXIR")]
    Nanya,
    #[strum(serialize = "HYNIX")]
    Hynix,
    #[strum(serialize = "MOSEL/PROMOS")]
    Mosel,
    #[strum(serialize = "WINBOND")]
    Winbond,
    #[strum(serialize = "ESMT")]
    Esmt,
    #[strum(serialize = "MICRON")]
    Micron,
    Unknown(u8),
}

impl From<u8> for MemoryVendor {
    fn from(v: u8) -> Self {
        match v {
            0x1 => MemoryVendor::Samsung,
            0x2 => MemoryVendor::Infineon,
            0x3 => MemoryVendor::Elpida,
            0x4 => MemoryVendor::Etron,
            0x5 => MemoryVendor::Nanya,
            0x6 => MemoryVendor::Hynix,
            0x7 => MemoryVendor::Mosel,
            0x8 => MemoryVendor::Winbond,
            0x9 => MemoryVendor::Esmt,
            0xf => MemoryVendor::Micron,
            u => MemoryVendor::Unknown(u),
        }
    }
}

static DENSITY: phf::Map<u8, &'static str> = phf_map! {
    0x02u8 => "4Mx16",
    0x03u8 => "4Mx32",
    0x12u8 => "8Mx16",
    0x13u8 => "8Mx32",
    0x15u8 => "8Mx128",
    0x22u8 => "16Mx16",
    0x23u8 => "16Mx32",
    0x25u8 => "16Mx128",
    0x32u8 => "32Mx16",
    0x33u8 => "32Mx32",
    0x35u8 => "32Mx128",
    0x41u8 => "64Mx8",
    0x42u8 => "64Mx16",
    0x43u8 => "64Mx32",
    0x45u8 => "64Mx128",
    0x51u8 => "128Mx8",
    0x52u8 => "128Mx16",
    0x53u8 => "128Mx32",
    0x61u8 => "256Mx8",
    0x62u8 => "256Mx16",
    0x63u8 => "256Mx32",
    0x71u8 => "512Mx8",
    0x72u8 => "512Mx16",
};

/// ATOM_VRAM_MODULE_V8, without the trailing part number string
#[derive(Immutable, IntoBytes, FromBytes, Serialize, Deserialize, Clone, Copy, Debug)]
#[derive(Eq, PartialEq)]
#[repr(C)]
pub struct VramModuleV8 {
    pub channel_map_cfg: u32,
    pub module_size: u16,
    pub mc_ram_cfg: u16,
    pub enable_channels: u16,
    pub ext_memory_id: u8,
    pub memory_type: u8,
    pub channel_num: u8,
    pub channel_width: u8,
    pub density: u8,
    pub bank_col: u8,
    pub misc: u8,
    pub vrefi: u8,
    pub reserved: u16,
    /// in MB
    pub memory_size: u16,
    pub mc_tunning_set_id: u8,
    pub row_num: u8,
    pub emrs2_value: u16,
    pub emrs3_value: u16,
    pub memory_vendor_id: VendorRevision,
    pub refresh_rate_factor: u8,
    pub fifo_depth: u8,
    pub cdr_bandwidth: u8,
    pub channel_map_cfg1: u32,
    pub bank_map_cfg: u32,
    pub reserved1: u32,
}

pub const VRAM_MODULE_V8_SIZE: usize = size_of::<VramModuleV8>();

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct VramModule {
    pub offset: usize,
    /// Fixed part plus part number string, including its terminator
    pub length: usize,
    pub info: VramModuleV8,
    pub part_number: String,
}

impl VramModule {
    pub fn parse(image: &Image, offset: usize) -> Result<Self> {
        let info = image.read::<VramModuleV8>(offset)?;
        let s = image.read_cstring(offset + VRAM_MODULE_V8_SIZE)?;
        let length = VRAM_MODULE_V8_SIZE + s.len();
        let part_number = String::from_utf8_lossy(&s[..s.len() - 1]).to_string();
        Ok(Self {
            offset,
            length,
            info,
            part_number,
        })
    }

    /// Where the next module starts
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    pub fn memory_type(&self) -> MemoryType {
        MemoryType::from(self.info.memory_type)
    }

    pub fn vendor(&self) -> MemoryVendor {
        MemoryVendor::from(self.info.memory_vendor_id.vendor())
    }

    pub fn revision(&self) -> u8 {
        self.info.memory_vendor_id.revision()
    }

    pub fn density(&self) -> Option<&'static str> {
        DENSITY.get(&self.info.density).copied()
    }

    pub fn channel_width_bits(&self) -> u32 {
        1u32.checked_shl(self.info.channel_width as u32).unwrap_or(0)
    }

    pub fn refresh_rate_ms(&self) -> Option<u32> {
        match self.info.refresh_rate_factor {
            f @ 0..=3 => Some(8 << f),
            _ => None,
        }
    }
}

impl Display for VramModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = &self.part_number;
        let o = self.offset;
        let l = self.length;
        let t = self.memory_type();
        let s = self.info.memory_size;
        write!(f, "{n:16} @ {o:08x} ({l:3} bytes), {t:?} {s} MB")
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub enum VramModules {
    V8(Vec<VramModule>),
    /// The header was decoded, but not the module records.
    Unsupported { version: u8 },
}

/// ATOM_VRAM_INFO
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct VramInfo {
    pub offset: usize,
    pub header: TableHeader,
    pub info: VramInfoHeader,
    pub modules: VramModules,
}

fn module_chain(image: &Image, start: usize, count: usize) -> Result<Vec<VramModule>> {
    let mut modules = Vec::with_capacity(count);
    let mut offset = start;
    for index in 0..count {
        let m = VramModule::parse(image, offset).map_err(|e| {
            debug!("VRAM module {index} @ {offset:08x}: {e}");
            AtomError::TruncatedModuleChain {
                index,
                count,
                offset,
            }
        })?;
        debug!("{m}");
        offset = m.end();
        modules.push(m);
    }
    Ok(modules)
}

impl VramInfo {
    pub fn parse(image: &Image, offset: usize) -> Result<Self> {
        let header = image.read::<TableHeader>(offset)?;
        let info = image.read::<VramInfoHeader>(offset + TABLE_HEADER_SIZE)?;
        let start = offset + TABLE_HEADER_SIZE + VRAM_INFO_HEADER_SIZE;
        let count = info.num_of_vram_module as usize;
        let modules = match info.vram_module_ver {
            MODULE_VERSION_8 => VramModules::V8(module_chain(image, start, count)?),
            version => {
                warn!("VRAM info @ {offset:08x}: cannot decode module version {version}");
                VramModules::Unsupported { version }
            }
        };
        Ok(Self {
            offset,
            header,
            info,
            modules,
        })
    }

    pub fn modules(&self) -> Result<&[VramModule]> {
        match &self.modules {
            VramModules::V8(m) => Ok(m),
            VramModules::Unsupported { version } => Err(AtomError::UnsupportedSchemaVersion {
                version: *version,
            }),
        }
    }

    /// Decode one of the register block sub-tables, if present.
    pub fn reg_block(&self, image: &Image, table: RegBlockTable) -> Option<Result<RegBlock>> {
        let p = self.info.pointer(table) as usize;
        if p == 0 {
            return None;
        }
        let o = self.offset + p;
        debug!("{table} register block @ {o:08x}");
        Some(RegBlock::parse(image, o))
    }

    pub fn mem_clk_patch(&self, image: &Image) -> Option<Result<RegBlock>> {
        self.reg_block(image, RegBlockTable::MemClkPatch)
    }
}

/// Decode the VRAM info table at `offset` and its memory clock patch table.
pub fn parse_vram(image: &Image, offset: usize) -> Result<(VramInfo, Option<RegBlock>)> {
    let vram = VramInfo::parse(image, offset)?;
    let clk_patch = vram.mem_clk_patch(image).transpose()?;
    Ok((vram, clk_patch))
}

#[cfg(test)]
use crate::testutil::{self, MEM_CLK_PATCH, MODULE_PARTS, VRAM_INFO, VRAM_MODULES};

#[cfg(test)]
const VERSION_OFFSET: usize = VRAM_INFO + TABLE_HEADER_SIZE + 14;
#[cfg(test)]
const COUNT_OFFSET: usize = VRAM_INFO + TABLE_HEADER_SIZE + 12;

#[test]
fn layouts() {
    assert_eq!(VRAM_INFO_HEADER_SIZE, 16);
    assert_eq!(VRAM_MODULE_V8_SIZE, 44);
}

#[test]
fn vendor_revision_nibbles() {
    let v = VendorRevision::from_bits(0x36);
    assert_eq!(v.vendor(), 0x6);
    assert_eq!(v.revision(), 0x3);
    assert_eq!(MemoryVendor::from(v.vendor()), MemoryVendor::Hynix);
}

#[test]
fn lookups_keep_unknown_codes() {
    assert_eq!(MemoryType::from(0x50), MemoryType::GDDR5);
    assert_eq!(MemoryType::from(0x51), MemoryType::Unknown(0x51));
    assert_eq!(MemoryVendor::from(0xf), MemoryVendor::Micron);
    assert_eq!(MemoryVendor::from(0xa), MemoryVendor::Unknown(0xa));
    assert_eq!(MemoryVendor::Hynix.to_string(), "HYNIX");
}

#[test]
fn parse_module_chain() {
    let data = testutil::image();
    let vram = VramInfo::parse(&Image::new(&data), VRAM_INFO).unwrap();
    assert_eq!(vram.header.format_revision, 2);
    assert_eq!(vram.header.content_revision, 1);
    assert_eq!(vram.info.num_of_vram_module, 2);
    assert_eq!(vram.info.mem_clk_patch_tbl_offset as usize, MEM_CLK_PATCH);

    let modules = vram.modules().unwrap();
    assert_eq!(modules.len(), MODULE_PARTS.len());
    assert_eq!(modules[0].offset, VRAM_MODULES);
    for (m, part) in modules.iter().zip(MODULE_PARTS) {
        assert_eq!(m.length, 44 + part.len());
        assert_eq!(m.part_number.as_bytes(), &part[..part.len() - 1]);
    }
    for w in modules.windows(2) {
        assert_eq!(w[1].offset, w[0].offset + w[0].length);
    }
}

#[test]
fn decoded_module_fields() {
    let data = testutil::image();
    let vram = VramInfo::parse(&Image::new(&data), VRAM_INFO).unwrap();
    let modules = vram.modules().unwrap();
    let m = &modules[0];
    assert_eq!(m.part_number, "H5GC4H24AJR");
    assert_eq!(m.memory_type(), MemoryType::GDDR5);
    assert_eq!(m.vendor(), MemoryVendor::Hynix);
    assert_eq!(m.revision(), 3);
    assert_eq!(m.info.memory_size, 4096);
    assert_eq!(m.density(), Some("256Mx16"));
    assert_eq!(m.channel_width_bits(), 32);
    assert_eq!(m.refresh_rate_ms(), Some(16));
    let m = &modules[1];
    assert_eq!(m.vendor(), MemoryVendor::Samsung);
    assert_eq!(m.revision(), 0);
    assert_eq!(m.density(), None);
}

#[test]
fn unsupported_module_version() {
    let mut data = testutil::image();
    data[VERSION_OFFSET] = 7;
    let vram = VramInfo::parse(&Image::new(&data), VRAM_INFO).unwrap();
    assert_eq!(vram.modules, VramModules::Unsupported { version: 7 });
    assert_eq!(
        vram.modules(),
        Err(AtomError::UnsupportedSchemaVersion { version: 7 })
    );
    // The register blocks are still reachable.
    assert!(vram.mem_clk_patch(&Image::new(&data)).unwrap().is_ok());
}

#[test]
fn truncated_module_chain() {
    let mut data = testutil::image();
    data[COUNT_OFFSET] = 3;
    let end = VRAM_MODULES + MODULE_PARTS[0].len() + MODULE_PARTS[1].len() + 2 * 44;
    let res = VramInfo::parse(&Image::new(&data[..end + 10]), VRAM_INFO);
    assert_eq!(
        res,
        Err(AtomError::TruncatedModuleChain {
            index: 2,
            count: 3,
            offset: end,
        })
    );
}

#[test]
fn unterminated_part_number() {
    let data = testutil::image();
    let end = VRAM_MODULES + 44 + 4;
    let res = VramInfo::parse(&Image::new(&data[..end]), VRAM_INFO);
    assert!(matches!(
        res,
        Err(AtomError::TruncatedModuleChain { index: 0, .. })
    ));
}

#[test]
fn register_blocks() {
    let data = testutil::image();
    let image = Image::new(&data);
    let (vram, clk_patch) = parse_vram(&image, VRAM_INFO).unwrap();
    let clk_patch = clk_patch.unwrap();
    assert_eq!(clk_patch.offset, VRAM_INFO + MEM_CLK_PATCH);
    assert_eq!(clk_patch.blocks.len(), 3);
    assert!(vram.reg_block(&image, RegBlockTable::McPhyInit).is_none());
    assert!(vram.reg_block(&image, RegBlockTable::MemAdjust).is_none());
}
