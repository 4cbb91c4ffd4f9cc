#![doc = include_str!("../README.md")]

use log::{info, warn};
use serde::{Deserialize, Serialize};

pub mod error;
pub mod header;
pub mod image;
pub mod reg_block;
pub mod tables;
pub mod vram;

#[cfg(test)]
mod testutil;

use error::Result;
use header::RomHeader;
use image::Image;
use tables::{DataTable, MasterDataTable, SubTables};
use vram::VramInfo;

/// An ATOM BIOS image with its data table directory resolved
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct AtomBios {
    pub header: RomHeader,
    pub data_tables: MasterDataTable,
}

impl AtomBios {
    pub fn parse(image: &Image) -> Result<Self> {
        let header = RomHeader::parse(image)?;
        if let Some(h) = &header.atom {
            info!("{h}");
        } else {
            warn!("ATOM ROM header @ {:08x} is incomplete", header.rom_base);
        }
        let data_tables = MasterDataTable::parse(image, header.data_table_base)?;
        Ok(Self {
            header,
            data_tables,
        })
    }

    /// Decode all present data tables, see [`MasterDataTable::tables`].
    pub fn tables<'a>(&'a self, image: Image<'a>) -> SubTables<'a> {
        self.data_tables.tables(image)
    }

    /// Decode the VRAM info table, if the directory lists one.
    pub fn vram_info(&self, image: &Image) -> Option<Result<VramInfo>> {
        let o = self.data_tables.find(DataTable::VRAM_Info)?;
        Some(VramInfo::parse(image, o))
    }
}

#[cfg(test)]
use testutil::{DATA_TABLE_BASE, ROM_BASE, VRAM_INFO};

#[test]
fn parse_synthetic_image() {
    let data = testutil::image();
    let image = Image::new(&data);
    let bios = AtomBios::parse(&image).unwrap();
    assert_eq!(bios.header.rom_base, ROM_BASE);
    assert_eq!(bios.data_tables.offset, DATA_TABLE_BASE);
    let vram = bios.vram_info(&image).unwrap().unwrap();
    assert_eq!(vram.offset, VRAM_INFO);
    assert_eq!(vram.modules().unwrap().len(), 2);
}

#[test]
/// Separate images of the same bytes decode to the same structures.
fn decode_is_idempotent() {
    let a = testutil::image();
    let b = a.clone();
    let (ia, ib) = (Image::new(&a), Image::new(&b));
    let bios_a = AtomBios::parse(&ia).unwrap();
    let bios_b = AtomBios::parse(&ib).unwrap();
    assert_eq!(bios_a, bios_b);
    let tables_a = bios_a.tables(ia).collect::<Vec<_>>();
    let tables_b = bios_b.tables(ib).collect::<Vec<_>>();
    assert_eq!(tables_a, tables_b);
    let vram_a = vram::parse_vram(&ia, VRAM_INFO).unwrap();
    let vram_b = vram::parse_vram(&ib, VRAM_INFO).unwrap();
    assert_eq!(vram_a, vram_b);
}

#[test]
fn no_vram_table() {
    let mut data = testutil::image();
    let o = DATA_TABLE_BASE + 4 + 2 * (DataTable::VRAM_Info as usize);
    data[o..o + 2].copy_from_slice(&[0, 0]);
    let image = Image::new(&data);
    let bios = AtomBios::parse(&image).unwrap();
    assert!(bios.vram_info(&image).is_none());
    assert_eq!(bios.tables(image).count(), 1);
}
