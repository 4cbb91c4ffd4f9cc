//! Legacy option ROM and ATOM ROM headers
//!
//! The chain from the start of the image to the Master Data Table is fixed:
//! option ROM signature, ATI marker, pointer to the ATOM ROM table, ATOM
//! signature, and finally the pointer to the data table directory.
//! For reference, see `drivers/gpu/drm/amd/include/atombios.h` in Linux.

use core::fmt::{self, Display};

use log::debug;
use serde::{Deserialize, Serialize};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes};

use crate::{
    error::{AtomError, Result},
    image::Image,
    tables::TableHeader,
};

pub const BIOS_MAGIC: &[u8] = &[0x55, 0xaa];
pub const ATI_MAGIC_OFFSET: usize = 0x30;
pub const ATI_MAGIC: &[u8] = b" 761295520";
pub const ROM_TABLE_PTR_OFFSET: usize = 0x48;
// Relative to the ATOM ROM table
pub const ATOM_MAGIC_OFFSET: usize = 0x04;
pub const ATOM_MAGIC: &[u8] = b"ATOM\0";
pub const DATA_TABLE_PTR_OFFSET: usize = 0x20;

/// ATOM_ROM_HEADER
#[derive(Immutable, IntoBytes, FromBytes, Serialize, Deserialize, Clone, Copy, Debug)]
#[derive(Eq, PartialEq)]
#[repr(C)]
pub struct AtomRomHeader {
    pub header: TableHeader,
    pub signature: [u8; 4],
    pub bios_runtime_segment: u16,
    pub protected_mode_info: u16,
    pub config_filename: u16,
    pub crc_block: u16,
    pub bootup_message: u16,
    pub int10: u16,
    pub pci_bus_dev_init_code: u16,
    pub io_base: u16,
    pub subsystem_vendor_id: u16,
    pub subsystem_id: u16,
    pub pci_info: u16,
    pub master_command_table: u16,
    pub master_data_table: u16,
    pub extended_function_code: u8,
    pub reserved: u8,
}

impl Display for AtomRomHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sv = self.subsystem_vendor_id;
        let si = self.subsystem_id;
        let ct = self.master_command_table;
        let dt = self.master_data_table;
        let h = self.header;
        write!(
            f,
            "ATOM ROM header {h}, subsystem {sv:04x}:{si:04x}, command tables @ {ct:04x}, data tables @ {dt:04x}"
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
pub struct RomHeader {
    /// Offset of the ATOM ROM table
    pub rom_base: usize,
    /// Offset of the Master Data Table directory
    pub data_table_base: usize,
    /// Only present if the complete ATOM ROM header fits into the image.
    pub atom: Option<AtomRomHeader>,
}

fn check_magic(image: &Image, offset: usize, magic: &[u8]) -> Result<Option<Vec<u8>>> {
    let m = image.read_fixed(offset, magic.len())?;
    if m.eq(magic) {
        Ok(None)
    } else {
        Ok(Some(m.to_vec()))
    }
}

impl RomHeader {
    pub fn parse(image: &Image) -> Result<Self> {
        if let Some(found) = check_magic(image, 0, BIOS_MAGIC)? {
            return Err(AtomError::InvalidBiosMagic { found });
        }
        if let Some(found) = check_magic(image, ATI_MAGIC_OFFSET, ATI_MAGIC)? {
            return Err(AtomError::InvalidAtiMagic {
                offset: ATI_MAGIC_OFFSET,
                found,
            });
        }

        let rom_base = image.read_u16(ROM_TABLE_PTR_OFFSET)? as usize;
        debug!("ATOM ROM table @ {rom_base:08x}");
        let o = rom_base + ATOM_MAGIC_OFFSET;
        if let Some(found) = check_magic(image, o, ATOM_MAGIC)? {
            return Err(AtomError::InvalidAtomMagic { offset: o, found });
        }

        let data_table_base = image.read_u16(rom_base + DATA_TABLE_PTR_OFFSET)? as usize;
        debug!("Master Data Table @ {data_table_base:08x}");
        let atom = image.read::<AtomRomHeader>(rom_base).ok();

        Ok(Self {
            rom_base,
            data_table_base,
            atom,
        })
    }
}

#[cfg(test)]
use crate::testutil::{self, DATA_TABLE_BASE, ROM_BASE};

#[test]
fn resolve_synthetic_header() {
    let data = testutil::image();
    let header = RomHeader::parse(&Image::new(&data)).unwrap();
    assert_eq!(header.rom_base, ROM_BASE);
    assert_eq!(header.data_table_base, DATA_TABLE_BASE);
    let atom = header.atom.unwrap();
    assert_eq!(&atom.signature, b"ATOM");
    assert_eq!(atom.master_data_table as usize, DATA_TABLE_BASE);
}

#[test]
fn atom_rom_header_layout() {
    assert_eq!(size_of::<AtomRomHeader>(), 0x24);
}

#[test]
fn flipped_bios_magic() {
    for i in 0..BIOS_MAGIC.len() {
        let mut data = testutil::image();
        data[i] ^= 0xff;
        let res = RomHeader::parse(&Image::new(&data));
        assert!(matches!(res, Err(AtomError::InvalidBiosMagic { .. })));
    }
}

#[test]
fn flipped_ati_magic() {
    for i in 0..ATI_MAGIC.len() {
        let mut data = testutil::image();
        data[ATI_MAGIC_OFFSET + i] ^= 0x01;
        let res = RomHeader::parse(&Image::new(&data));
        assert!(matches!(
            res,
            Err(AtomError::InvalidAtiMagic {
                offset: ATI_MAGIC_OFFSET,
                ..
            })
        ));
    }
}

#[test]
fn flipped_atom_magic() {
    for i in 0..ATOM_MAGIC.len() {
        let mut data = testutil::image();
        data[ROM_BASE + ATOM_MAGIC_OFFSET + i] ^= 0x01;
        let res = RomHeader::parse(&Image::new(&data));
        let o = ROM_BASE + ATOM_MAGIC_OFFSET;
        assert!(matches!(res, Err(AtomError::InvalidAtomMagic { offset, .. }) if offset == o));
    }
}

#[test]
/// Checks are ordered, so a broken BIOS magic wins over everything else.
fn magic_checks_are_ordered() {
    let mut data = testutil::image();
    data[0] = 0;
    data[ATI_MAGIC_OFFSET] = 0;
    data[ROM_BASE + ATOM_MAGIC_OFFSET] = 0;
    let res = RomHeader::parse(&Image::new(&data));
    assert!(matches!(res, Err(AtomError::InvalidBiosMagic { .. })));
}

#[test]
fn too_short_for_header() {
    let data = testutil::image();
    let res = RomHeader::parse(&Image::new(&data[..0x20]));
    assert!(matches!(res, Err(AtomError::OutOfBounds { .. })));
}
