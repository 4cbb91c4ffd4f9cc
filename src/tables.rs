//! Master Data Table directory and generic sub-tables
//!
//! The directory is a list of 16-bit pointers, one per well-known table, in a
//! fixed order. A pointer of 0 means that the table is not present.
//! Every table starts with ATOM_COMMON_TABLE_HEADER.

use core::fmt::{self, Display};

use log::debug;
use serde::{Deserialize, Serialize};
use strum::{Display as StrDisplay, EnumCount, EnumIter, IntoEnumIterator};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes};

use crate::{error::Result, image::Image};

/// ATOM_COMMON_TABLE_HEADER
#[derive(Immutable, IntoBytes, FromBytes, Serialize, Deserialize, Clone, Copy, Debug)]
#[derive(Default, Eq, PartialEq)]
#[repr(C)]
pub struct TableHeader {
    /// Length of the table, excluding this header
    pub structure_size: u16,
    pub format_revision: u8,
    pub content_revision: u8,
}

pub const TABLE_HEADER_SIZE: usize = size_of::<TableHeader>();

impl Display for TableHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.structure_size;
        let fr = self.format_revision;
        let cr = self.content_revision;
        write!(f, "v{fr}.{cr}, {s} bytes")
    }
}

/// Names of the data tables, in the order of ATOM_MASTER_LIST_OF_DATA_TABLES
#[derive(StrDisplay, EnumIter, EnumCount, Serialize, Deserialize, Clone, Copy, Debug)]
#[derive(Eq, PartialEq, Hash)]
#[allow(non_camel_case_types)]
pub enum DataTable {
    UtilityPipeLine,
    MultimediaCapabilityInfo,
    MultimediaConfigInfo,
    StandardVESA_Timing,
    FirmwareInfo,
    PaletteData,
    LCD_Info,
    DIGTransmitterInfo,
    SMU_Info,
    SupportedDevicesInfo,
    GPIO_I2C_Info,
    VRAM_UsageByFirmware,
    GPIO_Pin_LUT,
    VESA_ToInternalModeLUT,
    GFX_Info,
    PowerPlayInfo,
    GPUVirtualizationInfo,
    SaveRestoreInfo,
    PPLL_SS_Info,
    OemInfo,
    XTMDS_Info,
    MclkSS_Info,
    Object_Header,
    IndirectIOAccess,
    MC_InitParameter,
    ASIC_VDDC_Info,
    ASIC_InternalSS_Info,
    TV_VideoMode,
    VRAM_Info,
    MemoryTrainingInfo,
    IntegratedSystemInfo,
    ASIC_ProfilingInfo,
    VoltageObjectInfo,
    PowerSourceInfo,
    ServiceInfo,
}

pub const DATA_TABLE_COUNT: usize = DataTable::COUNT;

/// A data table with its header and raw contents
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct SubTable {
    pub name: DataTable,
    pub offset: usize,
    pub header: TableHeader,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl SubTable {
    pub fn parse(image: &Image, name: DataTable, offset: usize) -> Result<Self> {
        let header = image.read::<TableHeader>(offset)?;
        let len = header.structure_size as usize;
        let payload = image.read_fixed(offset + TABLE_HEADER_SIZE, len)?.to_vec();
        Ok(Self {
            name,
            offset,
            header,
            payload,
        })
    }

    pub fn len(&self) -> usize {
        self.header.structure_size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn payload_offset(&self) -> usize {
        self.offset + TABLE_HEADER_SIZE
    }
}

impl Display for SubTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.name.to_string();
        let o = self.offset;
        let h = self.header;
        write!(f, "{n:24} @ {o:08x}, {h}")
    }
}

/// ATOM_MASTER_DATA_TABLE
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct MasterDataTable {
    pub offset: usize,
    pub header: TableHeader,
    /// One pointer per name, in declaration order of [`DataTable`]
    pub pointers: Vec<(DataTable, u16)>,
}

impl MasterDataTable {
    pub fn parse(image: &Image, offset: usize) -> Result<Self> {
        let header = image.read::<TableHeader>(offset)?;
        let base = offset + TABLE_HEADER_SIZE;
        let pointers = DataTable::iter()
            .enumerate()
            .map(|(i, name)| -> Result<(DataTable, u16)> {
                Ok((name, image.read_u16(base + 2 * i)?))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "Master Data Table @ {offset:08x}: {} of {DATA_TABLE_COUNT} tables present",
            pointers.iter().filter(|(_, p)| *p != 0).count()
        );
        Ok(Self {
            offset,
            header,
            pointers,
        })
    }

    /// Get the offset of a table, if present.
    pub fn find(&self, name: DataTable) -> Option<usize> {
        self.pointers
            .iter()
            .find(|(n, p)| *n == name && *p != 0)
            .map(|(_, p)| *p as usize)
    }

    /// Decode all present tables lazily. Each call starts over.
    pub fn tables<'a>(&'a self, image: Image<'a>) -> SubTables<'a> {
        SubTables {
            image,
            pointers: self.pointers.iter(),
        }
    }
}

/// Iterator over present tables
///
/// A table that cannot be decoded yields an error; iteration carries on with
/// the next table.
pub struct SubTables<'a> {
    image: Image<'a>,
    pointers: core::slice::Iter<'a, (DataTable, u16)>,
}

impl Iterator for SubTables<'_> {
    type Item = Result<SubTable>;

    fn next(&mut self) -> Option<Self::Item> {
        let (name, ptr) = self.pointers.by_ref().find(|(_, p)| *p != 0)?;
        let t = SubTable::parse(&self.image, *name, *ptr as usize);
        if let Ok(t) = &t {
            debug!("{t}");
        }
        Some(t)
    }
}

#[cfg(test)]
use crate::{
    error::AtomError,
    testutil::{self, DATA_TABLE_BASE, FIRMWARE_INFO, FIRMWARE_INFO_PAYLOAD, VRAM_INFO},
};

#[cfg(test)]
fn directory(data: &[u8]) -> MasterDataTable {
    MasterDataTable::parse(&Image::new(data), DATA_TABLE_BASE).unwrap()
}

#[test]
fn names_in_firmware_order() {
    let names = DataTable::iter().collect::<Vec<_>>();
    assert_eq!(names.len(), DATA_TABLE_COUNT);
    assert_eq!(names[0], DataTable::UtilityPipeLine);
    assert_eq!(names[4], DataTable::FirmwareInfo);
    assert_eq!(names[28], DataTable::VRAM_Info);
    assert_eq!(names[DATA_TABLE_COUNT - 1], DataTable::ServiceInfo);
    assert_eq!(DataTable::VRAM_Info.to_string(), "VRAM_Info");
}

#[test]
fn pointers_follow_names() {
    let data = testutil::image();
    let dir = directory(&data);
    assert_eq!(dir.pointers.len(), DATA_TABLE_COUNT);
    assert_eq!(dir.header.structure_size as usize, 2 * DATA_TABLE_COUNT);
    assert_eq!(dir.find(DataTable::FirmwareInfo), Some(FIRMWARE_INFO));
    assert_eq!(dir.find(DataTable::VRAM_Info), Some(VRAM_INFO));
    assert_eq!(dir.find(DataTable::PowerPlayInfo), None);
}

#[test]
fn only_present_tables_in_order() {
    let data = testutil::image();
    let dir = directory(&data);
    let tables = dir
        .tables(Image::new(&data))
        .collect::<Result<Vec<_>>>()
        .unwrap();
    assert!(tables.len() <= DATA_TABLE_COUNT);
    let names = tables.iter().map(|t| t.name).collect::<Vec<_>>();
    assert_eq!(names, vec![DataTable::FirmwareInfo, DataTable::VRAM_Info]);
    for t in &tables {
        assert_eq!(t.payload.len(), t.len());
        let raw = u16::from_le_bytes([data[t.offset], data[t.offset + 1]]);
        assert_eq!(raw as usize, t.len());
    }
}

#[test]
fn round_trip_single_entry() {
    let data = testutil::image();
    let dir = directory(&data);
    let fw = dir.tables(Image::new(&data)).next().unwrap().unwrap();
    assert_eq!(fw.name, DataTable::FirmwareInfo);
    assert_eq!(fw.offset, FIRMWARE_INFO);
    assert_eq!(fw.len(), FIRMWARE_INFO_PAYLOAD.len());
    assert_eq!(fw.header.format_revision, 2);
    assert_eq!(fw.header.content_revision, 2);
    assert_eq!(fw.payload, FIRMWARE_INFO_PAYLOAD);
    assert_eq!(fw.payload_offset(), FIRMWARE_INFO + TABLE_HEADER_SIZE);
}

#[test]
fn broken_entry_does_not_hide_siblings() {
    let mut data = testutil::image();
    // Point MultimediaCapabilityInfo past the end of the image.
    let o = DATA_TABLE_BASE + TABLE_HEADER_SIZE + 2;
    data[o..o + 2].copy_from_slice(&0xfff0u16.to_le_bytes());
    let dir = directory(&data);
    let res = dir.tables(Image::new(&data)).collect::<Vec<_>>();
    assert_eq!(res.len(), 3);
    assert!(matches!(res[0], Err(AtomError::OutOfBounds { .. })));
    assert_eq!(res[1].as_ref().unwrap().name, DataTable::FirmwareInfo);
    assert_eq!(res[2].as_ref().unwrap().name, DataTable::VRAM_Info);
}

#[test]
fn tables_restartable() {
    let data = testutil::image();
    let dir = directory(&data);
    let first = dir.tables(Image::new(&data)).collect::<Vec<_>>();
    let second = dir.tables(Image::new(&data)).collect::<Vec<_>>();
    assert_eq!(first, second);
}

#[test]
fn truncated_directory() {
    let data = testutil::image();
    let end = DATA_TABLE_BASE + TABLE_HEADER_SIZE + 10;
    let res = MasterDataTable::parse(&Image::new(&data[..end]), DATA_TABLE_BASE);
    assert!(matches!(res, Err(AtomError::OutOfBounds { .. })));
}
