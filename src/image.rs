//! Read-only view over an ELF32 firmware image.
//!
//! Wraps the raw byte buffer owned by the firmware-fetch collaborator and
//! exposes the two lookups the boot path needs: named section descriptors
//! and the loadable program-header segments.

use crate::{Error, Result};
use xmas_elf::{
    ElfFile, header,
    program::Type as SegmentType,
    sections::SectionHeader,
};

/// Section holding the mailbox shared-memory block.
pub const MAILBOX_SECTION: &str = ".mbox_shared_data";
/// Section holding the firmware's debug log ring.
pub const DEBUG_LOG_SECTION: &str = ".debug_mem_logs";
/// Symbol table section, required.
pub const SYMTAB_SECTION: &str = ".symtab";
/// Symbol string table section, required.
pub const STRTAB_SECTION: &str = ".strtab";

/// A parsed, borrowed firmware image.
///
/// Does not own the underlying bytes; the firmware-fetch collaborator keeps
/// them alive for the duration of the load operation.
#[derive(Debug)]
pub struct FirmwareImage<'a> {
    elf: ElfFile<'a>,
}

/// Descriptor of a named section, derived on demand and not cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionView<'a> {
    pub name: &'a str,
    pub file_offset: u32,
    pub address: u32,
    pub size: u32,
}

/// A loadable program-header segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Device address the coprocessor expects the payload at (`p_paddr`).
    pub device_addr: u32,
    pub file_offset: u32,
    pub file_size: u32,
    pub mem_size: u32,
}

impl<'a> FirmwareImage<'a> {
    /// Parses and validates the image header.
    ///
    /// The coprocessor executes ELF32 little-endian images; anything else
    /// is rejected up front, before any field past the identification bytes
    /// is trusted.
    ///
    /// ## Errors
    ///
    /// Returns `Error::MalformedImage` if the buffer is not a sane ELF32
    /// little-endian image.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let elf =
            ElfFile::new(data).map_err(|_| Error::MalformedImage("not a valid ELF image"))?;
        header::sanity_check(&elf)
            .map_err(|_| Error::MalformedImage("inconsistent ELF header"))?;
        if elf.header.pt1.class() != header::Class::ThirtyTwo {
            return Err(Error::MalformedImage("not an ELF32 image"));
        }
        if elf.header.pt1.data() != header::Data::LittleEndian {
            return Err(Error::MalformedImage("not little-endian"));
        }
        Ok(Self { elf })
    }

    /// The raw image bytes.
    #[must_use]
    #[inline]
    pub const fn bytes(&self) -> &'a [u8] {
        self.elf.input
    }

    pub(crate) const fn elf(&self) -> &ElfFile<'a> {
        &self.elf
    }

    pub(crate) fn section_header(&self, name: &str) -> Option<SectionHeader<'a>> {
        // single walk over the section header array, first exact match wins
        self.elf
            .section_iter()
            .find(|section| section.get_name(&self.elf) == Ok(name))
    }

    /// Looks up a section by exact name.
    ///
    /// Returns `None` when no section matches; callers decide whether the
    /// section was required (symbol table) or optional (debug log ring).
    #[must_use]
    pub fn find_section(&self, name: &str) -> Option<SectionView<'a>> {
        let section = self.section_header(name)?;
        log::debug!("found section {name}");
        Some(SectionView {
            name: section.get_name(&self.elf).ok()?,
            file_offset: u32::try_from(section.offset()).ok()?,
            address: u32::try_from(section.address()).ok()?,
            size: u32::try_from(section.size()).ok()?,
        })
    }

    /// Iterates the `PT_LOAD` segments in program-header order.
    ///
    /// Stateless over the image: the walk can be restarted by calling this
    /// again.
    pub fn load_segments(&self) -> impl Iterator<Item = Result<Segment>> + '_ {
        self.elf.program_iter().filter_map(|ph| {
            match ph.get_type() {
                Err(_) => Some(Err(Error::MalformedImage("unreadable program header"))),
                Ok(SegmentType::Load) => Some(segment_fields(&ph)),
                Ok(_) => None,
            }
        })
    }
}

fn segment_fields(ph: &xmas_elf::program::ProgramHeader) -> Result<Segment> {
    let field = |value: u64| {
        u32::try_from(value).map_err(|_| Error::MalformedImage("program header field overflow"))
    };
    Ok(Segment {
        device_addr: field(ph.physical_addr())?,
        file_offset: field(ph.offset())?,
        file_size: field(ph.file_size())?,
        mem_size: field(ph.mem_size())?,
    })
}
