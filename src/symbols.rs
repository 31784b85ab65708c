//! Global symbol table built from the firmware image.
//!
//! The coprocessor firmware exports its entry points and shared objects
//! through the regular ELF symbol table. Only globally bound function and
//! object symbols are of interest to the host; everything else is skipped
//! during construction. The table is built once per boot and immutable
//! afterwards.

use crate::{
    Error, Result,
    image::{FirmwareImage, STRTAB_SECTION, SYMTAB_SECTION},
};
use xmas_elf::{
    sections::SectionData,
    symbol_table::{Binding, Entry, Type as SymbolBaseType},
};

/// Maximum retained symbol name length; longer names are truncated.
pub const SYM_NAME_MAX: usize = 128;

/// Kind of a retained global symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Object,
}

/// A retained global symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    name: Box<str>,
    addr: u32,
    info: u8,
}

impl Symbol {
    /// The symbol name, truncated to [`SYM_NAME_MAX`] bytes.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The symbol's device-address value.
    #[must_use]
    #[inline]
    pub const fn addr(&self) -> u32 {
        self.addr
    }

    /// The raw ELF binding/type info byte.
    #[must_use]
    #[inline]
    pub const fn info(&self) -> u8 {
        self.info
    }

    #[must_use]
    pub const fn kind(&self) -> SymbolKind {
        // low nibble of st_info; only FUNC and OBJECT survive construction
        if self.info & 0xf == 2 {
            SymbolKind::Function
        } else {
            SymbolKind::Object
        }
    }
}

/// Immutable lookup table of the firmware's global FUNC/OBJECT symbols.
#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: Vec<Symbol>,
}

impl SymbolTable {
    /// Builds the table by scanning the image's `.symtab` in file order.
    ///
    /// ## Errors
    ///
    /// Returns `Error::MalformedImage` when `.symtab` or `.strtab` is
    /// absent or unreadable; both are required.
    pub fn build(image: &FirmwareImage) -> Result<Self> {
        let symtab = image
            .section_header(SYMTAB_SECTION)
            .ok_or(Error::MalformedImage("missing .symtab section"))?;
        let strtab = image
            .find_section(STRTAB_SECTION)
            .ok_or(Error::MalformedImage("missing .strtab section"))?;

        let SectionData::SymbolTable32(symbols) = symtab
            .get_data(image.elf())
            .map_err(|_| Error::MalformedImage("unreadable .symtab section"))?
        else {
            return Err(Error::MalformedImage(".symtab has unexpected layout"));
        };

        let name_table = image
            .bytes()
            .get(strtab.file_offset as usize..strtab.file_offset as usize + strtab.size as usize)
            .ok_or(Error::MalformedImage(".strtab overruns the image"))?;

        let mut entries = Vec::with_capacity(symbols.len());
        for sym in symbols {
            let (Ok(binding), Ok(kind)) = (sym.get_binding(), sym.get_type()) else {
                continue;
            };
            if binding != Binding::Global
                || !matches!(kind, SymbolBaseType::Func | SymbolBaseType::Object)
            {
                continue;
            }
            let Some(name) = read_name(name_table, sym.name() as usize) else {
                log::warn!("skipping global symbol with unresolvable name");
                continue;
            };
            entries.push(Symbol {
                name: name.into(),
                addr: u32::try_from(sym.value())
                    .map_err(|_| Error::MalformedImage("symbol value overflow"))?,
                info: sym.info(),
            });
        }

        log::debug!("retained {} global symbols", entries.len());
        Ok(Self { entries })
    }

    /// Looks a symbol up by exact name.
    ///
    /// Keys longer than [`SYM_NAME_MAX`] are truncated the same way stored
    /// names were.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        let key = truncated(name);
        self.entries.iter().find(|sym| &*sym.name == key)
    }

    /// Number of retained symbols.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.entries.iter()
    }
}

/// Reads a NUL-terminated name out of the string table, truncating to
/// [`SYM_NAME_MAX`] bytes.
fn read_name(name_table: &[u8], offset: usize) -> Option<&str> {
    let tail = name_table.get(offset..)?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    let name = core::str::from_utf8(&tail[..end]).ok()?;
    if name.len() > SYM_NAME_MAX {
        log::warn!("truncating over-length symbol name {name:.32}...");
    }
    Some(truncated(name))
}

fn truncated(name: &str) -> &str {
    if name.len() <= SYM_NAME_MAX {
        return name;
    }
    let mut end = SYM_NAME_MAX;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
