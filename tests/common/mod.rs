//! Shared test fixtures: a synthetic ELF32 image builder and mock
//! platform collaborators.
#![allow(dead_code)]

use coproc_boot::{Carveout, CoprocControl, Error, FirmwareSource, HostPtr, Result};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::time::Duration;

pub const PT_LOAD: u32 = 1;
pub const SHT_PROGBITS: u32 = 1;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;

pub const STB_LOCAL: u8 = 0;
pub const STB_GLOBAL: u8 = 1;
pub const STB_WEAK: u8 = 2;
pub const STT_NOTYPE: u8 = 0;
pub const STT_OBJECT: u8 = 1;
pub const STT_FUNC: u8 = 2;

#[must_use]
pub const fn st_info(bind: u8, typ: u8) -> u8 {
    (bind << 4) | (typ & 0xf)
}

#[derive(Clone)]
pub struct SegmentSpec {
    pub device_addr: u32,
    pub data: Vec<u8>,
    pub mem_size: u32,
}

impl SegmentSpec {
    pub fn new(device_addr: u32, data: Vec<u8>) -> Self {
        let mem_size = data.len() as u32;
        Self {
            device_addr,
            data,
            mem_size,
        }
    }
}

#[derive(Clone)]
pub struct SectionSpec {
    pub name: &'static str,
    pub addr: u32,
    pub size: u32,
}

#[derive(Clone)]
pub struct SymSpec {
    pub name: &'static str,
    pub value: u32,
    pub info: u8,
}

/// Builds a minimal but fully well-formed ELF32 little-endian image.
#[derive(Default)]
pub struct Elf32Builder {
    segments: Vec<SegmentSpec>,
    sections: Vec<SectionSpec>,
    symbols: Option<Vec<SymSpec>>,
}

impl Elf32Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segment(mut self, segment: SegmentSpec) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn section(mut self, name: &'static str, addr: u32, size: u32) -> Self {
        self.sections.push(SectionSpec { name, addr, size });
        self
    }

    /// Adds `.symtab`/`.strtab` sections holding the given symbols.
    pub fn symbols(mut self, symbols: Vec<SymSpec>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let phnum = self.segments.len() as u16;
        let phoff = 52u32;
        let mut elf = vec![0u8; 52 + phnum as usize * 32];

        elf[0..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
        elf[4] = 1; // 32-bit
        elf[5] = 1; // little-endian
        elf[6] = 1; // version

        write_u16(&mut elf, 0x10, 2); // ET_EXEC
        write_u16(&mut elf, 0x12, 40); // EM_ARM
        write_u32(&mut elf, 0x14, 1); // version
        write_u32(&mut elf, 0x18, 0x8030_0000); // entry
        write_u32(&mut elf, 0x1C, phoff);
        // shoff written once the section table position is known
        write_u16(&mut elf, 0x28, 52); // ehsize
        write_u16(&mut elf, 0x2A, 32); // phentsize
        write_u16(&mut elf, 0x2C, phnum);
        write_u16(&mut elf, 0x2E, 40); // shentsize

        for (idx, seg) in self.segments.iter().enumerate() {
            align4(&mut elf);
            let offset = elf.len() as u32;
            elf.extend_from_slice(&seg.data);

            let file_size = seg.data.len() as u32;
            let base = phoff as usize + idx * 32;
            write_u32(&mut elf, base, PT_LOAD);
            write_u32(&mut elf, base + 4, offset);
            write_u32(&mut elf, base + 8, seg.device_addr); // vaddr
            write_u32(&mut elf, base + 12, seg.device_addr); // paddr
            write_u32(&mut elf, base + 16, file_size);
            write_u32(&mut elf, base + 20, seg.mem_size);
            write_u32(&mut elf, base + 24, 5); // PF_R | PF_X
            write_u32(&mut elf, base + 28, 4);
        }

        // section records: (shstrtab name offset, type, addr, offset, size, link, info, entsize)
        let mut shstrtab = vec![0u8];
        let mut records: Vec<[u32; 8]> = Vec::new();

        for section in &self.sections {
            align4(&mut elf);
            let name_off = append_name(&mut shstrtab, section.name);
            let offset = elf.len() as u32;
            elf.extend(std::iter::repeat_n(0u8, section.size as usize));
            records.push([
                name_off,
                SHT_PROGBITS,
                section.addr,
                offset,
                section.size,
                0,
                0,
                0,
            ]);
        }

        if let Some(symbols) = &self.symbols {
            let mut strtab = vec![0u8];
            let mut symtab = vec![0u8; 16]; // reserved null entry

            for sym in symbols {
                let name_off = append_name(&mut strtab, sym.name);
                let mut entry = [0u8; 16];
                entry[0..4].copy_from_slice(&name_off.to_le_bytes());
                entry[4..8].copy_from_slice(&sym.value.to_le_bytes());
                // st_size left zero
                entry[12] = sym.info;
                symtab.extend_from_slice(&entry);
            }

            align4(&mut elf);
            let symtab_name = append_name(&mut shstrtab, ".symtab");
            let symtab_off = elf.len() as u32;
            elf.extend_from_slice(&symtab);
            let strtab_index = records.len() as u32 + 2;
            records.push([
                symtab_name,
                SHT_SYMTAB,
                0,
                symtab_off,
                symtab.len() as u32,
                strtab_index,
                1,
                16,
            ]);

            let strtab_name = append_name(&mut shstrtab, ".strtab");
            let strtab_off = elf.len() as u32;
            elf.extend_from_slice(&strtab);
            records.push([
                strtab_name,
                SHT_STRTAB,
                0,
                strtab_off,
                strtab.len() as u32,
                0,
                0,
                0,
            ]);
        }

        let shstrtab_name = append_name(&mut shstrtab, ".shstrtab");
        let shstrtab_off = elf.len() as u32;
        elf.extend_from_slice(&shstrtab);
        records.push([
            shstrtab_name,
            SHT_STRTAB,
            0,
            shstrtab_off,
            shstrtab.len() as u32,
            0,
            0,
            0,
        ]);

        align4(&mut elf);
        let shoff = elf.len() as u32;
        let shnum = records.len() as u16 + 1; // plus SHT_NULL
        elf.extend_from_slice(&[0u8; 40]); // SHT_NULL entry

        for record in &records {
            let [name, typ, addr, offset, size, link, info, entsize] = *record;
            let base = elf.len();
            elf.extend_from_slice(&[0u8; 40]);
            write_u32(&mut elf, base, name);
            write_u32(&mut elf, base + 4, typ);
            write_u32(&mut elf, base + 8, 0); // flags
            write_u32(&mut elf, base + 12, addr);
            write_u32(&mut elf, base + 16, offset);
            write_u32(&mut elf, base + 20, size);
            write_u32(&mut elf, base + 24, link);
            write_u32(&mut elf, base + 28, info);
            write_u32(&mut elf, base + 32, 4); // addralign
            write_u32(&mut elf, base + 36, entsize);
        }

        write_u32(&mut elf, 0x20, shoff);
        write_u16(&mut elf, 0x30, shnum);
        write_u16(&mut elf, 0x32, shnum - 1); // shstrndx

        elf
    }
}

fn append_name(table: &mut Vec<u8>, name: &str) -> u32 {
    let offset = table.len() as u32;
    table.extend_from_slice(name.as_bytes());
    table.push(0);
    offset
}

fn align4(elf: &mut Vec<u8>) {
    while elf.len() % 4 != 0 {
        elf.push(0);
    }
}

fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[derive(Default)]
pub struct Counters {
    pub fetches: AtomicUsize,
    pub allocs: AtomicUsize,
    pub power_ons: AtomicUsize,
    pub starts: AtomicUsize,
    pub waits: AtomicUsize,
}

pub struct MockFirmware {
    pub image: Vec<u8>,
    pub counters: Arc<Counters>,
    pub fail: Arc<AtomicBool>,
}

impl MockFirmware {
    pub fn new(image: Vec<u8>, counters: Arc<Counters>) -> Self {
        Self {
            image,
            counters,
            fail: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl FirmwareSource for MockFirmware {
    fn fetch(&mut self, _name: &str) -> Result<Vec<u8>> {
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);
        if self.fail.load(Ordering::Relaxed) {
            return Err(Error::FirmwareUnavailable("mock fetch failure"));
        }
        Ok(self.image.clone())
    }
}

pub struct MockControl {
    mem: Box<[u8]>,
    device_addr: u64,
    pub counters: Arc<Counters>,
    pub fail_alloc: bool,
    pub fail_wait: Arc<AtomicBool>,
}

impl MockControl {
    /// A carveout of `len` zeroed bytes at `device_addr`.
    pub fn new(device_addr: u64, len: usize, counters: Arc<Counters>) -> Self {
        Self {
            mem: vec![0u8; len].into_boxed_slice(),
            device_addr,
            counters,
            fail_alloc: false,
            fail_wait: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl CoprocControl for MockControl {
    fn alloc_os_carveout(&mut self) -> Result<Carveout> {
        self.counters.allocs.fetch_add(1, Ordering::Relaxed);
        if self.fail_alloc {
            return Err(Error::Platform("mock carveout failure"));
        }
        Ok(Carveout {
            device_addr: self.device_addr,
            host: HostPtr::from_mut_slice(&mut self.mem),
            len: self.mem.len() as u32,
        })
    }

    fn power_on(&mut self) -> Result<()> {
        self.counters.power_ons.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn start_core(&mut self) -> Result<()> {
        self.counters.starts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn wait_boot_complete(&mut self, _timeout: Duration) -> Result<()> {
        self.counters.waits.fetch_add(1, Ordering::Relaxed);
        if self.fail_wait.load(Ordering::Relaxed) {
            return Err(Error::Timeout("boot complete signal"));
        }
        Ok(())
    }
}
