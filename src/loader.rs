//! Loadable segment relocation into coprocessor memory.
//!
//! Walks the image's `PT_LOAD` segments, validates their size invariants
//! against the untrusted image, resolves each target through the region
//! table and copies the payload with an address-space-appropriate method:
//! plain bulk copies into direct memory, width-respecting ordered word
//! stores into register/IO space.

use crate::{
    Error, Result,
    image::{FirmwareImage, Segment},
    map::{HostPtr, RegionTable},
};

/// Loads every `PT_LOAD` segment of `image` into place.
///
/// The first failure aborts the remaining walk and is surfaced as-is;
/// segments copied by earlier iterations are not rolled back, the boot
/// attempt is expected to be abandoned wholesale.
///
/// ## Errors
///
/// Returns `Error::MalformedImage` for segments violating size invariants
/// and `Error::TranslationMiss` for device addresses outside every
/// registered region.
pub fn load_image(image: &FirmwareImage, regions: &RegionTable) -> Result<()> {
    for segment in image.load_segments() {
        let segment = segment?;
        load_segment(image, regions, &segment)?;
    }
    Ok(())
}

fn load_segment(image: &FirmwareImage, regions: &RegionTable, segment: &Segment) -> Result<()> {
    log::debug!(
        "segment: da {:#x} memsz {:#x} filesz {:#x}",
        segment.device_addr,
        segment.mem_size,
        segment.file_size
    );

    if segment.file_size > segment.mem_size {
        return Err(Error::MalformedImage("segment file size exceeds memory size"));
    }

    let end = segment
        .file_offset
        .checked_add(segment.file_size)
        .ok_or(Error::MalformedImage("segment offset overflow"))?;
    if end as usize > image.bytes().len() {
        return Err(Error::MalformedImage("segment payload overruns the image"));
    }

    let direct = regions.is_direct_memory(u64::from(segment.device_addr));
    // Register-space copies always store whole words, so the final
    // zero-padded word must also stay inside the validated mapping.
    let span = if direct {
        segment.file_size
    } else {
        if !segment.device_addr.is_multiple_of(4) {
            return Err(Error::MalformedImage(
                "register-space segment is not word aligned",
            ));
        }
        segment
            .file_size
            .checked_next_multiple_of(4)
            .ok_or(Error::MalformedImage("segment size overflow"))?
    };
    let dest = regions.translate(u64::from(segment.device_addr), span)?;
    if !direct && !dest.as_ptr().addr().is_multiple_of(4) {
        return Err(Error::Platform(
            "register-space mapping is not word aligned",
        ));
    }

    // zero-fill-only segments (.bss) rely on pre-zeroed carveouts
    if segment.file_size == 0 {
        return Ok(());
    }

    let payload = &image.bytes()[segment.file_offset as usize..end as usize];
    if direct {
        // SAFETY: `translate` guarantees `dest` covers `payload.len()`
        // bytes of platform-owned memory, disjoint from the image buffer.
        unsafe {
            core::ptr::copy_nonoverlapping(payload.as_ptr(), dest.as_ptr(), payload.len());
        }
    } else {
        // SAFETY: same as above, at the word-rounded length.
        unsafe { copy_io_words(dest, payload) };
    }
    Ok(())
}

/// Copies `src` into register/IO space in ascending 4-byte strides.
///
/// Register interfaces do not tolerate unaligned or batched access, so
/// each stride is read from the source and stored individually, in order.
/// The final partial word, if any, is zero-padded.
///
/// # Safety
///
/// `dest` must be 4-byte aligned, valid for `src.len()` rounded up to a
/// multiple of 4 bytes, and exclusively owned by the caller.
unsafe fn copy_io_words(dest: HostPtr, src: &[u8]) {
    let mut offset = 0;
    while offset < src.len() {
        let mut word = [0u8; 4];
        let take = (src.len() - offset).min(4);
        word[..take].copy_from_slice(&src[offset..offset + take]);
        // SAFETY: offset stays below the word-rounded source length, which
        // the caller guarantees the destination covers.
        unsafe {
            dest.as_ptr()
                .add(offset)
                .cast::<u32>()
                .write_volatile(u32::from_le_bytes(word));
        }
        offset += 4;
    }
}
