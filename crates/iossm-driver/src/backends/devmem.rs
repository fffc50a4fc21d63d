//! Physical register access through a `/dev/mem` mapping.
//!
//! Maps one window of physical address space covering the IO96B CSR blocks
//! (and, when the clkgen gate is used, the system-manager status registers)
//! and serves bounds-checked volatile 32-bit accesses out of it.

use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::OpenOptions;
use std::ptr::NonNull;

use crate::bus::MmioBus;
use crate::error::{IossmError, Result};

/// One mapped window of physical address space.
///
/// Addresses handed to [`MmioBus`] methods are absolute physical addresses
/// and must fall inside the window.
#[derive(Debug)]
pub struct DevMem {
    ptr: NonNull<u8>,
    phys_base: u64,
    size: usize,
    _file: std::fs::File,
}

impl DevMem {
    /// Map `size` bytes of physical address space starting at `phys_base`.
    ///
    /// `phys_base` must be page-aligned (it is used as the mmap offset).
    ///
    /// # Errors
    ///
    /// Returns [`IossmError::Bus`] if `/dev/mem` cannot be opened (needs
    /// root), the base is misaligned, or the mapping fails.
    pub fn map(phys_base: u64, size: usize) -> Result<Self> {
        if phys_base % 0x1000 != 0 {
            return Err(IossmError::bus(format!(
                "physical base {phys_base:#x} is not page-aligned"
            )));
        }
        if size == 0 {
            return Err(IossmError::bus("cannot map a zero-sized window"));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/mem")
            .map_err(|e| IossmError::bus(format!("cannot open /dev/mem: {e}")))?;

        // SAFETY: mmap over a freshly opened fd with a validated non-zero
        // size and page-aligned offset. The fd is kept alive in the struct
        // for the lifetime of the mapping; munmap happens exactly once in
        // Drop with the same pointer and length.
        let ptr = unsafe {
            let addr = mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &file,
                phys_base,
            )
            .map_err(|e| IossmError::bus(format!("mmap of {phys_base:#x} failed: {e}")))?;

            NonNull::new(addr.cast::<u8>()).expect("mmap returns non-null on success")
        };

        tracing::info!(
            "Mapped {size:#x} bytes of CSR space at {phys_base:#x} ({ptr:p})"
        );

        Ok(Self {
            ptr,
            phys_base,
            size,
            _file: file,
        })
    }

    /// Translate an absolute physical address into a window offset.
    fn offset_of(&self, addr: u64) -> Result<usize> {
        let end = self.phys_base + self.size as u64;
        if addr < self.phys_base || addr + 4 > end {
            return Err(IossmError::bus(format!(
                "address {addr:#x} outside mapped window {:#x}..{end:#x}",
                self.phys_base
            )));
        }
        Ok((addr - self.phys_base) as usize)
    }

    /// Physical base of the window.
    #[must_use]
    pub const fn phys_base(&self) -> u64 {
        self.phys_base
    }

    /// Window size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }
}

impl MmioBus for DevMem {
    fn read_u32(&self, addr: u64) -> Result<u32> {
        let offset = self.offset_of(addr)?;

        // SAFETY: offset + 4 <= size was just validated; ptr is a live
        // mapping; CSR registers are 4-byte aligned, and the read must be
        // volatile because hardware mutates these registers underneath us.
        #[allow(clippy::cast_ptr_alignment)]
        let value = unsafe { self.ptr.as_ptr().add(offset).cast::<u32>().read_volatile() };

        tracing::trace!("rd {addr:#x} = {value:#x}");
        Ok(value)
    }

    fn write_u32(&mut self, addr: u64, value: u32) -> Result<()> {
        let offset = self.offset_of(addr)?;

        tracing::trace!("wr {addr:#x} = {value:#x}");

        // SAFETY: bounds validated as above; volatile because writes have
        // hardware side effects (the doorbell write starts command
        // execution) and must not be elided or reordered.
        #[allow(clippy::cast_ptr_alignment)]
        unsafe {
            self.ptr.as_ptr().add(offset).cast::<u32>().write_volatile(value);
        }

        Ok(())
    }
}

impl Drop for DevMem {
    fn drop(&mut self) {
        // SAFETY: ptr/size are exactly what mmap returned in map(); Drop
        // runs at most once.
        unsafe {
            if let Err(e) = munmap(self.ptr.as_ptr().cast(), self.size) {
                tracing::error!("munmap failed during drop: {e}");
            }
        }
        tracing::debug!("Unmapped CSR window at {:#x}", self.phys_base);
    }
}

// SAFETY: the mapping is owned exclusively and stays valid until Drop;
// moving the owner to another thread does not invalidate it.
unsafe impl Send for DevMem {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_misaligned_base() {
        let err = DevMem::map(0x1840_0004, 0x1000).unwrap_err();
        assert!(matches!(err, IossmError::Bus { .. }));
    }

    #[test]
    fn rejects_empty_window() {
        let err = DevMem::map(0x1840_0000, 0).unwrap_err();
        assert!(matches!(err, IossmError::Bus { .. }));
    }
}
