// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! CodeArena - mmap lifecycle owner for one key-bound executable region.

use core::ptr;

use rampart_pkey::{IsolatedAlloc, PageProtection, ProtectionKey};

use crate::error::ArenaError;

/// An executable memory region whose writability is gated by a protection key.
///
/// Pages stay read-write-execute in the page tables for the whole arena
/// lifetime; stores are honored only on threads currently holding the key's
/// write permission.
pub struct CodeArena {
    base: *mut u8,
    len: usize,
    key: ProtectionKey,
}

// Safety: the arena owns its mapping; per-thread write gating is the key's
// job, not the borrow checker's.
unsafe impl Send for CodeArena {}
unsafe impl Sync for CodeArena {}

impl CodeArena {
    /// Maps `len` bytes (rounded up to whole pages) and binds them to a
    /// fresh protection key.
    pub fn new(len: usize) -> Result<Self, ArenaError> {
        if !rampart_pkey::is_supported() {
            return Err(ArenaError::Unsupported);
        }

        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        let len = len.div_ceil(page_size) * page_size;

        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if base == libc::MAP_FAILED {
            return Err(ArenaError::Map);
        }

        let base = base as *mut u8;

        let key = match rampart_pkey::alloc_key() {
            Ok(key) => key,
            Err(_) => {
                unsafe { libc::munmap(base as *mut _, len) };
                return Err(ArenaError::Key);
            }
        };

        let bound = unsafe {
            rampart_pkey::bind_region(base, len, PageProtection::ReadWriteExecute, key)
        };

        if bound.is_err() {
            unsafe { libc::munmap(base as *mut _, len) };
            rampart_pkey::free_key(key);
            return Err(ArenaError::Bind);
        }

        Ok(Self { base, len, key })
    }

    /// The protection key assigned to this arena's pages.
    pub fn key(&self) -> ProtectionKey {
        self.key
    }

    /// Base address of the region.
    ///
    /// Stores through it fault unless the current thread holds the key's
    /// write permission.
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    /// Region length in bytes; always a whole number of pages.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the region is empty (never for a created arena).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl IsolatedAlloc for CodeArena {
    fn key(&self) -> ProtectionKey {
        self.key
    }
}

impl Drop for CodeArena {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.base as *mut _, self.len) };
        rampart_pkey::free_key(self.key);
    }
}

impl core::fmt::Debug for CodeArena {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CodeArena")
            .field("len", &self.len)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
