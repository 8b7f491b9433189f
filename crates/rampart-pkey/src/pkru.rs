// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! PKRU register access and the per-key bit layout.
//!
//! Every key owns two bits in the 32-bit PKRU register: an access-disable
//! bit and a write-disable bit. The register is thread state; writing it
//! affects only the current thread.

use core::arch::asm;

use crate::Permission;

const ACCESS_DISABLE: u32 = 0b01;
const WRITE_DISABLE: u32 = 0b10;

#[inline]
pub(crate) fn read() -> u32 {
    let pkru: u32;

    unsafe {
        asm!(
            "rdpkru",
            out("eax") pkru, out("edx") _, in("ecx") 0,
            options(nomem, nostack, preserves_flags),
        );
    }

    pkru
}

// No nomem here: wrpkru changes which stores are honored, so surrounding
// memory accesses must not be reordered across it.
#[inline]
pub(crate) fn write(pkru: u32) {
    unsafe {
        asm!(
            "wrpkru",
            in("eax") pkru, in("ecx") 0, in("edx") 0,
            options(nostack, preserves_flags),
        );
    }
}

/// Sets the two PKRU bits of `key` for the current thread.
#[inline]
pub(crate) fn set(key: u32, permission: Permission) {
    let shift = 2 * key;
    let mut pkru = read() & !((ACCESS_DISABLE | WRITE_DISABLE) << shift);

    if permission == Permission::DisableWrite {
        pkru |= WRITE_DISABLE << shift;
    }

    write(pkru);
}

/// Reads back the current thread's permission for `key`.
#[inline]
pub(crate) fn get(key: u32) -> Permission {
    let shift = 2 * key;

    if read() & (WRITE_DISABLE << shift) != 0 {
        Permission::DisableWrite
    } else {
        Permission::NoRestriction
    }
}
