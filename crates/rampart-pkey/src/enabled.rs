// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Linux x86_64 implementation over the pkey syscalls and PKRU register.
//!
//! libc exposes no portable wrappers for `pkey_alloc`/`pkey_free`/
//! `pkey_mprotect`, so the raw syscalls are used directly.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::error::KeyError;
use crate::pkru;
use crate::{PageProtection, Permission, ProtectionKey};

/// Probe state: not yet attempted
const PROBE_UNKNOWN: u8 = 0;
/// Probe state: in progress by another thread
const PROBE_IN_PROGRESS: u8 = 1;
/// Probe state: kernel refused a key
const PROBE_UNSUPPORTED: u8 = 2;
/// Probe state: keys available
const PROBE_SUPPORTED: u8 = 3;

static PROBE_STATE: AtomicU8 = AtomicU8::new(PROBE_UNKNOWN);

/// `pkey_alloc` access-rights flag requesting write access be disabled on the
/// new key. Defined here because this `libc` version exposes no wrapper for it;
/// value per the Linux uapi (`PKEY_DISABLE_WRITE`).
const PKEY_DISABLE_WRITE: libc::c_ulong = 0x2;

/// Returns whether the kernel hands out protection keys on this machine.
///
/// **Side effect on first call:** allocates and immediately frees one key.
/// Subsequent calls return the cached result without side effects.
///
/// Thread-safe: if multiple threads call simultaneously, only one performs
/// the probe while the others spin-wait.
#[inline]
pub fn is_supported() -> bool {
    match PROBE_STATE.load(Ordering::Acquire) {
        PROBE_SUPPORTED => true,
        PROBE_UNSUPPORTED => false,
        _ => probe_slow(),
    }
}

#[cold]
#[inline(never)]
fn probe_slow() -> bool {
    match PROBE_STATE.compare_exchange(
        PROBE_UNKNOWN,
        PROBE_IN_PROGRESS,
        Ordering::Acquire,
        Ordering::Relaxed,
    ) {
        Ok(_) => {
            let key = unsafe { libc::syscall(libc::SYS_pkey_alloc, 0, 0) };
            let supported = key >= 0;

            if supported {
                unsafe { libc::syscall(libc::SYS_pkey_free, key) };
            }

            let state = if supported {
                PROBE_SUPPORTED
            } else {
                PROBE_UNSUPPORTED
            };
            PROBE_STATE.store(state, Ordering::Release);

            supported
        }
        Err(_) => loop {
            match PROBE_STATE.load(Ordering::Acquire) {
                PROBE_SUPPORTED => return true,
                PROBE_UNSUPPORTED => return false,
                _ => core::hint::spin_loop(),
            }
        },
    }
}

/// Allocates a fresh protection key.
///
/// The key is allocated with write access already disabled, so the calling
/// thread starts out at the non-writable default without an extra register
/// write. Threads spawned afterwards inherit their parent's permission state.
pub fn alloc_key() -> Result<ProtectionKey, KeyError> {
    if !is_supported() {
        return Err(KeyError::Unsupported);
    }

    let key = unsafe { libc::syscall(libc::SYS_pkey_alloc, 0, PKEY_DISABLE_WRITE) };

    if key < 0 {
        return Err(KeyError::Alloc);
    }

    Ok(ProtectionKey(key as i32))
}

/// Releases a key previously obtained from [`alloc_key`].
///
/// Memory still bound to the key must not be accessed afterwards.
pub fn free_key(key: ProtectionKey) {
    unsafe { libc::syscall(libc::SYS_pkey_free, key.raw()) };
}

/// Sets the current thread's permission for `key`.
///
/// A single PKRU register write: no allocation, no errno, no locks, safe to
/// call from a signal handler. The caller must have established key support
/// ([`is_supported`]); key 0 is the process default key and is never toggled.
#[inline]
pub fn set_thread_permission(key: ProtectionKey, permission: Permission) {
    debug_assert!(is_supported());
    debug_assert!(key.raw() > 0);

    pkru::set(key.raw() as u32, permission);
}

/// Reads back the current thread's permission for `key`.
///
/// Used by assertions, diagnostics and tests; the toggle path never needs it.
#[inline]
pub fn thread_permission(key: ProtectionKey) -> Permission {
    debug_assert!(is_supported());

    pkru::get(key.raw() as u32)
}

fn prot_bits(protection: PageProtection) -> libc::c_int {
    match protection {
        PageProtection::Read => libc::PROT_READ,
        PageProtection::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
        PageProtection::ReadWriteExecute => {
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC
        }
    }
}

/// Binds `len` bytes at `ptr` to `key`, applying `protection` as the page
/// protection.
///
/// # Safety
///
/// `ptr..ptr + len` must be a page-aligned range of mapped memory the caller
/// owns. Rebinding changes which threads can write the range.
pub unsafe fn bind_region(
    ptr: *mut u8,
    len: usize,
    protection: PageProtection,
    key: ProtectionKey,
) -> Result<(), KeyError> {
    let failed = unsafe {
        libc::syscall(
            libc::SYS_pkey_mprotect,
            ptr as *mut libc::c_void,
            len,
            prot_bits(protection),
            key.raw(),
        )
    } != 0;

    if failed {
        return Err(KeyError::Bind);
    }

    Ok(())
}
