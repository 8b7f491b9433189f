// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Process-wide isolation state: the trusted/untrusted split and the
//! one-shot initialization protocol.
//!
//! # Trust Model
//!
//! The state is split in two:
//! - **Trusted**: the allocator handle and the key, held in a block padded
//!   to its own page(s) and sealed read-only under the key at the end of
//!   initialization. Code without the key's write permission cannot tamper
//!   with it, arbitrary-write primitive or not.
//! - **Untrusted**: a mirror of the raw key id in a plain atomic. Freely
//!   readable and writable by anything; the id grants no capability, so
//!   corrupting it can deny protection toggles but never mint write access.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicI32, Ordering};

#[cfg(debug_assertions)]
use core::sync::atomic::AtomicBool;
#[cfg(test)]
use core::sync::atomic::AtomicUsize;

use rampart_pkey::{IsolatedAlloc, PageProtection, ProtectionKey};

use crate::scope;

/// Compile-time padding assumed for the trusted block. The seal below is
/// page-granular; this must be at least the runtime page size or the seal
/// would spill onto neighbouring data.
pub(crate) const TRUSTED_REGION_ALIGN: usize = 4096;

/// Sentinel in the untrusted mirror: isolation inactive.
pub(crate) const NO_KEY: i32 = -1;

#[repr(C, align(4096))]
struct TrustedData {
    allocator: Option<&'static dyn IsolatedAlloc>,
    key: Option<ProtectionKey>,
}

const _: () = assert!(align_of::<TrustedData>() == TRUSTED_REGION_ALIGN);
const _: () = assert!(size_of::<TrustedData>() % TRUSTED_REGION_ALIGN == 0);

struct TrustedCell(UnsafeCell<TrustedData>);

// Safety: written exactly once during single-threaded startup, read-only
// afterwards; the seal makes any later write fault.
unsafe impl Sync for TrustedCell {}

static TRUSTED: TrustedCell = TrustedCell(UnsafeCell::new(TrustedData {
    allocator: None,
    key: None,
}));

/// Raw key id mirror, the fast-path input for permission toggles. `NO_KEY`
/// until initialization completes.
static UNTRUSTED_KEY: AtomicI32 = AtomicI32::new(NO_KEY);

#[cfg(debug_assertions)]
static INITIALIZE_CALLED: AtomicBool = AtomicBool::new(false);

#[cfg(test)]
static PAGE_SIZE_OVERRIDE: AtomicUsize = AtomicUsize::new(0);

/// Externally supplied switches consumed at initialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IsolationConfig {
    /// The embedder generates no code at runtime; nothing to protect.
    pub jitless: bool,
}

/// Unrecoverable initialization faults, distinguishable by exit code in tests.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub(crate) enum FatalError {
    /// The compiled-in trusted-region padding is smaller than a runtime page.
    TrustedRegionPageSize = 10,
    /// Sealing the trusted region failed.
    TrustedRegionSeal = 11,
}

fn fatal(error: FatalError) -> ! {
    // Tests observe the exact condition as an exit code.
    #[cfg(test)]
    std::process::exit(error as i32);

    #[cfg(not(test))]
    {
        let _ = error;
        std::process::abort()
    }
}

#[cfg(unix)]
fn system_page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

// Unreachable in practice: without protection keys initialize() returns
// before the page-size check.
#[cfg(not(unix))]
fn system_page_size() -> usize {
    TRUSTED_REGION_ALIGN
}

fn runtime_page_size() -> usize {
    #[cfg(test)]
    {
        let injected = PAGE_SIZE_OVERRIDE.load(Ordering::Relaxed);
        if injected != 0 {
            return injected;
        }
    }

    system_page_size()
}

/// Establishes the write-protection boundary. Call exactly once, on one
/// thread, before any other thread opens a [`WriteScope`] or touches
/// key-bound memory.
///
/// Every early exit leaves isolation disabled and every later operation a
/// no-op; callers are not expected to branch on the outcome (use
/// [`is_initialized`] for diagnostics). Isolation is hardening, not a
/// correctness requirement, with one exception: if the compiled-in
/// trusted-region padding turns out smaller than the runtime page size, a
/// page-granular seal could not actually seal, and the process aborts.
///
/// [`WriteScope`]: crate::WriteScope
pub fn initialize(allocator: Option<&'static dyn IsolatedAlloc>, config: IsolationConfig) {
    #[cfg(debug_assertions)]
    INITIALIZE_CALLED.store(true, Ordering::Relaxed);

    debug_assert!(!is_initialized(), "initialize() must only run once");
    debug_assert_eq!(
        scope::nesting_depth(),
        0,
        "initialize() must run before any write scope"
    );

    let Some(allocator) = allocator else {
        return;
    };

    if config.jitless {
        return;
    }

    if !rampart_pkey::is_supported() {
        return;
    }

    if TRUSTED_REGION_ALIGN < runtime_page_size() {
        fatal(FatalError::TrustedRegionPageSize);
    }

    let key = allocator.key();

    // Safety: single-threaded startup; nothing else can observe the block
    // mid-write, and the seal has not been applied yet.
    unsafe {
        let trusted = &mut *TRUSTED.0.get();
        trusted.allocator = Some(allocator);
        trusted.key = Some(key);
    }

    UNTRUSTED_KEY.store(key.raw(), Ordering::Release);

    // Seal: from here on the trusted block is read-only even inside a write
    // scope (page protection), and its pages answer to the key.
    let sealed = unsafe {
        rampart_pkey::bind_region(
            TRUSTED.0.get() as *mut u8,
            size_of::<TrustedData>(),
            PageProtection::Read,
            key,
        )
    };

    if sealed.is_err() {
        fatal(FatalError::TrustedRegionSeal);
    }
}

/// Whether initialization completed and isolation is active.
///
/// `false` after every degraded path (no allocator, JIT disabled, no
/// platform support); scopes and the signal-handler reset are then no-ops.
#[inline]
pub fn is_initialized() -> bool {
    UNTRUSTED_KEY.load(Ordering::Acquire) != NO_KEY
}

/// The protection key guarding JIT code memory. Valid only once
/// [`is_initialized`] is true; trusted-side accessor.
pub fn current_key() -> ProtectionKey {
    #[cfg(debug_assertions)]
    debug_assert!(
        INITIALIZE_CALLED.load(Ordering::Relaxed),
        "current_key() before initialize()"
    );
    debug_assert!(is_initialized(), "current_key() while isolation disabled");

    let trusted = unsafe { &*TRUSTED.0.get() };
    trusted.key.unwrap_or(ProtectionKey::from_raw(NO_KEY))
}

/// Key mirror read by the toggle paths; `None` while isolation is inactive.
#[inline]
pub(crate) fn untrusted_key() -> Option<ProtectionKey> {
    let raw = UNTRUSTED_KEY.load(Ordering::Acquire);

    if raw == NO_KEY {
        return None;
    }

    Some(ProtectionKey::from_raw(raw))
}

#[cfg(test)]
pub(crate) fn trusted_allocator() -> Option<&'static dyn IsolatedAlloc> {
    let trusted = unsafe { &*TRUSTED.0.get() };
    trusted.allocator
}

/// Clears the untrusted side so degraded-path tests can rerun initialize.
/// The trusted block stays sealed once sealed; tests that complete
/// initialization run in a subprocess instead.
#[cfg(test)]
pub(crate) fn reset_for_testing() {
    UNTRUSTED_KEY.store(NO_KEY, Ordering::SeqCst);
    #[cfg(debug_assertions)]
    INITIALIZE_CALLED.store(false, Ordering::SeqCst);
    PAGE_SIZE_OVERRIDE.store(0, Ordering::SeqCst);
}

#[cfg(test)]
pub(crate) fn set_page_size_for_testing(page_size: usize) {
    PAGE_SIZE_OVERRIDE.store(page_size, Ordering::SeqCst);
}
