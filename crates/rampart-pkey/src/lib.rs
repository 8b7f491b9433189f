// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Protection-key platform adapter.
//!
//! Wraps the Linux userspace memory protection key primitive (`pkey_alloc`,
//! `pkey_free`, `pkey_mprotect`, and the x86 PKRU register) behind a small
//! capability-checked surface. Memory bound to a key keeps its page-table
//! protection for its whole lifetime; whether stores to it are honored is
//! decided per thread by the key's write-disable bit, toggled with a cheap
//! register write instead of a page-table change.
//!
//! # Capability Model
//!
//! - [`is_supported`] probes the kernel once and caches the answer
//! - On platforms without the primitive, every operation is a no-op and
//!   [`alloc_key`] reports [`KeyError::Unsupported`]
//! - A key identifier grants nothing by itself; only the per-thread permission
//!   state, gated by the OS and CPU, grants or denies write access
//!
//! # Example
//!
//! ```rust
//! use rampart_pkey::{alloc_key, free_key, is_supported, set_thread_permission, Permission};
//!
//! if is_supported() {
//!     let key = alloc_key().expect("Failed to alloc_key()");
//!
//!     set_thread_permission(key, Permission::NoRestriction);
//!     set_thread_permission(key, Permission::DisableWrite);
//!
//!     free_key(key);
//! }
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
mod tests;

mod error;

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod enabled;
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod pkru;

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
mod disabled;

pub use error::KeyError;

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub use enabled::{
    alloc_key, bind_region, free_key, is_supported, set_thread_permission, thread_permission,
};

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
pub use disabled::{
    alloc_key, bind_region, free_key, is_supported, set_thread_permission, thread_permission,
};

/// A kernel-allocated protection key identifier.
///
/// The identifier carries no capability: knowing it does not grant write
/// access to memory bound under it. It is safe to mirror into freely
/// writable state as a fast-path input to [`set_thread_permission`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectionKey(i32);

impl ProtectionKey {
    /// Returns the raw kernel key id.
    #[inline]
    pub fn raw(self) -> i32 {
        self.0
    }

    /// Rebuilds a key from a raw id, e.g. one read back from a mirror.
    #[inline]
    pub fn from_raw(raw: i32) -> Self {
        Self(raw)
    }
}

/// Per-thread permission state for memory bound to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Reads and writes are honored on the current thread.
    NoRestriction,
    /// Writes fault on the current thread; reads are honored.
    DisableWrite,
}

/// Page-table protection applied when binding a range to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageProtection {
    /// Read-only pages.
    Read,
    /// Readable and writable pages.
    ReadWrite,
    /// Readable, writable and executable pages.
    ReadWriteExecute,
}

/// An allocator that owns memory bound to a single protection key.
///
/// The seam between a write-protection core and whatever carves out the
/// protected region: the core only ever asks which key the region got.
pub trait IsolatedAlloc: Sync {
    /// The protection key assigned to the memory this allocator manages.
    fn key(&self) -> ProtectionKey;
}
