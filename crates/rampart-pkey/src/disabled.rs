// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! No-op surface for platforms without protection-key support.

#![allow(missing_docs)]

use crate::error::KeyError;
use crate::{PageProtection, Permission, ProtectionKey};

pub fn is_supported() -> bool {
    false
}

pub fn alloc_key() -> Result<ProtectionKey, KeyError> {
    Err(KeyError::Unsupported)
}

pub fn free_key(_key: ProtectionKey) {}

pub fn set_thread_permission(_key: ProtectionKey, _permission: Permission) {}

pub fn thread_permission(_key: ProtectionKey) -> Permission {
    Permission::NoRestriction
}

/// # Safety
///
/// No-op; callers still pass a range they own so both builds share a contract.
pub unsafe fn bind_region(
    _ptr: *mut u8,
    _len: usize,
    _protection: PageProtection,
    _key: ProtectionKey,
) -> Result<(), KeyError> {
    Ok(())
}
