// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Error types for rampart-pkey.
use thiserror::Error;

/// Errors from protection-key syscalls.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum KeyError {
    /// Protection keys are unavailable on this platform, CPU or kernel.
    #[error("protection keys unsupported")]
    Unsupported = 0,

    /// pkey_alloc failed (keys exhausted or denied).
    #[error("pkey_alloc failed")]
    Alloc = 1,

    /// pkey_mprotect failed for the given range.
    #[error("pkey_mprotect failed")]
    Bind = 2,
}
