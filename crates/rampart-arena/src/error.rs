// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Error types for rampart-arena.
use thiserror::Error;

/// Errors from arena creation.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum ArenaError {
    /// Protection keys are unavailable on this platform, CPU or kernel.
    #[error("protection keys unsupported")]
    Unsupported = 0,

    /// mmap failed for the requested length.
    #[error("mmap failed")]
    Map = 1,

    /// No protection key could be allocated.
    #[error("pkey_alloc failed")]
    Key = 2,

    /// Binding the mapping to its key failed.
    #[error("pkey_mprotect failed")]
    Bind = 3,
}
