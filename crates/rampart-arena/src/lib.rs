// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Protection-key-backed arena for runtime-generated code.
//!
//! A [`CodeArena`] owns one anonymous mapping created readable, writable and
//! executable, bound at creation to a freshly allocated protection key. The
//! page tables never change again; whether stores to the region are honored
//! is decided per thread by the key's write-disable bit. That is what keeps
//! the region effectively write-xor-execute without an mprotect on every
//! code patch.
//!
//! # Guarantees
//!
//! - The mapping and the key live exactly as long as the arena
//! - The key is exposed via [`CodeArena::key`] so a write-protection layer
//!   can gate its own state under the same key
//! - Creation fails with [`ArenaError::Unsupported`] where the platform
//!   hands out no keys; there is no silent unprotected fallback
//!
//! # Example
//!
//! ```rust
//! #[cfg(unix)]
//! fn example() {
//!     use rampart_arena::CodeArena;
//!
//!     if rampart_pkey::is_supported() {
//!         let arena = CodeArena::new(4096).expect("Failed to new()");
//!         assert!(arena.key().raw() > 0);
//!         assert_eq!(arena.len() % 4096, 0);
//!     }
//! }
//! # #[cfg(unix)]
//! # example();
//! ```

#![warn(missing_docs)]
#![warn(unsafe_op_in_unsafe_fn)]


mod error;

#[cfg(unix)]
mod arena;

pub use error::ArenaError;

#[cfg(unix)]
pub use arena::CodeArena;
