// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Write-protection boundary for JIT code memory.
//!
//! A process that generates code at runtime has to hold memory that is both
//! writable and executable at some point. This crate narrows that window:
//! memory bound under the isolation key is writable on a thread only for the
//! dynamic extent of a [`WriteScope`] on that thread, and execute/read-only
//! everywhere else. An attacker with an arbitrary-write primitive cannot
//! patch code from outside a scope, and the control state describing the
//! protection itself lives in a sealed, read-only region so it cannot be
//! retargeted either.
//!
//! # Guarantees
//!
//! - **Bracketed writability**: the key's mapping is writable on a thread iff
//!   that thread is inside at least one [`WriteScope`]; nested scopes toggle
//!   only at the outermost boundary
//! - **Sealed control state**: the allocator handle and key are written once
//!   during [`initialize`] and then mapped read-only under the key itself
//! - **Graceful degradation**: without an allocator, with JIT disabled, or on
//!   hardware without protection keys, every operation is a true no-op and
//!   [`is_initialized`] stays `false`
//! - **Signal-safe escape hatch**: [`reset_to_default_for_signal_handler`]
//!   forces the current thread non-writable from async-signal context with a
//!   single register write
//!
//! # Example
//!
//! ```rust
//! use rampart::{initialize, is_initialized, IsolationConfig, WriteScope};
//!
//! // No allocator configured: isolation stays disabled, scopes are no-ops.
//! initialize(None, IsolationConfig::default());
//! assert!(!is_initialized());
//!
//! let _scope = WriteScope::new("patching a jump table");
//! ```
//!
//! # Startup Ordering
//!
//! [`initialize`] must run on one thread, strictly before any other thread
//! opens a scope or touches key-bound memory. Threads created before
//! initialization start with the key access-disabled; passing once through
//! a scope drop or the signal-handler reset normalizes them to the readable,
//! non-writable default.

#![warn(missing_docs)]
#![warn(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
mod tests;

mod isolation;
mod scope;

pub use isolation::{IsolationConfig, current_key, initialize, is_initialized};
pub use scope::{WriteScope, reset_to_default_for_signal_handler};

#[cfg(any(test, feature = "test-utils"))]
pub use scope::{WriteScopeForTesting, is_key_writable};

pub use rampart_pkey::{IsolatedAlloc, ProtectionKey};
