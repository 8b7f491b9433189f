// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! WriteScope - the nestable per-thread write-enable bracket, and the
//! signal-handler emergency reset.

use core::cell::Cell;
use core::marker::PhantomData;

use rampart_pkey::{Permission, set_thread_permission};

use crate::isolation;

thread_local! {
    /// Write-scope depth for the current thread. Strictly thread-local:
    /// no synchronization, no visibility to other threads.
    static NESTING_LEVEL: Cell<u32> = const { Cell::new(0) };
}

pub(crate) fn nesting_depth() -> u32 {
    NESTING_LEVEL.with(Cell::get)
}

/// Makes key-bound memory writable on the current thread for this scope's
/// lifetime.
///
/// Scopes nest: only the transition between zero and nonzero depth performs
/// the permission toggle, so a nested scope neither pays the toggle cost nor
/// revokes writability out from under its caller. While isolation is
/// disabled the scope is a true no-op.
///
/// The bracket is strictly per-thread: a scope on thread A says nothing
/// about thread B, and the type is deliberately not `Send`.
///
/// # Example
///
/// ```rust
/// use rampart::WriteScope;
///
/// let outer = WriteScope::new("emit trampoline");
/// {
///     let _inner = WriteScope::new("patch call site");
///     // still writable: same thread, depth 2
/// }
/// // still writable: outer scope is alive
/// drop(outer);
/// // non-writable default restored
/// ```
pub struct WriteScope {
    reason: &'static str,
    // The bracket only means anything on the thread that opened it.
    _not_send: PhantomData<*const ()>,
}

impl WriteScope {
    /// Opens a write scope labelled with a short diagnostic reason.
    pub fn new(reason: &'static str) -> Self {
        let previous = NESTING_LEVEL.with(|level| {
            let current = level.get();
            level.set(current + 1);
            current
        });

        if previous == 0 {
            if let Some(key) = isolation::untrusted_key() {
                set_thread_permission(key, Permission::NoRestriction);
            }
        }

        Self {
            reason,
            _not_send: PhantomData,
        }
    }

    /// The diagnostic label this scope was opened with.
    pub fn reason(&self) -> &'static str {
        self.reason
    }
}

impl Drop for WriteScope {
    fn drop(&mut self) {
        let remaining = NESTING_LEVEL.with(|level| {
            let current = level.get();
            debug_assert!(current > 0, "write scope depth underflow");
            level.set(current - 1);
            current - 1
        });

        if remaining == 0 {
            if let Some(key) = isolation::untrusted_key() {
                set_thread_permission(key, Permission::DisableWrite);
            }
        }
    }
}

impl core::fmt::Debug for WriteScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WriteScope")
            .field("reason", &self.reason)
            .field("depth", &nesting_depth())
            .finish()
    }
}

/// Forces the current thread back to the non-writable default, regardless
/// of scope nesting. For signal handlers.
///
/// A signal may land while writability is legitimately enabled, or halfway
/// through a scope's construction or drop. This path therefore reads only
/// the untrusted key mirror and issues one register write; it never touches
/// the nesting counter the interrupted thread may be mid-update on. That
/// intentionally desynchronizes the permission bit from the counter: when
/// the interrupted outermost scope later drops, its own restore is a
/// harmless redundant call. No-op while isolation is disabled.
pub fn reset_to_default_for_signal_handler() {
    let Some(key) = isolation::untrusted_key() else {
        return;
    };

    set_thread_permission(key, Permission::DisableWrite);
}

/// A [`WriteScope`] with a fixed label, for test harnesses that need a
/// scope without inventing a reason. Behaves identically.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug)]
pub struct WriteScopeForTesting {
    _scope: WriteScope,
}

#[cfg(any(test, feature = "test-utils"))]
impl WriteScopeForTesting {
    /// Opens a testing write scope.
    pub fn new() -> Self {
        Self {
            _scope: WriteScope::new("for testing"),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for WriteScopeForTesting {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the current thread can write key-bound memory right now.
/// Diagnostic only; while isolation is disabled writability is governed by
/// ordinary page permissions and this reports `true`.
#[cfg(any(test, feature = "test-utils"))]
pub fn is_key_writable() -> bool {
    match isolation::untrusted_key() {
        Some(key) => rampart_pkey::thread_permission(key) == Permission::NoRestriction,
        None => true,
    }
}
