// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Tests for rampart-pkey

use crate::ProtectionKey;

#[test]
fn test_key_raw_round_trip() {
    let key = ProtectionKey::from_raw(3);

    assert_eq!(key.raw(), 3);
    assert_eq!(ProtectionKey::from_raw(key.raw()), key);
}

#[test]
fn test_is_supported_is_idempotent() {
    let first = crate::is_supported();

    assert_eq!(crate::is_supported(), first);
    assert_eq!(crate::is_supported(), first);
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod linux_x86_64 {
    use serial_test::serial;

    use crate::{KeyError, PageProtection, Permission};

    /// Runs an ignored test as a subprocess and returns its exit code.
    fn run_test_as_subprocess(test_name: &str) -> Option<i32> {
        let exe = std::env::current_exe().expect("Failed to current_exe()");
        let status = std::process::Command::new(exe)
            .args([
                "--exact",
                test_name,
                "--ignored",
                "--test-threads=1",
                "--nocapture",
            ])
            .status()
            .expect("Failed to run subprocess");

        status.code()
    }

    /// Check if seccomp works here; false under QEMU or locked-down kernels.
    fn is_seccomp_available() -> bool {
        use libseccomp::{ScmpAction, ScmpFilterContext};

        match unsafe { libc::fork() } {
            -1 => {
                eprintln!("Failed to fork for seccomp check");
                false
            }
            0 => {
                let result =
                    ScmpFilterContext::new(ScmpAction::Allow).and_then(|filter| filter.load());

                std::process::exit(if result.is_ok() { 0 } else { 1 });
            }
            child_pid => {
                let mut status: libc::c_int = 0;
                unsafe {
                    libc::waitpid(child_pid, &mut status, 0);
                }

                libc::WIFEXITED(status) && libc::WEXITSTATUS(status) == 0
            }
        }
    }

    // =========================================================================
    // alloc_key() / set_thread_permission() / thread_permission()
    // =========================================================================

    #[test]
    #[serial(pkey)]
    fn test_alloc_toggle_and_free() {
        if !crate::is_supported() {
            eprintln!("skipping: no protection key support");
            return;
        }

        let key = crate::alloc_key().expect("Failed to alloc_key()");

        // Key 0 is the process default key; allocations start above it.
        assert!(key.raw() > 0);

        // Fresh keys come up write-disabled.
        assert_eq!(crate::thread_permission(key), Permission::DisableWrite);

        crate::set_thread_permission(key, Permission::NoRestriction);
        assert_eq!(crate::thread_permission(key), Permission::NoRestriction);

        crate::set_thread_permission(key, Permission::DisableWrite);
        assert_eq!(crate::thread_permission(key), Permission::DisableWrite);

        crate::free_key(key);
    }

    #[test]
    #[serial(pkey)]
    fn test_toggle_is_thread_local() {
        use std::sync::mpsc;

        if !crate::is_supported() {
            eprintln!("skipping: no protection key support");
            return;
        }

        let key = crate::alloc_key().expect("Failed to alloc_key()");

        let (ready_tx, ready_rx) = mpsc::channel();
        let (go_tx, go_rx) = mpsc::channel();

        // Spawned before the toggle below, so it inherits DisableWrite.
        let handle = std::thread::spawn(move || {
            ready_tx.send(()).expect("Failed to send()");
            go_rx.recv().expect("Failed to recv()");

            crate::thread_permission(key)
        });

        ready_rx.recv().expect("Failed to recv()");
        crate::set_thread_permission(key, Permission::NoRestriction);
        go_tx.send(()).expect("Failed to send()");

        let other_thread = handle.join().expect("Failed to join()");

        assert_eq!(other_thread, Permission::DisableWrite);
        assert_eq!(crate::thread_permission(key), Permission::NoRestriction);

        crate::set_thread_permission(key, Permission::DisableWrite);
        crate::free_key(key);
    }

    // =========================================================================
    // bind_region()
    // =========================================================================

    #[test]
    #[serial(pkey)]
    fn test_bind_region_and_write() {
        if !crate::is_supported() {
            eprintln!("skipping: no protection key support");
            return;
        }

        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                page_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert_ne!(ptr, libc::MAP_FAILED, "Failed to mmap()");
        let ptr = ptr as *mut u8;

        let key = crate::alloc_key().expect("Failed to alloc_key()");

        unsafe { crate::bind_region(ptr, page_size, PageProtection::ReadWrite, key) }
            .expect("Failed to bind_region()");

        // Writable while the key permits it.
        crate::set_thread_permission(key, Permission::NoRestriction);
        unsafe {
            ptr.write(0xAB);
            assert_eq!(ptr.read(), 0xAB);
        }

        crate::set_thread_permission(key, Permission::DisableWrite);
        // Reads stay honored under DisableWrite.
        assert_eq!(unsafe { ptr.read() }, 0xAB);

        crate::set_thread_permission(key, Permission::NoRestriction);
        unsafe { libc::munmap(ptr as *mut _, page_size) };
        crate::free_key(key);
    }

    #[test]
    #[serial(pkey)]
    fn test_bind_region_fails_on_unmapped_range() {
        if !crate::is_supported() {
            eprintln!("skipping: no protection key support");
            return;
        }

        let key = crate::alloc_key().expect("Failed to alloc_key()");
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;

        // Page 0 is never mapped.
        let result =
            unsafe { crate::bind_region(core::ptr::null_mut(), page_size, PageProtection::Read, key) };

        assert!(matches!(result, Err(KeyError::Bind)));

        crate::free_key(key);
    }

    // =========================================================================
    // Probe under seccomp
    // =========================================================================

    #[test]
    #[ignore]
    fn subprocess_test_probe_fails_when_pkey_alloc_blocked() {
        use libseccomp::{ScmpAction, ScmpFilterContext, ScmpSyscall};

        let mut filter =
            ScmpFilterContext::new(ScmpAction::Allow).expect("Failed to create filter");
        filter
            .add_rule(
                ScmpAction::Errno(libc::EPERM),
                ScmpSyscall::from_name("pkey_alloc").expect("Failed to from_name(..)"),
            )
            .expect("Failed to add rule");
        filter.load().expect("Failed to load filter");

        assert!(!crate::is_supported());
        assert!(matches!(crate::alloc_key(), Err(KeyError::Unsupported)));

        std::process::exit(0);
    }

    #[test]
    #[serial(pkey)]
    fn test_probe_fails_when_pkey_alloc_blocked() {
        if !is_seccomp_available() {
            eprintln!("skipping: seccomp unavailable");
            return;
        }

        let exit_code = run_test_as_subprocess(
            "tests::linux_x86_64::subprocess_test_probe_fails_when_pkey_alloc_blocked",
        );

        assert_eq!(exit_code, Some(0), "Subprocess should exit with 0");
    }
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
mod other_platforms {
    use crate::{KeyError, Permission, ProtectionKey};

    #[test]
    fn test_surface_is_inert() {
        assert!(!crate::is_supported());
        assert!(matches!(crate::alloc_key(), Err(KeyError::Unsupported)));

        let key = ProtectionKey::from_raw(1);

        crate::set_thread_permission(key, Permission::DisableWrite);
        assert_eq!(crate::thread_permission(key), Permission::NoRestriction);
    }
}
