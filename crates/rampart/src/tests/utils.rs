// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Test utilities for rampart.

/// Runs an ignored test as a subprocess and returns its exit code.
pub fn run_test_as_subprocess(test_name: &str) -> Option<i32> {
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
pub fn is_seccomp_available() -> bool {
    use libseccomp::{ScmpAction, ScmpFilterContext};

    match unsafe { libc::fork() } {
        -1 => {
            eprintln!("Failed to fork for seccomp check");
            false
        }
        0 => {
            let result = ScmpFilterContext::new(ScmpAction::Allow).and_then(|filter| filter.load());

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

fn block_syscall(name: &str) {
    use libseccomp::{ScmpAction, ScmpFilterContext, ScmpSyscall};

    let mut filter = ScmpFilterContext::new(ScmpAction::Allow).expect("Failed to create filter");
    filter
        .add_rule(
            ScmpAction::Errno(libc::EPERM),
            ScmpSyscall::from_name(name).expect("Failed to from_name(..)"),
        )
        .expect("Failed to add rule");
    filter.load().expect("Failed to load seccomp filter");
}

/// Blocks the pkey_alloc syscall for this process via seccomp.
pub fn block_pkey_alloc() {
    block_syscall("pkey_alloc");
}

/// Blocks the pkey_mprotect syscall for this process via seccomp.
pub fn block_pkey_mprotect() {
    block_syscall("pkey_mprotect");
}
