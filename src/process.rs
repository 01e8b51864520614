//! Thin process glue: CPU pinning and core-dump enabling. Neither is part of
//! the capture-classify-ratelimit-forward pipeline; both are best-effort.

use std::io;
use std::mem;

/// Pin the calling process to a single CPU via `sched_setaffinity`.
pub fn pin_to_cpu(cpu: usize) -> io::Result<()> {
    unsafe {
        let mut set: libc::cpu_set_t = mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        let rc = libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &set);
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Raise `RLIMIT_CORE` to unlimited so a crash leaves a core dump behind.
pub fn enable_core_dumps() -> io::Result<()> {
    unsafe {
        let limit = libc::rlimit {
            rlim_cur: libc::RLIM_INFINITY,
            rlim_max: libc::RLIM_INFINITY,
        };
        let rc = libc::setrlimit(libc::RLIMIT_CORE, &limit);
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
