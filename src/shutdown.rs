//! Termination signals turned into a reactor wakeup.
//!
//! ## Signals
//! `SIGINT`, `SIGHUP` and `SIGTERM` are handled unless the process inherited
//! them as ignored, so a supervisor that wants a signal ignored keeps it that way.
//!
//! ## Handler
//! The handler does one async-signal-safe thing: it writes a byte to the
//! wakeup pipe. No logging, no allocation, no shared-state mutation. Before
//! the pipe is armed there is no reactor to wake, so the handler ends the
//! process on the spot. It reinstalls itself after each delivery.
//!
//! ## Bridge
//! A `shutdown-bridge` thread blocks on the read end and forwards each byte to
//! the reactor's [`ShutdownSignal`], which is safe to activate from any thread.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use libc::c_int;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::FromRawFd;
use std::sync::atomic::{AtomicI32, Ordering};
use std::{mem, ptr, thread};

use crate::error::ShutdownError;

/// Activation primitive the reactor waits on.
pub type ShutdownSignal = Signal<CriticalSectionRawMutex, ()>;

pub const SHUTDOWN_SIGNALS: [c_int; 3] = [libc::SIGINT, libc::SIGHUP, libc::SIGTERM];

/// Write end of the wakeup pipe, or -1 while unarmed.
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn handle_signal(signum: c_int) {
    let fd = WAKE_FD.load(Ordering::SeqCst);
    if fd < 0 {
        // SAFETY: _exit is async-signal-safe.
        unsafe { libc::_exit(0) };
    }
    // SAFETY: errno is thread-local; the interrupted code must see its own value again.
    let saved_errno = unsafe { *libc::__errno_location() };
    activate(fd);

    let action = handler_action();
    // SAFETY: sigaction is async-signal-safe; `action` is fully initialized.
    unsafe {
        libc::sigaction(signum, &action, ptr::null_mut());
        *libc::__errno_location() = saved_errno;
    }
}

fn activate(fd: c_int) {
    let byte = 1u8;
    // SAFETY: one-byte write from a valid stack buffer. A full pipe already
    // holds a pending wakeup, so a failed non-blocking write loses nothing.
    unsafe { libc::write(fd, ptr::from_ref(&byte).cast(), 1) };
}

fn handler_action() -> libc::sigaction {
    // SAFETY: all-zero is a valid sigaction; the mask is then initialized.
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = handle_signal as extern "C" fn(c_int) as libc::sighandler_t;
    action.sa_flags = libc::SA_RESTART;
    unsafe { libc::sigemptyset(&mut action.sa_mask) };
    action
}

fn disposition(signal: c_int) -> Result<libc::sighandler_t, ShutdownError> {
    // SAFETY: querying only; `old` is written by the kernel.
    let mut old: libc::sigaction = unsafe { mem::zeroed() };
    if unsafe { libc::sigaction(signal, ptr::null(), &mut old) } != 0 {
        return Err(ShutdownError::Query {
            signal,
            source: io::Error::last_os_error(),
        });
    }
    Ok(old.sa_sigaction)
}

/// Installs the handler for `signal` unless it is currently ignored.
///
/// Returns whether the handler was installed.
fn install_handler(signal: c_int) -> Result<bool, ShutdownError> {
    if disposition(signal)? == libc::SIG_IGN {
        return Ok(false);
    }
    let action = handler_action();
    // SAFETY: `action` is fully initialized and the handler is async-signal-safe.
    if unsafe { libc::sigaction(signal, &action, ptr::null_mut()) } != 0 {
        return Err(ShutdownError::Install {
            signal,
            source: io::Error::last_os_error(),
        });
    }
    Ok(true)
}

/// Installs handlers for the termination signals. Call early in `main`, before any other thread exists.
pub fn install_handlers() -> Result<(), ShutdownError> {
    for signal in SHUTDOWN_SIGNALS {
        if !install_handler(signal)? {
            log::info!("Signal {} is ignored by the parent, leaving it alone", signal);
        }
    }
    Ok(())
}

/// Requests shutdown through the same path a termination signal takes.
#[cfg(test)]
fn trigger() {
    let fd = WAKE_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        activate(fd);
    }
}

/// Creates the wakeup pipe and the bridge thread feeding `signal`.
///
/// From here on a termination signal requests an orderly shutdown instead of
/// ending the process. Can be armed once per process.
pub fn arm(signal: &'static ShutdownSignal) -> Result<(), ShutdownError> {
    let mut fds: [c_int; 2] = [-1; 2];
    // SAFETY: `fds` has room for both descriptors.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(ShutdownError::Pipe(io::Error::last_os_error()));
    }
    let [read_fd, write_fd] = fds;
    // SAFETY: both descriptors were just created and are owned here.
    unsafe {
        libc::fcntl(read_fd, libc::F_SETFD, libc::FD_CLOEXEC);
        libc::fcntl(write_fd, libc::F_SETFD, libc::FD_CLOEXEC);
        libc::fcntl(write_fd, libc::F_SETFL, libc::O_NONBLOCK);
    }
    // SAFETY: the read end is owned by the bridge from here on.
    let reader = unsafe { File::from_raw_fd(read_fd) };

    if WAKE_FD.compare_exchange(-1, write_fd, Ordering::SeqCst, Ordering::SeqCst).is_err() {
        // SAFETY: the write end was never published.
        unsafe { libc::close(write_fd) };
        return Err(ShutdownError::AlreadyArmed);
    }

    let spawned = thread::Builder::new()
        .name("shutdown-bridge".to_string())
        .spawn(move || forward_wakeups(reader, signal));
    if let Err(e) = spawned {
        WAKE_FD.store(-1, Ordering::SeqCst);
        // SAFETY: unpublished again, nothing else writes to it.
        unsafe { libc::close(write_fd) };
        return Err(ShutdownError::Thread(e));
    }

    Ok(())
}

fn forward_wakeups(mut reader: File, signal: &'static ShutdownSignal) {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                log::info!("Shutdown requested");
                signal.signal(());
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::error!("Shutdown bridge read failed: {}", e);
                break;
            }
        }
    }
}
