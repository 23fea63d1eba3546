//! Signal forwarding to a running child sync

use ingest::{InterruptDelegate, Signal};
use log::{info, warn};

/// A child `dip-sync sync` process registered with the interrupt controller
pub struct ChildProcess {
    pid: u32,
    name: String,
}

impl ChildProcess {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }

    #[cfg(unix)]
    fn send(&self, signal: libc::c_int) {
        let Ok(pid) = libc::pid_t::try_from(self.pid) else {
            warn!("Cannot signal {}: pid {} out of range", self.name, self.pid);
            return;
        };

        // SAFETY: kill(2) has no memory-safety preconditions
        let rc = unsafe { libc::kill(pid, signal) };
        if rc != 0 {
            warn!(
                "Failed to signal {} (pid {}): {}",
                self.name,
                self.pid,
                std::io::Error::last_os_error()
            );
        }
    }
}

#[cfg(unix)]
impl InterruptDelegate for ChildProcess {
    fn interrupt(&self, signal: Signal) {
        info!("Forwarding {} signal to {} (pid {})", signal, self.name, self.pid);
        let raw = match signal {
            Signal::Interrupt => libc::SIGINT,
            Signal::Terminate => libc::SIGTERM,
        };
        self.send(raw);
    }

    fn kill(&self) {
        warn!("Killing {} (pid {})", self.name, self.pid);
        self.send(libc::SIGKILL);
    }
}

// Console Ctrl-C reaches every process attached to the console, so there is
// nothing to forward.
#[cfg(not(unix))]
impl InterruptDelegate for ChildProcess {
    fn interrupt(&self, signal: Signal) {
        info!("{} (pid {}) received {} from the console", self.name, self.pid, signal);
    }

    fn kill(&self) {
        warn!("Leaving {} (pid {}) to exit with the console", self.name, self.pid);
    }
}
