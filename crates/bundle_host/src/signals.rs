//! Process signals the host reacts to.
//!
//! SIGINT and SIGTERM stop the host, SIGHUP reloads every module. Other
//! platforms only get Ctrl+C.

use std::fmt;
use tracing::info;

/// What the host was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    Shutdown(&'static str),
    Reload,
}

impl fmt::Display for HostSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostSignal::Shutdown(name) => write!(f, "shutdown ({name})"),
            HostSignal::Reload => f.write_str("reload (SIGHUP)"),
        }
    }
}

/// Listeners are installed once and then polled from the host loop.
pub struct SignalListener {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
}

impl SignalListener {
    #[cfg(unix)]
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Waits for the next signal the host cares about.
    #[cfg(unix)]
    pub async fn next(&mut self) -> HostSignal {
        let signal = tokio::select! {
            _ = self.interrupt.recv() => HostSignal::Shutdown("SIGINT"),
            _ = self.terminate.recv() => HostSignal::Shutdown("SIGTERM"),
            _ = self.hangup.recv() => HostSignal::Reload,
        };
        info!("📡 Received {}", signal);
        signal
    }

    #[cfg(not(unix))]
    pub async fn next(&mut self) -> HostSignal {
        let signal = match tokio::signal::ctrl_c().await {
            Ok(()) => HostSignal::Shutdown("Ctrl+C"),
            Err(_) => HostSignal::Shutdown("signal listener failure"),
        };
        info!("📡 Received {}", signal);
        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_display() {
        assert_eq!(HostSignal::Shutdown("SIGTERM").to_string(), "shutdown (SIGTERM)");
        assert_eq!(HostSignal::Reload.to_string(), "reload (SIGHUP)");
    }

    #[tokio::test]
    async fn test_install_listeners() {
        assert!(SignalListener::install().is_ok());
    }
}
