//! Process termination signals.
//!
//! Container hosts stop the worker with SIGTERM, terminals with SIGINT. Both
//! resolve [`ShutdownSignals::recv`], after which the caller cancels the
//! shared token and lets in-flight cycles drain.

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

pub struct ShutdownSignals {
    #[cfg(unix)]
    terminate: Signal,
}

impl ShutdownSignals {
    /// Registers the handlers. Signals raised after this returns are not lost,
    /// even if nothing is awaiting [`recv`](Self::recv) yet.
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Waits for the first termination signal and returns its name.
    pub async fn recv(&mut self) -> &'static str {
        #[cfg(unix)]
        {
            tokio::select! {
                Ok(()) = tokio::signal::ctrl_c() => "SIGINT",
                _ = self.terminate.recv() => "SIGTERM",
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            "Ctrl+C"
        }
    }
}
