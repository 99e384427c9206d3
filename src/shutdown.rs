//! Two-stage interrupt handling
//!
//! The first interrupt asks for a warm shutdown: in-flight work finishes and
//! the run stops at the next stage boundary. A second interrupt escalates to a
//! cold shutdown: persist what has been gathered and stop immediately.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStage {
    Running,
    WarmRequested,
    Cold,
}

impl ShutdownStage {
    /// Stage reached after one more interrupt
    pub fn next(self) -> Self {
        match self {
            ShutdownStage::Running => ShutdownStage::WarmRequested,
            ShutdownStage::WarmRequested | ShutdownStage::Cold => ShutdownStage::Cold,
        }
    }
}

/// Owner of the shutdown state machine for one run
#[derive(Debug)]
pub struct ShutdownController {
    stage: watch::Sender<ShutdownStage>,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        let (stage, _) = watch::channel(ShutdownStage::Running);
        Self { stage }
    }

    pub fn stage(&self) -> ShutdownStage {
        *self.stage.borrow()
    }

    /// True once any interrupt has arrived
    pub fn stop_requested(&self) -> bool {
        self.stage() != ShutdownStage::Running
    }

    /// Feed one interrupt into the state machine and return the new stage
    pub fn interrupt(&self) -> ShutdownStage {
        let mut reached = ShutdownStage::Running;
        self.stage.send_modify(|stage| {
            *stage = stage.next();
            reached = *stage;
        });

        match reached {
            ShutdownStage::WarmRequested => {
                warn!("[-] Press Ctrl+C again for a cold shutdown.")
            }
            ShutdownStage::Cold => warn!("[-] Cold shut down"),
            ShutdownStage::Running => {}
        }
        reached
    }

    /// Resolves once the run has gone cold
    pub async fn cold(&self) {
        let mut rx = self.stage.subscribe();
        let _ = rx.wait_for(|stage| *stage == ShutdownStage::Cold).await;
    }

    /// Map process interrupt signals onto [`ShutdownController::interrupt`]
    ///
    /// The listener exits after the cold transition.
    pub fn listen_for_signals(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let mut signals = match Signals::new() {
                Ok(signals) => signals,
                Err(e) => {
                    error!("Cannot install signal handlers: {}", e);
                    return;
                }
            };

            loop {
                let name = signals.recv().await;
                debug!("Got signal {}", name);
                if controller.interrupt() == ShutdownStage::Cold {
                    return;
                }
            }
        })
    }
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn new() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl+C"
    }
}
