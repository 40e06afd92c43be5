use std::sync::{atomic::AtomicBool, Arc};

use tokio::runtime::Runtime;
use tracing::instrument;

/// Owns the process's tokio runtime and a cooperative kill switch. Every
/// long-running loop (indexer poll, submitter worker, event bus dispatch)
/// takes a kill receiver and selects over it alongside its own work, so
/// `LifecycleManager::stop` can cancel every background task deterministically.
#[derive(Clone)]
pub struct AppContext {
    pub rt: Arc<Runtime>,
    killed: Arc<AtomicBool>,
    kill_sender: tokio::sync::broadcast::Sender<()>,
    // held so `kill_sender.send` never fails with "no receivers"
    _kill_receiver: Arc<tokio::sync::broadcast::Receiver<()>>,
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AppContext {
    pub fn new() -> Self {
        let rt = Arc::new(
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap(),
        );

        let (kill_sender, kill_receiver) = tokio::sync::broadcast::channel(1);

        Self {
            rt,
            kill_sender,
            _kill_receiver: Arc::new(kill_receiver),
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signals every running task holding a kill receiver to stop.
    #[instrument(level = "debug", skip(self), fields(subsys = "AppContext"))]
    pub fn get_kill_receiver(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.kill_sender.subscribe()
    }

    /// Typically only called from main or tests - gracefully kills the system.
    #[instrument(level = "debug", skip(self), fields(subsys = "AppContext"))]
    pub fn kill(&self) {
        self.killed.store(true, std::sync::atomic::Ordering::SeqCst);
        self.kill_sender.send(()).unwrap();
    }

    pub fn killed(&self) -> bool {
        self.killed.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {
    #[test]
    fn kill_switch_drop_fails() {
        let sender = {
            let (sender, _) = tokio::sync::broadcast::channel::<&'static str>(1);
            sender
        };

        sender.send("hello").unwrap_err();
    }

    #[test]
    fn kill_switch_hold_succeeds() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (sender, mut receiver) = tokio::sync::broadcast::channel::<&'static str>(1);

        sender.send("hello").unwrap();

        runtime.block_on(async move {
            let msg = receiver.recv().await;

            assert_eq!("hello", msg.unwrap());
        });
    }
}
