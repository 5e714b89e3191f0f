use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide stop flag. Loops check it between units of work.
#[derive(Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Shutdown {
        Shutdown::default()
    }

    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            log::info!("Shutting down");
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Hooks SIGINT and SIGTERM.
    pub fn install_handler(&self) -> Result<(), ctrlc::Error> {
        let shutdown = self.clone();
        ctrlc::set_handler(move || shutdown.request())
    }
}
