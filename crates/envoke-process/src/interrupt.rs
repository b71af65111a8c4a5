use tokio::sync::watch;

/// One-shot interruption signal shared between the orchestrator and every
/// in-flight command.
///
/// Cheap to clone; all clones observe the same flag. Once tripped it never
/// resets.
#[derive(Debug, Clone)]
pub struct Interrupt {
    tx: watch::Sender<bool>,
}

impl Interrupt {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Trip the signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal trips; immediately if it already has.
    pub async fn notified(&self) {
        let mut rx = self.tx.subscribe();
        if *rx.borrow_and_update() {
            return;
        }
        // The sender lives in self, so changed() cannot fail here.
        let _ = rx.changed().await;
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}
