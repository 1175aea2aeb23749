use tokio::sync::watch;

/// Readiness signal from the inbound-message pipeline.
///
/// Key rotation must not run while inbound messages are still being
/// processed, since unresolved session state could be negotiating against the
/// keys about to be replaced. The pipeline reports work via
/// `task_started`/`task_finished`; the engine awaits `drained`.
pub struct ProcessingGate {
    pending: watch::Sender<usize>,
}

impl ProcessingGate {
    pub fn new() -> Self {
        let (pending, _) = watch::channel(0);
        Self { pending }
    }

    pub fn task_started(&self) {
        self.pending.send_modify(|count| *count += 1);
    }

    pub fn task_finished(&self) {
        self.pending
            .send_modify(|count| *count = count.saturating_sub(1));
    }

    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Resolves once no pipeline work is pending. Resolves immediately when
    /// the pipeline is already idle. Cancel-safe: dropping the future has no
    /// effect on the gate.
    pub async fn drained(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives in self, so the channel cannot close mid-wait.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for ProcessingGate {
    fn default() -> Self {
        Self::new()
    }
}
