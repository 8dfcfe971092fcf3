use std::time::Duration;

#[derive(Debug, Clone, Copy)]
/// Fixed minimum delay between ledger confirmation and the first verification
/// attempt. The verification service reads from an explorer index that lags
/// the chain head; submitting immediately after confirmation is rejected with
/// "unable to locate contract".
pub struct IndexingGate {
    delay_ms: u64,
}

impl IndexingGate {
    /// The original pipeline slept 40 seconds between deployment and
    /// verification; kept as the default policy.
    pub const DEFAULT_DELAY_MS: u64 = 40_000;

    pub fn new(delay_ms: u64) -> Self {
        Self { delay_ms }
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    /// Pure wait: no retry, no failure mode. A zero-delay gate is a no-op,
    /// which is also how targets without verification configured behave.
    pub async fn await_indexing(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
    }
}

impl Default for IndexingGate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY_MS)
    }
}
