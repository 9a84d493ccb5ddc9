//! A patch transport with no display behind it.

use std::sync::atomic::{AtomicU64, Ordering};

use mapcast_core::{MapcastError, PatchBatch, PatchTransport};

/// Logs every batch at `trace` and counts what went through.
#[derive(Debug, Default)]
pub struct LoggingTransport {
    batches: AtomicU64,
    patches: AtomicU64,
    bytes: AtomicU64,
}

impl LoggingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn patches(&self) -> u64 {
        self.patches.load(Ordering::Relaxed)
    }

    /// Payload bytes sent so far.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl PatchTransport for LoggingTransport {
    fn send_batch(&self, batch: &PatchBatch) -> Result<(), MapcastError> {
        let bytes: usize = batch.patches.iter().map(|p| p.payload.len()).sum();
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.patches.fetch_add(batch.len() as u64, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        tracing::trace!(target_id = batch.target_id, patches = batch.len(), bytes, "batch");
        Ok(())
    }

    fn clear_target(&self, target_id: u32) -> Result<(), MapcastError> {
        tracing::debug!(target_id, "clearing target");
        self.send_batch(&PatchBatch {
            target_id,
            patches: vec![mapcast_core::Patch::clear(target_id)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_batches() {
        let t = LoggingTransport::new();
        t.clear_target(3).unwrap();
        assert_eq!(t.batches(), 1);
        assert_eq!(t.patches(), 1);
        assert_eq!(t.bytes(), 128 * 128);
    }
}
