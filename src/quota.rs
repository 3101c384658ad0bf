//! Optional storage-quota observer on the ingestion path.
//!
//! Not part of ingestion correctness: when no cap is configured every upload
//! is admitted. The cap is over the total bytes of distinct stored files, so
//! deduplicated re-uploads are free.

#[derive(Debug, Clone, Copy, Default)]
pub struct StorageQuota {
    max_total_bytes: Option<u64>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct QuotaExceeded {
    pub current_bytes: u64,
    pub incoming_bytes: u64,
    pub max_total_bytes: u64,
}

impl StorageQuota {
    pub fn disabled() -> Self {
        Self {
            max_total_bytes: None,
        }
    }

    pub fn with_cap(max_total_bytes: u64) -> Self {
        Self {
            max_total_bytes: Some(max_total_bytes),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_total_bytes.is_some()
    }

    /// Admit or reject a new distinct file of `incoming_bytes` given
    /// `current_bytes` already stored.
    pub fn admit(&self, current_bytes: u64, incoming_bytes: u64) -> Result<(), QuotaExceeded> {
        match self.max_total_bytes {
            Some(max) if current_bytes.saturating_add(incoming_bytes) > max => Err(QuotaExceeded {
                current_bytes,
                incoming_bytes,
                max_total_bytes: max,
            }),
            _ => Ok(()),
        }
    }
}
