//! WatermarkStore port - 処理済み境界の時刻

use crate::domain::{StoreError, Timestamp};

/// WatermarkStore は単調非減少の時刻を 1 つだけ保持する
pub trait WatermarkStore: Send + Sync {
    /// Current durable value, `None` if never committed.
    fn load(&self) -> Result<Option<Timestamp>, StoreError>;

    /// Durably replace the value.
    ///
    /// A value older than the stored one is rejected as a no-op and
    /// `Ok(false)` is returned; the stored value is never lowered.
    fn commit(&mut self, value: Timestamp) -> Result<bool, StoreError>;
}
