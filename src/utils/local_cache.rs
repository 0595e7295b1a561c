use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File name doubles as the storage key, matching the landing page's
/// original local slot.
const TOTAL_KEY: &str = "totalDonated";

/// Last-known donation total, kept as a decimal string in a single file.
/// This is a best-effort snapshot, not the authority: it is read at startup
/// and on remote failure, and written only on the local-only fallback path.
pub struct LocalCache {
    path: PathBuf,
}

impl LocalCache {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(TOTAL_KEY),
        }
    }

    /// Returns the cached total, or 0 when the slot is missing or unreadable.
    pub fn load_total(&self) -> f64 {
        match fs::read_to_string(&self.path) {
            Ok(raw) => match raw.trim().parse::<f64>() {
                Ok(total) => total,
                Err(_) => {
                    tracing::warn!("local cache holds a non-numeric total: {:?}", raw.trim());
                    0.0
                }
            },
            Err(_) => 0.0,
        }
    }

    pub fn save_total(&self, total: f64) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, total.to_string())?;
        Ok(())
    }

    /// Local-only fallback: add `amount` on top of the last-known total and
    /// persist the sum. Returns the new local total.
    pub fn add_to_total(&self, amount: f64) -> Result<f64> {
        let new_total = self.load_total() + amount;
        self.save_total(new_total)?;
        Ok(new_total)
    }
}
