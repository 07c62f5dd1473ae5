//! Checkpoint module
//!
//! Optional JSON persistence of a solved (or partially solved) schedule:
//! the slot map plus the locked mandatory set. Loading rebuilds the derived
//! worker index and refuses checkpoints whose locked pairs are not present
//! in the slot map, so a round trip cannot smuggle in a broken invariant.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::domain::entities::Schedule;

pub struct Checkpoint;

impl Checkpoint {
    pub fn new() -> Self {
        Self
    }

    /// Writes the schedule (including its locked mandatory set) to disk
    ///
    /// # Arguments
    ///
    /// * `schedule` - The schedule to persist
    /// * `path` - Destination file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written
    pub fn save<P: AsRef<Path>>(&self, schedule: &Schedule, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(schedule)
            .context("Failed to serialize schedule checkpoint")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write checkpoint {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Reads a checkpoint back, rebuilding the worker index and verifying
    /// coherence and mandatory presence
    ///
    /// # Arguments
    ///
    /// * `path` - Checkpoint file to read
    ///
    /// # Returns
    ///
    /// The restored schedule with its derived index rebuilt
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the JSON is malformed,
    /// or a locked mandatory pair is missing from the slot map
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Schedule> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read checkpoint {:?}", path.as_ref()))?;
        self.load_str(&content)
    }

    pub fn load_str(&self, content: &str) -> Result<Schedule> {
        let mut schedule: Schedule =
            serde_json::from_str(content).context("Failed to parse checkpoint JSON")?;
        schedule.rebuild_index();
        if !schedule.is_coherent() {
            bail!("checkpoint slot map and worker index disagree");
        }
        if !schedule.locked_all_present() {
            bail!("checkpoint is missing a locked mandatory assignment");
        }
        Ok(schedule)
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    #[test]
    fn test_roundtrip_preserves_state() {
        let mut schedule = Schedule::new(date(1), date(10), 2);
        schedule.assign("A", date(3), 0);
        schedule.assign("B", date(3), 1);
        schedule.assign("A", date(7), 1);
        schedule.lock_mandatory("A", date(3));

        let json = serde_json::to_string_pretty(&schedule).unwrap();
        let restored = Checkpoint::new().load_str(&json).unwrap();

        assert!(restored.is_coherent());
        assert_eq!(restored.count("A"), 2);
        assert_eq!(restored.worker_at(date(3), 1), Some("B"));
        assert!(restored.is_locked("A", date(3)));
        assert!(restored.locked_all_present());
    }

    #[test]
    fn test_rejects_checkpoint_with_missing_locked_assignment() {
        let mut schedule = Schedule::new(date(1), date(10), 1);
        schedule.assign("A", date(3), 0);
        schedule.lock_mandatory("A", date(3));
        let mut broken = serde_json::to_value(&schedule).unwrap();
        // Drop the slot but keep the lock
        broken["slots"]["2026-01-03"][0] = serde_json::Value::Null;

        let result = Checkpoint::new().load_str(&broken.to_string());
        assert!(result.is_err());
    }
}
