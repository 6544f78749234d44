use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;

use med_core::Medication;

/// Durable home of the medication list. The whole list is written on every
/// mutation.
pub trait MedicationRepository: Send + Sync {
    fn load_all(&self) -> Result<Vec<Medication>>;
    fn save_all(&self, medications: &[Medication]) -> Result<()>;
}

/// Stores the list as a JSON array in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "medications.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl MedicationRepository for JsonFileStore {
    fn load_all(&self) -> Result<Vec<Medication>> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "no medication file yet");
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let medications: Vec<Medication> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(medications)
    }

    fn save_all(&self, medications: &[Medication]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let payload = serde_json::to_string_pretty(medications)?;
        let staging = self.staging_path();
        fs::write(&staging, payload)
            .with_context(|| format!("writing {}", staging.display()))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

/// Keeps the list in memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    medications: Mutex<Vec<Medication>>,
}

impl MemoryStore {
    pub fn new(initial: Vec<Medication>) -> Self {
        Self {
            medications: Mutex::new(initial),
        }
    }
}

impl MedicationRepository for MemoryStore {
    fn load_all(&self) -> Result<Vec<Medication>> {
        Ok(self.medications.lock().clone())
    }

    fn save_all(&self, medications: &[Medication]) -> Result<()> {
        *self.medications.lock() = medications.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_as_empty() {
        let temp = tempdir().expect("tempdir");
        let store = JsonFileStore::new(temp.path().join("meds.json"));
        assert!(store.load_all().expect("load").is_empty());
    }

    #[test]
    fn saves_and_reloads_with_wire_field_names() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("meds.json");
        let store = JsonFileStore::new(&path);
        let meds = vec![
            Medication::new("Aspirin").with_times(["08:00"]).everyday(),
            Medication::new("Antibiotic")
                .with_times(["07:00"])
                .on_dates(["2030-02-01"])
                .with_script("2030-02-10", "10:00"),
        ];
        store.save_all(&meds).expect("save");

        let raw = fs::read_to_string(&path).expect("read back");
        assert!(raw.contains("\"specificDates\""));
        assert!(raw.contains("\"scriptTime\": \"10:00\""));
        assert!(!store.staging_path().exists());

        assert_eq!(store.load_all().expect("reload"), meds);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("meds.json");
        fs::write(&path, "{ not json").expect("write");
        let err = JsonFileStore::new(&path).load_all().unwrap_err();
        assert!(err.to_string().contains("parsing"));
    }
}
