use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::error::StoreError;
use super::types::RawPing;

/// Append-only record of every accepted ping.
pub trait PingHistory: Send + Sync {
    /// Durably record `ping`. Either the whole record is committed or an
    /// error is returned.
    fn append(&self, ping: &RawPing) -> Result<(), StoreError>;

    /// Most recent pings for a vehicle by capture time, newest first.
    fn recent(&self, vehicle_id: &str, limit: usize) -> Result<Vec<RawPing>, StoreError>;

    /// The newest ping by capture time for every vehicle with history.
    fn latest_per_vehicle(&self) -> Result<Vec<RawPing>, StoreError>;
}

fn newest_first(mut pings: Vec<RawPing>, limit: usize) -> Vec<RawPing> {
    pings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    pings.truncate(limit);
    pings
}

#[derive(Default)]
struct NewestPerVehicle(HashMap<String, RawPing>);

impl NewestPerVehicle {
    fn offer(&mut self, ping: RawPing) {
        match self.0.get(&ping.vehicle_id) {
            Some(current) if current.timestamp >= ping.timestamp => {}
            _ => {
                self.0.insert(ping.vehicle_id.clone(), ping);
            }
        }
    }

    fn into_sorted(self) -> Vec<RawPing> {
        let mut pings: Vec<RawPing> = self.0.into_values().collect();
        pings.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
        pings
    }
}

#[derive(Debug, Default)]
pub struct MemoryHistory {
    pings: Mutex<Vec<RawPing>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pings.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PingHistory for MemoryHistory {
    fn append(&self, ping: &RawPing) -> Result<(), StoreError> {
        self.pings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ping.clone());
        Ok(())
    }

    fn recent(&self, vehicle_id: &str, limit: usize) -> Result<Vec<RawPing>, StoreError> {
        let pings = self.pings.lock().unwrap_or_else(PoisonError::into_inner);
        let matching = pings
            .iter()
            .filter(|p| p.vehicle_id == vehicle_id)
            .cloned()
            .collect();
        Ok(newest_first(matching, limit))
    }

    fn latest_per_vehicle(&self) -> Result<Vec<RawPing>, StoreError> {
        let pings = self.pings.lock().unwrap_or_else(PoisonError::into_inner);
        let mut newest = NewestPerVehicle::default();
        for ping in pings.iter() {
            newest.offer(ping.clone());
        }
        Ok(newest.into_sorted())
    }
}

/// History stored as one JSON object per line.
pub struct JsonlHistory {
    path: PathBuf,
    tail: Mutex<Tail>,
}

struct Tail {
    file: File,
    /// The file is empty or its last byte is a newline.
    ends_cleanly: bool,
}

impl JsonlHistory {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let ends_cleanly = ends_with_newline(&mut file)?;
        if !ends_cleanly {
            log::warn!(
                "Ping history {} ends with a partial record; it will be skipped",
                path.display()
            );
        }
        log::info!("Recording ping history to {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            tail: Mutex::new(Tail { file, ends_cleanly }),
        })
    }

    /// Calls `visit` with every readable record, in file order.
    fn scan(&self, mut visit: impl FnMut(RawPing)) -> Result<(), StoreError> {
        let reader = BufReader::new(File::open(&self.path)?);

        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawPing>(&line) {
                Ok(ping) => visit(ping),
                Err(e) => {
                    log::error!(
                        "Skipping corrupt history line {} in {}: {}",
                        number + 1,
                        self.path.display(),
                        e
                    );
                }
            }
        }
        Ok(())
    }
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

impl PingHistory for JsonlHistory {
    fn append(&self, ping: &RawPing) -> Result<(), StoreError> {
        let line = serde_json::to_vec(ping)?;

        let mut tail = self.tail.lock().unwrap_or_else(PoisonError::into_inner);
        let mut record = Vec::with_capacity(line.len() + 2);
        if !tail.ends_cleanly {
            // Terminate the partial record so this one starts on its own line
            record.push(b'\n');
        }
        record.extend_from_slice(&line);
        record.push(b'\n');

        let committed_len = tail.file.metadata()?.len();
        let written = tail
            .file
            .write_all(&record)
            .and_then(|()| tail.file.sync_data());

        match written {
            Ok(()) => {
                tail.ends_cleanly = true;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tail.file.set_len(committed_len) {
                    log::error!(
                        "Failed to roll back partial write to {}: {}",
                        self.path.display(),
                        rollback
                    );
                    tail.ends_cleanly = false;
                }
                Err(e.into())
            }
        }
    }

    fn recent(&self, vehicle_id: &str, limit: usize) -> Result<Vec<RawPing>, StoreError> {
        let mut matching = Vec::new();
        self.scan(|ping| {
            if ping.vehicle_id == vehicle_id {
                matching.push(ping);
            }
        })?;
        Ok(newest_first(matching, limit))
    }

    fn latest_per_vehicle(&self) -> Result<Vec<RawPing>, StoreError> {
        let mut newest = NewestPerVehicle::default();
        self.scan(|ping| newest.offer(ping))?;
        Ok(newest.into_sorted())
    }
}
