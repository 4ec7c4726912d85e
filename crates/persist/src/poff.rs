//! `poff.bin` — the append-only method offset index that turns
//! `parse_method(m)` memoization into an O(1) lookup into the graph
//! file, instead of a linear scan.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use ahash::AHashMap;

use crate::errors::PersistError;

pub const RECORD_SIZE: usize = 20;

/// One method's location inside `presult.bin`, keyed by its fully
/// interned identity (class name id, method name id, method's index
/// within its declaring dex).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetRecord {
    pub class_name_id: u32,
    pub method_name_id: u32,
    pub method_index: u32,
    pub start_offset: u32,
    pub length: u32,
}

impl OffsetRecord {
    fn to_bytes(self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.class_name_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.method_name_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.method_index.to_le_bytes());
        buf[12..16].copy_from_slice(&self.start_offset.to_le_bytes());
        buf[16..20].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8; RECORD_SIZE]) -> OffsetRecord {
        OffsetRecord {
            class_name_id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            method_name_id: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            method_index: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            start_offset: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            length: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MethodKey {
    class_name_id: u32,
    method_name_id: u32,
    method_index: u32,
}

/// In-memory view over `poff.bin`, loaded once at startup and appended
/// to as new methods are analyzed.
#[derive(Debug)]
pub struct OffsetIndex {
    by_key: AHashMap<MethodKey, OffsetRecord>,
    file: BufWriter<File>,
}

impl OffsetIndex {
    pub fn open(path: &Path) -> Result<OffsetIndex, PersistError> {
        let mut by_key = AHashMap::new();
        if path.exists() {
            let data = std::fs::read(path)?;
            if data.len() % RECORD_SIZE != 0 {
                return Err(PersistError::CorruptOffsetRecord((data.len() / RECORD_SIZE) as u64));
            }
            for (i, chunk) in data.chunks_exact(RECORD_SIZE).enumerate() {
                let buf: [u8; RECORD_SIZE] = chunk.try_into().map_err(|_| PersistError::CorruptOffsetRecord(i as u64))?;
                let record = OffsetRecord::from_bytes(&buf);
                by_key.insert(
                    MethodKey {
                        class_name_id: record.class_name_id,
                        method_name_id: record.method_name_id,
                        method_index: record.method_index,
                    },
                    record,
                );
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(OffsetIndex { by_key, file: BufWriter::new(file) })
    }

    /// Returns the already-memoized location of this method's graph
    /// record, if the current run (or a previous one) has analyzed it.
    pub fn lookup(&self, class_name_id: u32, method_name_id: u32, method_index: u32) -> Option<OffsetRecord> {
        self.by_key
            .get(&MethodKey { class_name_id, method_name_id, method_index })
            .copied()
    }

    pub fn append(&mut self, record: OffsetRecord) -> Result<(), PersistError> {
        self.file.write_all(&record.to_bytes())?;
        self.file.flush()?;
        self.by_key.insert(
            MethodKey {
                class_name_id: record.class_name_id,
                method_name_id: record.method_name_id,
                method_index: record.method_index,
            },
            record,
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_lookup_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("poff.bin");
        let mut index = OffsetIndex::open(&path).unwrap();

        let record = OffsetRecord { class_name_id: 1, method_name_id: 2, method_index: 3, start_offset: 100, length: 42 };
        index.append(record).unwrap();

        assert_eq!(index.lookup(1, 2, 3), Some(record));
        assert_eq!(index.lookup(1, 2, 4), None);
    }

    #[test]
    fn reopening_reloads_previous_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("poff.bin");
        {
            let mut index = OffsetIndex::open(&path).unwrap();
            index
                .append(OffsetRecord { class_name_id: 9, method_name_id: 9, method_index: 0, start_offset: 0, length: 10 })
                .unwrap();
        }
        let index = OffsetIndex::open(&path).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.lookup(9, 9, 0).is_some());
    }
}
