//! `strdict.bin` — the string-intern table shared by the offset index
//! and the graph file. Every distinct class descriptor or member name
//! seen across an analysis run is written once; everywhere else it is
//! referenced by a 4-byte id.
//!
//! On disk an entry is the string's bytes, a `0x00` terminator, then
//! its own starting offset as a 4-byte little-endian integer — the id
//! *is* the offset, so no separate index is needed to invert the file
//! back into a map on the next run.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use ahash::AHashMap;
use byteorder::{LittleEndian, WriteBytesExt};

use crate::errors::PersistError;

#[derive(Debug, Default)]
pub struct StringDict {
    by_id: AHashMap<u32, Vec<u8>>,
    by_bytes: AHashMap<Vec<u8>, u32>,
    file: Option<BufWriter<File>>,
    next_offset: u64,
}

impl StringDict {
    /// Opens (creating if absent) `path` for append, and loads whatever
    /// entries it already contains so interning is idempotent across
    /// runs.
    pub fn open(path: &Path) -> Result<StringDict, PersistError> {
        let mut dict = StringDict::default();

        if path.exists() {
            let data = std::fs::read(path)?;
            let mut pos = 0usize;
            while pos < data.len() {
                let start = pos;
                let term = data[pos..]
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(PersistError::CorruptStringDict(start as u64))?;
                let bytes = data[pos..pos + term].to_vec();
                pos += term + 1;
                if pos + 4 > data.len() {
                    return Err(PersistError::CorruptStringDict(start as u64));
                }
                let id = u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
                pos += 4;
                dict.by_bytes.insert(bytes.clone(), id);
                dict.by_id.insert(id, bytes);
            }
            dict.next_offset = pos as u64;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        dict.file = Some(BufWriter::new(file));
        Ok(dict)
    }

    /// Returns the existing id for `s`, or appends a new entry and
    /// returns its freshly assigned id (its offset in the file).
    pub fn intern(&mut self, s: &[u8]) -> Result<u32, PersistError> {
        if let Some(&id) = self.by_bytes.get(s) {
            return Ok(id);
        }
        let id = self.next_offset as u32;
        let writer = self.file.as_mut().expect("StringDict::open always sets file");
        writer.write_all(s)?;
        writer.write_all(&[0u8])?;
        writer.write_u32::<LittleEndian>(id)?;
        writer.flush()?;
        self.next_offset += s.len() as u64 + 1 + 4;

        self.by_bytes.insert(s.to_vec(), id);
        self.by_id.insert(id, s.to_vec());
        Ok(id)
    }

    pub fn resolve(&self, id: u32) -> Option<&[u8]> {
        self.by_id.get(&id).map(Vec::as_slice)
    }

    pub fn lookup(&self, s: &[u8]) -> Option<u32> {
        self.by_bytes.get(s).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn intern_is_idempotent_within_a_session() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("strdict.bin");
        let mut dict = StringDict::open(&path).unwrap();

        let a = dict.intern(b"Lcom/example/Foo;").unwrap();
        let b = dict.intern(b"Lcom/example/Foo;").unwrap();
        let c = dict.intern(b"Lcom/example/Bar;").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(dict.resolve(a), Some(&b"Lcom/example/Foo;"[..]));
    }

    #[test]
    fn reopening_reloads_previously_interned_strings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("strdict.bin");
        let id = {
            let mut dict = StringDict::open(&path).unwrap();
            dict.intern(b"onCreate").unwrap()
        };

        let dict = StringDict::open(&path).unwrap();
        assert_eq!(dict.lookup(b"onCreate"), Some(id));
        assert_eq!(dict.resolve(id), Some(&b"onCreate"[..]));
    }
}
