//! `presult.bin` / `presult.txt` — the per-method graph dump.
//!
//! This module knows nothing about [`ObjectAccess`]/[`MethodAccess`] —
//! those types live in the analyzer crate, which would create a
//! dependency cycle if this crate imported them. Instead the analyzer
//! flattens a method's indexed graph into [MethodGraph] before calling
//! [GraphStore::write_method], and rebuilds its own node type from the
//! [MethodGraph] returned by [GraphStore::read_method].
//!
//! The binary and text forms are written in the same call so they can
//! never drift apart.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::errors::PersistError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphHeader {
    pub class_id: u32,
    pub method_id: u32,
    pub method_index: u32,
    pub global_class_count: u32,
    pub arg_count: u32,
    pub total_node_count: u32,
}

/// One field slot of a node: the canonical child (`-1` if the field
/// was never observed), whether any path reached the instruction with
/// this field unobserved, and the full track set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldSlot {
    pub child: i64,
    pub null_branch: bool,
    pub track_members: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub idx: i64,
    pub all_flag: bool,
    pub in_array: bool,
    pub field_slots: Vec<FieldSlot>,
    /// `-1` unless this node is a `global_classes` root.
    pub global_class_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodGraph {
    pub header: GraphHeader,
    pub nodes: Vec<NodeRecord>,
}

impl MethodGraph {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.header.class_id.to_le_bytes());
        buf.extend_from_slice(&self.header.method_id.to_le_bytes());
        buf.extend_from_slice(&self.header.method_index.to_le_bytes());
        buf.extend_from_slice(&self.header.global_class_count.to_le_bytes());
        buf.extend_from_slice(&self.header.arg_count.to_le_bytes());
        buf.extend_from_slice(&self.header.total_node_count.to_le_bytes());

        for node in &self.nodes {
            buf.extend_from_slice(&node.idx.to_le_bytes());
            buf.push(node.all_flag as u8);
            buf.push(node.in_array as u8);
            buf.extend_from_slice(&(node.field_slots.len() as u32).to_le_bytes());
            for slot in &node.field_slots {
                buf.push(slot.null_branch as u8);
            }
            for slot in &node.field_slots {
                buf.extend_from_slice(&slot.child.to_le_bytes());
            }
            for slot in &node.field_slots {
                buf.extend_from_slice(&(slot.track_members.len() as u32).to_le_bytes());
                for &member in &slot.track_members {
                    buf.extend_from_slice(&member.to_le_bytes());
                }
            }
            buf.extend_from_slice(&node.global_class_id.to_le_bytes());
        }
        buf
    }

    fn decode(buf: &[u8], record_offset: u64) -> Result<MethodGraph, PersistError> {
        let err = |what: &str| PersistError::CorruptGraphRecord(record_offset, what.to_string());
        let mut cur = Cursor { buf, pos: 0, record_offset };

        let header = GraphHeader {
            class_id: cur.u32(&err)?,
            method_id: cur.u32(&err)?,
            method_index: cur.u32(&err)?,
            global_class_count: cur.u32(&err)?,
            arg_count: cur.u32(&err)?,
            total_node_count: cur.u32(&err)?,
        };

        let mut nodes = Vec::with_capacity(header.total_node_count as usize);
        for _ in 0..header.total_node_count {
            let idx = cur.i64(&err)?;
            let all_flag = cur.bool(&err)?;
            let in_array = cur.bool(&err)?;
            let fs_size = cur.u32(&err)? as usize;

            let mut null_branches = Vec::with_capacity(fs_size);
            for _ in 0..fs_size {
                null_branches.push(cur.bool(&err)?);
            }
            let mut children = Vec::with_capacity(fs_size);
            for _ in 0..fs_size {
                children.push(cur.i64(&err)?);
            }
            let mut field_slots = Vec::with_capacity(fs_size);
            for i in 0..fs_size {
                let count = cur.u32(&err)? as usize;
                let mut track_members = Vec::with_capacity(count);
                for _ in 0..count {
                    track_members.push(cur.i64(&err)?);
                }
                field_slots.push(FieldSlot { child: children[i], null_branch: null_branches[i], track_members });
            }
            let global_class_id = cur.i64(&err)?;
            nodes.push(NodeRecord { idx, all_flag, in_array, field_slots, global_class_id });
        }

        Ok(MethodGraph { header, nodes })
    }

    fn to_text(&self) -> String {
        use std::fmt::Write as _;
        let mut out = String::new();
        let h = &self.header;
        let _ = writeln!(
            out,
            "class={} method={} method_index={} global_classes={} args={} nodes={}",
            h.class_id, h.method_id, h.method_index, h.global_class_count, h.arg_count, h.total_node_count
        );
        for node in &self.nodes {
            let _ = writeln!(out, "  node idx={} all_flag={} in_array={} global_class_id={}", node.idx, node.all_flag, node.in_array, node.global_class_id);
            for (i, slot) in node.field_slots.iter().enumerate() {
                let _ = writeln!(out, "    field[{i}] child={} null_branch={} tracks={:?}", slot.child, slot.null_branch, slot.track_members);
            }
        }
        out.push('\n');
        out
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    record_offset: u64,
}

impl<'a> Cursor<'a> {
    fn u32(&mut self, err: &dyn Fn(&str) -> PersistError) -> Result<u32, PersistError> {
        let bytes = self.buf.get(self.pos..self.pos + 4).ok_or_else(|| err("truncated u32"))?;
        self.pos += 4;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn i64(&mut self, err: &dyn Fn(&str) -> PersistError) -> Result<i64, PersistError> {
        let bytes = self.buf.get(self.pos..self.pos + 8).ok_or_else(|| err("truncated i64"))?;
        self.pos += 8;
        Ok(i64::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn bool(&mut self, err: &dyn Fn(&str) -> PersistError) -> Result<bool, PersistError> {
        let byte = *self.buf.get(self.pos).ok_or_else(|| err("truncated bool"))?;
        self.pos += 1;
        Ok(byte != 0)
    }
}

/// Open handle onto the paired `presult.bin` / `presult.txt` files.
/// Writes go through an append-mode writer; reads reopen the binary
/// file read-only, matching the single-writer/many-readers split in
/// the concurrency model.
pub struct GraphStore {
    bin_path: PathBuf,
    bin_writer: BufWriter<File>,
    txt_writer: BufWriter<File>,
    next_offset: u64,
}

impl GraphStore {
    pub fn open(bin_path: &Path, txt_path: &Path) -> Result<GraphStore, PersistError> {
        let next_offset = if bin_path.exists() { std::fs::metadata(bin_path)?.len() } else { 0 };
        let bin_writer = BufWriter::new(OpenOptions::new().create(true).append(true).open(bin_path)?);
        let txt_writer = BufWriter::new(OpenOptions::new().create(true).append(true).open(txt_path)?);
        Ok(GraphStore { bin_path: bin_path.to_path_buf(), bin_writer, txt_writer, next_offset })
    }

    /// Appends `graph` to both files and returns `(start_offset, length)`
    /// for the caller to record in `poff.bin`.
    pub fn write_method(&mut self, graph: &MethodGraph) -> Result<(u32, u32), PersistError> {
        let encoded = graph.encode();
        let start_offset = self.next_offset;
        self.bin_writer.write_all(&encoded)?;
        self.bin_writer.flush()?;
        self.next_offset += encoded.len() as u64;

        self.txt_writer.write_all(graph.to_text().as_bytes())?;
        self.txt_writer.flush()?;

        Ok((start_offset as u32, encoded.len() as u32))
    }

    pub fn read_method(&self, start_offset: u32, length: u32) -> Result<MethodGraph, PersistError> {
        let mut file = File::open(&self.bin_path)?;
        file.seek(SeekFrom::Start(start_offset as u64))?;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf)?;
        MethodGraph::decode(&buf, start_offset as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_graph() -> MethodGraph {
        MethodGraph {
            header: GraphHeader { class_id: 1, method_id: 2, method_index: 0, global_class_count: 0, arg_count: 1, total_node_count: 2 },
            nodes: vec![
                NodeRecord {
                    idx: 0,
                    all_flag: false,
                    in_array: false,
                    field_slots: vec![FieldSlot { child: 1, null_branch: false, track_members: vec![1] }],
                    global_class_id: -1,
                },
                NodeRecord { idx: 1, all_flag: true, in_array: false, field_slots: vec![], global_class_id: -1 },
            ],
        }
    }

    #[test]
    fn round_trips_a_method_graph_with_a_cycle_free_shape() {
        let dir = tempdir().unwrap();
        let mut store = GraphStore::open(&dir.path().join("presult.bin"), &dir.path().join("presult.txt")).unwrap();

        let graph = sample_graph();
        let (offset, length) = store.write_method(&graph).unwrap();
        let back = store.read_method(offset, length).unwrap();
        assert_eq!(back, graph);
    }

    #[test]
    fn second_write_appends_after_the_first() {
        let dir = tempdir().unwrap();
        let mut store = GraphStore::open(&dir.path().join("presult.bin"), &dir.path().join("presult.txt")).unwrap();

        let graph = sample_graph();
        let (off1, len1) = store.write_method(&graph).unwrap();
        let (off2, _) = store.write_method(&graph).unwrap();
        assert_eq!(off2, off1 + len1);

        let first = store.read_method(off1, len1).unwrap();
        assert_eq!(first, graph);
    }

    #[test]
    fn round_trips_a_self_cycle_by_index() {
        let dir = tempdir().unwrap();
        let mut store = GraphStore::open(&dir.path().join("presult.bin"), &dir.path().join("presult.txt")).unwrap();

        let graph = MethodGraph {
            header: GraphHeader { class_id: 0, method_id: 0, method_index: 0, global_class_count: 0, arg_count: 1, total_node_count: 1 },
            nodes: vec![NodeRecord {
                idx: 0,
                all_flag: false,
                in_array: false,
                field_slots: vec![FieldSlot { child: 0, null_branch: false, track_members: vec![0] }],
                global_class_id: -1,
            }],
        };
        let (offset, length) = store.write_method(&graph).unwrap();
        let back = store.read_method(offset, length).unwrap();
        assert_eq!(back, graph);
    }
}
