//! Bridges the analyzer's in-memory, arena-indexed [MethodAccess]
//! graphs to `offload_persist`'s flattened, string-interned on-disk
//! format (§4.6).
//!
//! Two representational gaps have to be crossed in each direction:
//! - In memory, `field_set`/`track_set` are keyed by sparse
//!   [`AHashMap<u32, _>`] field indices. On disk, [NodeRecord::field_slots]
//!   is a dense `Vec`: a field's index *is* its position in the vec, so
//!   [Persistence::to_graph] must densify (filling the gaps with empty
//!   slots) and [Persistence::from_graph] must re-sparsify.
//! - In memory, a class or method is identified by a [ClassId]/[MethodId]
//!   that is only meaningful for the lifetime of one [Linker] run. On
//!   disk, identity has to survive across runs, so every class
//!   reference — whether a method's owner or a `global_classes` root —
//!   is stored as its descriptor's id in the shared [StringDict], the
//!   same scheme `poff.bin` uses for its own method key.

use ahash::AHashMap;

use offload_dex::link::{Linker, MethodId};
use offload_persist::{FieldSlot, GraphHeader, GraphStore, MethodGraph, NodeRecord, OffsetIndex, OffsetRecord, StringDict};

use crate::errors::AnalyzerError;
use crate::value::{Arena, MethodAccess, NodeId};

/// Aggregates the three on-disk stores into the single handle the
/// driver consults for memoization.
pub struct Persistence {
    pub strings: StringDict,
    pub offsets: OffsetIndex,
    pub graphs: GraphStore,
}

impl Persistence {
    pub fn open(cache_dir: &std::path::Path) -> Result<Persistence, AnalyzerError> {
        std::fs::create_dir_all(cache_dir)?;
        let strings = StringDict::open(&cache_dir.join("strdict.bin"))?;
        let offsets = OffsetIndex::open(&cache_dir.join("poff.bin"))?;
        let graphs = GraphStore::open(&cache_dir.join("presult.bin"), &cache_dir.join("presult.txt"))?;
        Ok(Persistence { strings, offsets, graphs })
    }

    /// Interns this method's identity and looks it up in the offset
    /// index. A miss means neither this run nor a previous one against
    /// this cache directory has analyzed it yet.
    pub fn lookup(&mut self, linker: &Linker, method: MethodId) -> Result<Option<OffsetRecord>, AnalyzerError> {
        let key = self.method_key(linker, method)?;
        Ok(self.offsets.lookup(key.0, key.1, key.2))
    }

    pub fn load_graph(&self, record: OffsetRecord) -> Result<MethodGraph, AnalyzerError> {
        Ok(self.graphs.read_method(record.start_offset, record.length)?)
    }

    /// Rebuilds a [MethodAccess] from a stored graph, re-linking every
    /// `global_classes` root by its persisted descriptor.
    pub fn from_graph(&self, linker: &mut Linker, method: MethodId, graph: &MethodGraph) -> Result<MethodAccess, AnalyzerError> {
        let mut arena = Arena::default();
        for _ in 0..graph.nodes.len() {
            arena.alloc();
        }

        let mut global_classes = AHashMap::default();
        for record in &graph.nodes {
            let id = record.idx as NodeId;
            {
                let n = arena.get_mut(id);
                n.all_flag = record.all_flag;
                n.in_array = record.in_array;
            }
            if record.global_class_id >= 0 {
                let descriptor = self
                    .strings
                    .resolve(record.global_class_id as u32)
                    .ok_or_else(|| AnalyzerError::BootstrapUnavailable("dangling global_class_id in cached graph".into()))?;
                let descriptor = std::str::from_utf8(descriptor)
                    .map_err(|_| AnalyzerError::BootstrapUnavailable("non-utf8 class descriptor in cache".into()))?
                    .to_string();
                let class = linker.link_class(&descriptor)?;
                arena.get_mut(id).class_ref = Some(class);
                global_classes.insert(class, id);
            }
            for (field_idx, slot) in record.field_slots.iter().enumerate() {
                let field_idx = field_idx as u32;
                if slot.child >= 0 {
                    let child = slot.child as NodeId;
                    arena.get_mut(id).field_set.insert(field_idx, child);
                    arena.get_mut(child).belonging = Some(id);
                }
                if slot.null_branch {
                    arena.get_mut(id).null_branch_flags.insert(field_idx);
                }
                if !slot.track_members.is_empty() {
                    let members = slot.track_members.iter().map(|&m| m as NodeId).collect();
                    arena.get_mut(id).track_set.insert(field_idx, members);
                }
            }
        }

        let mut ma = MethodAccess::new(method);
        ma.arena = arena;
        ma.args = (0..graph.header.arg_count).collect();
        ma.global_classes = global_classes;
        Ok(ma)
    }

    /// Flattens `ma` and appends it to both the graph store and the
    /// offset index, in that order (so a crash mid-write never leaves
    /// an offset record pointing at a graph that was never written).
    pub fn store(&mut self, linker: &Linker, method: MethodId, ma: &mut MethodAccess) -> Result<(), AnalyzerError> {
        let key = self.method_key(linker, method)?;
        let graph = self.to_graph(linker, key, ma)?;
        let (start_offset, length) = self.graphs.write_method(&graph)?;
        self.offsets.append(OffsetRecord {
            class_name_id: key.0,
            method_name_id: key.1,
            method_index: key.2,
            start_offset,
            length,
        })?;
        Ok(())
    }

    /// Densifies `ma`'s indexed graph into the on-disk record shape.
    fn to_graph(&mut self, linker: &Linker, key: (u32, u32, u32), ma: &mut MethodAccess) -> Result<MethodGraph, AnalyzerError> {
        let list = ma.index_all();
        let arg_count = ma.args.len() as u32;

        let mut class_descriptor_by_node: AHashMap<NodeId, String> = AHashMap::default();
        for node in list.iter() {
            if let Some(class) = ma.arena.get(*node).class_ref {
                class_descriptor_by_node.insert(*node, linker.class(class).descriptor.clone());
            }
        }

        let mut nodes = Vec::with_capacity(list.len());
        for &id in &list {
            let node = ma.arena.get(id);
            let max_field = node
                .field_set
                .keys()
                .chain(node.track_set.keys())
                .copied()
                .max()
                .map(|m| m + 1)
                .unwrap_or(0);

            let mut field_slots = vec![FieldSlot::default(); max_field as usize];
            for i in 0..max_field {
                let child = node.field_set.get(&i).map(|&c| ma.arena.get(c).idx).unwrap_or(-1);
                let null_branch = node.null_branch_flags.contains(&i);
                let track_members: Vec<i64> = node
                    .track_set
                    .get(&i)
                    .map(|set| set.iter().map(|&n| ma.arena.get(n).idx).collect())
                    .unwrap_or_default();
                field_slots[i as usize] = FieldSlot { child, null_branch, track_members };
            }

            let global_class_id = match class_descriptor_by_node.get(&id) {
                Some(descriptor) => self.strings.intern(descriptor.as_bytes())? as i64,
                None => -1,
            };

            nodes.push(NodeRecord {
                idx: node.idx,
                all_flag: node.all_flag,
                in_array: node.in_array,
                field_slots,
                global_class_id,
            });
        }

        ma.clear_index(&list);

        Ok(MethodGraph {
            header: GraphHeader {
                class_id: key.0,
                method_id: key.1,
                method_index: key.2,
                global_class_count: ma.global_classes.len() as u32,
                arg_count,
                total_node_count: nodes.len() as u32,
            },
            nodes,
        })
    }

    fn method_key(&mut self, linker: &Linker, method: MethodId) -> Result<(u32, u32, u32), AnalyzerError> {
        let m = linker.method(method);
        let class = linker.class(m.owner);
        let class_name_id = self.strings.intern(class.descriptor.as_bytes())?;

        let dex = linker.dex(m.dex);
        let method_item = dex
            .method_ids
            .get(m.method_idx as usize)
            .ok_or_else(|| AnalyzerError::BootstrapUnavailable(format!("dangling method_idx {}", m.method_idx)))?;
        let name = method_item.get_name(dex).map(|s| s.into_owned()).unwrap_or_default();
        let shorty = method_item
            .get_prototype(dex)
            .and_then(|p| p.view(dex).descriptor())
            .map(|s| s.into_owned())
            .unwrap_or_default();
        let name_sig = format!("{name}{shorty}");
        let method_name_id = self.strings.intern(name_sig.as_bytes())?;

        let method_index = declaration_index(class, method);
        Ok((class_name_id, method_name_id, method_index))
    }
}

/// A method's position within its declaring class's `direct_methods`
/// followed by `virtual_methods`, the same ordering `offload_persist`
/// keys a method by on disk.
pub fn declaration_index(class: &offload_dex::link::ClassObject, method: MethodId) -> u32 {
    if let Some(pos) = class.direct_methods.iter().position(|&m| m == method) {
        return pos as u32;
    }
    if let Some(pos) = class.virtual_methods.iter().position(|&m| m == method) {
        return class.direct_methods.len() as u32 + pos as u32;
    }
    0
}
