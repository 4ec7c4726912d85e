//! The abstract-value model: [ObjectAccess] nodes arranged into a
//! (possibly cyclic) graph, owned by an arena per [MethodAccess].
//!
//! Nodes never hold a direct reference to one another — every edge
//! (`field_set`, `track_set`, `belonging`) is a [NodeId] into the
//! owning [MethodAccess]'s arena. This is the "arena per MethodAccess,
//! allocate nodes into the arena, refer by index" ownership model: it
//! sidesteps the need for `Rc`/`RefCell` cycles entirely, and makes a
//! graph trivially relocatable (clone the arena, remap indices) for
//! path forks and call-site merges.

use std::collections::VecDeque;

use ahash::{AHashMap, AHashSet};

use offload_dex::link::{ClassId, MethodId};

/// Index into a [MethodAccess]'s node arena.
pub type NodeId = u32;

/// Knowledge about one abstract object (or, when `class_ref` is set, one
/// static-class footprint — the Rust rendition of the original's
/// `ClassAccess ⊂ ObjectAccess`: rather than a subtype, a class-rooted
/// node is just an `ObjectAccess` with `class_ref` populated).
#[derive(Debug, Clone, Default)]
pub struct ObjectAccess {
    /// Once true, the entire transitive object must be migrated; all
    /// further refinement on this node is suppressed.
    pub all_flag: bool,
    /// The object is reachable via an array element; imposes `all_flag`
    /// on anything stored into it.
    pub in_array: bool,
    /// Canonical representative child per field index.
    pub field_set: AHashMap<u32, NodeId>,
    /// Nodes this field currently *may* point to along the path under
    /// analysis.
    pub track_set: AHashMap<u32, AHashSet<NodeId>>,
    /// Scratch area used only during join operations; swapped into
    /// `track_set` when a join commits.
    pub merge_set: AHashMap<u32, AHashSet<NodeId>>,
    /// True when at least one explored path reached this instruction
    /// with the field unobserved.
    pub null_branch_flags: AHashSet<u32>,
    /// Back-reference to the owning parent, used to walk up and check
    /// any ancestor's `all_flag`.
    pub belonging: Option<NodeId>,
    /// Transient id, meaningful only between `index()` and
    /// `clear_index()`; `-1` otherwise.
    pub idx: i64,
    /// Set when this node is a `global_classes` root: the class this
    /// static footprint belongs to.
    pub class_ref: Option<ClassId>,
}

impl ObjectAccess {
    pub fn new() -> ObjectAccess {
        ObjectAccess { idx: -1, ..Default::default() }
    }
}

/// Arena owning every [ObjectAccess] reachable from one [MethodAccess].
#[derive(Debug, Default, Clone)]
pub struct Arena {
    nodes: Vec<ObjectAccess>,
}

impl Arena {
    pub fn alloc(&mut self) -> NodeId {
        self.nodes.push(ObjectAccess::new());
        (self.nodes.len() - 1) as NodeId
    }

    pub fn alloc_child(&mut self, belonging: NodeId) -> NodeId {
        let id = self.alloc();
        self.nodes[id as usize].belonging = Some(belonging);
        id
    }

    pub fn get(&self, id: NodeId) -> &ObjectAccess {
        &self.nodes[id as usize]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut ObjectAccess {
        &mut self.nodes[id as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ObjectAccess)> {
        self.nodes.iter().enumerate().map(|(i, n)| (i as NodeId, n))
    }

    /// Sets `all_flag` on `node` and every node transitively reachable
    /// through its `field_set`/`track_set`, via an explicit worklist
    /// (never recursion — graphs here are cyclic in general).
    pub fn widen_all(&mut self, root: NodeId) {
        let mut stack = vec![root];
        let mut seen = AHashSet::new();
        while let Some(n) = stack.pop() {
            if !seen.insert(n) {
                continue;
            }
            let node = self.get_mut(n);
            node.all_flag = true;
            let mut next = Vec::new();
            next.extend(node.field_set.values().copied());
            for set in node.track_set.values() {
                next.extend(set.iter().copied());
            }
            stack.extend(next);
        }
    }

    /// True if `node`, or any ancestor reached by walking `belonging`,
    /// has `all_flag` set (invariant 1: an all-flagged ancestor means
    /// the node is treated as fully migrated).
    pub fn any_ancestor_all_flag(&self, mut node: NodeId) -> bool {
        let mut seen = AHashSet::new();
        loop {
            if !seen.insert(node) {
                return false;
            }
            let n = self.get(node);
            if n.all_flag {
                return true;
            }
            match n.belonging {
                Some(p) => node = p,
                None => return false,
            }
        }
    }
}

/// Per-method analysis result: the argument and global-class footprints
/// an inter-procedural caller merges into its own graph.
#[derive(Debug, Clone)]
pub struct MethodAccess {
    pub method: MethodId,
    pub arena: Arena,
    /// One node per incoming object/array parameter, including the
    /// receiver for instance methods, in parameter order.
    pub args: Vec<NodeId>,
    pub global_classes: AHashMap<ClassId, NodeId>,
    pub return_objs: AHashSet<NodeId>,
    /// Transient holder for the most recent callee's return set,
    /// consumed by the next `move-result-object`.
    pub current_call_returns: AHashSet<NodeId>,
}

impl MethodAccess {
    pub fn new(method: MethodId) -> MethodAccess {
        MethodAccess {
            method,
            arena: Arena::default(),
            args: Vec::new(),
            global_classes: AHashMap::new(),
            return_objs: AHashSet::new(),
            current_call_returns: AHashSet::new(),
        }
    }

    /// Materializes the `global_classes` entry for `class`, creating a
    /// fresh class-rooted node on first sight.
    pub fn global_class_node(&mut self, class: ClassId) -> NodeId {
        if let Some(&id) = self.global_classes.get(&class) {
            return id;
        }
        let id = self.arena.alloc();
        self.arena.get_mut(id).class_ref = Some(class);
        self.global_classes.insert(class, id);
        id
    }

    /// BFS from `root`, assigning each newly-visited node a unique,
    /// increasing `idx` and appending it to `list`. Already-indexed
    /// nodes (from an earlier `index()` call rooted elsewhere in the
    /// same pass) are left alone, so a caller can index every arg root
    /// and every global-class root into one shared `list`.
    pub fn index(&mut self, root: NodeId, list: &mut Vec<NodeId>) {
        let mut queue = VecDeque::new();
        let mut seen = AHashSet::new();
        queue.push_back(root);
        seen.insert(root);

        while let Some(n) = queue.pop_front() {
            if self.arena.get(n).idx != -1 {
                continue;
            }
            self.arena.get_mut(n).idx = list.len() as i64;
            list.push(n);

            let neighbors: Vec<NodeId> = {
                let node = self.arena.get(n);
                let mut v: Vec<NodeId> = node.field_set.values().copied().collect();
                for set in node.track_set.values() {
                    v.extend(set.iter().copied());
                }
                v
            };
            for nb in neighbors {
                if seen.insert(nb) {
                    queue.push_back(nb);
                }
            }
        }
    }

    /// Restores `idx = -1` on every node in `list`.
    pub fn clear_index(&mut self, list: &[NodeId]) {
        for &id in list {
            self.arena.get_mut(id).idx = -1;
        }
    }

    /// Indexes every argument root and global-class root into one list,
    /// in a stable order (args first, then global classes by class id),
    /// as required before serialization (§4.6: "indexes the graph via
    /// `index_method_access`... every reference uses its assigned idx").
    ///
    /// Persistence records only an `arg_count`, not which node ids are
    /// roots, so the contract this method upholds is that roots claim
    /// `idx` 0..root_count *before* any of their descendants are
    /// indexed — a caller reconstructing from a [GraphHeader] gets args
    /// back simply as `0..arg_count`. This is why roots are indexed in
    /// one pass and only then expanded breadth-first, rather than
    /// draining each root's reachable set before moving to the next.
    pub fn index_all(&mut self) -> Vec<NodeId> {
        let mut roots = self.args.clone();
        let mut classes: Vec<ClassId> = self.global_classes.keys().copied().collect();
        classes.sort_unstable();
        roots.extend(classes.iter().map(|c| self.global_classes[c]));

        let mut list = Vec::new();
        for &root in &roots {
            if self.arena.get(root).idx == -1 {
                self.arena.get_mut(root).idx = list.len() as i64;
                list.push(root);
            }
        }

        let mut queue: VecDeque<NodeId> = roots.iter().copied().collect();
        let mut seen: AHashSet<NodeId> = roots.iter().copied().collect();
        while let Some(n) = queue.pop_front() {
            let neighbors: Vec<NodeId> = {
                let node = self.arena.get(n);
                let mut v: Vec<NodeId> = node.field_set.values().copied().collect();
                for set in node.track_set.values() {
                    v.extend(set.iter().copied());
                }
                v
            };
            for nb in neighbors {
                if seen.insert(nb) {
                    if self.arena.get(nb).idx == -1 {
                        self.arena.get_mut(nb).idx = list.len() as i64;
                        list.push(nb);
                    }
                    queue.push_back(nb);
                }
            }
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widen_all_follows_cycles() {
        let mut arena = Arena::default();
        let a = arena.alloc();
        let b = arena.alloc_child(a);
        arena.get_mut(a).field_set.insert(0, b);
        arena.get_mut(b).field_set.insert(0, a); // cycle back to a

        arena.widen_all(a);
        assert!(arena.get(a).all_flag);
        assert!(arena.get(b).all_flag);
    }

    #[test]
    fn any_ancestor_all_flag_walks_belonging() {
        let mut arena = Arena::default();
        let root = arena.alloc();
        let child = arena.alloc_child(root);
        let unrelated = arena.alloc();

        assert!(!arena.any_ancestor_all_flag(child));
        arena.get_mut(root).all_flag = true;
        assert!(arena.any_ancestor_all_flag(child));
        assert!(!arena.any_ancestor_all_flag(unrelated));
    }

    #[test]
    fn index_assigns_unique_ids_and_clear_resets() {
        let mut ma = MethodAccess::new(0);
        let a = ma.arena.alloc();
        let b = ma.arena.alloc_child(a);
        ma.arena.get_mut(a).field_set.insert(0, b);
        ma.args.push(a);

        let list = ma.index_all();
        assert_eq!(list.len(), 2);
        assert_eq!(ma.arena.get(a).idx, 0);
        assert_eq!(ma.arena.get(b).idx, 1);

        ma.clear_index(&list);
        assert_eq!(ma.arena.get(a).idx, -1);
        assert_eq!(ma.arena.get(b).idx, -1);
    }

    #[test]
    fn global_class_node_is_created_once() {
        let mut ma = MethodAccess::new(0);
        let n1 = ma.global_class_node(5);
        let n2 = ma.global_class_node(5);
        assert_eq!(n1, n2);
        assert_eq!(ma.arena.get(n1).class_ref, Some(5));
    }
}
