//! Cross-reference resolution over a loaded classpath: class loading,
//! method/field resolution, virtual dispatch table construction, and
//! subclass/implementer enumeration.
//!
//! A [Linker] owns every [Dex] on the classpath plus the arenas of
//! resolved [ClassObject]/[LinkedMethod]/[LinkedField] records. Classes
//! are linked lazily, the first time something asks for them by
//! descriptor or by an index into a particular dex's tables — this
//! mirrors the "symbolic until first use" resolution the dex format
//! itself defers to runtime.

use ahash::{AHashMap, AHashSet};
use once_cell::sync::Lazy;

use crate::dex::{AccessFlags, ClassData, ClassItem, Dex, NO_INDEX};
use crate::errors::LinkError;

/// Index into [Linker::dexes].
pub type DexId = u32;
/// Index into [Linker::classes].
pub type ClassId = u32;
/// Index into [Linker::methods].
pub type MethodId = u32;
/// Index into [Linker::fields].
pub type FieldId = u32;

/// The kind of dispatch an `invoke-*` opcode requests; determines how
/// [Linker::resolve_method] looks a callee up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
}

#[derive(Debug, Clone)]
pub struct LinkedMethod {
    pub owner: ClassId,
    pub dex: DexId,
    /// Index into `owner`'s dex `method_ids`, used to recover the
    /// name/descriptor for logging and persistence.
    pub method_idx: u32,
    pub access_flags: AccessFlags,
    pub code_off: u32,
    /// `Some(i)` for a virtual method at vtable slot `i`; `None` for
    /// direct/static dispatch.
    pub vtable_index: Option<u32>,
    /// `Some(i)` when `owner` is an interface and this is its `i`-th
    /// declared (abstract) virtual method, used to index
    /// `iftable[..].1` at any implementer.
    pub iface_slot: Option<u32>,
}

impl LinkedMethod {
    pub fn is_native(&self) -> bool {
        self.access_flags.contains(AccessFlags::NATIVE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(AccessFlags::ABSTRACT)
    }
}

#[derive(Debug, Clone)]
pub struct LinkedField {
    pub owner: ClassId,
    pub dex: DexId,
    pub field_idx: u32,
    pub access_flags: AccessFlags,
    /// Stable per-class index: a word offset for instance fields
    /// (8-byte aligned for wide fields), a plain declaration-order
    /// position for static fields.
    pub index: u32,
    pub is_wide: bool,
}

#[derive(Debug, Clone)]
pub struct ClassObject {
    pub descriptor: String,
    pub dex: DexId,
    pub class_def_idx: u32,
    pub access_flags: AccessFlags,
    pub super_class: Option<ClassId>,
    /// Directly implemented/extended interfaces.
    pub interfaces: Vec<ClassId>,
    /// Transitive closure of `interfaces`, inherited interfaces included.
    pub all_interfaces: Vec<ClassId>,
    pub direct_methods: Vec<MethodId>,
    pub virtual_methods: Vec<MethodId>,
    /// Full virtual dispatch table: inherited entries, overridden in
    /// place, with new slots (including synthesized miranda methods)
    /// appended.
    pub vtable: Vec<MethodId>,
    /// Per-interface method-index array mapping that interface's
    /// declaration order to a slot in `vtable`.
    pub iftable: Vec<(ClassId, Vec<u32>)>,
    pub instance_fields: Vec<FieldId>,
    pub static_fields: Vec<FieldId>,
    pub instance_size_words: u32,
}

impl ClassObject {
    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(AccessFlags::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(AccessFlags::ABSTRACT)
    }
}

/// Hard-coded exempt types the analyzer refuses to descend into: a call
/// site whose receiver resolves to one of these (or a subtype) always
/// widens instead of being inlined into the graph.
pub static EXEMPT_DESCRIPTORS: Lazy<AHashSet<&'static str>> = Lazy::new(|| {
    [
        "Ljava/lang/Object;",
        "Ljava/lang/String;",
        "Ljava/lang/CharSequence;",
        "Ljava/lang/Class;",
        "Ljava/lang/Thread;",
        "Ljava/lang/Runnable;",
        "Ljava/util/Collection;",
        "Ljava/util/List;",
        "Ljava/util/Map;",
        "Ljava/util/Set;",
        "Ljava/util/ArrayList;",
        "Ljava/util/HashMap;",
        "Ljava/util/HashSet;",
        "Ljava/io/Closeable;",
        "Ljava/io/InputStream;",
        "Ljava/io/OutputStream;",
        "Ljava/io/Serializable;",
        "Landroid/os/Parcelable;",
        "Landroid/os/Parcel;",
    ]
    .into_iter()
    .collect()
});

struct FieldDecl {
    field_idx: u32,
    access_flags: AccessFlags,
}

struct MethodDecl {
    method_idx: u32,
    access_flags: AccessFlags,
    code_off: u32,
}

/// Loads dex containers in classpath order and resolves references
/// between them.
pub struct Linker {
    dexes: Vec<Dex>,
    /// descriptor -> index into that dex's `class_defs`, built once per
    /// dex so `link_class` doesn't linearly scan on every call.
    class_defs_by_descriptor: Vec<AHashMap<String, u32>>,

    classes: Vec<ClassObject>,
    methods: Vec<LinkedMethod>,
    fields: Vec<LinkedField>,

    class_index: AHashMap<String, ClassId>,
    /// Guards against cyclic `extends`/`implements` chains in malformed
    /// input; linking a class already in this set is a resolution
    /// failure rather than infinite recursion.
    linking: AHashSet<String>,

    method_cache: AHashMap<(DexId, u32, u8), Option<MethodId>>,
    instance_field_cache: AHashMap<(DexId, u32), Option<FieldId>>,
    static_field_cache: AHashMap<(DexId, u32), Option<FieldId>>,

    subclasses_of: AHashMap<ClassId, Vec<ClassId>>,
    implementers_of: AHashMap<ClassId, Vec<ClassId>>,

    exempt_classes: AHashSet<ClassId>,
}

impl Default for Linker {
    fn default() -> Self {
        Self::new()
    }
}

impl Linker {
    pub fn new() -> Linker {
        Linker {
            dexes: Vec::new(),
            class_defs_by_descriptor: Vec::new(),
            classes: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            class_index: AHashMap::new(),
            linking: AHashSet::new(),
            method_cache: AHashMap::new(),
            instance_field_cache: AHashMap::new(),
            static_field_cache: AHashMap::new(),
            subclasses_of: AHashMap::new(),
            implementers_of: AHashMap::new(),
            exempt_classes: AHashSet::new(),
        }
    }

    /// Adds a dex container to the classpath, in the order it should be
    /// searched. Returns its [DexId].
    pub fn add_dex(&mut self, dex: Dex) -> DexId {
        let mut by_descriptor = AHashMap::new();
        for (i, class_def) in dex.class_defs.iter().enumerate() {
            if let Some(name) = class_def.get_name(&dex) {
                by_descriptor.insert(name.into_owned(), i as u32);
            }
        }
        self.dexes.push(dex);
        self.class_defs_by_descriptor.push(by_descriptor);
        (self.dexes.len() - 1) as DexId
    }

    pub fn dex(&self, id: DexId) -> &Dex {
        &self.dexes[id as usize]
    }

    pub fn class(&self, id: ClassId) -> &ClassObject {
        &self.classes[id as usize]
    }

    pub fn method(&self, id: MethodId) -> &LinkedMethod {
        &self.methods[id as usize]
    }

    pub fn field(&self, id: FieldId) -> &LinkedField {
        &self.fields[id as usize]
    }

    pub fn is_exempt(&self, class: ClassId) -> bool {
        self.exempt_classes.contains(&class)
    }

    pub fn find_subclasses(&self, class: ClassId) -> &[ClassId] {
        self.subclasses_of.get(&class).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn find_implementers(&self, interface: ClassId) -> &[ClassId] {
        self.implementers_of.get(&interface).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Resolves and fully links `descriptor`, returning the cached
    /// [ClassId] on repeat calls. Superclass and interfaces are linked
    /// recursively before this class's vtable/iftable are built, so
    /// dispatch tables always see fully-resolved ancestors.
    pub fn link_class(&mut self, descriptor: &str) -> Result<ClassId, LinkError> {
        if let Some(&id) = self.class_index.get(descriptor) {
            return Ok(id);
        }
        if self.linking.contains(descriptor) {
            return Err(LinkError::ClassNotFound(descriptor.to_string()));
        }

        let (dex_id, class_def_idx) = self.find_class_def(descriptor)?;
        self.linking.insert(descriptor.to_string());
        let result = self.link_class_def(descriptor, dex_id, class_def_idx);
        self.linking.remove(descriptor);
        let id = result?;

        self.class_index.insert(descriptor.to_string(), id);
        if self.is_exempt_descriptor(descriptor) || self.inherits_exempt(id) {
            self.exempt_classes.insert(id);
        }
        Ok(id)
    }

    pub fn resolve_class(&mut self, referrer_dex: DexId, type_idx: u32) -> Result<ClassId, LinkError> {
        let descriptor = self.dexes[referrer_dex as usize]
            .get_type(type_idx as usize)
            .map(|s| s.into_owned())
            .ok_or_else(|| LinkError::ClassNotFound(format!("type_idx {type_idx}")))?;
        self.link_class(&descriptor)
    }

    /// Resolves a method reference from `referrer_dex`'s `method_ids`
    /// table. Results (including failures) are cached per `(dex, idx,
    /// kind)`.
    pub fn resolve_method(
        &mut self,
        referrer_dex: DexId,
        method_idx: u32,
        kind: InvokeKind,
    ) -> Result<MethodId, LinkError> {
        let cache_key = (referrer_dex, method_idx, kind as u8);
        if let Some(&cached) = self.method_cache.get(&cache_key) {
            return cached.ok_or(LinkError::MethodNotFound {
                class: String::new(),
                name: String::new(),
                method_idx,
            });
        }
        let result = self.resolve_method_uncached(referrer_dex, method_idx, kind);
        self.method_cache.insert(cache_key, result.as_ref().ok().copied());
        result
    }

    fn resolve_method_uncached(
        &mut self,
        referrer_dex: DexId,
        method_idx: u32,
        kind: InvokeKind,
    ) -> Result<MethodId, LinkError> {
        let (class_type_idx, name, sig) = {
            let dex = &self.dexes[referrer_dex as usize];
            let m = dex
                .method_ids
                .get(method_idx as usize)
                .ok_or(LinkError::MethodNotFound { class: String::new(), name: String::new(), method_idx })?;
            let name = dex.get_string(m.name_idx as usize).map(|s| s.into_owned()).unwrap_or_default();
            let sig = method_signature(dex, method_idx).unwrap_or_default();
            (m.class_idx as u32, name, sig)
        };
        let class_id = self.resolve_class(referrer_dex, class_type_idx)?;
        let class_descriptor = self.classes[class_id as usize].descriptor.clone();

        let found = match kind {
            InvokeKind::Direct | InvokeKind::Static => {
                self.find_in_methods(&self.classes[class_id as usize].direct_methods.clone(), &sig)
                    .or_else(|| self.find_in_methods(&self.classes[class_id as usize].virtual_methods.clone(), &sig))
            }
            InvokeKind::Virtual | InvokeKind::Super => {
                self.find_in_methods(&self.classes[class_id as usize].vtable.clone(), &sig)
            }
            InvokeKind::Interface => {
                self.find_in_methods(&self.classes[class_id as usize].virtual_methods.clone(), &sig)
            }
        };

        found.ok_or(LinkError::MethodNotFound { class: class_descriptor, name, method_idx })
    }

    /// Resolves a method signature starting the vtable search at
    /// `class` directly, used by `invoke-super` dispatch (the driver
    /// passes the *calling* method's declaring superclass here, per
    /// standard super semantics).
    pub fn resolve_method_in_class(
        &mut self,
        class: ClassId,
        referrer_dex: DexId,
        method_idx: u32,
    ) -> Result<MethodId, LinkError> {
        let sig = {
            let dex = &self.dexes[referrer_dex as usize];
            method_signature(dex, method_idx).unwrap_or_default()
        };
        self.find_in_methods(&self.classes[class as usize].vtable.clone(), &sig).ok_or(
            LinkError::MethodNotFound {
                class: self.classes[class as usize].descriptor.clone(),
                name: String::new(),
                method_idx,
            },
        )
    }

    fn find_in_methods(&self, candidates: &[MethodId], sig: &str) -> Option<MethodId> {
        candidates.iter().copied().find(|&m| self.method_signature_of(m) == sig)
    }

    pub fn resolve_instance_field(
        &mut self,
        referrer_dex: DexId,
        field_idx: u32,
    ) -> Result<FieldId, LinkError> {
        let cache_key = (referrer_dex, field_idx);
        if let Some(&cached) = self.instance_field_cache.get(&cache_key) {
            return cached.ok_or(LinkError::InstanceFieldNotFound(field_idx));
        }
        let result = self.resolve_field_uncached(referrer_dex, field_idx, false);
        self.instance_field_cache.insert(cache_key, result);
        result.ok_or(LinkError::InstanceFieldNotFound(field_idx))
    }

    pub fn resolve_static_field(
        &mut self,
        referrer_dex: DexId,
        field_idx: u32,
    ) -> Result<FieldId, LinkError> {
        let cache_key = (referrer_dex, field_idx);
        if let Some(&cached) = self.static_field_cache.get(&cache_key) {
            return cached.ok_or(LinkError::StaticFieldNotFound(field_idx));
        }
        let result = self.resolve_field_uncached(referrer_dex, field_idx, true);
        self.static_field_cache.insert(cache_key, result);
        result.ok_or(LinkError::StaticFieldNotFound(field_idx))
    }

    fn resolve_field_uncached(&mut self, referrer_dex: DexId, field_idx: u32, is_static: bool) -> Option<FieldId> {
        let (class_type_idx, sig) = {
            let dex = &self.dexes[referrer_dex as usize];
            let f = dex.field_ids.get(field_idx as usize)?;
            (f.class_idx as u32, field_signature(dex, field_idx)?)
        };
        let class_id = self.resolve_class(referrer_dex, class_type_idx).ok()?;
        let candidates = if is_static {
            self.classes[class_id as usize].static_fields.clone()
        } else {
            self.classes[class_id as usize].instance_fields.clone()
        };
        candidates.into_iter().find(|&f| self.field_signature_of(f) == sig)
    }

    fn is_exempt_descriptor(&self, descriptor: &str) -> bool {
        EXEMPT_DESCRIPTORS.contains(descriptor)
    }

    fn inherits_exempt(&self, class: ClassId) -> bool {
        let obj = &self.classes[class as usize];
        if let Some(super_id) = obj.super_class {
            if self.exempt_classes.contains(&super_id) {
                return true;
            }
        }
        obj.interfaces.iter().any(|i| self.exempt_classes.contains(i))
    }

    fn find_class_def(&self, descriptor: &str) -> Result<(DexId, u32), LinkError> {
        for (dex_id, map) in self.class_defs_by_descriptor.iter().enumerate() {
            if let Some(&class_def_idx) = map.get(descriptor) {
                return Ok((dex_id as DexId, class_def_idx));
            }
        }
        Err(LinkError::ClassNotFound(descriptor.to_string()))
    }

    fn link_class_def(
        &mut self,
        descriptor: &str,
        dex_id: DexId,
        class_def_idx: u32,
    ) -> Result<ClassId, LinkError> {
        let (access_flags, superclass_idx, interfaces_off, class_data_off) = {
            let dex = &self.dexes[dex_id as usize];
            let class_def: &ClassItem = &dex.class_defs[class_def_idx as usize];
            (class_def.access_flags, class_def.superclass_idx, class_def.interfaces_off, class_def.class_data_off)
        };

        let super_descriptor = if superclass_idx == NO_INDEX {
            None
        } else {
            self.dexes[dex_id as usize].get_type(superclass_idx as usize).map(|s| s.into_owned())
        };
        let interface_descriptors: Vec<String> = {
            let dex = &self.dexes[dex_id as usize];
            dex.get_type_list(interfaces_off)
                .map_err(LinkError::Dex)?
                .into_iter()
                .filter_map(|idx| dex.get_type(idx as usize).map(|s| s.into_owned()))
                .collect()
        };
        let class_data: ClassData = self.dexes[dex_id as usize]
            .get_class_data(class_data_off)
            .map_err(LinkError::Dex)?;

        let super_class = super_descriptor.as_deref().map(|d| self.link_class(d)).transpose()?;
        let mut interfaces = Vec::with_capacity(interface_descriptors.len());
        for d in &interface_descriptors {
            interfaces.push(self.link_class(d)?);
        }

        let mut all_interfaces: Vec<ClassId> = Vec::new();
        if let Some(s) = super_class {
            for i in self.classes[s as usize].all_interfaces.clone() {
                push_unique(&mut all_interfaces, i);
            }
        }
        for &i in &interfaces {
            push_unique(&mut all_interfaces, i);
            for n in self.classes[i as usize].all_interfaces.clone() {
                push_unique(&mut all_interfaces, n);
            }
        }

        let direct_method_decls: Vec<MethodDecl> = decode_methods(&class_data.direct_methods);
        let virtual_method_decls: Vec<MethodDecl> = decode_methods(&class_data.virtual_methods);
        let instance_field_decls: Vec<FieldDecl> = decode_fields(&class_data.instance_fields);
        let static_field_decls: Vec<FieldDecl> = decode_fields(&class_data.static_fields);

        let class_id = self.classes.len() as ClassId;

        let direct_methods: Vec<MethodId> = direct_method_decls
            .into_iter()
            .map(|d| self.push_method(class_id, dex_id, d.method_idx, d.access_flags, d.code_off, None, None))
            .collect();

        let mut vtable: Vec<MethodId> =
            super_class.map(|s| self.classes[s as usize].vtable.clone()).unwrap_or_default();
        let mut virtual_methods = Vec::with_capacity(virtual_method_decls.len());
        for d in virtual_method_decls {
            let sig = {
                let dex = &self.dexes[dex_id as usize];
                method_signature(dex, d.method_idx).unwrap_or_default()
            };
            let overridden_slot = vtable.iter().position(|&m| self.method_signature_of(m) == sig);
            let vtable_index = overridden_slot.unwrap_or(vtable.len()) as u32;
            let code_off = if d.access_flags.contains(AccessFlags::ABSTRACT) { 0 } else { d.code_off };
            let method_id = self.push_method(class_id, dex_id, d.method_idx, d.access_flags, code_off, Some(vtable_index), None);
            match overridden_slot {
                Some(slot) => vtable[slot] = method_id,
                None => vtable.push(method_id),
            }
            virtual_methods.push(method_id);
        }

        let instance_fields_own = self.push_fields(class_id, dex_id, instance_field_decls, false);
        let static_fields_own = self.push_fields(class_id, dex_id, static_field_decls, true);
        let (instance_fields, instance_size_words) =
            self.layout_instance_fields(super_class, instance_fields_own);
        let static_fields = self.layout_static_fields(static_fields_own);

        let is_interface = access_flags.contains(AccessFlags::INTERFACE);
        if is_interface {
            for (slot, &m) in virtual_methods.iter().enumerate() {
                self.methods[m as usize].iface_slot = Some(slot as u32);
            }
        }

        self.classes.push(ClassObject {
            descriptor: descriptor.to_string(),
            dex: dex_id,
            class_def_idx,
            access_flags,
            super_class,
            interfaces,
            all_interfaces: all_interfaces.clone(),
            direct_methods,
            virtual_methods,
            vtable,
            iftable: Vec::new(),
            instance_fields,
            static_fields,
            instance_size_words,
        });

        if !is_interface {
            self.synthesize_miranda_and_iftable(class_id);
        }

        if let Some(s) = super_class {
            self.subclasses_of.entry(s).or_default().push(class_id);
        }
        for i in all_interfaces {
            self.implementers_of.entry(i).or_default().push(class_id);
        }

        Ok(class_id)
    }

    #[allow(clippy::too_many_arguments)]
    fn push_method(
        &mut self,
        owner: ClassId,
        dex: DexId,
        method_idx: u32,
        access_flags: AccessFlags,
        code_off: u32,
        vtable_index: Option<u32>,
        iface_slot: Option<u32>,
    ) -> MethodId {
        let id = self.methods.len() as MethodId;
        self.methods.push(LinkedMethod { owner, dex, method_idx, access_flags, code_off, vtable_index, iface_slot });
        id
    }

    fn push_fields(&mut self, owner: ClassId, dex: DexId, decls: Vec<FieldDecl>, is_static: bool) -> Vec<PendingField> {
        decls
            .into_iter()
            .map(|d| {
                let is_wide = self.field_type_is_wide(dex, d.field_idx);
                let is_ref = self.field_type_is_ref(dex, d.field_idx);
                PendingField { owner, dex, field_idx: d.field_idx, access_flags: d.access_flags, is_wide, is_ref, is_static }
            })
            .collect()
    }

    fn field_type_is_wide(&self, dex_id: DexId, field_idx: u32) -> bool {
        self.field_type_char(dex_id, field_idx).map(|c| c == 'J' || c == 'D').unwrap_or(false)
    }

    fn field_type_is_ref(&self, dex_id: DexId, field_idx: u32) -> bool {
        self.field_type_char(dex_id, field_idx).map(|c| c == 'L' || c == '[').unwrap_or(false)
    }

    fn field_type_char(&self, dex_id: DexId, field_idx: u32) -> Option<char> {
        let dex = &self.dexes[dex_id as usize];
        let f = dex.field_ids.get(field_idx as usize)?;
        let ty = dex.get_type(f.type_idx as usize)?;
        ty.chars().next()
    }

    /// Lays out instance fields after the inherited ones: reference
    /// fields first, then 8-byte fields padded onto an even word
    /// boundary, then the remainder. This keeps the offset assignment
    /// deterministic and stable without needing true object-header
    /// layout, which the analyzer never materializes.
    fn layout_instance_fields(
        &mut self,
        super_class: Option<ClassId>,
        own: Vec<PendingField>,
    ) -> (Vec<FieldId>, u32) {
        let (inherited, mut offset) = match super_class {
            Some(s) => (self.classes[s as usize].instance_fields.clone(), self.classes[s as usize].instance_size_words),
            None => (Vec::new(), 0),
        };

        let (mut refs, mut wide, mut other): (Vec<_>, Vec<_>, Vec<_>) = (Vec::new(), Vec::new(), Vec::new());
        for f in own {
            if f.is_ref {
                refs.push(f);
            } else if f.is_wide {
                wide.push(f);
            } else {
                other.push(f);
            }
        }

        let mut new_ids = Vec::with_capacity(refs.len() + wide.len() + other.len());
        for f in refs {
            new_ids.push(self.finish_field(f, offset));
            offset += 1;
        }
        if !wide.is_empty() && offset % 2 != 0 {
            offset += 1;
        }
        for f in wide {
            new_ids.push(self.finish_field(f, offset));
            offset += 2;
        }
        for f in other {
            new_ids.push(self.finish_field(f, offset));
            offset += 1;
        }

        let mut all = inherited;
        all.extend(new_ids);
        (all, offset)
    }

    fn layout_static_fields(&mut self, own: Vec<PendingField>) -> Vec<FieldId> {
        own.into_iter()
            .enumerate()
            .map(|(i, f)| self.finish_field(f, i as u32))
            .collect()
    }

    fn finish_field(&mut self, f: PendingField, index: u32) -> FieldId {
        let id = self.fields.len() as FieldId;
        self.fields.push(LinkedField {
            owner: f.owner,
            dex: f.dex,
            field_idx: f.field_idx,
            access_flags: f.access_flags,
            index,
            is_wide: f.is_wide,
        });
        id
    }

    /// Fills in synthesized "miranda" entries for interface methods no
    /// ancestor implements, and records, per implemented interface, the
    /// vtable slot each of its methods dispatches to.
    fn synthesize_miranda_and_iftable(&mut self, class_id: ClassId) {
        let all_interfaces = self.classes[class_id as usize].all_interfaces.clone();
        let mut iftable = Vec::with_capacity(all_interfaces.len());

        for iface in all_interfaces {
            let iface_methods = self.classes[iface as usize].virtual_methods.clone();
            let mut method_index_array = Vec::with_capacity(iface_methods.len());

            for im in iface_methods {
                let sig = self.method_signature_of(im);
                let existing = self.classes[class_id as usize]
                    .vtable
                    .iter()
                    .position(|&m| self.method_signature_of(m) == sig);

                let slot = match existing {
                    Some(s) => s as u32,
                    None => {
                        let src = self.methods[im as usize].clone();
                        let vt_index = self.classes[class_id as usize].vtable.len() as u32;
                        let miranda = self.push_method(
                            class_id,
                            src.dex,
                            src.method_idx,
                            src.access_flags | AccessFlags::ABSTRACT,
                            0,
                            Some(vt_index),
                            None,
                        );
                        self.classes[class_id as usize].vtable.push(miranda);
                        vt_index
                    }
                };
                method_index_array.push(slot);
            }
            iftable.push((iface, method_index_array));
        }

        self.classes[class_id as usize].iftable = iftable;
    }

    fn method_signature_of(&self, method: MethodId) -> String {
        let m = &self.methods[method as usize];
        method_signature(&self.dexes[m.dex as usize], m.method_idx).unwrap_or_default()
    }

    fn field_signature_of(&self, field: FieldId) -> String {
        let f = &self.fields[field as usize];
        field_signature(&self.dexes[f.dex as usize], f.field_idx).unwrap_or_default()
    }
}

struct PendingField {
    owner: ClassId,
    dex: DexId,
    field_idx: u32,
    access_flags: AccessFlags,
    is_wide: bool,
    is_ref: bool,
    #[allow(dead_code)]
    is_static: bool,
}

fn push_unique(v: &mut Vec<ClassId>, id: ClassId) {
    if !v.contains(&id) {
        v.push(id);
    }
}

fn decode_methods(encoded: &[crate::dex::EncodedMethod]) -> Vec<MethodDecl> {
    let mut idx = 0u32;
    encoded
        .iter()
        .map(|e| {
            idx += e.method_idx_diff;
            MethodDecl { method_idx: idx, access_flags: e.access_flags, code_off: e.code_off }
        })
        .collect()
}

fn decode_fields(encoded: &[crate::dex::EncodedField]) -> Vec<FieldDecl> {
    let mut idx = 0u32;
    encoded
        .iter()
        .map(|e| {
            idx += e.field_idx_diff;
            FieldDecl { field_idx: idx, access_flags: e.access_flags }
        })
        .collect()
}

fn method_signature(dex: &Dex, method_idx: u32) -> Option<String> {
    let m = dex.method_ids.get(method_idx as usize)?;
    let name = dex.get_string(m.name_idx as usize)?;
    let proto = dex.proto_ids.get(m.proto_idx as usize)?;
    let return_ty = dex.get_type(proto.return_type_idx as usize)?;
    let params = dex.get_type_list(proto.parameters_off).ok()?;
    let mut sig = String::with_capacity(32);
    sig.push_str(&name);
    sig.push('(');
    for p in params {
        if let Some(t) = dex.get_type(p as usize) {
            sig.push_str(&t);
        }
    }
    sig.push(')');
    sig.push_str(&return_ty);
    Some(sig)
}

fn field_signature(dex: &Dex, field_idx: u32) -> Option<String> {
    let f = dex.field_ids.get(field_idx as usize)?;
    let name = dex.get_string(f.name_idx as usize)?;
    let ty = dex.get_type(f.type_idx as usize)?;
    Some(format!("{name}:{ty}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exempt_descriptors_contains_object() {
        assert!(EXEMPT_DESCRIPTORS.contains("Ljava/lang/Object;"));
        assert!(!EXEMPT_DESCRIPTORS.contains("Lcom/example/Foo;"));
    }

    #[test]
    fn push_unique_dedupes() {
        let mut v = Vec::new();
        push_unique(&mut v, 1);
        push_unique(&mut v, 2);
        push_unique(&mut v, 1);
        assert_eq!(v, vec![1, 2]);
    }
}
