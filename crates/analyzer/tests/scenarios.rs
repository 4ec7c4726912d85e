//! End-to-end scenarios: hand-built single-dex fixtures run through the
//! real linker and path engine, exercising the driver's inter-procedural
//! merge and the interpreter's field-touch bookkeeping together rather
//! than in isolation.
//!
//! [dexbuilder] assembles a minimal but format-correct dex file byte by
//! byte. `Dex::new` reads `string_ids`/`type_ids`/`proto_ids`/
//! `field_ids`/`method_ids`/`class_defs` sequentially right after the
//! header regardless of the header's own `_off` fields, so the builder
//! lays those six tables out in that fixed order and only needs to get
//! the offset-referenced blobs (string data, type lists, class data,
//! code items) right.

mod dexbuilder {
    use offload_dex::dex::NO_INDEX;
    use offload_dex::Dex;

    const HEADER_SIZE: u32 = 0x70;

    fn write_uleb128(buf: &mut Vec<u8>, mut value: u32) {
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            buf.push(byte);
            if value == 0 {
                break;
            }
        }
    }

    #[derive(Clone)]
    pub struct CodeSpec {
        pub registers_size: u16,
        pub ins_size: u16,
        pub outs_size: u16,
        pub insns: Vec<u16>,
    }

    struct ProtoSpec {
        shorty_idx: u32,
        return_type_idx: u32,
        params: Vec<u16>,
    }

    struct FieldSpec {
        class_idx: u16,
        type_idx: u16,
        name_idx: u32,
    }

    struct MethodSpec {
        class_idx: u16,
        proto_idx: u16,
        name_idx: u32,
    }

    #[derive(Default)]
    struct ClassSpec {
        class_idx: u32,
        access_flags: u32,
        superclass_idx: u32,
        interfaces: Vec<u16>,
        static_fields: Vec<(u32, u32)>,
        instance_fields: Vec<(u32, u32)>,
        direct_methods: Vec<(u32, u32, Option<CodeSpec>)>,
        virtual_methods: Vec<(u32, u32, Option<CodeSpec>)>,
    }

    /// Builds up a single-dex fixture in two passes: callers describe
    /// strings/types/protos/fields/methods/classes with no notion of
    /// file layout, and [DexBuilder::build] works out every offset
    /// afterwards, once it knows the full shape of what it's placing.
    #[derive(Default)]
    pub struct DexBuilder {
        strings: Vec<String>,
        string_index: std::collections::HashMap<String, u32>,
        types: Vec<u32>,
        type_index: std::collections::HashMap<String, u16>,
        protos: Vec<ProtoSpec>,
        fields: Vec<FieldSpec>,
        methods: Vec<MethodSpec>,
        classes: Vec<ClassSpec>,
    }

    impl DexBuilder {
        pub fn new() -> DexBuilder {
            DexBuilder::default()
        }

        pub fn intern_string(&mut self, s: &str) -> u32 {
            if let Some(&idx) = self.string_index.get(s) {
                return idx;
            }
            let idx = self.strings.len() as u32;
            self.strings.push(s.to_string());
            self.string_index.insert(s.to_string(), idx);
            idx
        }

        pub fn intern_type(&mut self, descriptor: &str) -> u16 {
            if let Some(&idx) = self.type_index.get(descriptor) {
                return idx;
            }
            let string_idx = self.intern_string(descriptor);
            let idx = self.types.len() as u16;
            self.types.push(string_idx);
            self.type_index.insert(descriptor.to_string(), idx);
            idx
        }

        /// `shorty` is the short-form descriptor (`"V"`, `"VL"`, ...);
        /// `params` are full type descriptors, excluding the return type.
        pub fn add_proto(&mut self, shorty: &str, return_type: &str, params: &[&str]) -> u16 {
            let shorty_idx = self.intern_string(shorty);
            let return_type_idx = self.intern_type(return_type) as u32;
            let params: Vec<u16> = params.iter().map(|p| self.intern_type(p)).collect();
            let idx = self.protos.len() as u16;
            self.protos.push(ProtoSpec { shorty_idx, return_type_idx, params });
            idx
        }

        pub fn add_field(&mut self, class_idx: u16, type_idx: u16, name: &str) -> u32 {
            let name_idx = self.intern_string(name);
            let idx = self.fields.len() as u32;
            self.fields.push(FieldSpec { class_idx, type_idx, name_idx });
            idx
        }

        pub fn add_method(&mut self, class_idx: u16, proto_idx: u16, name: &str) -> u32 {
            let name_idx = self.intern_string(name);
            let idx = self.methods.len() as u32;
            self.methods.push(MethodSpec { class_idx, proto_idx, name_idx });
            idx
        }

        /// `superclass_idx` is a type index, or [NO_INDEX] for a root
        /// class. Returns a handle used by the `add_*_method`/`add_*_field`
        /// calls below.
        pub fn add_class(&mut self, class_idx: u16, access_flags: u32, superclass_idx: u32) -> usize {
            let idx = self.classes.len();
            self.classes.push(ClassSpec {
                class_idx: class_idx as u32,
                access_flags,
                superclass_idx,
                ..Default::default()
            });
            idx
        }

        pub fn add_instance_field(&mut self, class: usize, field_id: u32, access_flags: u32) {
            self.classes[class].instance_fields.push((field_id, access_flags));
        }

        pub fn add_static_field(&mut self, class: usize, field_id: u32, access_flags: u32) {
            self.classes[class].static_fields.push((field_id, access_flags));
        }

        pub fn add_direct_method(&mut self, class: usize, method_id: u32, access_flags: u32, code: Option<CodeSpec>) {
            self.classes[class].direct_methods.push((method_id, access_flags, code));
        }

        pub fn add_virtual_method(&mut self, class: usize, method_id: u32, access_flags: u32, code: Option<CodeSpec>) {
            self.classes[class].virtual_methods.push((method_id, access_flags, code));
        }

        pub fn build(self) -> Dex {
            let string_ids_size = self.strings.len() as u32;
            let type_ids_size = self.types.len() as u32;
            let proto_ids_size = self.protos.len() as u32;
            let field_ids_size = self.fields.len() as u32;
            let method_ids_size = self.methods.len() as u32;
            let class_defs_size = self.classes.len() as u32;

            let data_start = HEADER_SIZE
                + 4 * string_ids_size
                + 4 * type_ids_size
                + 12 * proto_ids_size
                + 8 * field_ids_size
                + 8 * method_ids_size
                + 32 * class_defs_size;

            let mut data: Vec<u8> = Vec::new();

            // string_data_item per interned string: uleb128(utf16 size)
            // then raw bytes. Every descriptor/name used here is ASCII,
            // so byte length and utf16 code-unit count coincide and the
            // bytes are already valid mutf-8.
            let mut string_offsets = Vec::with_capacity(self.strings.len());
            for s in &self.strings {
                string_offsets.push(data_start + data.len() as u32);
                write_uleb128(&mut data, s.chars().count() as u32);
                data.extend_from_slice(s.as_bytes());
            }

            // proto parameter type_lists.
            let mut proto_params_off = Vec::with_capacity(self.protos.len());
            for proto in &self.protos {
                if proto.params.is_empty() {
                    proto_params_off.push(0u32);
                    continue;
                }
                proto_params_off.push(data_start + data.len() as u32);
                data.extend_from_slice(&(proto.params.len() as u32).to_le_bytes());
                for &t in &proto.params {
                    data.extend_from_slice(&t.to_le_bytes());
                }
            }

            // class interface type_lists.
            let mut class_interfaces_off = Vec::with_capacity(self.classes.len());
            for class in &self.classes {
                if class.interfaces.is_empty() {
                    class_interfaces_off.push(0u32);
                    continue;
                }
                class_interfaces_off.push(data_start + data.len() as u32);
                data.extend_from_slice(&(class.interfaces.len() as u32).to_le_bytes());
                for &t in &class.interfaces {
                    data.extend_from_slice(&t.to_le_bytes());
                }
            }

            // code_items, recording each method's offset so class_data
            // can reference it.
            let mut direct_code_off: Vec<Vec<u32>> = Vec::with_capacity(self.classes.len());
            let mut virtual_code_off: Vec<Vec<u32>> = Vec::with_capacity(self.classes.len());
            for class in &self.classes {
                let mut direct = Vec::with_capacity(class.direct_methods.len());
                for (_, _, code) in &class.direct_methods {
                    direct.push(write_code_item(&mut data, data_start, code.as_ref()));
                }
                direct_code_off.push(direct);

                let mut virt = Vec::with_capacity(class.virtual_methods.len());
                for (_, _, code) in &class.virtual_methods {
                    virt.push(write_code_item(&mut data, data_start, code.as_ref()));
                }
                virtual_code_off.push(virt);
            }

            // class_data_items.
            let mut class_data_off = Vec::with_capacity(self.classes.len());
            for (ci, class) in self.classes.iter().enumerate() {
                if class.static_fields.is_empty()
                    && class.instance_fields.is_empty()
                    && class.direct_methods.is_empty()
                    && class.virtual_methods.is_empty()
                {
                    class_data_off.push(0u32);
                    continue;
                }
                class_data_off.push(data_start + data.len() as u32);

                write_uleb128(&mut data, class.static_fields.len() as u32);
                write_uleb128(&mut data, class.instance_fields.len() as u32);
                write_uleb128(&mut data, class.direct_methods.len() as u32);
                write_uleb128(&mut data, class.virtual_methods.len() as u32);

                encode_fields(&mut data, &class.static_fields);
                encode_fields(&mut data, &class.instance_fields);
                encode_methods(&mut data, &class.direct_methods, &direct_code_off[ci]);
                encode_methods(&mut data, &class.virtual_methods, &virtual_code_off[ci]);
            }

            // Fixed arrays, now that every offset they reference is known.
            let mut fixed = Vec::new();
            for &s in &string_offsets {
                fixed.extend_from_slice(&s.to_le_bytes());
            }
            for &t in &self.types {
                fixed.extend_from_slice(&t.to_le_bytes());
            }
            for (i, proto) in self.protos.iter().enumerate() {
                fixed.extend_from_slice(&proto.shorty_idx.to_le_bytes());
                fixed.extend_from_slice(&proto.return_type_idx.to_le_bytes());
                fixed.extend_from_slice(&proto_params_off[i].to_le_bytes());
            }
            for field in &self.fields {
                fixed.extend_from_slice(&field.class_idx.to_le_bytes());
                fixed.extend_from_slice(&field.type_idx.to_le_bytes());
                fixed.extend_from_slice(&field.name_idx.to_le_bytes());
            }
            for method in &self.methods {
                fixed.extend_from_slice(&method.class_idx.to_le_bytes());
                fixed.extend_from_slice(&method.proto_idx.to_le_bytes());
                fixed.extend_from_slice(&method.name_idx.to_le_bytes());
            }
            for (i, class) in self.classes.iter().enumerate() {
                fixed.extend_from_slice(&class.class_idx.to_le_bytes());
                fixed.extend_from_slice(&class.access_flags.to_le_bytes());
                fixed.extend_from_slice(&class.superclass_idx.to_le_bytes());
                fixed.extend_from_slice(&class_interfaces_off[i].to_le_bytes());
                fixed.extend_from_slice(&NO_INDEX.to_le_bytes()); // source_file_idx
                fixed.extend_from_slice(&0u32.to_le_bytes()); // annotations_off
                fixed.extend_from_slice(&class_data_off[i].to_le_bytes());
                fixed.extend_from_slice(&0u32.to_le_bytes()); // static_values_off
            }

            let total_len = HEADER_SIZE as usize + fixed.len() + data.len();

            let mut header = Vec::with_capacity(HEADER_SIZE as usize);
            header.extend_from_slice(b"dex\n035\0");
            header.extend_from_slice(&0u32.to_le_bytes()); // checksum, unverified by these tests
            header.extend_from_slice(&[0u8; 20]); // signature
            header.extend_from_slice(&(total_len as u32).to_le_bytes()); // file_size
            header.extend_from_slice(&HEADER_SIZE.to_le_bytes()); // header_size
            header.extend_from_slice(&offload_dex::dex::ENDIAN_CONSTANT.to_le_bytes());
            header.extend_from_slice(&0u32.to_le_bytes()); // link_size
            header.extend_from_slice(&0u32.to_le_bytes()); // link_off
            // map_off strictly past the end of the file so the parser's
            // `data.get(map_off..)` misses and short-circuits to an
            // empty map_list rather than failing a read on an empty slice.
            header.extend_from_slice(&(total_len as u32 + 1).to_le_bytes());

            let mut off = HEADER_SIZE;
            header.extend_from_slice(&string_ids_size.to_le_bytes());
            header.extend_from_slice(&off.to_le_bytes());
            off += 4 * string_ids_size;
            header.extend_from_slice(&type_ids_size.to_le_bytes());
            header.extend_from_slice(&off.to_le_bytes());
            off += 4 * type_ids_size;
            header.extend_from_slice(&proto_ids_size.to_le_bytes());
            header.extend_from_slice(&off.to_le_bytes());
            off += 12 * proto_ids_size;
            header.extend_from_slice(&field_ids_size.to_le_bytes());
            header.extend_from_slice(&off.to_le_bytes());
            off += 8 * field_ids_size;
            header.extend_from_slice(&method_ids_size.to_le_bytes());
            header.extend_from_slice(&off.to_le_bytes());
            off += 8 * method_ids_size;
            header.extend_from_slice(&class_defs_size.to_le_bytes());
            header.extend_from_slice(&off.to_le_bytes());
            off += 32 * class_defs_size;
            debug_assert_eq!(off, data_start);

            header.extend_from_slice(&(data.len() as u32).to_le_bytes()); // data_size
            header.extend_from_slice(&data_start.to_le_bytes()); // data_off

            debug_assert_eq!(header.len(), HEADER_SIZE as usize);

            let mut bytes = Vec::with_capacity(total_len);
            bytes.extend_from_slice(&header);
            bytes.extend_from_slice(&fixed);
            bytes.extend_from_slice(&data);

            Dex::new(bytes).expect("fixture dex must parse")
        }
    }

    fn write_code_item(data: &mut Vec<u8>, data_start: u32, code: Option<&CodeSpec>) -> u32 {
        let Some(code) = code else { return 0 };
        let off = data_start + data.len() as u32;
        data.extend_from_slice(&code.registers_size.to_le_bytes());
        data.extend_from_slice(&code.ins_size.to_le_bytes());
        data.extend_from_slice(&code.outs_size.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes()); // tries_size
        data.extend_from_slice(&0u32.to_le_bytes()); // debug_info_off
        data.extend_from_slice(&(code.insns.len() as u32).to_le_bytes());
        for &unit in &code.insns {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        off
    }

    fn encode_fields(data: &mut Vec<u8>, fields: &[(u32, u32)]) {
        let mut sorted = fields.to_vec();
        sorted.sort_by_key(|&(id, _)| id);
        let mut prev = 0u32;
        for (id, access_flags) in sorted {
            write_uleb128(data, id - prev);
            write_uleb128(data, access_flags);
            prev = id;
        }
    }

    fn encode_methods(data: &mut Vec<u8>, methods: &[(u32, u32, Option<CodeSpec>)], code_off: &[u32]) {
        let mut sorted: Vec<(u32, u32, u32)> =
            methods.iter().zip(code_off.iter()).map(|((id, af, _), &off)| (*id, *af, off)).collect();
        sorted.sort_by_key(|&(id, _, _)| id);
        let mut prev = 0u32;
        for (id, access_flags, code_off) in sorted {
            write_uleb128(data, id - prev);
            write_uleb128(data, access_flags);
            write_uleb128(data, code_off);
            prev = id;
        }
    }

    /// Dalvik instruction encoders mirroring `RawInstruction::decode`'s
    /// bit-packing exactly, in the opposite direction.
    pub mod insn {
        pub fn op10x(op: u8) -> Vec<u16> {
            vec![op as u16]
        }

        pub fn op11x(op: u8, a: u8) -> Vec<u16> {
            vec![((a as u16) << 8) | op as u16]
        }

        pub fn op22c(op: u8, a: u8, c: u8, idx: u16) -> Vec<u16> {
            let hi = ((c as u16 & 0xf) << 4) | (a as u16 & 0xf);
            vec![(hi << 8) | op as u16, idx]
        }

        pub fn op21c(op: u8, a: u8, idx: u16) -> Vec<u16> {
            vec![((a as u16) << 8) | op as u16, idx]
        }

        pub fn op21t(op: u8, a: u8, offset: i16) -> Vec<u16> {
            vec![((a as u16) << 8) | op as u16, offset as u16]
        }

        pub fn op35c(op: u8, regs: &[u8], method_idx: u16) -> Vec<u16> {
            let count = regs.len() as u16;
            let g = 0u16;
            let hi0 = (count << 4) | g;
            let cu0 = (hi0 << 8) | op as u16;
            let mut r = [0u16; 4];
            for (i, &reg) in regs.iter().enumerate().take(4) {
                r[i] = reg as u16;
            }
            let cu2 = (r[3] << 12) | (r[2] << 8) | (r[1] << 4) | r[0];
            vec![cu0, method_idx, cu2]
        }
    }
}

use dexbuilder::{insn, CodeSpec, DexBuilder};
use offload_dex::dex::NO_INDEX;
use offload_dex::link::Linker;
use offload_analyzer::context::AnalyzerContext;
use offload_analyzer::{driver, AnalyzerConfig};

const ACC_PUBLIC: u32 = 0x1;
const ACC_PRIVATE: u32 = 0x2;
const ACC_STATIC: u32 = 0x8;

const OP_RETURN_VOID: u8 = 0x0e;
const OP_IGET: u8 = 0x52;
const OP_IGET_OBJECT: u8 = 0x54;
const OP_SGET: u8 = 0x60;
const OP_IF_EQZ: u8 = 0x38;
const OP_INVOKE_VIRTUAL: u8 = 0x6e;
const OP_INVOKE_STATIC: u8 = 0x71;

fn concat(parts: Vec<Vec<u16>>) -> Vec<u16> {
    parts.into_iter().flatten().collect()
}

#[test]
fn s1_single_field_read() {
    let mut b = DexBuilder::new();
    let t_int = b.intern_type("I");
    let t_s1 = b.intern_type("Lcom/example/S1;");
    let p_void = b.add_proto("V", "V", &[]);
    let f_a = b.add_field(t_s1, t_int, "a");
    let m_read = b.add_method(t_s1, p_void, "read");

    let c_s1 = b.add_class(t_s1, ACC_PUBLIC, NO_INDEX);
    let code = CodeSpec {
        registers_size: 2,
        ins_size: 1,
        outs_size: 0,
        insns: concat(vec![insn::op22c(OP_IGET, 0, 1, f_a as u16), insn::op10x(OP_RETURN_VOID)]),
    };
    b.add_direct_method(c_s1, m_read, ACC_PRIVATE, Some(code));

    let dex = b.build();
    let mut linker = Linker::new();
    linker.add_dex(dex);
    let class = linker.link_class("Lcom/example/S1;").unwrap();
    let method = linker.class(class).direct_methods[0];

    let mut ctx = AnalyzerContext::new(linker, AnalyzerConfig::default());
    let ma = driver::analyze_method(&mut ctx, method).unwrap();

    assert_eq!(ma.args.len(), 1, "only the receiver is an object parameter");
    let receiver = ma.args[0];
    assert!(ma.arena.get(receiver).field_set.contains_key(&f_a), "iget must touch field `a` on the receiver");
}

#[test]
fn s2_chained_dereference() {
    let mut b = DexBuilder::new();
    let t_int = b.intern_type("I");
    let t_s2 = b.intern_type("Lcom/example/S2;");
    let p_void = b.add_proto("V", "V", &[]);
    let f_a = b.add_field(t_s2, t_s2, "a");
    let f_b = b.add_field(t_s2, t_int, "b");
    let m_chain = b.add_method(t_s2, p_void, "chain");

    let c_s2 = b.add_class(t_s2, ACC_PUBLIC, NO_INDEX);
    let code = CodeSpec {
        registers_size: 3,
        ins_size: 1,
        outs_size: 0,
        insns: concat(vec![
            insn::op22c(OP_IGET_OBJECT, 0, 2, f_a as u16), // v0 = receiver.a
            insn::op22c(OP_IGET, 1, 0, f_b as u16),        // v1 = v0.b
            insn::op10x(OP_RETURN_VOID),
        ]),
    };
    b.add_direct_method(c_s2, m_chain, ACC_PRIVATE, Some(code));

    let dex = b.build();
    let mut linker = Linker::new();
    linker.add_dex(dex);
    let class = linker.link_class("Lcom/example/S2;").unwrap();
    let method = linker.class(class).direct_methods[0];

    let mut ctx = AnalyzerContext::new(linker, AnalyzerConfig::default());
    let ma = driver::analyze_method(&mut ctx, method).unwrap();

    let receiver = ma.args[0];
    let &a_child = ma.arena.get(receiver).field_set.get(&f_a).expect("receiver.a must be touched");
    assert!(ma.arena.get(a_child).field_set.contains_key(&f_b), "receiver.a.b must be touched through the loaded object");
}

#[test]
fn s3_null_check_branch_then_dereference() {
    let mut b = DexBuilder::new();
    let t_int = b.intern_type("I");
    let t_s3 = b.intern_type("Lcom/example/S3;");
    let p_void = b.add_proto("V", "V", &[]);
    let f_a = b.add_field(t_s3, t_s3, "a");
    let f_b = b.add_field(t_s3, t_int, "b");
    let m_guarded = b.add_method(t_s3, p_void, "guarded");

    let c_s3 = b.add_class(t_s3, ACC_PUBLIC, NO_INDEX);
    // v2 = receiver (ins), v0/v1 scratch.
    // off0: v0 = receiver.a
    // off2: if-eqz v0, +4 (skip straight to return-void at off6)
    // off4: v1 = v0.b
    // off6: return-void
    let code = CodeSpec {
        registers_size: 3,
        ins_size: 1,
        outs_size: 0,
        insns: concat(vec![
            insn::op22c(OP_IGET_OBJECT, 0, 2, f_a as u16),
            insn::op21t(OP_IF_EQZ, 0, 4),
            insn::op22c(OP_IGET, 1, 0, f_b as u16),
            insn::op10x(OP_RETURN_VOID),
        ]),
    };
    b.add_direct_method(c_s3, m_guarded, ACC_PRIVATE, Some(code));

    let dex = b.build();
    let mut linker = Linker::new();
    linker.add_dex(dex);
    let class = linker.link_class("Lcom/example/S3;").unwrap();
    let method = linker.class(class).direct_methods[0];

    let mut ctx = AnalyzerContext::new(linker, AnalyzerConfig::default());
    let ma = driver::analyze_method(&mut ctx, method).unwrap();

    let receiver = ma.args[0];
    let &a_child = ma.arena.get(receiver).field_set.get(&f_a).expect("receiver.a is touched on every path");
    assert!(
        ma.arena.get(a_child).field_set.contains_key(&f_b),
        "the fallthrough branch's dereference of a.b must still land in the joined graph"
    );
}

#[test]
fn s4_virtual_dispatch_combines_overrides() {
    let mut b = DexBuilder::new();
    let t_void = b.intern_type("V");
    let t_int = b.intern_type("I");
    let t_base = b.intern_type("Lcom/example/Base;");
    let t_d1 = b.intern_type("Lcom/example/Derived1;");
    let t_d2 = b.intern_type("Lcom/example/Derived2;");
    let t_caller = b.intern_type("Lcom/example/Caller;");
    let _ = t_void;

    let p_touch = b.add_proto("V", "V", &[]);
    let p_call_touch = b.add_proto("VL", "V", &["Lcom/example/Base;"]);

    let m_base_touch = b.add_method(t_base, p_touch, "touch");
    let m_d1_touch = b.add_method(t_d1, p_touch, "touch");
    let m_d2_touch = b.add_method(t_d2, p_touch, "touch");
    let m_call_touch = b.add_method(t_caller, p_call_touch, "callTouch");

    let f_d1 = b.add_field(t_d1, t_int, "d1");
    // A leading padding field on Derived2 pushes `d2` to a different
    // per-class instance offset than `d1`, so the two overrides'
    // touches land on distinct `field_set` keys (§4.3: instance field
    // indices are word offsets within the hierarchy, reset per branch).
    let f_d2_pad = b.add_field(t_d2, t_int, "pad");
    let f_d2 = b.add_field(t_d2, t_int, "d2");

    let c_base = b.add_class(t_base, ACC_PUBLIC, NO_INDEX);
    b.add_virtual_method(
        c_base,
        m_base_touch,
        ACC_PUBLIC,
        Some(CodeSpec { registers_size: 1, ins_size: 1, outs_size: 0, insns: insn::op10x(OP_RETURN_VOID) }),
    );

    let c_d1 = b.add_class(t_d1, ACC_PUBLIC, t_base as u32);
    b.add_instance_field(c_d1, f_d1, ACC_PRIVATE);
    b.add_virtual_method(
        c_d1,
        m_d1_touch,
        ACC_PUBLIC,
        Some(CodeSpec {
            registers_size: 2,
            ins_size: 1,
            outs_size: 0,
            insns: concat(vec![insn::op22c(OP_IGET, 0, 1, f_d1 as u16), insn::op10x(OP_RETURN_VOID)]),
        }),
    );

    let c_d2 = b.add_class(t_d2, ACC_PUBLIC, t_base as u32);
    b.add_instance_field(c_d2, f_d2_pad, ACC_PRIVATE);
    b.add_instance_field(c_d2, f_d2, ACC_PRIVATE);
    b.add_virtual_method(
        c_d2,
        m_d2_touch,
        ACC_PUBLIC,
        Some(CodeSpec {
            registers_size: 2,
            ins_size: 1,
            outs_size: 0,
            insns: concat(vec![insn::op22c(OP_IGET, 0, 1, f_d2 as u16), insn::op10x(OP_RETURN_VOID)]),
        }),
    );

    let c_caller = b.add_class(t_caller, ACC_PUBLIC, NO_INDEX);
    let call_code = CodeSpec {
        registers_size: 1,
        ins_size: 1,
        outs_size: 1,
        insns: concat(vec![
            insn::op35c(OP_INVOKE_VIRTUAL, &[0], m_base_touch as u16),
            insn::op10x(OP_RETURN_VOID),
        ]),
    };
    b.add_direct_method(c_caller, m_call_touch, ACC_PUBLIC | ACC_STATIC, Some(call_code));

    let dex = b.build();
    let mut linker = Linker::new();
    linker.add_dex(dex);

    // Subclasses must be linked before `Base`'s dispatch is enumerated
    // so `Linker::find_subclasses` already knows about them.
    linker.link_class("Lcom/example/Derived1;").unwrap();
    linker.link_class("Lcom/example/Derived2;").unwrap();
    let caller_class = linker.link_class("Lcom/example/Caller;").unwrap();
    let call_method = linker.class(caller_class).direct_methods[0];

    let mut ctx = AnalyzerContext::new(linker, AnalyzerConfig::default());
    let ma = driver::analyze_method(&mut ctx, call_method).unwrap();

    // field_set is keyed by the linker's canonical per-hierarchy field
    // index (§4.3), not the dex file's raw field_ids slot, so look up
    // the same index the interpreter itself would have resolved.
    let dex = ctx.linker.method(call_method).dex;
    let d1_field = ctx.linker.resolve_instance_field(dex, f_d1).unwrap();
    let d2_field = ctx.linker.resolve_instance_field(dex, f_d2).unwrap();
    let d1_index = ctx.linker.field(d1_field).index;
    let d2_index = ctx.linker.field(d2_field).index;
    assert_ne!(d1_index, d2_index, "the two overrides' fields must land on distinct offsets");

    let param = ma.args[0];
    let fields = &ma.arena.get(param).field_set;
    assert!(fields.contains_key(&d1_index), "Derived1's override must contribute its field touch");
    assert!(fields.contains_key(&d2_index), "Derived2's override must contribute its field touch");
}

#[test]
fn s5_recursion_widens_object_arg() {
    let mut b = DexBuilder::new();
    let t_int = b.intern_type("I");
    let t_node = b.intern_type("Lcom/example/Node;");
    let t_s5 = b.intern_type("Lcom/example/S5;");

    let p_recurse = b.add_proto("VIL", "V", &["I", "Lcom/example/Node;"]);
    let m_recurse = b.add_method(t_s5, p_recurse, "recurse");
    let _ = b.add_class(t_node, ACC_PUBLIC, NO_INDEX);

    let c_s5 = b.add_class(t_s5, ACC_PUBLIC, NO_INDEX);
    // static recurse(int n, Node o): v1 = n, v2 = o, v0 scratch.
    let code = CodeSpec {
        registers_size: 3,
        ins_size: 2,
        outs_size: 2,
        insns: concat(vec![
            insn::op35c(OP_INVOKE_STATIC, &[1, 2], m_recurse as u16),
            insn::op10x(OP_RETURN_VOID),
        ]),
    };
    b.add_direct_method(c_s5, m_recurse, ACC_PUBLIC | ACC_STATIC, Some(code));

    let dex = b.build();
    let mut linker = Linker::new();
    linker.add_dex(dex);
    let class = linker.link_class("Lcom/example/S5;").unwrap();
    let method = linker.class(class).direct_methods[0];

    let mut ctx = AnalyzerContext::new(linker, AnalyzerConfig::default());
    let ma = driver::analyze_method(&mut ctx, method).unwrap();

    assert_eq!(ma.args.len(), 1, "the int parameter contributes no node, only the object does");
    let object_param = ma.args[0];
    assert!(ma.arena.get(object_param).all_flag, "self-recursion must widen the object argument rather than loop forever");
}

#[test]
fn s6_static_field_reads() {
    let mut b = DexBuilder::new();
    let t_int = b.intern_type("I");
    let t_s6 = b.intern_type("Lcom/example/S6;");
    let p_void = b.add_proto("V", "V", &[]);
    let f_sx = b.add_field(t_s6, t_int, "sx");
    let f_sy = b.add_field(t_s6, t_int, "sy");
    let m_read_both = b.add_method(t_s6, p_void, "readBoth");

    let c_s6 = b.add_class(t_s6, ACC_PUBLIC, NO_INDEX);
    b.add_static_field(c_s6, f_sx, ACC_PRIVATE | ACC_STATIC);
    b.add_static_field(c_s6, f_sy, ACC_PRIVATE | ACC_STATIC);
    let code = CodeSpec {
        registers_size: 1,
        ins_size: 0,
        outs_size: 0,
        insns: concat(vec![
            insn::op21c(OP_SGET, 0, f_sx as u16),
            insn::op21c(OP_SGET, 0, f_sy as u16),
            insn::op10x(OP_RETURN_VOID),
        ]),
    };
    b.add_direct_method(c_s6, m_read_both, ACC_PUBLIC | ACC_STATIC, Some(code));

    let dex = b.build();
    let mut linker = Linker::new();
    linker.add_dex(dex);
    let class = linker.link_class("Lcom/example/S6;").unwrap();
    let method = linker.class(class).direct_methods[0];

    let mut ctx = AnalyzerContext::new(linker, AnalyzerConfig::default());
    let ma = driver::analyze_method(&mut ctx, method).unwrap();

    assert!(ma.args.is_empty(), "a static method with no object parameters binds no argument roots");
    assert_eq!(ma.global_classes.len(), 1, "both static fields belong to the one class root");
    let owner = *ma.global_classes.values().next().unwrap();
    let fields = &ma.arena.get(owner).field_set;
    assert!(fields.contains_key(&f_sx));
    assert!(fields.contains_key(&f_sy));
}
