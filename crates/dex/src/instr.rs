//! Generic decoding of the Dalvik instruction stream inside a
//! [crate::dex::CodeItem].
//!
//! This mirrors the shape of Dalvik's own `DecodedInstruction` (a handful
//! of generic `vA`/`vB`/`vC`/`arg[5]` slots filled in per instruction
//! format) rather than one enum variant per opcode: the semantic meaning
//! of an opcode is layered on top by the interpreter, which only needs to
//! know the format-driven shape of the operands.
//!
//! See: <https://source.android.com/docs/core/runtime/dex-format#instructions>

use crate::errors::DexError;

/// One of the fixed instruction layouts the dex format defines. The
/// variant name follows the format identifiers used in the dex format
/// reference (`10x`, `22c`, `35c`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Fmt10x,
    Fmt12x,
    Fmt11n,
    Fmt11x,
    Fmt10t,
    Fmt20t,
    Fmt22x,
    Fmt21t,
    Fmt21s,
    Fmt21h,
    Fmt21c,
    Fmt23x,
    Fmt22b,
    Fmt22t,
    Fmt22s,
    Fmt22c,
    Fmt30t,
    Fmt32x,
    Fmt31i,
    Fmt31t,
    Fmt31c,
    Fmt35c,
    Fmt3rc,
    Fmt45cc,
    Fmt4rcc,
    Fmt51l,
}

impl Format {
    /// Width of an instruction in this format, in 16-bit code units.
    pub const fn width(self) -> u32 {
        match self {
            Format::Fmt10x
            | Format::Fmt12x
            | Format::Fmt11n
            | Format::Fmt11x
            | Format::Fmt10t => 1,
            Format::Fmt20t
            | Format::Fmt22x
            | Format::Fmt21t
            | Format::Fmt21s
            | Format::Fmt21h
            | Format::Fmt21c
            | Format::Fmt23x
            | Format::Fmt22b
            | Format::Fmt22t
            | Format::Fmt22s
            | Format::Fmt22c => 2,
            Format::Fmt30t
            | Format::Fmt32x
            | Format::Fmt31i
            | Format::Fmt31t
            | Format::Fmt31c
            | Format::Fmt35c
            | Format::Fmt3rc => 3,
            Format::Fmt45cc | Format::Fmt4rcc => 4,
            Format::Fmt51l => 5,
        }
    }
}

/// Maps an opcode byte to its fixed instruction format.
///
/// Opcodes `0xe3..=0xf9` are reserved for ODEX "quickened" instructions
/// that never appear in an unoptimized dex file; they decode as `Fmt10x`
/// (one code unit, no operands) purely so a stray occurrence still
/// advances the program counter rather than panicking.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#opcodes>
pub const fn format_of(opcode: u8) -> Format {
    match opcode {
        0x00 => Format::Fmt10x,
        0x01 | 0x04 | 0x07 => Format::Fmt12x,
        0x02 | 0x05 | 0x08 => Format::Fmt22x,
        0x03 | 0x06 | 0x09 => Format::Fmt32x,
        0x0a..=0x0d => Format::Fmt11x,
        0x0e => Format::Fmt10x,
        0x0f..=0x11 => Format::Fmt11x,
        0x12 => Format::Fmt11n,
        0x13 | 0x16 => Format::Fmt21s,
        0x14 | 0x17 => Format::Fmt31i,
        0x15 | 0x19 => Format::Fmt21h,
        0x18 => Format::Fmt51l,
        0x1a | 0x1c | 0x1f | 0x22 | 0xfe | 0xff => Format::Fmt21c,
        0x1b => Format::Fmt31c,
        0x1d | 0x1e | 0x27 => Format::Fmt11x,
        0x20 | 0x23 => Format::Fmt22c,
        0x21 => Format::Fmt12x,
        0x24 => Format::Fmt35c,
        0x25 => Format::Fmt3rc,
        0x26 | 0x2b | 0x2c => Format::Fmt31t,
        0x28 => Format::Fmt10t,
        0x29 => Format::Fmt20t,
        0x2a => Format::Fmt30t,
        0x2d..=0x31 => Format::Fmt23x,
        0x32..=0x37 => Format::Fmt22t,
        0x38..=0x3d => Format::Fmt21t,
        0x3e..=0x43 => Format::Fmt10x,
        0x44..=0x51 => Format::Fmt23x,
        0x52..=0x5f => Format::Fmt22c,
        0x60..=0x6d => Format::Fmt21c,
        0x6e..=0x72 => Format::Fmt35c,
        0x73 => Format::Fmt10x,
        0x74..=0x78 => Format::Fmt3rc,
        0x79 | 0x7a => Format::Fmt10x,
        0x7b..=0x8f => Format::Fmt12x,
        0x90..=0xaf => Format::Fmt23x,
        0xb0..=0xcf => Format::Fmt12x,
        0xd0..=0xd7 => Format::Fmt22s,
        0xd8..=0xe2 => Format::Fmt22b,
        0xe3..=0xf9 => Format::Fmt10x,
        0xfa => Format::Fmt45cc,
        0xfb => Format::Fmt4rcc,
        0xfc => Format::Fmt35c,
        0xfd => Format::Fmt3rc,
    }
}

/// A generic view over a decoded instruction's operands. Not every field
/// is meaningful for every format; the interpreter reads the fields its
/// opcode's format defines and ignores the rest.
#[derive(Debug, Clone, Default)]
pub struct RawInstruction {
    /// Code-unit offset this instruction starts at.
    pub offset: u32,
    /// Width in code units; `offset + width` is the fall-through pc.
    pub width: u32,
    pub opcode: u8,
    pub format: Format,
    /// Primary register operand (dest for most formats).
    pub a: u32,
    /// Secondary operand: a register, or a sign/zero-extended
    /// literal/index/branch-offset depending on format.
    pub b: i64,
    /// Tertiary register operand (used by 22t/22s/22c/22b/23x).
    pub c: u32,
    /// `invoke-kind`/`filled-new-array` argument registers in call order
    /// (up to 5), valid when `format` is `Fmt35c` / `Fmt45cc`.
    pub args: [u8; 5],
    pub arg_count: u8,
    /// First register of a contiguous range, valid for `Fmt3rc`/`Fmt4rcc`.
    pub range_base: u16,
    pub range_count: u16,
}

impl RawInstruction {
    /// Reads one instruction starting at code-unit offset `pc`.
    pub fn decode(insns: &[u16], pc: u32) -> Result<RawInstruction, DexError> {
        let cu0 = *insns.get(pc as usize).ok_or(DexError::InstructionError)?;
        let opcode = (cu0 & 0xff) as u8;
        let hi0 = (cu0 >> 8) as u8;
        let format = format_of(opcode);
        let width = format.width();
        if insns.len() < (pc + width) as usize {
            return Err(DexError::InstructionError);
        }
        let cu = |i: u32| -> u16 { insns[(pc + i) as usize] };

        let mut insn = RawInstruction {
            offset: pc,
            width,
            opcode,
            format,
            ..Default::default()
        };

        match format {
            Format::Fmt10x => {}
            Format::Fmt12x | Format::Fmt11n => {
                insn.a = (hi0 & 0x0f) as u32;
                insn.b = ((hi0 >> 4) & 0x0f) as i64;
                if format == Format::Fmt11n {
                    insn.b = sign_extend_nibble(hi0 >> 4);
                }
            }
            Format::Fmt11x => {
                insn.a = hi0 as u32;
            }
            Format::Fmt10t => {
                insn.b = (hi0 as i8) as i64;
            }
            Format::Fmt20t => {
                insn.b = (cu(1) as i16) as i64;
            }
            Format::Fmt22x => {
                insn.a = hi0 as u32;
                insn.b = cu(1) as i64;
            }
            Format::Fmt21t | Format::Fmt21s => {
                insn.a = hi0 as u32;
                insn.b = (cu(1) as i16) as i64;
            }
            Format::Fmt21h => {
                insn.a = hi0 as u32;
                // high16/high32 forms: the literal's low bits are zero,
                // the 16-bit payload supplies the top bits.
                insn.b = (cu(1) as i64) << 16;
            }
            Format::Fmt21c => {
                insn.a = hi0 as u32;
                insn.b = cu(1) as i64;
            }
            Format::Fmt23x => {
                insn.a = hi0 as u32;
                let cu1 = cu(1);
                insn.b = (cu1 & 0xff) as i64;
                insn.c = (cu1 >> 8) as u32;
            }
            Format::Fmt22b => {
                insn.a = hi0 as u32;
                let cu1 = cu(1);
                insn.b = (cu1 & 0xff) as i64;
                // sign-extended 8-bit literal, stored as its bit pattern;
                // read back via `insn.c as i32`.
                insn.c = ((cu1 >> 8) as i8) as u32;
            }
            Format::Fmt22t | Format::Fmt22s | Format::Fmt22c => {
                insn.a = (hi0 & 0x0f) as u32;
                insn.c = ((hi0 >> 4) & 0x0f) as u32;
                match format {
                    Format::Fmt22t => insn.b = (cu(1) as i16) as i64,
                    Format::Fmt22s => insn.b = (cu(1) as i16) as i64,
                    Format::Fmt22c => insn.b = cu(1) as i64,
                    _ => unreachable!(),
                }
            }
            Format::Fmt30t => {
                insn.b = join_u32(cu(1), cu(2)) as i32 as i64;
            }
            Format::Fmt32x => {
                insn.a = cu(1) as u32;
                insn.b = cu(2) as i64;
            }
            Format::Fmt31i | Format::Fmt31c => {
                insn.a = hi0 as u32;
                insn.b = join_u32(cu(1), cu(2)) as i64;
            }
            Format::Fmt31t => {
                insn.a = hi0 as u32;
                insn.b = join_u32(cu(1), cu(2)) as i32 as i64;
            }
            Format::Fmt35c => {
                let a_count = (hi0 >> 4) & 0x0f;
                let g = hi0 & 0x0f;
                insn.b = cu(1) as i64; // method/type idx
                let cu2 = cu(2);
                let c_reg = (cu2 & 0x0f) as u8;
                let d_reg = ((cu2 >> 4) & 0x0f) as u8;
                let e_reg = ((cu2 >> 8) & 0x0f) as u8;
                let f_reg = ((cu2 >> 12) & 0x0f) as u8;
                insn.args = [c_reg, d_reg, e_reg, f_reg, g];
                insn.arg_count = a_count;
            }
            Format::Fmt45cc => {
                let a_count = (hi0 >> 4) & 0x0f;
                let g = hi0 & 0x0f;
                insn.b = cu(1) as i64; // method idx
                let cu2 = cu(2);
                let c_reg = (cu2 & 0x0f) as u8;
                let d_reg = ((cu2 >> 4) & 0x0f) as u8;
                let e_reg = ((cu2 >> 8) & 0x0f) as u8;
                let f_reg = ((cu2 >> 12) & 0x0f) as u8;
                insn.args = [c_reg, d_reg, e_reg, f_reg, g];
                insn.arg_count = a_count;
                insn.c = cu(3) as u32; // proto idx
            }
            Format::Fmt3rc => {
                insn.a = hi0 as u32; // count
                insn.b = cu(1) as i64; // method/type idx
                insn.range_base = cu(2);
                insn.range_count = hi0 as u16;
            }
            Format::Fmt4rcc => {
                insn.a = hi0 as u32;
                insn.b = cu(1) as i64;
                insn.range_base = cu(2);
                insn.range_count = hi0 as u16;
                insn.c = cu(3) as u32; // proto idx
            }
            Format::Fmt51l => {
                insn.a = hi0 as u32;
                let lo = join_u32(cu(1), cu(2)) as u64;
                let hi = join_u32(cu(3), cu(4)) as u64;
                insn.b = (lo | (hi << 32)) as i64;
            }
        }

        Ok(insn)
    }
}

#[inline]
fn sign_extend_nibble(n: u8) -> i64 {
    let n = n & 0x0f;
    if n & 0x08 != 0 {
        (n as i64) - 16
    } else {
        n as i64
    }
}

#[inline]
fn join_u32(lo: u16, hi: u16) -> u32 {
    (lo as u32) | ((hi as u32) << 16)
}

/// Decodes the `packed-switch-payload` pseudo-instruction reached via a
/// `packed-switch` instruction's 31t data offset. Returns `(first_key,
/// targets)` where each target is a code-unit offset *relative to the
/// `packed-switch` instruction itself* (already resolved to absolute via
/// the caller's `switch_insn_offset`).
pub fn parse_packed_switch_payload(
    insns: &[u16],
    data_offset: u32,
    switch_insn_offset: u32,
) -> Result<(i32, Vec<i32>), DexError> {
    let ident = *insns.get(data_offset as usize).ok_or(DexError::InstructionError)?;
    if ident != 0x0100 {
        return Err(DexError::InstructionError);
    }
    let size = *insns
        .get(data_offset as usize + 1)
        .ok_or(DexError::InstructionError)? as usize;
    let first_key = join_u32(
        *insns.get(data_offset as usize + 2).ok_or(DexError::InstructionError)?,
        *insns.get(data_offset as usize + 3).ok_or(DexError::InstructionError)?,
    ) as i32;

    let mut targets = Vec::with_capacity(size);
    for i in 0..size {
        let base = data_offset as usize + 4 + i * 2;
        let lo = *insns.get(base).ok_or(DexError::InstructionError)?;
        let hi = *insns.get(base + 1).ok_or(DexError::InstructionError)?;
        let relative = join_u32(lo, hi) as i32;
        targets.push(switch_insn_offset as i32 + relative);
    }
    Ok((first_key, targets))
}

/// Decodes the `sparse-switch-payload` pseudo-instruction. Returns
/// `(key, absolute target)` pairs.
pub fn parse_sparse_switch_payload(
    insns: &[u16],
    data_offset: u32,
    switch_insn_offset: u32,
) -> Result<Vec<(i32, i32)>, DexError> {
    let ident = *insns.get(data_offset as usize).ok_or(DexError::InstructionError)?;
    if ident != 0x0200 {
        return Err(DexError::InstructionError);
    }
    let size = *insns
        .get(data_offset as usize + 1)
        .ok_or(DexError::InstructionError)? as usize;

    let mut keys = Vec::with_capacity(size);
    for i in 0..size {
        let base = data_offset as usize + 2 + i * 2;
        let lo = *insns.get(base).ok_or(DexError::InstructionError)?;
        let hi = *insns.get(base + 1).ok_or(DexError::InstructionError)?;
        keys.push(join_u32(lo, hi) as i32);
    }

    let targets_base = data_offset as usize + 2 + size * 2;
    let mut out = Vec::with_capacity(size);
    for (i, key) in keys.into_iter().enumerate() {
        let base = targets_base + i * 2;
        let lo = *insns.get(base).ok_or(DexError::InstructionError)?;
        let hi = *insns.get(base + 1).ok_or(DexError::InstructionError)?;
        let relative = join_u32(lo, hi) as i32;
        out.push((key, switch_insn_offset as i32 + relative));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_move_12x() {
        // move v1, v2 => opcode 0x01, A=1 (dest), B=2 (src)
        let insns = [0x0201u16];
        let insn = RawInstruction::decode(&insns, 0).unwrap();
        assert_eq!(insn.format, Format::Fmt12x);
        assert_eq!(insn.a, 1);
        assert_eq!(insn.b, 2);
        assert_eq!(insn.width, 1);
    }

    #[test]
    fn decodes_iget_object_22c() {
        // iget-object v0, v1, field@0x0010 => opcode 0x54, A=0, B(obj)=1, field_idx cu = 0x0010
        let insns = [0x1054u16, 0x0010u16];
        let insn = RawInstruction::decode(&insns, 0).unwrap();
        assert_eq!(insn.format, Format::Fmt22c);
        assert_eq!(insn.a, 0);
        assert_eq!(insn.c, 1);
        assert_eq!(insn.b, 0x10);
        assert_eq!(insn.width, 2);
    }

    #[test]
    fn decodes_invoke_virtual_35c() {
        // invoke-virtual {v1, v2}, method@5 => opcode 0x6e, count=2, args=[1,2,0,0,0]
        let insns = [0x206eu16, 0x0005u16, 0x0021u16];
        let insn = RawInstruction::decode(&insns, 0).unwrap();
        assert_eq!(insn.format, Format::Fmt35c);
        assert_eq!(insn.arg_count, 2);
        assert_eq!(insn.b, 5);
        assert_eq!(&insn.args[..2], &[1, 2]);
        assert_eq!(insn.width, 3);
    }

    #[test]
    fn decodes_invoke_virtual_range_3rc() {
        // invoke-virtual/range {v10..v12}, method@7 => opcode 0x74, AA=3, BBBB=7, CCCC=10
        let insns = [0x0374u16, 0x0007u16, 0x000au16];
        let insn = RawInstruction::decode(&insns, 0).unwrap();
        assert_eq!(insn.format, Format::Fmt3rc);
        assert_eq!(insn.range_count, 3);
        assert_eq!(insn.range_base, 10);
        assert_eq!(insn.b, 7);
    }

    #[test]
    fn decodes_goto_10t() {
        // goto +2 => opcode 0x28, AA = 2 (signed)
        let insns = [0x0228u16];
        let insn = RawInstruction::decode(&insns, 0).unwrap();
        assert_eq!(insn.format, Format::Fmt10t);
        assert_eq!(insn.b, 2);
    }

    #[test]
    fn packed_switch_payload_round_trip() {
        // ident, size=2, first_key=0, targets=[4, 6] (relative to switch at offset 10)
        let insns: [u16; 8] = [0x0100, 2, 0, 0, 4, 0, 6, 0];
        let (first_key, targets) = parse_packed_switch_payload(&insns, 0, 10).unwrap();
        assert_eq!(first_key, 0);
        assert_eq!(targets, vec![14, 16]);
    }
}
