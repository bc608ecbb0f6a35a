//! Instruction decoding.
//!
//! [`decode`] is a pure function: a 32-bit word in, a tagged [`Opcode`] out.
//! No I/O, no allocation beyond the variant itself. Opcode ids outside
//! `0..=81` decode to [`Opcode::Unknown`] rather than failing — whether that
//! is fatal is a decision for the lifter, not this layer.

pub mod packing;

use packing::{abc, abx, abzcz, aspec, asbx, opcode_id, Abc, AbzCz, Abx, Aspec, AsBx};

/// Byte length of one instruction word.
pub const INSTRUCTION_LEN: usize = 4;

/// One decoded Rite instruction.
///
/// Variant fields carry only the operands the lifter actually reads;
/// packing bits the lifter never consults (e.g. the unused `C` in `MOVE`)
/// are not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// No-op.
    Nop,
    /// `R(A) = R(B)`.
    Move { a: u16, b: u16 },
    /// `R(A) = Pool(Bx)`.
    Loadl { a: u16, bx: u16 },
    /// `R(A) = sBx` (small integer literal, not a pool index).
    Loadi { a: u16, sbx: i32 },
    /// `R(A) = Sym(Bx)`.
    Loadsym { a: u16, bx: u16 },
    /// `R(A) = nil`.
    Loadnil { a: u16 },
    /// `R(A) = self`.
    Loadself { a: u16 },
    /// `R(A) = true`.
    Loadt { a: u16 },
    /// `R(A) = false`.
    Loadf { a: u16 },
    Getglobal { a: u16, bx: u16 },
    Setglobal { a: u16, bx: u16 },
    Getspecial { a: u16, bx: u16 },
    Setspecial { a: u16, bx: u16 },
    Getiv { a: u16, bx: u16 },
    Setiv { a: u16, bx: u16 },
    Getcv { a: u16, bx: u16 },
    Setcv { a: u16, bx: u16 },
    Getconst { a: u16, bx: u16 },
    Setconst { a: u16, bx: u16 },
    /// `R(A) = A::Sym(Bx)` (`GETMCNST`, outer-class is the current
    /// `R(A)`'s prior value).
    Getmcnst { a: u16, bx: u16 },
    Setmcnst { a: u16, bx: u16 },
    /// Reads an upvalue in parent scope register `b`, written into `R(a)`.
    Getupvar { a: u16, b: u16 },
    /// Writes `R(a)` into an upvalue in parent scope register `b`.
    Setupvar { a: u16, b: u16 },

    /// Unconditional relative jump.
    Jmp { sbx: i32 },
    /// Jump if `R(A)` is truthy.
    Jmpif { a: u16, sbx: i32 },
    /// Jump if `R(A)` is falsy.
    Jmpnot { a: u16, sbx: i32 },
    Onerr { sbx: i32 },
    Rescue { a: u16 },
    Poperr,
    Raise { a: u16 },
    Epush { bx: u16 },
    Epop { a: u16 },

    /// Method call: `R(A) = R(A).Sym(B)(R(A+1)..R(A+C))`.
    Send { a: u16, b: u16, c: u16 },
    /// As `Send`, plus a trailing block argument register at `A+C+1`.
    Sendb { a: u16, b: u16, c: u16 },
    Fsend { a: u16, b: u16, c: u16 },
    Call,
    /// `super(...)`; `c == 0x7f` means "forward the enclosing method's args".
    Super { a: u16, b: u16, c: u16 },
    /// Compiler idiom that should not surface in well-formed input.
    Argary { a: u16, bx: u16 },
    /// Argument-list prologue: decodes into an [`Aspec`].
    Enter { spec: Aspec },
    Karg { a: u16, bx: u16 },
    Kdict { a: u16, bx: u16 },

    /// `B == 0`: value return / next; `B == 1`: break; `B == 2`: also
    /// value-style (explicit `return` keyword in source).
    Return { a: u16, b: u16 },
    Tailcall { a: u16, b: u16 },
    Blkpush { a: u16, bx: u16 },

    Add { a: u16, b: u16 },
    Addi { a: u16, b: u16, c: u16 },
    Sub { a: u16, b: u16 },
    Subi { a: u16, b: u16, c: u16 },
    Mul { a: u16, b: u16 },
    Div { a: u16, b: u16 },
    Eq { a: u16, b: u16 },
    Lt { a: u16, b: u16 },
    Le { a: u16, b: u16 },
    Gt { a: u16, b: u16 },
    Ge { a: u16, b: u16 },

    /// `R(A) = [R(B)..R(B+C)]`.
    Array { a: u16, b: u16, c: u16 },
    /// `R(A).push(*R(B))`.
    Arycat { a: u16, b: u16 },
    /// `R(A) << R(B)`.
    Arypush { a: u16, b: u16 },
    Aref { a: u16, b: u16, c: u16 },
    Aset { a: u16, b: u16, c: u16 },
    Apost { a: u16, b: u16, c: u16 },

    Stringop { a: u16, bx: u16 },
    Strcat { a: u16, b: u16 },

    /// `R(A) = {R(B) => R(B+1), ...}` for `C` pairs.
    Hash { a: u16, b: u16, c: u16 },
    /// Materializes child irep `bz` as a lambda/method body; `cz` carries
    /// strictness flags the lifter does not need to distinguish.
    Lambda { a: u16, bz: u16, cz: u8 },
    /// `R(A) = R(B)..R(B+1)` (or `...` if `c != 0`).
    Range { a: u16, b: u16, c: u16 },

    Oclass { a: u16 },
    /// `class Sym(B) < R(A+1)`, stored into `R(A)`.
    Class { a: u16, b: u16 },
    Module { a: u16, b: u16 },
    /// Executes child irep `bx` as a class/module body.
    Exec { a: u16, bx: u16 },
    /// Finalizes a pending method definition named `Sym(B)` on `R(A)`.
    Method { a: u16, b: u16 },
    Sclass { a: u16 },
    Tclass { a: u16 },

    Debug,
    Stop,
    Err { bx: u16 },

    Rsvd1,
    Rsvd2,
    Rsvd3,
    Rsvd4,
    Rsvd5,
    /// Any opcode id outside the documented `0..=81` range.
    Unknown { word: u32 },
}

/// Decodes a raw instruction word. Infallible: unrecognized ids become
/// [`Opcode::Unknown`].
pub fn decode(word: u32) -> Opcode {
    let id = opcode_id(word);
    match id {
        0 => Opcode::Nop,
        1 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Move { a, b }
        }
        2 => {
            let Abx { a, bx } = abx(word);
            Opcode::Loadl { a, bx }
        }
        3 => {
            let AsBx { a, sbx } = asbx(word);
            Opcode::Loadi { a, sbx }
        }
        4 => {
            let Abx { a, bx } = abx(word);
            Opcode::Loadsym { a, bx }
        }
        5 => Opcode::Loadnil { a: abc(word).a },
        6 => Opcode::Loadself { a: abc(word).a },
        7 => Opcode::Loadt { a: abc(word).a },
        8 => Opcode::Loadf { a: abc(word).a },
        9 => abx_variant(word, |a, bx| Opcode::Getglobal { a, bx }),
        10 => abx_variant(word, |a, bx| Opcode::Setglobal { a, bx }),
        11 => abx_variant(word, |a, bx| Opcode::Getspecial { a, bx }),
        12 => abx_variant(word, |a, bx| Opcode::Setspecial { a, bx }),
        13 => abx_variant(word, |a, bx| Opcode::Getiv { a, bx }),
        14 => abx_variant(word, |a, bx| Opcode::Setiv { a, bx }),
        15 => abx_variant(word, |a, bx| Opcode::Getcv { a, bx }),
        16 => abx_variant(word, |a, bx| Opcode::Setcv { a, bx }),
        17 => abx_variant(word, |a, bx| Opcode::Getconst { a, bx }),
        18 => abx_variant(word, |a, bx| Opcode::Setconst { a, bx }),
        19 => abx_variant(word, |a, bx| Opcode::Getmcnst { a, bx }),
        20 => abx_variant(word, |a, bx| Opcode::Setmcnst { a, bx }),
        21 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Getupvar { a, b }
        }
        22 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Setupvar { a, b }
        }
        23 => Opcode::Jmp { sbx: asbx(word).sbx },
        24 => {
            let AsBx { a, sbx } = asbx(word);
            Opcode::Jmpif { a, sbx }
        }
        25 => {
            let AsBx { a, sbx } = asbx(word);
            Opcode::Jmpnot { a, sbx }
        }
        26 => Opcode::Onerr { sbx: asbx(word).sbx },
        27 => Opcode::Rescue { a: abc(word).a },
        28 => Opcode::Poperr,
        29 => Opcode::Raise { a: abc(word).a },
        30 => Opcode::Epush { bx: abx(word).bx },
        31 => Opcode::Epop { a: abc(word).a },
        32 => {
            let Abc { a, b, c } = abc(word);
            Opcode::Send { a, b, c: c as u16 }
        }
        33 => {
            let Abc { a, b, c } = abc(word);
            Opcode::Sendb { a, b, c: c as u16 }
        }
        34 => {
            let Abc { a, b, c } = abc(word);
            Opcode::Fsend { a, b, c: c as u16 }
        }
        35 => Opcode::Call,
        36 => {
            let Abc { a, b, c } = abc(word);
            Opcode::Super { a, b, c: c as u16 }
        }
        37 => abx_variant(word, |a, bx| Opcode::Argary { a, bx }),
        38 => Opcode::Enter { spec: aspec(word) },
        39 => abx_variant(word, |a, bx| Opcode::Karg { a, bx }),
        40 => abx_variant(word, |a, bx| Opcode::Kdict { a, bx }),
        41 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Return { a, b }
        }
        42 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Tailcall { a, b }
        }
        43 => abx_variant(word, |a, bx| Opcode::Blkpush { a, bx }),
        44 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Add { a, b }
        }
        45 => {
            let Abc { a, b, c } = abc(word);
            Opcode::Addi { a, b, c: c as u16 }
        }
        46 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Sub { a, b }
        }
        47 => {
            let Abc { a, b, c } = abc(word);
            Opcode::Subi { a, b, c: c as u16 }
        }
        48 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Mul { a, b }
        }
        49 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Div { a, b }
        }
        50 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Eq { a, b }
        }
        51 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Lt { a, b }
        }
        52 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Le { a, b }
        }
        53 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Gt { a, b }
        }
        54 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Ge { a, b }
        }
        55 => {
            let Abc { a, b, c } = abc(word);
            Opcode::Array { a, b, c: c as u16 }
        }
        56 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Arycat { a, b }
        }
        57 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Arypush { a, b }
        }
        58 => {
            let Abc { a, b, c } = abc(word);
            Opcode::Aref { a, b, c: c as u16 }
        }
        59 => {
            let Abc { a, b, c } = abc(word);
            Opcode::Aset { a, b, c: c as u16 }
        }
        60 => {
            let Abc { a, b, c } = abc(word);
            Opcode::Apost { a, b, c: c as u16 }
        }
        61 => {
            let Abx { a, bx } = abx(word);
            Opcode::Stringop { a, bx }
        }
        62 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Strcat { a, b }
        }
        63 => {
            let Abc { a, b, c } = abc(word);
            Opcode::Hash { a, b, c: c as u16 }
        }
        64 => {
            let AbzCz { a, bz, cz } = abzcz(word);
            Opcode::Lambda { a, bz, cz }
        }
        65 => {
            let Abc { a, b, c } = abc(word);
            Opcode::Range { a, b, c: c as u16 }
        }
        66 => Opcode::Oclass { a: abc(word).a },
        67 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Class { a, b }
        }
        68 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Module { a, b }
        }
        69 => {
            let Abx { a, bx } = abx(word);
            Opcode::Exec { a, bx }
        }
        70 => {
            let Abc { a, b, .. } = abc(word);
            Opcode::Method { a, b }
        }
        71 => Opcode::Sclass { a: abc(word).a },
        72 => Opcode::Tclass { a: abc(word).a },
        73 => Opcode::Debug,
        74 => Opcode::Stop,
        75 => Opcode::Err { bx: abx(word).bx },
        76 => Opcode::Rsvd1,
        77 => Opcode::Rsvd2,
        78 => Opcode::Rsvd3,
        79 => Opcode::Rsvd4,
        80 => Opcode::Rsvd5,
        _ => Opcode::Unknown { word },
    }
}

/// Shared helper for the many opcodes that pack `{ a, bx }` and differ only
/// in which variant they construct.
fn abx_variant(word: u32, variant: impl FnOnce(u16, u16) -> Opcode) -> Opcode {
    let Abx { a, bx } = abx(word);
    variant(a, bx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(op: u8, a: u16, b: u16, c: u8) -> u32 {
        ((a as u32) << 23) | ((b as u32) << 14) | ((c as u32) << 7) | op as u32
    }

    #[test]
    fn decodes_move() {
        assert_eq!(decode(word(1, 2, 3, 0)), Opcode::Move { a: 2, b: 3 });
    }

    #[test]
    fn decodes_send_with_argc() {
        assert_eq!(decode(word(32, 1, 5, 2)), Opcode::Send { a: 1, b: 5, c: 2 });
    }

    #[test]
    fn out_of_range_is_unknown() {
        let w = word(100, 0, 0, 0);
        assert_eq!(decode(w), Opcode::Unknown { word: w });
    }

    #[test]
    fn decodes_enter_argspec() {
        let field = (1u32 << 18) | (2u32 << 13); // req=1, opt=2
        let w = (field << 7) | 38;
        match decode(w) {
            Opcode::Enter { spec } => {
                assert_eq!(spec.req, 1);
                assert_eq!(spec.opt, 2);
            }
            other => panic!("expected Enter, got {other:?}"),
        }
    }

    // Any 32-bit word, however nonsensical, must decode to something rather
    // than panic: untrusted bytecode shouldn't ever crash this layer.
    #[quickcheck_macros::quickcheck]
    fn decode_never_panics(raw: u32) -> bool {
        let opcode = decode(raw);
        if opcode_id(raw) > 80 {
            matches!(opcode, Opcode::Unknown { word } if word == raw)
        } else {
            true
        }
    }

    #[quickcheck_macros::quickcheck]
    fn opcode_id_is_low_seven_bits(raw: u32) -> bool {
        opcode_id(raw) == (raw & 0x7f) as u8
    }
}
