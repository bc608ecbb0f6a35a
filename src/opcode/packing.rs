//! Bitfield layouts for the operand packings a Rite instruction word can use.
//!
//! A word is 32 bits wide; the low 7 bits always carry the opcode id and the
//! high 25 bits carry operands, sliced one of six ways. See `decode` in
//! `super::mod` for which packing each opcode uses.

/// `A:9, B:9, C:7` taken from the high 25 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Abc {
    pub a: u16,
    pub b: u16,
    pub c: u8,
}

/// `A:9, Bx:16` (unsigned).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Abx {
    pub a: u16,
    pub bx: u16,
}

/// `A:9, sBx:16`, biased by `0x7FFF` so the stored field is unsigned but the
/// decoded value is signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsBx {
    pub a: u16,
    pub sbx: i32,
}

/// `A:9, Bz:14, Cz:2`, used only by `LAMBDA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AbzCz {
    pub a: u16,
    pub bz: u16,
    pub cz: u8,
}

/// `req:5, opt:5, rest:1, post:5, key:5, kdict:1, block:1`, used only by
/// `ENTER`. Carries a method/lambda's argument-list shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Aspec {
    pub req: u8,
    pub opt: u8,
    pub rest: bool,
    pub post: u8,
    pub key: u8,
    pub kdict: bool,
    pub block: bool,
}

impl Aspec {
    /// The argspec used by the desugared for-loop lambda idiom (§4.7):
    /// `Ax == 0x40000`, decoding to `req == 1` and every other field zero
    /// (the loop takes its one block parameter as a required arg; `0x40000`
    /// is bit 18, the low bit of the `req` field at `field >> 18`). The
    /// irep's own `num_local_vars` is separately zero for this idiom, since
    /// that single parameter is never named in the lvar table — any loop
    /// variable names come from the `AREF`/`SETUPVAR` prologue instead.
    pub const FOR_LOOP_AX: u32 = 0x40000;
}

pub(super) fn opcode_id(word: u32) -> u8 {
    (word & 0x7f) as u8
}

fn operand_field(word: u32) -> u32 {
    (word >> 7) & 0x01ff_ffff
}

pub(super) fn abc(word: u32) -> Abc {
    Abc {
        a: ((word >> 23) & 0x1ff) as u16,
        b: ((word >> 14) & 0x1ff) as u16,
        c: ((word >> 7) & 0x7f) as u8,
    }
}

pub(super) fn abx(word: u32) -> Abx {
    Abx {
        a: ((word >> 23) & 0x1ff) as u16,
        bx: ((word >> 7) & 0xffff) as u16,
    }
}

pub(super) fn asbx(word: u32) -> AsBx {
    let raw = (word >> 7) & 0xffff;
    AsBx {
        a: ((word >> 23) & 0x1ff) as u16,
        sbx: raw as i32 - 0x7fff,
    }
}

pub(super) fn abzcz(word: u32) -> AbzCz {
    AbzCz {
        a: ((word >> 23) & 0x1ff) as u16,
        bz: ((word >> 9) & 0x3fff) as u16,
        cz: ((word >> 7) & 0x3) as u8,
    }
}

pub(super) fn aspec(word: u32) -> Aspec {
    let field = operand_field(word);
    Aspec {
        req: ((field >> 18) & 0x1f) as u8,
        opt: ((field >> 13) & 0x1f) as u8,
        rest: (field >> 12) & 0x1 != 0,
        post: ((field >> 7) & 0x1f) as u8,
        key: ((field >> 2) & 0x1f) as u8,
        kdict: (field >> 1) & 0x1 != 0,
        block: field & 0x1 != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abc_matches_high_bit_layout() {
        // A=3, B=5, C=7, op=0x41
        let word = (3u32 << 23) | (5u32 << 14) | (7u32 << 7) | 0x41;
        let decoded = abc(word);
        assert_eq!(decoded.a, 3);
        assert_eq!(decoded.b, 5);
        assert_eq!(decoded.c, 7);
        assert_eq!(opcode_id(word), 0x41);
    }

    #[test]
    fn asbx_bias_round_trips_negative() {
        let sbx = -4i32;
        let raw = (sbx + 0x7fff) as u32 & 0xffff;
        let word = (2u32 << 23) | (raw << 7);
        assert_eq!(asbx(word).sbx, -4);
    }

    // Every field packed into an ENTER word must decode back out unchanged,
    // independent of what bits its neighbors hold.
    #[quickcheck_macros::quickcheck]
    fn aspec_round_trips_each_field(req: u8, opt: u8, rest: bool, post: u8, key: u8, kdict: bool, block: bool) -> bool {
        let req = req & 0x1f;
        let opt = opt & 0x1f;
        let post = post & 0x1f;
        let key = key & 0x1f;
        let field = ((req as u32) << 18)
            | ((opt as u32) << 13)
            | ((rest as u32) << 12)
            | ((post as u32) << 7)
            | ((key as u32) << 2)
            | ((kdict as u32) << 1)
            | block as u32;
        let word = (field << 7) | 38;
        let decoded = aspec(word);
        decoded.req == req
            && decoded.opt == opt
            && decoded.rest == rest
            && decoded.post == post
            && decoded.key == key
            && decoded.kdict == kdict
            && decoded.block == block
    }

    #[test]
    fn aspec_extracts_for_loop_argspec() {
        let word = (Aspec::FOR_LOOP_AX << 7) | 38;
        let spec = aspec(word);
        assert_eq!(spec.req, 1);
        assert_eq!(spec.opt, 0);
        assert!(!spec.rest);
        assert_eq!(spec.post, 0);
        assert_eq!(spec.key, 0);
        assert!(!spec.kdict);
        assert!(!spec.block);
    }
}
