//! On-disk Rite container parsing.
//!
//! This produces the in-memory [`Irep`] tree and [`LvarTree`] the lifter
//! (§4.7) consumes. It is deliberately kept separate from the lifter:
//! the core only ever sees already-parsed data, matching spec.md's framing
//! of the binary reader as an external collaborator to the core.

mod cursor;
mod header;
mod irep;
mod lvar;

pub use header::{RiteFooter, RiteHeader, RiteSectionHeader};
pub use lvar::LvarRecord;
pub use irep::{Irep, IrepSectionHeader};
pub use lvar::LvarTree;

use cursor::ByteCursor;
use crate::error::ContainerError;

/// A fully parsed Rite file: header, irep tree, optional lvar debug tree,
/// footer.
#[derive(Debug, Clone)]
pub struct RiteFile {
    pub header: RiteHeader,
    pub irep_section: IrepSectionHeader,
    pub irep: Irep,
    pub lvars: LvarTree,
    pub footer: RiteFooter,
}

impl RiteFile {
    /// Parses a complete `.mrb` byte buffer.
    pub fn parse(bytes: &[u8]) -> Result<Self, ContainerError> {
        let mut cursor = ByteCursor::new(bytes);

        let header = RiteHeader::read(&mut cursor)?;
        let before_irep = cursor.position();

        let irep_section = IrepSectionHeader::read(&mut cursor)?;
        let irep = Irep::read(&mut cursor)?;

        let consumed = cursor.position() - before_irep;
        let remaining = (header.total_size as usize)
            .saturating_sub(RiteHeader::LEN)
            .saturating_sub(consumed);

        let lvars = if remaining > 8 {
            let lvar_section = RiteSectionHeader::read(&mut cursor)?;
            if lvar_section.id != "LVAR" {
                return Err(ContainerError::BadSectionId {
                    found: lvar_section.id,
                    expected: &["LVAR"],
                });
            }
            LvarTree::read(&mut cursor, &irep)?
        } else {
            LvarTree::empty(&irep)
        };

        let footer = RiteFooter::read(&mut cursor)?;

        Ok(RiteFile {
            header,
            irep_section,
            irep,
            lvars,
            footer,
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Hand-built byte fixtures shared by container and lifter tests.
    use crate::opcode::packing::Aspec;

    pub fn word_abc(op: u8, a: u16, b: u16, c: u8) -> u32 {
        ((a as u32) << 23) | ((b as u32) << 14) | ((c as u32) << 7) | op as u32
    }

    pub fn word_abx(op: u8, a: u16, bx: u16) -> u32 {
        ((a as u32) << 23) | ((bx as u32) << 7) | op as u32
    }

    pub fn word_asbx(op: u8, a: u16, sbx: i32) -> u32 {
        let raw = (sbx + 0x7fff) as u32 & 0xffff;
        ((a as u32) << 23) | (raw << 7) | op as u32
    }

    pub fn word_enter(req: u8, opt: u8, rest: bool) -> u32 {
        let field = ((req as u32) << 18) | ((opt as u32) << 13) | ((rest as u32) << 12);
        (field << 7) | 38
    }

    pub fn word_for_loop_enter() -> u32 {
        (Aspec::FOR_LOOP_AX << 7) | 38
    }

    /// Builds a minimal but structurally valid `.mrb` buffer with a single
    /// top-level irep containing `instructions`, a symbol table `symbols`,
    /// and no pool/children/lvars.
    pub fn minimal_mrb(instructions: &[u32], symbols: &[&str]) -> Vec<u8> {
        minimal_mrb_with_lvars(instructions, symbols, &[])
    }

    /// As [`minimal_mrb`], but also emits an `LVAR` debug section binding
    /// each `(register, name)` pair in `lvars` so the lifter renders that
    /// register using the real source name instead of a synthetic temp.
    pub fn minimal_mrb_with_lvars(instructions: &[u32], symbols: &[&str], lvars: &[(u16, &str)]) -> Vec<u8> {
        let num_locals: u16 = 1 + lvars.len() as u16;

        let mut irep = Vec::new();
        // recordSize placeholder, filled below
        irep.extend_from_slice(&[0u8; 4]);
        irep.extend_from_slice(&num_locals.to_be_bytes());
        irep.extend_from_slice(&64u16.to_be_bytes()); // num_registers
        irep.extend_from_slice(&0u16.to_be_bytes()); // num_children
        irep.extend_from_slice(&(instructions.len() as u32).to_be_bytes());
        // 4-byte alignment pad: irep currently at offset 14, pad to next multiple of 4
        let pad = (4 - (irep.len() % 4)) % 4;
        irep.extend(std::iter::repeat(0u8).take(pad));
        for w in instructions {
            irep.extend_from_slice(&w.to_be_bytes());
        }
        irep.extend_from_slice(&0u32.to_be_bytes()); // pool_len
        irep.extend_from_slice(&(symbols.len() as u32).to_be_bytes());
        for sym in symbols {
            let bytes = sym.as_bytes();
            irep.extend_from_slice(&((bytes.len()) as u16).to_be_bytes());
            irep.extend_from_slice(bytes);
            irep.push(0);
        }

        let record_size = (irep.len() - 4) as u32;
        irep[0..4].copy_from_slice(&record_size.to_be_bytes());

        let mut out = Vec::new();
        out.extend_from_slice(b"RITE");
        out.extend_from_slice(b"03");
        out.extend_from_slice(b"00");
        out.extend_from_slice(&0u16.to_be_bytes()); // crc
        let total_size_pos = out.len();
        out.extend_from_slice(&0u32.to_be_bytes()); // total size placeholder
        out.extend_from_slice(b"MATZ");
        out.extend_from_slice(b"0000");

        out.extend_from_slice(b"IREP");
        let section_size_pos = out.len();
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(b"0300");
        out.extend_from_slice(&irep);
        let section_size = (out.len() - section_size_pos - 4) as u32;
        out[section_size_pos..section_size_pos + 4].copy_from_slice(&section_size.to_be_bytes());

        if !lvars.is_empty() {
            out.extend_from_slice(b"LVAR");
            let lvar_size_pos = out.len();
            out.extend_from_slice(&0u32.to_be_bytes());

            let mut lvar_symbols: Vec<&str> = Vec::new();
            for (_, name) in lvars {
                if !lvar_symbols.contains(name) {
                    lvar_symbols.push(name);
                }
            }
            out.extend_from_slice(&(lvar_symbols.len() as u32).to_be_bytes());
            for name in &lvar_symbols {
                out.extend_from_slice(&(name.len() as u16).to_be_bytes());
                out.extend_from_slice(name.as_bytes());
            }

            for register in 1..num_locals {
                match lvars.iter().find(|(r, _)| *r == register) {
                    Some((_, name)) => {
                        let idx = lvar_symbols.iter().position(|s| s == name).unwrap() as u16;
                        out.extend_from_slice(&idx.to_be_bytes());
                        out.extend_from_slice(&register.to_be_bytes());
                    }
                    None => {
                        out.extend_from_slice(&0xffffu16.to_be_bytes());
                        out.extend_from_slice(&register.to_be_bytes());
                    }
                }
            }

            let lvar_size = (out.len() - lvar_size_pos - 4) as u32;
            out[lvar_size_pos..lvar_size_pos + 4].copy_from_slice(&lvar_size.to_be_bytes());
        }

        out.extend_from_slice(b"END\0");
        out.extend_from_slice(&8u32.to_be_bytes());

        let total_size = out.len() as u32;
        out[total_size_pos..total_size_pos + 4].copy_from_slice(&total_size.to_be_bytes());
        out
    }
}
