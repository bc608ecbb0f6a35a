//! The optional `LVAR` debug section: local variable names keyed by
//! register, mirrored over the irep tree.
//!
//! Not every `.mrb` carries this section (it's stripped by `mrbc -g`'s
//! absence); when it's missing the lifter falls back to synthesized
//! `tmp_N`-style names via [`LvarTree::empty`].

use std::collections::HashMap;

use super::cursor::ByteCursor;
use super::irep::Irep;
use crate::error::ContainerError;

/// Local variable names for a single irep, keyed by register number.
///
/// Register 0 is always `self` and is never present in this map; the
/// bytecode's own `(num_locals - 1)` pairs cover registers `1..num_locals`.
#[derive(Debug, Clone, Default)]
pub struct LvarRecord {
    pub names: HashMap<u16, String>,
}

impl LvarRecord {
    pub fn get(&self, register: u16) -> Option<&str> {
        self.names.get(&register).map(String::as_str)
    }
}

/// The lvar debug tree, one [`LvarRecord`] per irep in the same DFS order
/// the ireps themselves were read in.
#[derive(Debug, Clone, Default)]
pub struct LvarTree {
    pub record: LvarRecord,
    pub children: Vec<LvarTree>,
}

impl LvarTree {
    /// Builds an all-empty tree mirroring `irep`'s shape, used when the
    /// container carries no `LVAR` section.
    pub fn empty(irep: &Irep) -> Self {
        LvarTree {
            record: LvarRecord::default(),
            children: irep.children.iter().map(LvarTree::empty).collect(),
        }
    }

    /// Reads the lvar section: a local symbol table, then one record per
    /// irep (DFS, matching read order), each `num_locals - 1` pairs of
    /// `(symbol_index: u16, register: u16)` with `0xffff` marking "no name".
    pub fn read(cursor: &mut ByteCursor, irep: &Irep) -> Result<Self, ContainerError> {
        let symbols_len = cursor.u32("lvar-symbols")? as usize;
        let mut symbols = Vec::with_capacity(symbols_len);
        for _ in 0..symbols_len {
            let len = cursor.u16("lvar-symbols")? as usize;
            symbols.push(cursor.lossy_str(len, "lvar-symbols")?);
        }

        Self::read_record(cursor, irep, &symbols)
    }

    fn read_record(
        cursor: &mut ByteCursor,
        irep: &Irep,
        symbols: &[String],
    ) -> Result<Self, ContainerError> {
        let mut names = HashMap::new();
        let pair_count = irep.num_local_vars.saturating_sub(1) as usize;
        for i in 0..pair_count {
            let symbol_index = cursor.u16("lvar-record")?;
            let register = cursor.u16("lvar-record")?;
            if symbol_index != 0xffff {
                if let Some(name) = symbols.get(symbol_index as usize) {
                    names.insert(register, name.clone());
                } else {
                    names.insert(register, format!("lvar_{i}"));
                }
            }
        }

        let mut children = Vec::with_capacity(irep.children.len());
        for child in &irep.children {
            children.push(Self::read_record(cursor, child, symbols)?);
        }

        Ok(LvarTree {
            record: LvarRecord { names },
            children,
        })
    }
}
