//! The recursive irep section and its decoded in-memory form.

use super::cursor::ByteCursor;
use crate::error::ContainerError;

/// `id(4) + size(4) + version(4)`, the irep section's own header variant.
#[derive(Debug, Clone)]
pub struct IrepSectionHeader {
    pub id: String,
    pub size: u32,
    pub version: String,
}

impl IrepSectionHeader {
    pub(super) fn read(cursor: &mut ByteCursor) -> Result<Self, ContainerError> {
        let id = cursor.fixed_str(4, "irep-section-header")?;
        if id != "IREP" {
            return Err(ContainerError::BadSectionId {
                found: id,
                expected: &["IREP"],
            });
        }
        Ok(IrepSectionHeader {
            id,
            size: cursor.u32("irep-section-header")?,
            version: cursor.fixed_str(4, "irep-section-header")?,
        })
    }
}

/// A decoded pool entry ("constant pool (sequence of byte
/// strings, decoded as UTF-8 with replacement)"). The type tag is kept for
/// forensic purposes but the core only distinguishes by how an opcode uses
/// the index, so a single `String` carries both string and encoded-float
/// pool entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    pub type_tag: u8,
    pub value: String,
}

/// One irep: instructions, pools, symbols, and nested child ireps.
///
/// This is the data model consumed by the lifter — it carries no debug
/// (lvar) information; that lives in a parallel
/// [`super::LvarTree`] keyed by the same DFS order.
#[derive(Debug, Clone)]
pub struct Irep {
    pub num_local_vars: u16,
    pub num_registers: u16,
    pub instructions: Vec<u32>,
    pub pool: Vec<PoolEntry>,
    /// Symbol table; an empty string marks the 0xFFFF "anonymous" sentinel.
    pub symbols: Vec<String>,
    pub children: Vec<Irep>,
}

impl Irep {
    pub(super) fn read(cursor: &mut ByteCursor) -> Result<Self, ContainerError> {
        let _record_size = cursor.u32("irep-record")?;
        let num_local_vars = cursor.u16("irep-record")?;
        let num_registers = cursor.u16("irep-record")?;
        let num_children = cursor.u16("irep-record")?;

        let ilen = cursor.u32("irep-record")? as usize;
        cursor.align4();
        let mut instructions = Vec::with_capacity(ilen);
        for _ in 0..ilen {
            instructions.push(cursor.u32("irep-instructions")?);
        }

        let pool_len = cursor.u32("irep-record")? as usize;
        let mut pool = Vec::with_capacity(pool_len);
        for _ in 0..pool_len {
            let type_tag = cursor.u8("irep-pool")?;
            let data_len = cursor.u16("irep-pool")? as usize;
            let value = cursor.lossy_str(data_len, "irep-pool")?;
            pool.push(PoolEntry { type_tag, value });
        }

        let symbols_len = cursor.u32("irep-record")? as usize;
        let mut symbols = Vec::with_capacity(symbols_len);
        for _ in 0..symbols_len {
            let name_len = cursor.u16("irep-symbols")?;
            if name_len == 0xffff {
                symbols.push(String::new());
            } else {
                // on-disk strings are zero-terminated; the stored length
                // excludes the terminator, matching original_source's
                // `read_string(file, symbolNameLength + 1)`.
                let raw = cursor.lossy_str(name_len as usize + 1, "irep-symbols")?;
                symbols.push(raw.trim_end_matches('\0').to_string());
            }
        }

        let mut children = Vec::with_capacity(num_children as usize);
        for _ in 0..num_children {
            children.push(Irep::read(cursor)?);
        }

        Ok(Irep {
            num_local_vars,
            num_registers,
            instructions,
            pool,
            symbols,
            children,
        })
    }
}
