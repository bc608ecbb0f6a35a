//! File header, generic section header, and footer.

use super::cursor::ByteCursor;
use crate::error::ContainerError;

/// The 22-byte file header.
#[derive(Debug, Clone)]
pub struct RiteHeader {
    pub major_version: String,
    pub minor_version: String,
    pub crc: u16,
    pub total_size: u32,
    pub compiler_name: String,
    pub compiler_version: String,
}

impl RiteHeader {
    pub const LEN: usize = 22;
    const MAGIC: &'static [u8] = b"RITE";

    pub(super) fn read(cursor: &mut ByteCursor) -> Result<Self, ContainerError> {
        let magic = cursor.take(4, "header")?;
        if magic != Self::MAGIC {
            return Err(ContainerError::BadMagic);
        }
        Ok(RiteHeader {
            major_version: cursor.fixed_str(2, "header")?,
            minor_version: cursor.fixed_str(2, "header")?,
            crc: cursor.u16("header")?,
            total_size: cursor.u32("header")?,
            compiler_name: cursor.fixed_str(4, "header")?,
            compiler_version: cursor.fixed_str(4, "header")?,
        })
    }
}

/// A generic `id(4) + size(4)` section header.
#[derive(Debug, Clone)]
pub struct RiteSectionHeader {
    pub id: String,
    pub size: u32,
}

impl RiteSectionHeader {
    pub(super) fn read(cursor: &mut ByteCursor) -> Result<Self, ContainerError> {
        Ok(RiteSectionHeader {
            id: cursor.fixed_str(4, "section-header")?,
            size: cursor.u32("section-header")?,
        })
    }
}

/// The trailing `"END "` section.
#[derive(Debug, Clone)]
pub struct RiteFooter {
    pub id: String,
    pub size: u32,
}

impl RiteFooter {
    pub(super) fn read(cursor: &mut ByteCursor) -> Result<Self, ContainerError> {
        let id = cursor.fixed_str(4, "footer")?;
        let size = cursor.u32("footer")?;
        if id != "END\0" && id != "END " {
            return Err(ContainerError::BadSectionId {
                found: id,
                expected: &["END\0", "END "],
            });
        }
        Ok(RiteFooter { id, size })
    }
}
