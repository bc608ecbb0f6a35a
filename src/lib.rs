//! Reconstructs Ruby-like source from compiled Rite (mruby) bytecode.
//!
//! The pipeline mirrors the module split in [`container`] (on-disk
//! parsing), [`opcode`] (instruction decoding), and [`lifter`] (expression
//! reconstruction): [`decompile`] glues all three together for the common
//! case of "bytes in, source text out".

pub mod codegen;
pub mod config;
pub mod consts;
pub mod container;
pub mod context;
pub mod error;
pub mod feed;
pub mod ir;
pub mod lifter;
pub mod opcode;
pub mod registers;

use config::DecompilerOptions;
use container::RiteFile;
use error::DecompileError;

/// Parses `bytes` as a `.mrb` container and lifts it to Ruby-like source,
/// using `options` to control comment retention and unrecognized-jump
/// strictness.
pub fn decompile(bytes: &[u8], options: &DecompilerOptions) -> Result<String, DecompileError> {
    let file = RiteFile::parse(bytes)?;
    Ok(lifter::decompile(&file, options)?)
}

pub mod prelude {
    pub use crate::config::DecompilerOptions;
    pub use crate::container::RiteFile;
    pub use crate::error::{ContainerError, DecompileError, LiftError};
    pub use crate::ir::{Expr, ExprArena, ExprId};
}
