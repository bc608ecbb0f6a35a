//! Error taxonomy for the three layers of the pipeline: reading the
//! container off disk, lifting ireps into the expression IR, and the
//! end-to-end `decompile` entry point that wraps both.

use thiserror::Error;

/// Failures reading or validating the on-disk `.mrb` container.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The file didn't start with the 4-byte `"RITE"` magic.
    #[error("not a Rite binary: missing RITE magic")]
    BadMagic,
    /// A section id didn't match what the reader expected at that position
    /// (e.g. an `IREP` section header or `END` footer with the wrong id).
    #[error("unexpected section id {found:?}, expected one of {expected:?}")]
    BadSectionId {
        found: String,
        expected: &'static [&'static str],
    },
    /// A section header declared a size that doesn't match what was
    /// actually read for it.
    #[error("section size mismatch: header declared {expected} bytes, read {actual}")]
    SectionSizeMismatch { expected: u32, actual: u32 },
    /// The cursor ran past the end of the buffer while reading `section`.
    #[error("unexpected end of file while reading {section}")]
    UnexpectedEof { section: &'static str },
    /// A pool entry's type tag wasn't one the reader recognizes.
    #[error("unknown pool entry type tag {0:#x}")]
    UnknownPoolType(u8),
}

/// Failures reconstructing an expression tree from an irep's opcode stream.
#[derive(Debug, Error)]
pub enum LiftError {
    /// A jump target fell outside the bounds of the current opcode stream.
    #[error("jump target {target} out of bounds (stream length {len})")]
    JumpOutOfBounds { target: usize, len: usize },
    /// A symbol or pool index used by an instruction had no corresponding
    /// entry in the irep's tables.
    #[error("index {index} out of range for {table} (len {len})")]
    IndexOutOfRange {
        table: &'static str,
        index: usize,
        len: usize,
    },
    /// An opcode appeared in a position the lifter has no recognized
    /// pattern for (e.g. a bare `JMP` that isn't part of a recognized
    /// control-flow idiom and `tolerant_jumps` is disabled).
    #[error("unrecognized control-flow shape at instruction {at}: {detail}")]
    UnrecognizedControlFlow { at: usize, detail: String },
    /// A child irep index referenced by `LAMBDA`/`OCLASS`/`EXEC`-family
    /// opcodes had no corresponding entry in the parent irep's children.
    #[error("child irep index {index} out of range (len {len})")]
    ChildIrepOutOfRange { index: usize, len: usize },
}

/// Top-level error returned by [`crate::decompile`], wrapping either layer.
#[derive(Debug, Error)]
pub enum DecompileError {
    #[error("failed to parse Rite container: {0}")]
    Container(#[from] ContainerError),
    #[error("failed to lift bytecode: {0}")]
    Lift(#[from] LiftError),
    /// Propagated from optional TOML config loading (`config-file` feature).
    #[cfg(feature = "config-file")]
    #[error("failed to load configuration: {0}")]
    Config(#[from] crate::config::ConfigError),
}
