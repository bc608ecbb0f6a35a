//! Decompiler options: jump-recovery strictness and output formatting.

#[cfg_attr(feature = "config-file", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config-file", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecompilerOptions {
    /// Keep rendered line comments, including the pass-through diagnostic
    /// comments emitted for an unrecognized jump.
    pub include_comments: bool,
    /// When `true` (the default, matching the original tool), an
    /// unrecognized forward `JMP` is handled as a soft diagnostic: a
    /// `raise` stub plus passed-through comments, and decoding continues.
    /// When `false`, the same shape is a fatal [`crate::error::LiftError`].
    pub tolerant_jumps: bool,
}

impl Default for DecompilerOptions {
    fn default() -> Self {
        DecompilerOptions {
            include_comments: true,
            tolerant_jumps: true,
        }
    }
}

#[cfg(feature = "config-file")]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[cfg(feature = "config-file")]
impl DecompilerOptions {
    /// Loads options from a TOML file, falling back to [`Default`] for any
    /// field the file omits.
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tolerant_open_question_decision() {
        let opts = DecompilerOptions::default();
        assert!(opts.tolerant_jumps);
        assert!(opts.include_comments);
    }
}
