//! Code generator: an append-only ordered buffer of
//! emitted expressions, rendered to text once a traversal (or sub-parse)
//! completes.

use crate::ir::{ExprArena, ExprId, Printer};

#[derive(Debug, Clone, Default)]
pub struct CodeGen {
    exprs: Vec<ExprId>,
}

impl CodeGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, expr: ExprId) {
        self.exprs.push(expr);
    }

    pub fn exprs(&self) -> &[ExprId] {
        &self.exprs
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// Renders this buffer to text using `arena` for expression lookups,
    /// dropping pruned/suppressed entries.
    pub fn render(&self, arena: &ExprArena, include_comments: bool) -> String {
        Printer::new(arena, include_comments).render_block(&self.exprs, 0)
    }
}
