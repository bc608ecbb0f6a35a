//! Parsing context: a stack of enclosing scope kinds,
//! plus the side-channel a `case`/`when` reconstruction uses to collect
//! surfaced when-conditions from nested sub-parses.

use crate::ir::ExprId;

/// One entry in the scope stack ("normal, method, if, while, for,
/// when-condition").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Normal,
    Method,
    If,
    WhileLoop,
    ForLoop,
    WhenCondition,
}

/// A single scope frame: its kind and whether the traversal that pushed it
/// is embedded inside a larger opcode sequence that continues afterward.
#[derive(Debug, Clone)]
struct Frame {
    kind: ScopeKind,
    has_more_outside: bool,
}

/// The mutable collector a `when-condition` sub-parse appends surfaced
/// conditions to ("pass a mutable collector... through the
/// parsing context").
#[derive(Debug, Clone, Default)]
pub struct WhenCallback {
    /// `(condition, dispatch JMPIF position, its jump target)`, both
    /// positions local to whichever feed was active when surfaced.
    pub surfaced: Vec<(ExprId, usize, usize)>,
}

/// Stack of enclosing scopes plus the when-condition callback channel.
#[derive(Debug, Clone, Default)]
pub struct ParsingContext {
    frames: Vec<Frame>,
    pub callback: Option<WhenCallback>,
}

impl ParsingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a child context with `kind` pushed, inheriting nothing else;
    /// used at the start of every sub-parse.
    pub fn push_and_new(&self, kind: ScopeKind, has_more_outside: bool) -> Self {
        let mut frames = self.frames.clone();
        frames.push(Frame { kind, has_more_outside });
        ParsingContext { frames, callback: None }
    }

    pub fn has_more_outside(&self) -> bool {
        self.frames.last().map(|f| f.has_more_outside).unwrap_or(false)
    }

    fn innermost_matching(&self, pred: impl Fn(ScopeKind) -> bool) -> bool {
        for frame in self.frames.iter().rev() {
            if frame.kind == ScopeKind::Method {
                return false;
            }
            if pred(frame.kind) {
                return true;
            }
        }
        false
    }

    pub fn is_method(&self) -> bool {
        self.frames.iter().any(|f| f.kind == ScopeKind::Method)
    }

    pub fn is_if(&self) -> bool {
        self.frames.last().map(|f| f.kind == ScopeKind::If).unwrap_or(false)
    }

    pub fn is_for_loop(&self) -> bool {
        self.innermost_matching(|k| k == ScopeKind::ForLoop)
    }

    pub fn is_while_loop(&self) -> bool {
        self.innermost_matching(|k| k == ScopeKind::WhileLoop)
    }

    pub fn is_when_cond(&self) -> bool {
        self.frames.last().map(|f| f.kind == ScopeKind::WhenCondition).unwrap_or(false)
    }

    /// Begins collecting when-conditions surfaced by a nested sub-parse.
    pub fn start_callback(&mut self) {
        self.callback = Some(WhenCallback::default());
    }

    pub fn surface_condition(&mut self, expr: ExprId, position: usize, target: usize) {
        if let Some(cb) = self.callback.as_mut() {
            cb.surfaced.push((expr, position, target));
        }
    }

    pub fn take_callback(&mut self) -> Vec<(ExprId, usize, usize)> {
        self.callback.take().map(|cb| cb.surfaced).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Expr, ExprArena};

    fn ids(n: usize) -> Vec<ExprId> {
        let mut arena = ExprArena::new();
        (0..n).map(|_| arena.push(Expr::Nil, 0)).collect()
    }

    #[test]
    fn push_and_new_does_not_mutate_the_parent() {
        let root = ParsingContext::new();
        let child = root.push_and_new(ScopeKind::If, true);
        assert!(!root.is_if());
        assert!(child.is_if());
    }

    #[test]
    fn is_when_cond_only_looks_at_the_innermost_frame() {
        let root = ParsingContext::new();
        let when = root.push_and_new(ScopeKind::WhenCondition, true);
        assert!(when.is_when_cond());
        // A further push (the prefix-replay / body sub-parses done inside
        // `try_build_case`) leaves the when-condition frame behind it, so a
        // nested JMPIF sees ordinary scope rules again.
        let nested = when.push_and_new(ScopeKind::Normal, true);
        assert!(!nested.is_when_cond());
    }

    #[test]
    fn method_boundary_stops_loop_detection_from_seeing_outer_scopes() {
        let root = ParsingContext::new();
        let in_loop = root.push_and_new(ScopeKind::WhileLoop, true);
        assert!(in_loop.is_while_loop());
        // A method body nested inside a loop's textual position still
        // starts its own fresh scope -- `break`/`next` inside it must not
        // resolve to the enclosing loop.
        let in_method = in_loop.push_and_new(ScopeKind::Method, true);
        let in_block_inside_method = in_method.push_and_new(ScopeKind::Normal, true);
        assert!(!in_block_inside_method.is_while_loop());
        assert!(in_block_inside_method.is_method());
    }

    #[test]
    fn surface_condition_is_a_no_op_without_start_callback() {
        // This is exactly how `try_build_case`'s prefix replay uses
        // `WhenCondition` scope: it never calls `start_callback`, so a
        // re-encountered JMPIF's surfaced condition is silently dropped
        // instead of accumulating into a stale collector.
        let mut ctx = ParsingContext::new().push_and_new(ScopeKind::WhenCondition, true);
        let exprs = ids(1);
        ctx.surface_condition(exprs[0], 0, 1);
        assert!(ctx.take_callback().is_empty());
    }

    #[test]
    fn start_callback_collects_until_taken() {
        let mut ctx = ParsingContext::new().push_and_new(ScopeKind::WhenCondition, true);
        let exprs = ids(2);
        ctx.start_callback();
        ctx.surface_condition(exprs[0], 0, 5);
        ctx.surface_condition(exprs[1], 3, 5);
        let surfaced = ctx.take_callback();
        assert_eq!(surfaced, vec![(exprs[0], 0, 5), (exprs[1], 3, 5)]);
        assert!(ctx.take_callback().is_empty());
    }
}
