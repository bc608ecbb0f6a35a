//! `JMP`/`JMPIF`/`JMPNOT` reconstruction ("the core's heart"):
//! if/else, while/until, short-circuit `&&`/`||`, and `case`/`when`. Every
//! construct here is recovered from the *shape* of a jump and its
//! surrounding code, never from anything the container format labels
//! explicitly — there is no "this is a loop" bit in Rite bytecode.
//!
//! Throughout, a jump's target is computed as `position + sBx` (confirmed
//! against the worked if/else example: the then-block spans
//! `(pos+1, pos+sBx-1)` and the else-block `(pos+sBx, pos+sBx+jmp.sBx-1)`,
//! both consistent only under that formula, with no extra `+1`).

use crate::codegen::CodeGen;
use crate::context::{ParsingContext, ScopeKind};
use crate::error::LiftError;
use crate::feed::OpcodeFeed;
use crate::ir::{CaseArm, Expr, ExprArena, ExprId};
use crate::opcode::Opcode;
use crate::registers::RegisterFile;

use super::Env;

fn checked_target(pos: usize, sbx: i32) -> Option<usize> {
    let t = pos as i64 + sbx as i64;
    if t < 0 {
        None
    } else {
        Some(t as usize)
    }
}

/// Runs `sub_feed` as an isolated sub-program: a fresh copy of the register
/// file ("each sub-parse owns a freshly copied register file"),
/// pushed onto a child parsing context. Returns the emitted statements and
/// the register file as it stood when the sub-program ran out of
/// instructions, so callers can read back whichever register the
/// surrounding construct cares about.
fn subparse(
    arena: &mut ExprArena,
    env: &Env,
    base_registers: &RegisterFile,
    mut sub_feed: OpcodeFeed,
    context: &ParsingContext,
    kind: ScopeKind,
    has_more_outside: bool,
) -> Result<(CodeGen, RegisterFile), LiftError> {
    let mut registers = base_registers.clone();
    let mut sub_context = context.push_and_new(kind, has_more_outside);
    let gen = super::lift_block(arena, env, &mut sub_feed, &mut registers, &mut sub_context)?;
    Ok((gen, registers))
}

fn block_expr(arena: &mut ExprArena, gen: CodeGen) -> ExprId {
    arena.push_live(Expr::Block(gen.exprs().to_vec()), 0)
}

fn diagnostic_passthrough(arena: &mut ExprArena, feed: &OpcodeFeed, gen: &mut CodeGen, pos: usize, skip: usize) {
    tracing::warn!(pos, skip, "unexpected JMP; emitting pass-through diagnostic");
    let raise_id = arena.push_live(Expr::Raise(format!("unexpected control flow at instruction {pos}")), 0);
    gen.push(raise_id);
    for op in feed.get_jumped_opcodes(skip) {
        let id = arena.push_live(Expr::LineComment(format!("{op:?}")), 0);
        gen.push(id);
    }
}

/// Scans forward from a `JMP`'s target for a `JMPIF`/`JMPNOT` whose own
/// target lands back on `loop_head` — the terminator that turns a forward
/// `JMP` into a `while`/`until` header ("Loop reconstruction").
/// Returns `None` if no such terminator is found before the irep ends, in
/// which case the caller falls back to the pass-through diagnostic.
fn try_while_loop(
    arena: &mut ExprArena,
    env: &Env,
    feed: &OpcodeFeed,
    registers: &RegisterFile,
    context: &ParsingContext,
    pos: usize,
    sbx: i32,
) -> Result<Option<(Expr, usize)>, LiftError> {
    let Some(target) = checked_target(pos, sbx) else { return Ok(None) };
    if target <= pos || target > feed.len() {
        return Ok(None);
    }
    let loop_head = pos + 1;

    let mut scan = target;
    let (cond_end, until, cond_reg) = loop {
        if scan >= feed.len() {
            return Ok(None);
        }
        match feed.decode_at(scan) {
            Some(Opcode::Jmpif { a, sbx: s }) if checked_target(scan, s) == Some(loop_head) => break (scan, false, a),
            Some(Opcode::Jmpnot { a, sbx: s }) if checked_target(scan, s) == Some(loop_head) => break (scan, true, a),
            _ => scan += 1,
        }
    };

    let body_feed = feed.slice(loop_head, target);
    let (body_gen, body_registers) = subparse(arena, env, registers, body_feed, context, ScopeKind::WhileLoop, true)?;
    let body = block_expr(arena, body_gen);

    // The condition's own computation reads whatever the body just bound,
    // not the pre-loop register state: a counter the body increments still
    // needs to resolve to its lvar name when the condition reads it back.
    let cond_feed = feed.slice(target, cond_end);
    let (_, cond_registers) = subparse(arena, env, &body_registers, cond_feed, context, ScopeKind::WhileLoop, true)?;
    let cond = super::read_register(arena, &cond_registers, cond_reg);
    arena.mark_used(cond);

    Ok(Some((Expr::While { cond, body, until }, cond_end + 1)))
}

pub(super) fn handle_jmp(
    arena: &mut ExprArena,
    env: &Env,
    feed: &mut OpcodeFeed,
    registers: &mut RegisterFile,
    context: &mut ParsingContext,
    gen: &mut CodeGen,
    pos: usize,
    sbx: i32,
) -> Result<(), LiftError> {
    let Some(target) = checked_target(pos, sbx) else {
        return Err(LiftError::JumpOutOfBounds { target: 0, len: feed.len() });
    };

    if target <= pos {
        gen.push(arena.push_live(Expr::Next, 0));
        return Ok(());
    }

    if target >= feed.len() {
        if context.is_while_loop() {
            gen.push(arena.push_live(Expr::Break, 0));
        }
        feed.seek(feed.len());
        return Ok(());
    }

    if let Some((while_expr, resume)) = try_while_loop(arena, env, &*feed, registers, context, pos, sbx)? {
        let id = arena.push_live(while_expr, 0);
        gen.push(id);
        feed.seek(resume);
        return Ok(());
    }

    let gap = target - feed.position();
    if gap <= 2 {
        feed.seek(target);
        return Ok(());
    }

    if env.options.tolerant_jumps {
        diagnostic_passthrough(arena, feed, gen, pos, gap);
        feed.seek(target);
        Ok(())
    } else {
        Err(LiftError::UnrecognizedControlFlow { at: pos, detail: "unrecognized forward JMP".to_string() })
    }
}

fn build_if_else(
    arena: &mut ExprArena,
    env: &Env,
    feed: &mut OpcodeFeed,
    registers: &mut RegisterFile,
    context: &ParsingContext,
    gen: &mut CodeGen,
    pos: usize,
    a: u16,
    else_start: usize,
    jmp_pos: usize,
    resume: usize,
) -> Result<(), LiftError> {
    let cond = super::read_register(arena, registers, a);
    arena.mark_used(cond);

    let then_feed = feed.slice(pos + 1, jmp_pos);
    let (then_gen, _) = subparse(arena, env, registers, then_feed, context, ScopeKind::If, context.has_more_outside())?;
    let then_branch = block_expr(arena, then_gen);

    let else_branch = if resume > else_start {
        let else_feed = feed.slice(else_start, resume);
        let (else_gen, _) = subparse(arena, env, registers, else_feed, context, ScopeKind::If, context.has_more_outside())?;
        Some(block_expr(arena, else_gen))
    } else {
        None
    };

    let id = arena.push_live(Expr::If { cond, then_branch, else_branch }, 0);
    gen.push(id);
    feed.seek(resume);
    Ok(())
}

/// Builds the `left && right` / `left || right` short-circuit reading of a
/// `JMPNOT`/`JMPIF` that didn't qualify as an if/else or case header (spec
/// §4.7: "otherwise the pair reads as a short-circuiting boolean
/// operator"). If the sub-program spans more than one statement, the
/// right-hand side isn't a value expression at all — that shape is really
/// a plain `if cond; ...; end` with no else, so it's rendered as one
/// instead of a synthetic `&&`/`||`.
fn handle_and_or(
    arena: &mut ExprArena,
    env: &Env,
    feed: &mut OpcodeFeed,
    registers: &mut RegisterFile,
    context: &ParsingContext,
    gen: &mut CodeGen,
    pos: usize,
    a: u16,
    sbx: i32,
    is_or: bool,
) -> Result<(), LiftError> {
    let Some(target) = checked_target(pos, sbx) else {
        return Err(LiftError::JumpOutOfBounds { target: 0, len: feed.len() });
    };
    if target <= pos || target > feed.len() {
        return Err(LiftError::UnrecognizedControlFlow { at: pos, detail: "and/or region out of bounds".to_string() });
    }

    let left = super::read_register(arena, registers, a);
    let sub_feed = feed.slice(pos + 1, target);
    let (sub_gen, sub_registers) = subparse(arena, env, registers, sub_feed, context, ScopeKind::Normal, context.has_more_outside())?;

    if sub_gen.exprs().len() > 1 {
        arena.mark_used(left);
        let body = block_expr(arena, sub_gen);
        let id = arena.push_live(Expr::If { cond: left, then_branch: body, else_branch: None }, 0);
        gen.push(id);
    } else {
        let right = super::read_register(arena, &sub_registers, a);
        arena.mark_used(left);
        arena.mark_used(right);
        let combined = if is_or { Expr::Or { left, right } } else { Expr::And { left, right } };
        let id = arena.push(combined, a);
        registers.load(a, id);
        gen.push(id);
    }

    feed.seek(target);
    Ok(())
}

pub(super) fn handle_jmpnot(
    arena: &mut ExprArena,
    env: &Env,
    feed: &mut OpcodeFeed,
    registers: &mut RegisterFile,
    context: &mut ParsingContext,
    gen: &mut CodeGen,
    pos: usize,
    a: u16,
    sbx: i32,
) -> Result<(), LiftError> {
    if let Some(target) = checked_target(pos, sbx) {
        if target > pos && target <= feed.len() && target >= 1 {
            if let Some(Opcode::Jmp { sbx: jmp_sbx }) = feed.decode_at(target - 1) {
                if jmp_sbx > 0 {
                    if let Some(resume) = checked_target(target - 1, jmp_sbx) {
                        if resume <= feed.len() {
                            return build_if_else(arena, env, feed, registers, context, gen, pos, a, target, target - 1, resume);
                        }
                    }
                }
            }
        }
    }
    handle_and_or(arena, env, feed, registers, context, gen, pos, a, sbx, false)
}

pub(super) fn handle_jmpif(
    arena: &mut ExprArena,
    env: &Env,
    feed: &mut OpcodeFeed,
    registers: &mut RegisterFile,
    context: &mut ParsingContext,
    gen: &mut CodeGen,
    pos: usize,
    a: u16,
    sbx: i32,
) -> Result<(), LiftError> {
    if context.is_when_cond() {
        let cond = super::read_register(arena, registers, a);
        arena.mark_used(cond);
        let target = checked_target(pos, sbx).unwrap_or(pos);
        context.surface_condition(cond, pos, target);
        return Ok(());
    }

    if let Some(target) = checked_target(pos, sbx) {
        if target > pos && target <= feed.len() && target >= 1 {
            if let Some(Opcode::Jmp { sbx: skip_sbx }) = feed.decode_at(target - 1) {
                if skip_sbx > 0 {
                    if let Some(case_end) = checked_target(target - 1, skip_sbx) {
                        if case_end <= feed.len() {
                            if let Some((case_expr, resume)) =
                                try_build_case(arena, env, &*feed, registers, context, pos, a, target, target - 1, case_end)?
                            {
                                let id = arena.push_live(case_expr, 0);
                                gen.push(id);
                                feed.seek(resume);
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }

    handle_and_or(arena, env, feed, registers, context, gen, pos, a, sbx, true)
}

/// Reconstructs a `case`/`when` from a head `JMPIF` whose span ends in a
/// forward `JMP`: the conditions-and-else region `[pos0, skip_pos)` is
/// re-run under a `when-condition` context so every `JMPIF` along the way
/// surfaces its tested value via the callback channel instead of actually
/// branching; consecutive surfaced conditions sharing the same dispatch
/// target are grouped into one `when` arm (the `when a, b` idiom).
///
/// This assumes arm bodies are laid out in source order right after the
/// conditions+else region, which is what the reference compiler emits but
/// isn't something the bytecode states explicitly — noted as a deliberate
/// simplification in the project's design notes.
#[allow(clippy::too_many_arguments)]
fn try_build_case(
    arena: &mut ExprArena,
    env: &Env,
    feed: &OpcodeFeed,
    registers: &RegisterFile,
    context: &ParsingContext,
    pos0: usize,
    a0: u16,
    bodies_start: usize,
    skip_pos: usize,
    case_end: usize,
) -> Result<Option<(Expr, usize)>, LiftError> {
    let _ = a0;

    let mut cond_context = context.push_and_new(ScopeKind::WhenCondition, true);
    cond_context.start_callback();
    let mut cond_registers = registers.clone();
    let mut cond_feed = feed.slice(pos0, skip_pos);
    let _ = super::lift_block(arena, env, &mut cond_feed, &mut cond_registers, &mut cond_context)?;
    let surfaced = cond_context.take_callback();
    if surfaced.is_empty() {
        return Ok(None);
    }

    // `surfaced` positions/targets are local to `cond_feed` (which starts
    // its own cursor at 0, offset by `pos0` from the outer `feed`); every
    // downstream use here slices the *outer* `feed`, so rebase both fields
    // back into that coordinate space before grouping arms.
    let mut arms_raw: Vec<(Vec<ExprId>, usize, usize)> = Vec::new();
    for (expr, surf_pos, target) in surfaced {
        let surf_pos = surf_pos + pos0;
        let target = target + pos0;
        match arms_raw.last_mut() {
            Some(last) if last.1 == target => {
                last.0.push(expr);
                last.2 = surf_pos;
            }
            _ => arms_raw.push((vec![expr], target, surf_pos)),
        }
    }

    let last_cond_end = arms_raw.last().map(|(_, _, p)| p + 1).unwrap_or(pos0 + 1);

    // Replayed under the same `WhenCondition` scope the conditions pass used
    // (without starting a callback), so a `JMPIF` re-encountered here just
    // marks its test used instead of re-attempting jump dispatch against
    // this truncated slice -- only the MOVE/LOADI/EQ side effects on
    // `work_registers` are what this replay is for.
    let mut work_registers = registers.clone();
    if last_cond_end > pos0 {
        let mut prefix_feed = feed.slice(pos0, last_cond_end);
        let mut prefix_context = context.push_and_new(ScopeKind::WhenCondition, true);
        let _ = super::lift_block(arena, env, &mut prefix_feed, &mut work_registers, &mut prefix_context)?;
    }

    let else_body = if skip_pos > last_cond_end {
        let else_feed = feed.slice(last_cond_end, skip_pos);
        let (else_gen, _) = subparse(arena, env, &work_registers, else_feed, context, ScopeKind::Normal, true)?;
        Some(block_expr(arena, else_gen))
    } else {
        None
    };

    let targets: Vec<usize> = std::iter::once(bodies_start).chain(arms_raw.iter().skip(1).map(|(_, t, _)| *t)).collect();
    let targets: Vec<usize> = if targets.len() == arms_raw.len() { targets } else { arms_raw.iter().map(|(_, t, _)| *t).collect() };

    let mut arms = Vec::with_capacity(arms_raw.len());
    for (k, (conditions, start, _)) in arms_raw.into_iter().enumerate() {
        let mut end = if k + 1 < targets.len() { targets[k + 1] } else { case_end };
        if end > start {
            if let Some(Opcode::Jmp { sbx }) = feed.decode_at(end - 1) {
                if checked_target(end - 1, sbx) == Some(case_end) {
                    end -= 1;
                }
            }
        }
        let body_feed = feed.slice(start, end);
        let (body_gen, _) = subparse(arena, env, &work_registers, body_feed, context, ScopeKind::Normal, true)?;
        let body = block_expr(arena, body_gen);
        arms.push(CaseArm { conditions, body });
    }

    let header = lift_case_header(arena, &mut arms);
    Ok(Some((Expr::Case { header, arms, else_body }, case_end)))
}

/// If every arm's every condition is `X === v` for the same `X`, lifts `X`
/// to the `case` header and reduces each condition to its `v` — the common
/// left-hand side becomes the `case` expression itself.
fn lift_case_header(arena: &ExprArena, arms: &mut [CaseArm]) -> Option<ExprId> {
    let mut common: Option<ExprId> = None;
    for arm in arms.iter() {
        if arm.conditions.is_empty() {
            return None;
        }
        for &cond in &arm.conditions {
            match arena.expr(cond) {
                Expr::TwoOp { left, op, .. } if op == "===" => match common {
                    None => common = Some(*left),
                    Some(x) if arena.expr(x) == arena.expr(*left) => {}
                    _ => return None,
                },
                _ => return None,
            }
        }
    }
    let header = common?;
    for arm in arms.iter_mut() {
        arm.conditions = arm
            .conditions
            .iter()
            .map(|&c| match arena.expr(c) {
                Expr::TwoOp { right, .. } => *right,
                _ => c,
            })
            .collect();
    }
    Some(header)
}

#[cfg(test)]
mod tests {
    use crate::config::DecompilerOptions;
    use crate::container::fixtures::{minimal_mrb_with_lvars, word_abc, word_abx, word_asbx};
    use crate::container::RiteFile;

    const MOVE: u8 = 1;
    const LOADI: u8 = 3;
    const JMP: u8 = 23;
    const JMPIF: u8 = 24;
    const JMPNOT: u8 = 25;
    const EQ: u8 = 50;
    const ADD: u8 = 44;
    const LT: u8 = 51;
    const STOP: u8 = 74;
    const GETGLOBAL: u8 = 9;

    #[test]
    fn if_else_scenario_s2() {
        // 1 == 2 computed into a scratch register (r3), never into r1 (the
        // "x" lvar) directly -- matching the reference compiler's rule that
        // expressions never compute straight into a register an LVAR record
        // already names. JMPNOT reads the scratch register's condition,
        // then-block assigns `x = 10`, else-block assigns `x = 20`.
        let instructions = [
            word_asbx(LOADI, 3, 1),       // 0: r3 = 1
            word_asbx(LOADI, 4, 2),       // 1: r4 = 2
            word_abc(EQ, 3, 0, 0),        // 2: r3 = r3 == r4
            word_asbx(JMPNOT, 3, 3),      // 3: target = 3+3 = 6
            word_asbx(LOADI, 1, 10),      // 4: x = 10
            word_asbx(JMP, 0, 2),         // 5: resume = 5+2 = 7
            word_asbx(LOADI, 1, 20),      // 6: x = 20
            word_abc(STOP, 0, 0, 0),      // 7
        ];
        let bytes = minimal_mrb_with_lvars(&instructions, &["=="], &[(1, "x")]);
        let file = RiteFile::parse(&bytes).expect("parses");
        let options = DecompilerOptions::default();
        let text = super::super::decompile(&file, &options).expect("lifts");
        assert!(text.contains("if 1 == 2"), "unexpected output: {text}");
        assert!(text.contains("x = 10"), "unexpected output: {text}");
        assert!(text.contains("else"), "unexpected output: {text}");
        assert!(text.contains("x = 20"), "unexpected output: {text}");
    }

    #[test]
    fn while_loop_scenario_s3() {
        // Classic "test at top" compiled shape: an unconditional JMP to the
        // condition, a body that increments the lvar "i", then a condition
        // computed into scratch registers (never into r1) and a JMPIF back
        // to the body.
        let instructions = [
            word_asbx(LOADI, 1, 0),        // 0: i = 0
            word_asbx(JMP, 0, 3),          // 1: target = 1+3 = 4
            word_asbx(LOADI, 2, 1),        // 2: r2 = 1
            word_abc(ADD, 1, 0, 0),        // 3: i = i + r2
            word_abc(MOVE, 3, 1, 0),       // 4: r3 = i
            word_asbx(LOADI, 4, 5),        // 5: r4 = 5
            word_abc(LT, 3, 1, 0),         // 6: r3 = r3 < r4
            word_asbx(JMPIF, 3, -5),       // 7: target = 7-5 = 2 (loop head)
            word_abc(STOP, 0, 0, 0),       // 8
        ];
        let bytes = minimal_mrb_with_lvars(&instructions, &["+", "<"], &[(1, "i")]);
        let file = RiteFile::parse(&bytes).expect("parses");
        let options = DecompilerOptions::default();
        let text = super::super::decompile(&file, &options).expect("lifts");
        assert!(text.contains("while i < 5"), "unexpected output: {text}");
        assert!(text.contains("i = i + 1"), "unexpected output: {text}");
    }

    #[test]
    fn case_when_scenario_s4() {
        // `case $x; when 1; 100; when 2; 200; else; 999; end`. Each arm
        // copies the scrutinee into a scratch register before comparing
        // (never clobbering r1, the same rule S2/S3 exercise for if/while),
        // and the first JMPIF's own target skips past the later conditions
        // straight into its body -- the shape `try_build_case` keys off.
        let instructions = [
            word_abx(GETGLOBAL, 1, 0),    // 0: r1 = $x
            word_abc(MOVE, 3, 1, 0),      // 1: r3 = r1
            word_asbx(LOADI, 4, 1),       // 2: r4 = 1
            word_abc(EQ, 3, 1, 0),        // 3: r3 = r3 === r4
            word_asbx(JMPIF, 3, 7),       // 4: target = 4+7 = 11 (body1)
            word_abc(MOVE, 3, 1, 0),      // 5: r3 = r1
            word_asbx(LOADI, 4, 2),       // 6: r4 = 2
            word_abc(EQ, 3, 1, 0),        // 7: r3 = r3 === r4
            word_asbx(JMPIF, 3, 5),       // 8: target = 8+5 = 13 (body2)
            word_asbx(LOADI, 5, 999),     // 9: else body
            word_asbx(JMP, 0, 5),         // 10: resume = 10+5 = 15 (case_end)
            word_asbx(LOADI, 5, 100),     // 11: body1
            word_asbx(JMP, 0, 3),         // 12: resume = 12+3 = 15
            word_asbx(LOADI, 5, 200),     // 13: body2
            word_asbx(JMP, 0, 1),         // 14: resume = 14+1 = 15
            word_abc(STOP, 0, 0, 0),      // 15: case_end
        ];
        let bytes = minimal_mrb_with_lvars(&instructions, &["$x", "==="], &[]);
        let file = RiteFile::parse(&bytes).expect("parses");
        let options = DecompilerOptions::default();
        let text = super::super::decompile(&file, &options).expect("lifts");
        assert!(text.contains("case $x"), "unexpected output: {text}");
        assert!(text.contains("when 1"), "unexpected output: {text}");
        assert!(text.contains("100"), "unexpected output: {text}");
        assert!(text.contains("when 2"), "unexpected output: {text}");
        assert!(text.contains("200"), "unexpected output: {text}");
        assert!(text.contains("else"), "unexpected output: {text}");
        assert!(text.contains("999"), "unexpected output: {text}");
    }
}
