//! Lambda/method/class/module materialization ("Lambdas, methods,
//! classes and modules"): everything that recurses into a child irep.
//!
//! `LAMBDA` and `EXEC` are the only two opcodes that hand control to a
//! nested irep. `LAMBDA` covers closures (blocks, `for`-loop bodies, and
//! `def` bodies, which are closures that happen to be immediately finalized
//! by a trailing `METHOD`); `EXEC` covers class/module bodies.

use crate::codegen::CodeGen;
use crate::container::Irep;
use crate::context::ScopeKind;
use crate::error::LiftError;
use crate::feed::OpcodeFeed;
use crate::ir::{Arg, Expr, ExprArena, ExprId};
use crate::opcode::packing::Aspec;
use crate::opcode::Opcode;
use crate::registers::RegisterFile;

use super::{upvalue, CurClass, Env};

fn child_irep<'a>(env: &Env<'a>, index: u16) -> Result<&'a Irep, LiftError> {
    env.irep
        .children
        .get(index as usize)
        .ok_or(LiftError::ChildIrepOutOfRange { index: index as usize, len: env.irep.children.len() })
}

/// True when `spec` is the argspec the reference compiler emits for a
/// desugared `for` loop's block ("For-loops"): built by decoding
/// the same canonical word the fixture helpers use, so this stays correct
/// regardless of the exact bit layout `Aspec` packs into.
fn is_for_loop_argspec(spec: Aspec) -> bool {
    match crate::opcode::decode((Aspec::FOR_LOOP_AX << 7) | 38) {
        Opcode::Enter { spec: canonical } => spec == canonical,
        _ => false,
    }
}

fn lvar_or(lvars: &crate::container::LvarRecord, register: u16, fallback: &str) -> String {
    lvars.get(register).map(str::to_string).unwrap_or_else(|| format!("{fallback}{register}"))
}

/// Resolves the name a `SETUPVAR` targeting the *enclosing* scope's
/// register `b` should render as: the enclosing register file's own lvar
/// binding if it has one there directly, else a further walk up the parent
/// chain ("Upvalues"), else a synthetic placeholder.
fn resolve_outer_name(env: &Env, registers: &RegisterFile, b: u16, ordinal: usize) -> String {
    registers
        .lvar_name(b)
        .map(str::to_string)
        .or_else(|| upvalue::resolve(env, b))
        .unwrap_or_else(|| format!("v{ordinal}"))
}

/// Reads a desugared for-loop lambda body's leading variable-binding
/// prologue ("the body begins with either a sequence of AREF/assignment
/// pairs (destructured multi-var form) or a sequence of SETUPVAR pairs
/// (single-var form)"). The single block
/// parameter lands in register 1 (the child irep's `ENTER` always decodes
/// to `req == 1` for this idiom); destructuring reads it back with `AREF`
/// before writing each piece out to the enclosing scope, while the
/// single-var form writes it out directly.
///
/// Returns the loop variable names in source order and how many
/// instructions after `ENTER` were consumed, so the caller can tell
/// [`super::lift_irep`] to skip them — they are the loop header, not body
/// statements.
fn parse_for_loop_vars(env: &Env, registers: &RegisterFile, irep: &Irep) -> (Vec<String>, usize) {
    let decode_at = |i: usize| irep.instructions.get(i).map(|&w| crate::opcode::decode(w));
    let mut vars = Vec::new();
    let mut idx = 1usize; // instruction 0 is ENTER

    loop {
        match (decode_at(idx), decode_at(idx + 1)) {
            (Some(Opcode::Aref { a: dest, b: 1, c: _ }), Some(Opcode::Setupvar { a: sa, b })) if sa == dest => {
                vars.push(resolve_outer_name(env, registers, b, vars.len()));
                idx += 2;
            }
            _ => break,
        }
    }

    if vars.is_empty() {
        if let Some(Opcode::Setupvar { a: 1, b }) = decode_at(idx) {
            vars.push(resolve_outer_name(env, registers, b, 0));
            idx += 1;
        }
    }

    (vars, idx - 1)
}

/// Builds the declared argument list from a child irep's leading `ENTER`
/// instruction ("Argument lists"). Optional-argument default
/// expressions aren't reconstructed: the `ENTER`-adjacent jump table that
/// encodes them needs its own small interpreter this lifter doesn't run,
/// so every optional argument surfaces with `default: None`.
fn parse_enter(lvars: &crate::container::LvarRecord, spec: Aspec) -> Vec<Arg> {
    let mut args = Vec::new();
    let mut reg = 1u16;

    for _ in 0..spec.req {
        args.push(Arg { name: lvar_or(lvars, reg, "req_"), default: None, prefix: "" });
        reg += 1;
    }
    for _ in 0..spec.opt {
        args.push(Arg { name: lvar_or(lvars, reg, "opt_"), default: None, prefix: "" });
        reg += 1;
    }
    if spec.rest {
        args.push(Arg { name: lvar_or(lvars, reg, "rest_"), default: None, prefix: "*" });
        reg += 1;
    }
    for _ in 0..spec.post {
        args.push(Arg { name: lvar_or(lvars, reg, "post_"), default: None, prefix: "" });
        reg += 1;
    }
    for _ in 0..spec.key {
        args.push(Arg { name: lvar_or(lvars, reg, "key_"), default: None, prefix: "" });
        reg += 1;
    }
    if spec.kdict {
        args.push(Arg { name: lvar_or(lvars, reg, "kdict_"), default: None, prefix: "" });
        reg += 1;
    }
    if spec.block {
        args.push(Arg { name: lvar_or(lvars, reg, "block_"), default: None, prefix: "&" });
    }

    args
}

/// `LAMBDA a, bz`: materializes child irep `bz` as a closure stored in
/// `R(a)`. When the very next instruction is `METHOD`, the pair is a `def`
/// and is emitted directly as one [`Expr::Method`] instead of leaving a
/// bare lambda value sitting in the register ("LAMBDA+METHOD
/// always appear as an adjacent pair for a method definition").
pub(super) fn handle_lambda(
    arena: &mut ExprArena,
    env: &Env,
    feed: &mut OpcodeFeed,
    registers: &mut RegisterFile,
    gen: &mut CodeGen,
    a: u16,
    bz: u16,
) -> Result<(), LiftError> {
    let irep = child_irep(env, bz)?;
    let lvars = env
        .lvars
        .children
        .get(bz as usize)
        .map(|t| &t.record)
        .ok_or(LiftError::ChildIrepOutOfRange { index: bz as usize, len: env.lvars.children.len() })?;

    let mut child_feed = OpcodeFeed::new(&irep.instructions);
    let spec = match child_feed.next() {
        Some(Opcode::Enter { spec }) => spec,
        _ => Aspec { req: 0, opt: 0, rest: false, post: 0, key: 0, kdict: false, block: false },
    };

    let for_loop = is_for_loop_argspec(spec);
    let (for_vars, prologue_len) =
        if for_loop { parse_for_loop_vars(env, registers, irep) } else { (Vec::new(), 0) };
    let args = if for_loop && !for_vars.is_empty() {
        for_vars.into_iter().map(|name| Arg { name, default: None, prefix: "" }).collect()
    } else {
        parse_enter(lvars, spec)
    };

    let is_method_def = matches!(feed.cur(), Some(Opcode::Method { a: ma, .. }) if ma == a);
    let initial_scope = if for_loop {
        ScopeKind::ForLoop
    } else if is_method_def {
        ScopeKind::Method
    } else {
        ScopeKind::Normal
    };

    let mut parents = env.parents.clone();
    parents.push(registers.clone());

    let body_gen = super::lift_irep(
        arena,
        irep,
        env.lvars.children.get(bz as usize).expect("checked above"),
        parents,
        env.cur_class,
        false,
        initial_scope,
        false,
        prologue_len,
        0,
        env.options,
    )?;
    let body = arena.push_live(Expr::Block(body_gen.exprs().to_vec()), a);

    if is_method_def {
        let Some(Opcode::Method { b, .. }) = feed.next() else { unreachable!("matched above") };
        let method_name = method_symbol(env, b)?;
        let parent = self_or_current_class(arena, env);
        let id = arena.push_live(Expr::Method { parent, name: method_name, args, body }, a);
        gen.push(id);
        registers.load(a, id);
    } else {
        let id = arena.push(Expr::Lambda { args, body, is_for_loop: for_loop }, a);
        registers.load(a, id);
    }

    Ok(())
}

fn method_symbol(env: &Env, b: u16) -> Result<String, LiftError> {
    super::symbol_name(env.irep, b as usize).map(str::to_string)
}

fn self_or_current_class(arena: &mut ExprArena, env: &Env) -> ExprId {
    match env.cur_class {
        CurClass::Main => arena.push(Expr::SelfExpr, 0),
        CurClass::Named(class_ref) => class_ref,
    }
}

/// `EXEC a, bx`: runs child irep `bx` as a class/module body, with `R(a)`
/// holding the class/module reference `OCLASS`/`CLASS`/`MODULE`/`SCLASS`
/// pushed earlier ("Classes and modules").
pub(super) fn handle_exec(
    arena: &mut ExprArena,
    env: &Env,
    registers: &mut RegisterFile,
    gen: &mut CodeGen,
    a: u16,
    bx: u16,
) -> Result<(), LiftError> {
    let irep = child_irep(env, bx)?;
    let lvars = env
        .lvars
        .children
        .get(bx as usize)
        .ok_or(LiftError::ChildIrepOutOfRange { index: bx as usize, len: env.lvars.children.len() })?;

    let class_ref = super::read_register(arena, registers, a);
    arena.mark_used(class_ref);
    let is_module = matches!(arena.expr(class_ref), Expr::ModuleSymbol { .. });

    let mut parents = env.parents.clone();
    parents.push(registers.clone());

    let body_gen = super::lift_irep(
        arena,
        irep,
        lvars,
        parents,
        CurClass::Named(class_ref),
        false,
        ScopeKind::Normal,
        false,
        0,
        0,
        env.options,
    )?;
    let body = arena.push_live(Expr::Block(body_gen.exprs().to_vec()), a);

    let id = if is_module {
        arena.push_live(Expr::Module { module_ref: class_ref, body }, a)
    } else {
        arena.push_live(Expr::Class { class_ref, body }, a)
    };
    gen.push(id);
    registers.load(a, id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecompilerOptions;
    use crate::container::{Irep, LvarTree};
    use crate::opcode::decode;
    use std::collections::HashMap;

    fn word_abc(op: u8, a: u16, b: u16, c: u8) -> u32 {
        ((a as u32) << 23) | ((b as u32) << 14) | ((c as u32) << 7) | op as u32
    }

    fn opcode_id(sample: crate::opcode::Opcode) -> u8 {
        // Round-trip through a word built with a recognizable field to find
        // the numeric id `decode` maps to this variant, rather than
        // hardcoding ids that would drift if the opcode table is reordered.
        for id in 0u8..=81 {
            if std::mem::discriminant(&decode(id as u32)) == std::mem::discriminant(&sample) {
                return id;
            }
        }
        panic!("no opcode id decodes to the given variant");
    }

    fn test_env<'a>(irep: &'a Irep, lvars: &'a LvarTree, options: &'a DecompilerOptions) -> Env<'a> {
        Env { irep, lvars, parents: Vec::new(), cur_class: CurClass::Main, is_top_level: false, options }
    }

    #[test]
    fn for_loop_single_var_prologue_resolves_outer_lvar_name() {
        let setupvar_id = opcode_id(crate::opcode::Opcode::Setupvar { a: 0, b: 0 });
        let enter_id = opcode_id(crate::opcode::Opcode::Enter { spec: Aspec { req: 1, opt: 0, rest: false, post: 0, key: 0, kdict: false, block: false } });

        let child = Irep {
            num_local_vars: 0,
            num_registers: 2,
            instructions: vec![
                (Aspec::FOR_LOOP_AX << 7) | enter_id as u32,
                // SETUPVAR a=1 (register holding the block param), b=1
                // (the enclosing scope's register bound to the loop var).
                word_abc(setupvar_id, 1, 1, 0),
            ],
            pool: Vec::new(),
            symbols: Vec::new(),
            children: Vec::new(),
        };

        let parent_irep = Irep {
            num_local_vars: 2,
            num_registers: 4,
            instructions: Vec::new(),
            pool: Vec::new(),
            symbols: Vec::new(),
            children: vec![child.clone()],
        };
        let lvars = LvarTree::empty(&parent_irep);
        let options = DecompilerOptions::default();
        let env = test_env(&parent_irep, &lvars, &options);

        let mut names = HashMap::new();
        names.insert(1u16, "item".to_string());
        let registers = RegisterFile::new(4, &names);

        let (vars, skip) = parse_for_loop_vars(&env, &registers, &child);
        assert_eq!(vars, vec!["item".to_string()]);
        assert_eq!(skip, 1);
    }

    #[test]
    fn for_loop_argspec_detection_matches_canonical_encoding() {
        let enter_id = opcode_id(crate::opcode::Opcode::Enter { spec: Aspec { req: 0, opt: 0, rest: false, post: 0, key: 0, kdict: false, block: false } });
        let word = (Aspec::FOR_LOOP_AX << 7) | enter_id as u32;
        match decode(word) {
            crate::opcode::Opcode::Enter { spec } => assert!(is_for_loop_argspec(spec)),
            other => panic!("expected Enter, got {other:?}"),
        }
    }
}
