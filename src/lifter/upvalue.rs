//! `GETUPVAR`/`SETUPVAR` resolution ("Upvalues"): walks the
//! lexical parent-scope chain outward from the nearest enclosing scope,
//! looking for the first register file whose slot at `register` is bound
//! to a named local.
//!
//! mruby's upvalue operand is a register number in an enclosing scope, not
//! a depth-and-register pair — nested closures more than one level deep
//! still address their grandparent's registers directly, since each
//! intermediate scope's `ENTER` re-exposes the names it captured. Walking
//! from the nearest parent outward and taking the first match therefore
//! finds the right binding without needing an explicit depth count.

use super::Env;

pub(super) fn resolve(env: &Env, register: u16) -> Option<String> {
    env.parents.iter().rev().find_map(|scope| scope.lvar_name(register).map(str::to_string))
}
