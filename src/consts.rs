//! Fixed tables the lifter and printer consult: opcode bounds, operator
//! priority, and the set of symbols that render as operators rather than
//! plain method calls.

/// Highest valid opcode id ("opcode value ∈ [0, 81]").
pub const MAX_OPCODE_ID: u8 = 81;

/// Argspec value `ENTER` carries for the anonymous for-loop lambda idiom:
/// `req == 1` (the single block parameter), everything else zero.
pub const FOR_LOOP_ARGSPEC: u32 = crate::opcode::packing::Aspec::FOR_LOOP_AX;

/// Operator-priority table. Lower binds tighter; a child
/// two-op node is parenthesized iff its priority is numerically greater
/// than its parent's.
pub mod priority {
    pub const UNARY_BANG_TILDE_PLUS: u8 = 0;
    pub const POW: u8 = 1;
    pub const UNARY_MINUS: u8 = 2;
    pub const MUL_DIV_MOD: u8 = 3;
    pub const ADD_SUB: u8 = 4;
    pub const SHIFT: u8 = 5;
    pub const BIT_AND: u8 = 6;
    pub const BIT_OR_XOR: u8 = 7;
    pub const COMPARISON: u8 = 8;
    pub const EQUALITY: u8 = 9;
    pub const LOGICAL_AND: u8 = 10;
    pub const LOGICAL_OR: u8 = 11;
    pub const RANGE: u8 = 12;
    pub const TERNARY: u8 = 13;
    pub const ASSIGNMENT: u8 = 15;
}

/// Maps a binary-operator symbol to its rendering priority, or `None` if
/// the symbol isn't a recognized infix operator (in which case the call
/// renders as `src.sym(args)` rather than `src SYM arg`).
pub fn binary_operator_priority(symbol: &str) -> Option<u8> {
    use priority::*;
    Some(match symbol {
        "**" => POW,
        "*" | "/" | "%" => MUL_DIV_MOD,
        "+" | "-" => ADD_SUB,
        "<<" | ">>" => SHIFT,
        "&" => BIT_AND,
        "|" | "^" => BIT_OR_XOR,
        "<" | "<=" | ">" | ">=" | "<=>" => COMPARISON,
        "==" | "===" | "!=" | "=~" => EQUALITY,
        ".." | "..." => RANGE,
        _ => return None,
    })
}

/// Unary operator symbols ("arity 0, strip any `@` suffix").
pub fn is_unary_operator(symbol: &str) -> bool {
    matches!(symbol, "-@" | "+@" | "!" | "~")
}

/// Strips the `@` suffix mruby attaches to unary-operator method names
/// (`-@`, `+@`) so the printer can render `-x` instead of `-@x`.
pub fn strip_unary_suffix(symbol: &str) -> &str {
    symbol.strip_suffix('@').unwrap_or(symbol)
}
