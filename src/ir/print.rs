//! Deterministic pretty-printer for the expression arena.

use super::{Arg, CaseArm, Expr, ExprArena, ExprId};
use crate::consts::{binary_operator_priority, is_unary_operator, priority, strip_unary_suffix};

const INDENT: &str = "  ";
const INLINE_ARRAY_LIMIT: usize = 80;

/// Renders expression-arena handles to Ruby-like source text.
///
/// Holds no arena state of its own — it's a pure function of
/// `(arena, options)` — so a single instance can render every top-level
/// expression of a decompiled file.
pub struct Printer<'a> {
    arena: &'a ExprArena,
    include_comments: bool,
}

impl<'a> Printer<'a> {
    pub fn new(arena: &'a ExprArena, include_comments: bool) -> Self {
        Printer { arena, include_comments }
    }

    /// Renders a full block (join surviving top-level
    /// expressions with newlines, dropping pruned and suppressed entries).
    pub fn render_block(&self, exprs: &[ExprId], depth: usize) -> String {
        let mut lines = Vec::new();
        for &id in exprs {
            if self.arena.should_prune(id) {
                continue;
            }
            if matches!(self.arena.expr(id), Expr::LineComment(_)) && !self.include_comments {
                continue;
            }
            let rendered = self.render(id, depth, priority::ASSIGNMENT);
            for line in rendered.lines() {
                lines.push(format!("{}{}", INDENT.repeat(depth), line));
            }
        }
        lines.join("\n")
    }

    /// Renders a body position (a `Method`/`If`/`While`/... child) fully
    /// indented to `depth`, including its first line. A bare `Block`
    /// defers to [`render_block`](Self::render_block) so every statement
    /// gets its own indented line; anything else is a single expression
    /// indented once, since its own render may itself already carry
    /// further-indented lines from nested control flow.
    fn render_body(&self, body: ExprId, depth: usize) -> String {
        match self.arena.expr(body) {
            Expr::Block(exprs) => self.render_block(exprs, depth),
            _ => format!("{}{}", INDENT.repeat(depth), self.render(body, depth, priority::ASSIGNMENT)),
        }
    }

    /// Renders a single expression. `parent_priority` is consulted by
    /// `TwoOp` to decide whether to parenthesize itself.
    fn render(&self, id: ExprId, depth: usize, parent_priority: u8) -> String {
        match self.arena.expr(id) {
            Expr::Nil => "nil".to_string(),
            Expr::True => "true".to_string(),
            Expr::False => "false".to_string(),
            Expr::SelfExpr => "self".to_string(),
            Expr::Literal(s) => s.clone(),
            Expr::Symbol(s) => s.clone(),
            Expr::SymbolLiteral(s) => format!(":{s}"),
            Expr::ClassSymbol { name, parent, singleton } => {
                let mut rendered = name.clone();
                if let Some(p) = parent {
                    rendered = format!("{} < {}", rendered, self.render(*p, depth, priority::ASSIGNMENT));
                }
                if *singleton {
                    rendered = format!("class << {rendered}");
                }
                rendered
            }
            Expr::ModuleSymbol { name } => name.clone(),
            Expr::MConst { scope, name } => {
                format!("{}::{}", self.render(*scope, depth, 0), name)
            }
            Expr::TwoOp { left, right, op, priority: my_priority } => {
                let rendered = format!(
                    "{} {} {}",
                    self.render(*left, depth, *my_priority),
                    op,
                    self.render(*right, depth, *my_priority)
                );
                if *my_priority > parent_priority {
                    format!("({rendered})")
                } else {
                    rendered
                }
            }
            Expr::And { left, right } => {
                let rendered = format!(
                    "{} && {}",
                    self.render(*left, depth, priority::LOGICAL_AND),
                    self.render(*right, depth, priority::LOGICAL_AND)
                );
                if priority::LOGICAL_AND > parent_priority {
                    format!("({rendered})")
                } else {
                    rendered
                }
            }
            Expr::Or { left, right } => {
                let rendered = format!(
                    "{} || {}",
                    self.render(*left, depth, priority::LOGICAL_OR),
                    self.render(*right, depth, priority::LOGICAL_OR)
                );
                if priority::LOGICAL_OR > parent_priority {
                    format!("({rendered})")
                } else {
                    rendered
                }
            }
            Expr::Assign { target, value } => {
                format!(
                    "{} = {}",
                    self.render(*target, depth, priority::ASSIGNMENT),
                    self.render(*value, depth, priority::ASSIGNMENT)
                )
            }
            Expr::Array(items) => self.render_array(items, depth),
            Expr::ArrayConcat { target, value } => {
                format!("{} += {}", self.render(*target, depth, 0), self.render(*value, depth, 0))
            }
            Expr::ArrayPush { target, value } => {
                format!("{} << {}", self.render(*target, depth, priority::SHIFT), self.render(*value, depth, priority::SHIFT))
            }
            Expr::ArrayRef { target, index } => {
                format!("{}[{}]", self.render(*target, depth, 0), self.render(*index, depth, priority::ASSIGNMENT))
            }
            Expr::String(s) => format!("\"{}\"", escape_string(s)),
            Expr::StringConcat(parts) => self.render_string_concat(parts, depth),
            Expr::Hash(entries) => self.render_hash(entries, depth),
            Expr::Range { from, to, exclusive } => {
                let op = if *exclusive { "..." } else { ".." };
                format!("{}{op}{}", self.render(*from, depth, priority::RANGE), self.render(*to, depth, priority::RANGE))
            }
            Expr::MethodCall { source, symbol, args } => self.render_method_call(*source, symbol, args, depth),
            Expr::MethodCallWithBlock { source, symbol, args, block } => {
                let call = self.render_method_call(*source, symbol, args, depth);
                format!("{call} {}", self.render(*block, depth, priority::ASSIGNMENT))
            }
            Expr::Lambda { args, body, is_for_loop: _ } => self.render_lambda(args, *body, depth),
            Expr::Method { parent: _, name, args, body } => {
                let header = render_arg_list(name, args);
                let body_text = self.render_body(*body, depth + 1);
                format!("def {header}\n{}\n{}end", body_text, INDENT.repeat(depth))
            }
            Expr::Block(exprs) => self.render_block(exprs, depth),
            Expr::Class { class_ref, body } => {
                let header = self.render(*class_ref, depth, priority::ASSIGNMENT);
                let body_text = self.render_body(*body, depth + 1);
                format!("class {header}\n{}\n{}end", body_text, INDENT.repeat(depth))
            }
            Expr::Module { module_ref, body } => {
                let header = self.render(*module_ref, depth, priority::ASSIGNMENT);
                let body_text = self.render_body(*body, depth + 1);
                format!("module {header}\n{}\n{}end", body_text, INDENT.repeat(depth))
            }
            Expr::If { cond, then_branch, else_branch } => {
                let cond_text = self.render(*cond, depth, priority::ASSIGNMENT);
                let then_text = self.render_body(*then_branch, depth + 1);
                let mut out = format!("if {cond_text}\n{}\n", then_text);
                if let Some(else_id) = else_branch {
                    let else_text = self.render_body(*else_id, depth + 1);
                    out.push_str(&format!("{}else\n{}\n", INDENT.repeat(depth), else_text));
                }
                out.push_str(&format!("{}end", INDENT.repeat(depth)));
                out
            }
            Expr::While { cond, body, until } => {
                let kw = if *until { "until" } else { "while" };
                let cond_text = self.render(*cond, depth, priority::ASSIGNMENT);
                let body_text = self.render_body(*body, depth + 1);
                format!("{kw} {cond_text}\n{}\n{}end", body_text, INDENT.repeat(depth))
            }
            Expr::Case { header, arms, else_body } => self.render_case(header.as_ref(), arms, else_body.as_ref(), depth),
            Expr::For { vars, collection, body } => {
                let header = if vars.len() == 1 {
                    vars[0].clone()
                } else {
                    vars.join(", ")
                };
                let coll_text = self.render(*collection, depth, priority::ASSIGNMENT);
                let body_text = self.render_body(*body, depth + 1);
                format!("for {header} in {coll_text}\n{}\n{}end", body_text, INDENT.repeat(depth))
            }
            Expr::Return(value) => match value {
                Some(v) => format!("return {}", self.render(*v, depth, priority::ASSIGNMENT)),
                None => "return".to_string(),
            },
            Expr::Break => "break".to_string(),
            Expr::Next => "next".to_string(),
            Expr::LineComment(text) => format!("# {text}"),
            Expr::Raise(text) => format!("raise \"{}\"", escape_string(text)),
            Expr::BlkPush => String::new(),
        }
    }

    fn render_method_call(&self, source: Option<ExprId>, symbol: &str, args: &[ExprId], depth: usize) -> String {
        if let Some(op_priority) = binary_operator_priority(symbol) {
            if args.len() == 1 {
                if let Some(src) = source {
                    let rendered = format!(
                        "{} {} {}",
                        self.render(src, depth, op_priority),
                        symbol,
                        self.render(args[0], depth, op_priority)
                    );
                    return rendered;
                }
            }
        }
        if is_unary_operator(symbol) && args.is_empty() {
            if let Some(src) = source {
                return format!("{}{}", strip_unary_suffix(symbol), self.render(src, depth, priority::UNARY_MINUS));
            }
        }

        let args_text = args
            .iter()
            .map(|&a| self.render(a, depth, priority::ASSIGNMENT))
            .collect::<Vec<_>>()
            .join(", ");
        match source {
            Some(src) => {
                if args.is_empty() {
                    format!("{}.{}", self.render(src, depth, 0), symbol)
                } else {
                    format!("{}.{}({})", self.render(src, depth, 0), symbol, args_text)
                }
            }
            None => {
                if args.is_empty() {
                    symbol.to_string()
                } else {
                    format!("{symbol}({args_text})")
                }
            }
        }
    }

    fn render_array(&self, items: &[ExprId], depth: usize) -> String {
        let rendered: Vec<String> = items.iter().map(|&id| self.render(id, depth, priority::ASSIGNMENT)).collect();
        let inline = format!("[{}]", rendered.join(", "));
        if inline.len() <= INLINE_ARRAY_LIMIT {
            inline
        } else {
            let inner_indent = INDENT.repeat(depth + 1);
            let body = rendered
                .iter()
                .map(|line| format!("{inner_indent}{line},"))
                .collect::<Vec<_>>()
                .join("\n");
            format!("[\n{body}\n{}]", INDENT.repeat(depth))
        }
    }

    fn render_string_concat(&self, parts: &[ExprId], depth: usize) -> String {
        let mut buf = String::new();
        for &id in parts {
            match self.arena.expr(id) {
                Expr::String(s) => buf.push_str(&escape_string(s)),
                Expr::Literal(s) => buf.push_str(&escape_string(s)),
                _ => {
                    buf.push_str("#{");
                    buf.push_str(&self.render(id, depth, priority::ASSIGNMENT));
                    buf.push('}');
                }
            }
        }
        format!("\"{buf}\"")
    }

    fn render_hash(&self, entries: &[crate::ir::HashEntry], depth: usize) -> String {
        if entries.is_empty() {
            return "{}".to_string();
        }
        let render_entry = |e: &crate::ir::HashEntry| {
            let key = self.render_hash_key(e.key, depth);
            let value = self.render(e.value, depth, priority::ASSIGNMENT);
            format!("{key} => {value}")
        };
        if entries.len() == 1 {
            format!("{{ {} }}", render_entry(&entries[0]))
        } else {
            let inner_indent = INDENT.repeat(depth + 1);
            let body = entries
                .iter()
                .map(|e| format!("{inner_indent}{},", render_entry(e)))
                .collect::<Vec<_>>()
                .join("\n");
            format!("{{\n{body}\n{}}}", INDENT.repeat(depth))
        }
    }

    fn render_hash_key(&self, key: ExprId, depth: usize) -> String {
        let rendered = self.render(key, depth, priority::ASSIGNMENT);
        if rendered.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            format!("\"{rendered}\"")
        } else {
            rendered
        }
    }

    fn render_lambda(&self, args: &[Arg], body: ExprId, depth: usize) -> String {
        let params = if args.is_empty() {
            String::new()
        } else {
            format!("|{}| ", render_args(args))
        };
        let inline_body = match self.arena.expr(body) {
            Expr::Block(exprs) if exprs.len() == 1 => Some(exprs[0]),
            Expr::Block(exprs) if exprs.is_empty() => None,
            Expr::Block(_) => None,
            _ => Some(body),
        };
        match inline_body {
            Some(id) => format!("{{ {params}{} }}", self.render(id, depth, priority::ASSIGNMENT)),
            None if matches!(self.arena.expr(body), Expr::Block(exprs) if exprs.is_empty()) => {
                format!("{{ {params}}}")
            }
            None => {
                let body_text = self.render_body(body, depth + 1);
                format!("{{ {params}\n{}\n{}}}", body_text, INDENT.repeat(depth))
            }
        }
    }

    fn render_case(&self, header: Option<&ExprId>, arms: &[CaseArm], else_body: Option<&ExprId>, depth: usize) -> String {
        let header_text = header.map(|h| format!(" {}", self.render(*h, depth, priority::ASSIGNMENT))).unwrap_or_default();
        let mut out = format!("case{header_text}\n");
        let arm_indent = INDENT.repeat(depth);
        for arm in arms {
            let conds = arm
                .conditions
                .iter()
                .map(|&c| self.render(c, depth, priority::ASSIGNMENT))
                .collect::<Vec<_>>()
                .join(", ");
            let body_text = self.render_body(arm.body, depth + 1);
            out.push_str(&format!("{arm_indent}when {conds}\n{}\n", body_text));
        }
        if let Some(else_id) = else_body {
            let body_text = self.render_body(*else_id, depth + 1);
            out.push_str(&format!("{arm_indent}else\n{}\n", body_text));
        }
        out.push_str(&format!("{arm_indent}end"));
        out
    }
}

fn render_args(args: &[Arg]) -> String {
    args.iter()
        .map(|a| format!("{}{}", a.prefix, a.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_arg_list(name: &str, args: &[Arg]) -> String {
    if args.is_empty() {
        name.to_string()
    } else {
        format!("{name}({})", render_args(args))
    }
}

fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
