//! Register file: a per-irep virtual register bank
//! tracking both "what value is here" and "what name is here", since the
//! lifter must decide per use site whether to print a variable's name or
//! the expression last computed into it.

use crate::ir::ExprId;

#[derive(Debug, Clone, Copy)]
pub struct RegisterSlot {
    /// Current value expression; `None` before any write.
    value: Option<ExprId>,
    /// The lvar symbol this slot is permanently bound to, if any (from the
    /// irep's local-variable table).
    lvar: Option<usize>,
    /// Set by `move_in` when a move brought in another register's lvar
    /// identity without that identity being this slot's own binding.
    tmp_lvar: Option<usize>,
}

impl RegisterSlot {
    fn new(lvar: Option<usize>) -> Self {
        RegisterSlot { value: None, lvar, tmp_lvar: None }
    }
}

/// `R + 1` slots for an irep declaring `R` registers ("one
/// over-allocation simplifies off-by-one arithmetic for call frames").
#[derive(Debug, Clone)]
pub struct RegisterFile {
    slots: Vec<RegisterSlot>,
    /// Register index -> symbol-table index, from the irep's lvar binding
    /// (distinct from the on-disk `LvarTree`, which is resolved into this
    /// at irep-traversal setup time).
    names: Vec<String>,
}

impl RegisterFile {
    /// Builds a fresh file for an irep with `num_registers` registers,
    /// binding `lvars[register] = name` for every entry present.
    pub fn new(num_registers: u16, lvars: &std::collections::HashMap<u16, String>) -> Self {
        let mut names = Vec::new();
        let mut slots = Vec::with_capacity(num_registers as usize + 1);
        for i in 0..=num_registers {
            let lvar = lvars.get(&i).map(|name| {
                names.push(name.clone());
                names.len() - 1
            });
            slots.push(RegisterSlot::new(lvar));
        }
        RegisterFile { slots, names }
    }

    pub fn lvar_name(&self, register: u16) -> Option<&str> {
        self.slots
            .get(register as usize)
            .and_then(|s| s.lvar)
            .map(|idx| self.names[idx].as_str())
    }

    fn tmp_lvar_name(&self, register: u16) -> Option<&str> {
        self.slots
            .get(register as usize)
            .and_then(|s| s.tmp_lvar)
            .map(|idx| self.names[idx].as_str())
    }

    pub fn is_lvar(&self, register: u16) -> bool {
        self.slots.get(register as usize).map(|s| s.lvar.is_some()).unwrap_or(false)
    }

    pub fn value(&self, register: u16) -> Option<ExprId> {
        self.slots.get(register as usize).and_then(|s| s.value)
    }

    /// `load`: set the slot's value, clearing any propagated temp-lvar
    /// identity.
    pub fn load(&mut self, register: u16, expr: ExprId) {
        let slot = &mut self.slots[register as usize];
        slot.value = Some(expr);
        slot.tmp_lvar = None;
    }

    /// `move_in`: copy `src`'s identity into `dst`. If `src` is bound to an
    /// lvar, `dst` inherits that name as its temp-lvar identity (spec
    /// §4.3: "propagate an lvar identity ... used when the reader later
    /// emits expressions that refer to the original named variable").
    pub fn move_in(&mut self, dst: u16, src: u16) {
        let value = self.slots[src as usize].value;
        let lvar_name = self.lvar_name(src).or_else(|| self.tmp_lvar_name(src)).map(str::to_string);
        let slot = &mut self.slots[dst as usize];
        slot.value = value;
        slot.tmp_lvar = lvar_name.and_then(|name| self.names.iter().position(|n| *n == name));
    }

    /// Preferred read for operand position: the lvar name if this slot is
    /// bound to one (so reassigning a named local doesn't inline its
    /// previous value), else the temp-lvar name, else the raw value.
    pub fn value_or_symbol(&self, register: u16) -> RegisterRead {
        if let Some(name) = self.lvar_name(register) {
            return RegisterRead::Name(name.to_string());
        }
        if let Some(name) = self.tmp_lvar_name(register) {
            return RegisterRead::Name(name.to_string());
        }
        match self.value(register) {
            Some(expr) => RegisterRead::Value(expr),
            None => RegisterRead::Uninitialized,
        }
    }
}

/// The result of reading a register as an operand: either it resolves to a
/// named local (render the name) or to a computed expression (render the
/// expression), or the register was never written.
#[derive(Debug, Clone)]
pub enum RegisterRead {
    Name(String),
    Value(ExprId),
    Uninitialized,
}
