//! In-memory intermediate representation.
//!
//! Functions are lists of basic blocks; every value is produced by exactly
//! one instruction. Mutable variables live in per-function storage slots
//! that are only touched through `load` and `store`. Calls name their
//! callee, so a function can be replaced without patching its callers.

use super::backend::{ArithOp, Backend, BoolPredicate, Execute, FloatPredicate, RuntimeValue, ValueKind};
use super::engine::Engine;
use super::error::{Error, ErrorKind};
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

/// A block together with the function it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRef {
    pub func: FuncId,
    pub block: BlockId,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Inst {
    ConstNumber {
        dst: ValueId,
        value: f64,
    },
    ConstBool {
        dst: ValueId,
        value: bool,
    },
    Param {
        dst: ValueId,
        index: usize,
    },
    Arith {
        dst: ValueId,
        op: ArithOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    FCmp {
        dst: ValueId,
        pred: FloatPredicate,
        lhs: ValueId,
        rhs: ValueId,
    },
    BCmp {
        dst: ValueId,
        pred: BoolPredicate,
        lhs: ValueId,
        rhs: ValueId,
    },
    Not {
        dst: ValueId,
        src: ValueId,
    },
    Load {
        dst: ValueId,
        slot: SlotId,
    },
    Store {
        slot: SlotId,
        src: ValueId,
    },
    Call {
        dst: ValueId,
        callee: String,
        args: Vec<ValueId>,
    },
    // Must lead its block.
    Phi {
        dst: ValueId,
        incoming: Vec<(BlockId, ValueId)>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Terminator {
    Br(BlockId),
    CondBr {
        cond: ValueId,
        then: BlockId,
        els: BlockId,
    },
    Ret(ValueId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub label: String,
    pub insts: Vec<Inst>,
    pub term: Option<Terminator>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IrFunction {
    pub name: String,
    pub params: Vec<String>,
    pub ret: ValueKind,
    pub slots: Vec<String>,
    pub blocks: Vec<Block>,
    value_count: u32,
}

impl IrFunction {
    fn new(name: &str, params: &[String], ret: ValueKind) -> IrFunction {
        IrFunction {
            name: name.to_owned(),
            params: params.to_vec(),
            ret,
            slots: Vec::new(),
            blocks: Vec::new(),
            value_count: 0,
        }
    }

    pub fn value_count(&self) -> usize {
        self.value_count as usize
    }

    /// A declaration has no blocks.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    fn new_value(&mut self) -> ValueId {
        let id = ValueId(self.value_count);
        self.value_count += 1;
        id
    }
}

#[derive(Clone, Debug, Default)]
pub struct Module {
    funcs: Vec<Option<IrFunction>>,
    names: HashMap<String, FuncId>,
}

impl Module {
    pub fn function(&self, id: FuncId) -> Option<&IrFunction> {
        self.funcs.get(id.0 as usize).and_then(|f| f.as_ref())
    }

    pub fn lookup(&self, name: &str) -> Option<&IrFunction> {
        self.names.get(name).and_then(|id| self.function(*id))
    }

    pub fn functions(&self) -> impl Iterator<Item = &IrFunction> {
        self.funcs.iter().filter_map(|f| f.as_ref())
    }

    fn function_mut(&mut self, id: FuncId) -> Option<&mut IrFunction> {
        self.funcs.get_mut(id.0 as usize).and_then(|f| f.as_mut())
    }
}

/// Builds IR into a `Module`, one insertion point at a time.
#[derive(Debug, Default)]
pub struct Builder {
    module: Module,
    cursor: Option<BlockRef>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    fn current(&mut self) -> (&mut IrFunction, BlockId) {
        let cursor = self
            .cursor
            .expect("builder is not positioned in a block");
        let function = self
            .module
            .function_mut(cursor.func)
            .expect("builder is positioned in a deleted function");
        (function, cursor.block)
    }

    fn emit<F>(&mut self, make: F) -> ValueId
    where
        F: FnOnce(ValueId) -> Inst,
    {
        let (function, block) = self.current();
        let dst = function.new_value();
        function.blocks[block.0 as usize].insts.push(make(dst));
        dst
    }

    fn push(&mut self, inst: Inst) {
        let (function, block) = self.current();
        function.blocks[block.0 as usize].insts.push(inst);
    }

    fn terminate(&mut self, term: Terminator) {
        let (function, block) = self.current();
        function.blocks[block.0 as usize].term = Some(term);
    }
}

impl Backend for Builder {
    type Value = ValueId;
    type Block = BlockRef;
    type Slot = SlotId;
    type Function = FuncId;

    fn const_number(&mut self, value: f64) -> ValueId {
        self.emit(|dst| Inst::ConstNumber { dst, value })
    }

    fn const_bool(&mut self, value: bool) -> ValueId {
        self.emit(|dst| Inst::ConstBool { dst, value })
    }

    fn build_arith(&mut self, op: ArithOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.emit(|dst| Inst::Arith { dst, op, lhs, rhs })
    }

    fn build_fcmp(&mut self, pred: FloatPredicate, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.emit(|dst| Inst::FCmp {
            dst,
            pred,
            lhs,
            rhs,
        })
    }

    fn build_bcmp(&mut self, pred: BoolPredicate, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.emit(|dst| Inst::BCmp {
            dst,
            pred,
            lhs,
            rhs,
        })
    }

    fn build_not(&mut self, src: ValueId) -> ValueId {
        self.emit(|dst| Inst::Not { dst, src })
    }

    fn build_slot(&mut self, function: FuncId, name: &str) -> SlotId {
        let function = self
            .module
            .function_mut(function)
            .expect("slot requested for a deleted function");
        function.slots.push(name.to_owned());
        SlotId(function.slots.len() as u32 - 1)
    }

    fn build_load(&mut self, slot: SlotId, _name: &str) -> ValueId {
        self.emit(|dst| Inst::Load { dst, slot })
    }

    fn build_store(&mut self, slot: SlotId, src: ValueId) {
        self.push(Inst::Store { slot, src })
    }

    fn append_block(&mut self, function: FuncId, name: &str) -> BlockRef {
        let f = self
            .module
            .function_mut(function)
            .expect("block requested for a deleted function");
        f.blocks.push(Block {
            label: name.to_owned(),
            insts: Vec::new(),
            term: None,
        });
        BlockRef {
            func: function,
            block: BlockId(f.blocks.len() as u32 - 1),
        }
    }

    fn position_at_end(&mut self, block: BlockRef) {
        self.cursor = Some(block);
    }

    fn insert_block(&self) -> BlockRef {
        self.cursor.expect("builder is not positioned in a block")
    }

    fn build_br(&mut self, target: BlockRef) {
        self.terminate(Terminator::Br(target.block))
    }

    fn build_cond_br(&mut self, cond: ValueId, then: BlockRef, els: BlockRef) {
        self.terminate(Terminator::CondBr {
            cond,
            then: then.block,
            els: els.block,
        })
    }

    fn build_phi(&mut self, _kind: ValueKind, incoming: &[(ValueId, BlockRef)]) -> ValueId {
        let incoming = incoming.iter().map(|(v, b)| (b.block, *v)).collect();
        self.emit(|dst| Inst::Phi { dst, incoming })
    }

    fn build_ret(&mut self, value: ValueId) {
        self.terminate(Terminator::Ret(value))
    }

    fn build_call(&mut self, callee: FuncId, args: &[ValueId]) -> ValueId {
        let callee = self
            .module
            .function(callee)
            .map(|f| f.name.clone())
            .expect("call to a deleted function");
        let args = args.to_vec();
        self.emit(|dst| Inst::Call { dst, callee, args })
    }

    fn declare_function(&mut self, name: &str, params: &[String], ret: ValueKind) -> FuncId {
        if let Some(old) = self.get_function(name) {
            self.delete_function(old);
        }
        let id = FuncId(self.module.funcs.len() as u32);
        self.module
            .funcs
            .push(Some(IrFunction::new(name, params, ret)));
        self.module.names.insert(name.to_owned(), id);
        id
    }

    fn get_function(&self, name: &str) -> Option<FuncId> {
        self.module
            .names
            .get(name)
            .copied()
            .filter(|id| self.module.function(*id).is_some())
    }

    fn param(&mut self, _function: FuncId, index: usize) -> ValueId {
        self.emit(|dst| Inst::Param { dst, index })
    }

    fn param_count(&self, function: FuncId) -> usize {
        self.module
            .function(function)
            .map(|f| f.params.len())
            .unwrap_or(0)
    }

    fn return_kind(&self, function: FuncId) -> ValueKind {
        self.module
            .function(function)
            .map(|f| f.ret)
            .unwrap_or(ValueKind::Number)
    }

    fn delete_function(&mut self, function: FuncId) {
        let name = match self.module.funcs.get_mut(function.0 as usize) {
            Some(slot) => match slot.take() {
                Some(f) => f.name,
                None => return,
            },
            None => return,
        };
        if self.module.names.get(&name) == Some(&function) {
            self.module.names.remove(&name);
        }
        if self.cursor.map(|c| c.func) == Some(function) {
            self.cursor = None;
        }
    }

    fn replace_function(&mut self, old: FuncId, new: FuncId) {
        let name = match self.module.function(old) {
            Some(f) => f.name.clone(),
            None => return,
        };
        let staged = match self.module.function_mut(new) {
            Some(f) => std::mem::replace(&mut f.name, name.clone()),
            None => return,
        };
        self.delete_function(old);
        if self.module.names.get(&staged) == Some(&new) {
            self.module.names.remove(&staged);
        }
        self.module.names.insert(name.clone(), new);

        // Calls resolve by name, so only self-calls made under the old name
        // of `new` need renaming.
        if let Some(f) = self.module.function_mut(new) {
            for block in &mut f.blocks {
                for inst in &mut block.insts {
                    if let Inst::Call { callee, .. } = inst {
                        if *callee == staged {
                            *callee = name.clone();
                        }
                    }
                }
            }
        }
    }

    fn has_callers(&self, function: FuncId) -> bool {
        let name = match self.module.function(function) {
            Some(f) => &f.name,
            None => return false,
        };
        self.module
            .funcs
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != function.0 as usize)
            .filter_map(|(_, f)| f.as_ref())
            .flat_map(|f| f.blocks.iter())
            .flat_map(|b| b.insts.iter())
            .any(|inst| match inst {
                Inst::Call { callee, .. } => callee == name,
                _ => false,
            })
    }

    fn finish_function(&mut self, function: FuncId) -> Result<(), Error> {
        let f = self.module.function(function).ok_or_else(|| {
            Error::from(ErrorKind::Codegen("function was deleted".to_owned()))
        })?;
        if f.blocks.is_empty() {
            return Err(Error::from(ErrorKind::Codegen(format!(
                "function '{}' has no body",
                f.name
            ))));
        }
        for block in &f.blocks {
            if block.term.is_none() {
                return Err(Error::from(ErrorKind::Codegen(format!(
                    "block '{}' in '{}' has no terminator",
                    block.label, f.name
                ))));
            }
        }
        Ok(())
    }

    fn dump_function(&self, function: FuncId) -> String {
        self.module
            .function(function)
            .map(|f| f.to_string())
            .unwrap_or_default()
    }
}

impl Execute for Builder {
    fn run(&mut self, function: FuncId) -> Result<RuntimeValue, Error> {
        let name = self
            .module
            .function(function)
            .map(|f| f.name.clone())
            .ok_or_else(|| Error::from(ErrorKind::Execution("function was deleted".to_owned())))?;
        Engine::new(&self.module).call(&name, &[])
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Inst::ConstNumber { dst, value } => write!(f, "%{} = const double {:?}", dst.0, value),
            Inst::ConstBool { dst, value } => write!(f, "%{} = const bool {}", dst.0, value),
            Inst::Param { dst, index } => write!(f, "%{} = param {}", dst.0, index),
            Inst::Arith { dst, op, lhs, rhs } => {
                let name = match op {
                    ArithOp::Add => "fadd",
                    ArithOp::Sub => "fsub",
                    ArithOp::Mul => "fmul",
                    ArithOp::Div => "fdiv",
                };
                write!(f, "%{} = {} %{}, %{}", dst.0, name, lhs.0, rhs.0)
            }
            Inst::FCmp { dst, pred, lhs, rhs } => {
                let name = match pred {
                    FloatPredicate::Oeq => "oeq",
                    FloatPredicate::One => "one",
                    FloatPredicate::Ult => "ult",
                    FloatPredicate::Ule => "ule",
                };
                write!(f, "%{} = fcmp {} %{}, %{}", dst.0, name, lhs.0, rhs.0)
            }
            Inst::BCmp { dst, pred, lhs, rhs } => {
                let name = match pred {
                    BoolPredicate::Eq => "eq",
                    BoolPredicate::Ne => "ne",
                };
                write!(f, "%{} = icmp {} %{}, %{}", dst.0, name, lhs.0, rhs.0)
            }
            Inst::Not { dst, src } => write!(f, "%{} = not %{}", dst.0, src.0),
            Inst::Load { dst, slot } => write!(f, "%{} = load $%{}", dst.0, slot.0),
            Inst::Store { slot, src } => write!(f, "store %{}, $%{}", src.0, slot.0),
            Inst::Call { dst, callee, args } => {
                let args: Vec<String> = args.iter().map(|a| format!("%{}", a.0)).collect();
                write!(f, "%{} = call @{}({})", dst.0, callee, args.join(", "))
            }
            Inst::Phi { dst, incoming } => {
                let arms: Vec<String> = incoming
                    .iter()
                    .map(|(b, v)| format!("[ %{}, #{} ]", v.0, b.0))
                    .collect();
                write!(f, "%{} = phi {}", dst.0, arms.join(", "))
            }
        }
    }
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| format!("double %{}", p)).collect();
        if self.is_declaration() {
            return writeln!(f, "declare {} @{}({})", self.ret, self.name, params.join(", "));
        }

        writeln!(f, "define {} @{}({}) {{", self.ret, self.name, params.join(", "))?;
        for (i, slot) in self.slots.iter().enumerate() {
            writeln!(f, "  $%{} = slot double ; {}", i, slot)?;
        }
        for (i, block) in self.blocks.iter().enumerate() {
            writeln!(f, "#{} {}:", i, block.label)?;
            for inst in &block.insts {
                writeln!(f, "  {}", inst)?;
            }
            match &block.term {
                Some(Terminator::Br(target)) => writeln!(f, "  br #{}", target.0)?,
                Some(Terminator::CondBr { cond, then, els }) => {
                    writeln!(f, "  br %{}, #{}, #{}", cond.0, then.0, els.0)?
                }
                Some(Terminator::Ret(value)) => writeln!(f, "  ret %{}", value.0)?,
                None => writeln!(f, "  <unterminated>")?,
            }
        }
        writeln!(f, "}}")
    }
}
