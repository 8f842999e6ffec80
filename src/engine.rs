use super::backend::{ArithOp, BoolPredicate, FloatPredicate, RuntimeValue};
use super::error::{Error, ErrorKind};
use super::ir::{BlockId, Inst, IrFunction, Module, Terminator, ValueId};

const MAX_CALL_DEPTH: usize = 256;

fn fail<T>(message: String) -> Result<T, Error> {
    Err(Error::from(ErrorKind::Execution(message)))
}

/// Interprets functions of a `Module`.
///
/// Calls are resolved by name when they execute, so a callee may be defined
/// after its caller was lowered.
pub struct Engine<'m> {
    module: &'m Module,
    depth: usize,
}

impl<'m> Engine<'m> {
    pub fn new(module: &'m Module) -> Engine<'m> {
        Engine { module, depth: 0 }
    }

    pub fn call(&mut self, name: &str, args: &[RuntimeValue]) -> Result<RuntimeValue, Error> {
        let module = self.module;
        let function = match module.lookup(name) {
            Some(function) => function,
            None => return fail(format!("undefined function '{}'", name)),
        };
        if function.is_declaration() {
            return fail(format!("function '{}' is declared but never defined", name));
        }
        if function.params.len() != args.len() {
            return fail(format!(
                "'{}' takes {} arguments but was called with {}",
                name,
                function.params.len(),
                args.len()
            ));
        }
        if self.depth >= MAX_CALL_DEPTH {
            return fail(format!("call stack exhausted while calling '{}'", name));
        }

        self.depth += 1;
        let result = self.execute(function, args);
        self.depth -= 1;
        result
    }

    fn execute(&mut self, function: &IrFunction, args: &[RuntimeValue]) -> Result<RuntimeValue, Error> {
        let mut values: Vec<Option<RuntimeValue>> = vec![None; function.value_count()];
        let mut slots = vec![RuntimeValue::Number(0.0); function.slots.len()];
        let mut prev: Option<BlockId> = None;
        let mut current = BlockId(0);

        loop {
            let block = match function.blocks.get(current.0 as usize) {
                Some(block) => block,
                None => return fail(format!("branch to missing block #{}", current.0)),
            };

            for inst in &block.insts {
                match inst {
                    Inst::ConstNumber { dst, value } => {
                        values[dst.0 as usize] = Some(RuntimeValue::Number(*value))
                    }
                    Inst::ConstBool { dst, value } => {
                        values[dst.0 as usize] = Some(RuntimeValue::Bool(*value))
                    }
                    Inst::Param { dst, index } => {
                        let arg = match args.get(*index) {
                            Some(arg) => *arg,
                            None => return fail(format!("missing argument {}", index)),
                        };
                        values[dst.0 as usize] = Some(arg);
                    }
                    Inst::Arith { dst, op, lhs, rhs } => {
                        let l = number(&values, *lhs)?;
                        let r = number(&values, *rhs)?;
                        let v = match op {
                            ArithOp::Add => l + r,
                            ArithOp::Sub => l - r,
                            ArithOp::Mul => l * r,
                            ArithOp::Div => l / r,
                        };
                        values[dst.0 as usize] = Some(RuntimeValue::Number(v));
                    }
                    Inst::FCmp { dst, pred, lhs, rhs } => {
                        let l = number(&values, *lhs)?;
                        let r = number(&values, *rhs)?;
                        let unordered = l.is_nan() || r.is_nan();
                        let v = match pred {
                            FloatPredicate::Oeq => !unordered && l == r,
                            FloatPredicate::One => !unordered && l != r,
                            FloatPredicate::Ult => unordered || l < r,
                            FloatPredicate::Ule => unordered || l <= r,
                        };
                        values[dst.0 as usize] = Some(RuntimeValue::Bool(v));
                    }
                    Inst::BCmp { dst, pred, lhs, rhs } => {
                        let l = boolean(&values, *lhs)?;
                        let r = boolean(&values, *rhs)?;
                        let v = match pred {
                            BoolPredicate::Eq => l == r,
                            BoolPredicate::Ne => l != r,
                        };
                        values[dst.0 as usize] = Some(RuntimeValue::Bool(v));
                    }
                    Inst::Not { dst, src } => {
                        let v = boolean(&values, *src)?;
                        values[dst.0 as usize] = Some(RuntimeValue::Bool(!v));
                    }
                    Inst::Load { dst, slot } => {
                        values[dst.0 as usize] = Some(slots[slot.0 as usize]);
                    }
                    Inst::Store { slot, src } => {
                        slots[slot.0 as usize] = value(&values, *src)?;
                    }
                    Inst::Call { dst, callee, args } => {
                        let mut actuals = Vec::with_capacity(args.len());
                        for arg in args {
                            actuals.push(value(&values, *arg)?);
                        }
                        let v = self.call(callee, &actuals)?;
                        values[dst.0 as usize] = Some(v);
                    }
                    Inst::Phi { dst, incoming } => {
                        let from = match incoming.iter().find(|(b, _)| Some(*b) == prev) {
                            Some((_, v)) => *v,
                            None => return fail(format!("phi %{} has no incoming value", dst.0)),
                        };
                        values[dst.0 as usize] = Some(value(&values, from)?);
                    }
                }
            }

            match &block.term {
                Some(Terminator::Br(target)) => {
                    prev = Some(current);
                    current = *target;
                }
                Some(Terminator::CondBr { cond, then, els }) => {
                    let taken = if boolean(&values, *cond)? { *then } else { *els };
                    prev = Some(current);
                    current = taken;
                }
                Some(Terminator::Ret(v)) => return value(&values, *v),
                None => {
                    return fail(format!(
                        "block '{}' in '{}' has no terminator",
                        block.label, function.name
                    ))
                }
            }
        }
    }
}

fn value(values: &[Option<RuntimeValue>], id: ValueId) -> Result<RuntimeValue, Error> {
    match values.get(id.0 as usize).copied().flatten() {
        Some(v) => Ok(v),
        None => fail(format!("use of undefined value %{}", id.0)),
    }
}

fn number(values: &[Option<RuntimeValue>], id: ValueId) -> Result<f64, Error> {
    match value(values, id)? {
        RuntimeValue::Number(n) => Ok(n),
        RuntimeValue::Bool(_) => fail(format!("%{} is a bool where a double was expected", id.0)),
    }
}

fn boolean(values: &[Option<RuntimeValue>], id: ValueId) -> Result<bool, Error> {
    match value(values, id)? {
        RuntimeValue::Bool(b) => Ok(b),
        RuntimeValue::Number(_) => fail(format!("%{} is a double where a bool was expected", id.0)),
    }
}
