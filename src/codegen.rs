use super::ast::{BinOp, Expr, Function, Prototype};
use super::backend::{ArithOp, Backend, BoolPredicate, FloatPredicate, ValueKind};
use super::error::{Error, ErrorKind};
use std::collections::HashMap;

fn type_error<T>(message: String) -> Result<T, Error> {
    Err(Error::from(ErrorKind::TypeMismatch(message)))
}

fn expect_kind(found: ValueKind, expected: ValueKind, what: &str) -> Result<(), Error> {
    if found == expected {
        Ok(())
    } else {
        type_error(format!("{} expects a {} but got a {}", what, expected, found))
    }
}

/// Lowers AST functions into a backend, one function at a time.
///
/// Owns the per-function scope table and the prototype registry. The scope
/// table is cleared whenever a new function body starts.
pub struct CodeGen<B: Backend> {
    backend: B,
    named_values: HashMap<String, B::Slot>,
    prototypes: HashMap<String, Prototype>,
    the_function: Option<B::Function>,
    // Name the function being built is called by in its own body.
    the_name: Option<String>,
}

impl<B: Backend> CodeGen<B> {
    pub fn new(backend: B) -> CodeGen<B> {
        CodeGen {
            backend,
            named_values: HashMap::new(),
            prototypes: HashMap::new(),
            the_function: None,
            the_name: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn prototype(&self, name: &str) -> Option<&Prototype> {
        self.prototypes.get(name)
    }

    /// Records a prototype without emitting anything; calls to it are
    /// materialized on first use.
    pub fn register_prototype(&mut self, proto: Prototype) {
        self.prototypes.insert(proto.name().to_owned(), proto);
    }

    /// Registers a forward declaration and makes it callable. A function
    /// already in the module under that name is left as is.
    pub fn codegen_proto(&mut self, proto: Prototype) -> B::Function {
        if let Some(f) = self.backend.get_function(proto.name()) {
            self.register_prototype(proto);
            return f;
        }
        let f = self
            .backend
            .declare_function(proto.name(), proto.params(), ValueKind::Number);
        self.register_prototype(proto);
        f
    }

    /// Resolves a callee: functions already in the module first, then the
    /// prototype registry.
    pub fn get_function(&mut self, name: &str) -> Option<B::Function> {
        if let Some(f) = self.backend.get_function(name) {
            return Some(f);
        }

        match self.prototypes.get(name) {
            Some(proto) => Some(
                self.backend
                    .declare_function(proto.name(), proto.params(), ValueKind::Number),
            ),
            None => None,
        }
    }

    /// Lowers a whole function definition.
    ///
    /// The return kind is inferred from the body before anything is
    /// emitted. On failure the half-built function is removed from the
    /// module and any earlier definition of the same name is left in place.
    /// A function that others call keeps its signature.
    pub fn codegen_func(&mut self, function: Function) -> Result<B::Function, Error> {
        let Function(proto, body) = function;
        let name = proto.name().to_owned();
        let params = proto.params().to_vec();
        let kind = self.infer_kind(&body, &name);

        let old = self.backend.get_function(&name);
        if let Some(old) = old {
            let same_signature = self.backend.param_count(old) == params.len()
                && self.backend.return_kind(old) == kind;
            if !same_signature && self.backend.has_callers(old) {
                return type_error(format!(
                    "cannot change the signature of '{}' while other functions call it",
                    name
                ));
            }
        }
        self.register_prototype(proto);

        // A redefinition is built under a staging name so the previous
        // definition survives until the new one is complete.
        let the_function = match old {
            Some(_) => self
                .backend
                .declare_function(&format!("{}.new", name), &params, kind),
            None => self.backend.declare_function(&name, &params, kind),
        };

        self.the_function = Some(the_function);
        self.the_name = Some(name);
        let result = self.codegen_body(the_function, &params, &body, kind);
        self.the_function = None;
        self.the_name = None;
        self.named_values.clear();

        match result {
            Ok(()) => {
                if let Some(old) = old {
                    self.backend.replace_function(old, the_function);
                }
                Ok(the_function)
            }
            Err(e) => {
                self.backend.delete_function(the_function);
                Err(e)
            }
        }
    }

    fn codegen_body(
        &mut self,
        the_function: B::Function,
        params: &[String],
        body: &Expr,
        kind: ValueKind,
    ) -> Result<(), Error> {
        let entry = self.backend.append_block(the_function, "entry");
        self.backend.position_at_end(entry);

        self.named_values.clear();
        for (i, name) in params.iter().enumerate() {
            let slot = self.backend.build_slot(the_function, name);
            let arg = self.backend.param(the_function, i);
            self.backend.build_store(slot, arg);
            self.named_values.insert(name.clone(), slot);
        }

        let (value, body_kind) = self.codegen_expr(body)?;
        if body_kind != kind {
            return type_error(format!(
                "body yields a {} but a {} was inferred",
                body_kind, kind
            ));
        }
        self.backend.build_ret(value);
        self.backend.finish_function(the_function)
    }

    /// Value kind `e` produces, computed without touching the backend.
    ///
    /// Calls to `current` (the function being defined) and to functions only
    /// known by prototype are taken to return numbers. Errors are left for
    /// lowering to report.
    pub fn infer_kind(&self, e: &Expr, current: &str) -> ValueKind {
        match e {
            Expr::Number(_) | Expr::Variable(_) => ValueKind::Number,
            Expr::Bool(_) => ValueKind::Bool,
            Expr::Unary('!', _) => ValueKind::Bool,
            Expr::Unary(_, _) => ValueKind::Number,
            Expr::Binary(BinOp::Assign, _, rhs) => self.infer_kind(rhs, current),
            Expr::Binary(BinOp::Add, _, _)
            | Expr::Binary(BinOp::Sub, _, _)
            | Expr::Binary(BinOp::Mul, _, _)
            | Expr::Binary(BinOp::Div, _, _) => ValueKind::Number,
            Expr::Binary(_, _, _) => ValueKind::Bool,
            Expr::Call(callee, _) => {
                if callee == current {
                    return ValueKind::Number;
                }
                match self.backend.get_function(callee) {
                    Some(f) => self.backend.return_kind(f),
                    None => ValueKind::Number,
                }
            }
            Expr::If(_, then, _) => self.infer_kind(then, current),
        }
    }

    pub fn codegen_expr(&mut self, e: &Expr) -> Result<(B::Value, ValueKind), Error> {
        match e {
            Expr::Number(n) => Ok((self.backend.const_number(*n), ValueKind::Number)),
            Expr::Bool(b) => Ok((self.backend.const_bool(*b), ValueKind::Bool)),
            Expr::Variable(name) => match self.named_values.get(name) {
                Some(slot) => {
                    let slot = *slot;
                    Ok((self.backend.build_load(slot, name), ValueKind::Number))
                }
                None => Err(Error::from(ErrorKind::UnknownVariable(name.clone()))),
            },
            Expr::Unary(op, operand) => self.codegen_unary(*op, operand),
            Expr::Binary(op, lhs, rhs) => self.codegen_binary(*op, lhs, rhs),
            Expr::Call(callee, args) => self.codegen_call(callee, args),
            Expr::If(cond, then, els) => self.codegen_if(cond, then, els),
        }
    }

    fn codegen_unary(&mut self, op: char, operand: &Expr) -> Result<(B::Value, ValueKind), Error> {
        let (value, kind) = self.codegen_expr(operand)?;

        match op {
            '!' => {
                expect_kind(kind, ValueKind::Bool, "logical negation")?;
                Ok((self.backend.build_not(value), ValueKind::Bool))
            }
            '-' => {
                expect_kind(kind, ValueKind::Number, "negation")?;
                let zero = self.backend.const_number(0.0);
                Ok((
                    self.backend.build_arith(ArithOp::Sub, zero, value),
                    ValueKind::Number,
                ))
            }
            '+' => {
                expect_kind(kind, ValueKind::Number, "unary plus")?;
                Ok((value, ValueKind::Number))
            }
            _ => Err(Error::from(ErrorKind::UnsupportedOperator(op.to_string()))),
        }
    }

    // The left side names a slot rather than producing a value, so it is
    // never lowered as an expression.
    fn codegen_assignment(&mut self, lhs: &Expr, rhs: &Expr) -> Result<(B::Value, ValueKind), Error> {
        let name = match lhs {
            Expr::Variable(name) => name,
            _ => return Err(Error::from(ErrorKind::InvalidAssignment)),
        };

        let (value, kind) = self.codegen_expr(rhs)?;

        let slot = match self.named_values.get(name) {
            Some(slot) => *slot,
            None => return Err(Error::from(ErrorKind::UnknownVariable(name.clone()))),
        };
        expect_kind(kind, ValueKind::Number, &format!("assignment to '{}'", name))?;

        self.backend.build_store(slot, value);
        Ok((value, kind))
    }

    fn codegen_binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<(B::Value, ValueKind), Error> {
        if op == BinOp::Assign {
            return self.codegen_assignment(lhs, rhs);
        }

        let (l, lk) = self.codegen_expr(lhs)?;
        let (r, rk) = self.codegen_expr(rhs)?;

        let value = match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                let arith_op = match op {
                    BinOp::Add => ArithOp::Add,
                    BinOp::Sub => ArithOp::Sub,
                    BinOp::Mul => ArithOp::Mul,
                    _ => ArithOp::Div,
                };
                let what = format!("operator '{}'", op.as_str());
                expect_kind(lk, ValueKind::Number, &what)?;
                expect_kind(rk, ValueKind::Number, &what)?;
                return Ok((self.backend.build_arith(arith_op, l, r), ValueKind::Number));
            }
            BinOp::Eq | BinOp::Ne => {
                expect_kind(rk, lk, &format!("operator '{}'", op.as_str()))?;
                match lk {
                    ValueKind::Bool => {
                        let pred = if op == BinOp::Eq {
                            BoolPredicate::Eq
                        } else {
                            BoolPredicate::Ne
                        };
                        self.backend.build_bcmp(pred, l, r)
                    }
                    ValueKind::Number => {
                        let pred = if op == BinOp::Eq {
                            FloatPredicate::Oeq
                        } else {
                            FloatPredicate::One
                        };
                        self.backend.build_fcmp(pred, l, r)
                    }
                }
            }
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
                expect_kind(lk, ValueKind::Number, &format!("operator '{}'", op.as_str()))?;
                expect_kind(rk, ValueKind::Number, &format!("operator '{}'", op.as_str()))?;
                // `>` and `>=` become `<` and `<=` with the operands swapped.
                // Both operands have already been emitted in source order.
                match op {
                    BinOp::Lt => self.backend.build_fcmp(FloatPredicate::Ult, l, r),
                    BinOp::Gt => self.backend.build_fcmp(FloatPredicate::Ult, r, l),
                    BinOp::Le => self.backend.build_fcmp(FloatPredicate::Ule, l, r),
                    _ => self.backend.build_fcmp(FloatPredicate::Ule, r, l),
                }
            }
            BinOp::Assign => unreachable!(),
        };

        Ok((value, ValueKind::Bool))
    }

    fn codegen_call(&mut self, callee: &str, args: &[Expr]) -> Result<(B::Value, ValueKind), Error> {
        let current = match self.the_name {
            Some(ref name) if name == callee => self.the_function,
            _ => None,
        };
        let function = match current.or_else(|| self.get_function(callee)) {
            Some(f) => f,
            None => return Err(Error::from(ErrorKind::UnknownFunction(callee.to_owned()))),
        };

        let expected = self.backend.param_count(function);
        if expected != args.len() {
            return Err(Error::from(ErrorKind::ArityMismatch {
                name: callee.to_owned(),
                expected,
                found: args.len(),
            }));
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let (value, kind) = self.codegen_expr(arg)?;
            expect_kind(kind, ValueKind::Number, &format!("argument to '{}'", callee))?;
            values.push(value);
        }

        let kind = self.backend.return_kind(function);
        Ok((self.backend.build_call(function, &values), kind))
    }

    fn codegen_if(
        &mut self,
        cond: &Expr,
        then: &Expr,
        els: &Expr,
    ) -> Result<(B::Value, ValueKind), Error> {
        let the_function = match self.the_function {
            Some(f) => f,
            None => {
                return Err(Error::from(ErrorKind::Codegen(
                    "conditional outside of a function body".to_owned(),
                )))
            }
        };

        let (cond_value, cond_kind) = self.codegen_expr(cond)?;
        let cond_value = match cond_kind {
            ValueKind::Bool => cond_value,
            ValueKind::Number => {
                let zero = self.backend.const_number(0.0);
                self.backend
                    .build_fcmp(FloatPredicate::One, cond_value, zero)
            }
        };

        let then_bb = self.backend.append_block(the_function, "then");
        let else_bb = self.backend.append_block(the_function, "else");
        let merge_bb = self.backend.append_block(the_function, "ifcont");

        self.backend.build_cond_br(cond_value, then_bb, else_bb);

        self.backend.position_at_end(then_bb);
        let (then_value, then_kind) = self.codegen_expr(then)?;
        self.backend.build_br(merge_bb);
        // Lowering the arm may have moved the insertion point.
        let then_end = self.backend.insert_block();

        self.backend.position_at_end(else_bb);
        let (else_value, else_kind) = self.codegen_expr(els)?;
        self.backend.build_br(merge_bb);
        let else_end = self.backend.insert_block();

        if then_kind != else_kind {
            return type_error(format!(
                "if branches yield different kinds: {} and {}",
                then_kind, else_kind
            ));
        }

        self.backend.position_at_end(merge_bb);
        let phi = self.backend.build_phi(
            then_kind,
            &[(then_value, then_end), (else_value, else_end)],
        );
        Ok((phi, then_kind))
    }
}

#[cfg(test)]
mod test {
    use super::super::backend::{Execute, RuntimeValue};
    use super::super::ir::{Builder, FuncId, Inst, SlotId, ValueId};
    use super::super::lexer::tokenize;
    use super::super::parser::parse_statement;
    use super::*;

    fn function(src: &str) -> Function {
        let tokens = tokenize(src).unwrap();
        parse_statement(&tokens).unwrap().0
    }

    fn eval(codegen: &mut CodeGen<Builder>, src: &str) -> Result<RuntimeValue, Error> {
        let f = codegen.codegen_func(function(src))?;
        codegen.backend_mut().run(f)
    }

    #[test]
    fn test_number_function() {
        let mut codegen = CodeGen::new(Builder::new());
        codegen.codegen_func(function("def foo(x) x + 1")).unwrap();
        assert_eq!(eval(&mut codegen, "foo(41)").unwrap(), RuntimeValue::Number(42.0));
    }

    #[test]
    fn test_infer_bool_return() {
        let mut codegen = CodeGen::new(Builder::new());
        let f = codegen.codegen_func(function("def f() true")).unwrap();
        assert_eq!(codegen.backend().return_kind(f), ValueKind::Bool);
        assert_eq!(eval(&mut codegen, "f()").unwrap(), RuntimeValue::Bool(true));
    }

    #[test]
    fn test_infer_kind_is_pure() {
        let codegen = CodeGen::new(Builder::new());
        let body = function("1 < 2").1;
        assert_eq!(codegen.infer_kind(&body, "x"), ValueKind::Bool);
        assert_eq!(codegen.backend().module().functions().count(), 0);
    }

    #[test]
    fn test_conditional() {
        let mut codegen = CodeGen::new(Builder::new());
        codegen
            .codegen_func(function("def bar(a, b) if a < b then a else b"))
            .unwrap();
        assert_eq!(eval(&mut codegen, "bar(3, 5)").unwrap(), RuntimeValue::Number(3.0));
        assert_eq!(eval(&mut codegen, "bar(7, 5)").unwrap(), RuntimeValue::Number(5.0));
        assert_eq!(
            eval(&mut codegen, "if 0 then 1 else 2").unwrap(),
            RuntimeValue::Number(2.0)
        );
    }

    #[test]
    fn test_assignment() {
        let mut codegen = CodeGen::new(Builder::new());
        codegen
            .codegen_func(function("def twice(x) if x = x * 2 then x else 0"))
            .unwrap();
        assert_eq!(eval(&mut codegen, "twice(4)").unwrap(), RuntimeValue::Number(8.0));

        codegen
            .codegen_func(function("def chain(a, b) (a = b = 3) + a + b"))
            .unwrap();
        assert_eq!(eval(&mut codegen, "chain(0, 0)").unwrap(), RuntimeValue::Number(9.0));
    }

    #[test]
    fn test_assignment_errors() {
        let mut codegen = CodeGen::new(Builder::new());
        let err = codegen.codegen_func(function("x = 5")).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnknownVariable("x".to_owned()));

        let err = codegen.codegen_func(function("def f(x) 1 = x")).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidAssignment);
        assert_eq!(codegen.backend().get_function("f"), None);
    }

    #[test]
    fn test_equality_dispatch() {
        let mut codegen = CodeGen::new(Builder::new());
        assert_eq!(eval(&mut codegen, "1 == 1").unwrap(), RuntimeValue::Bool(true));
        assert_eq!(eval(&mut codegen, "1 == 2").unwrap(), RuntimeValue::Bool(false));
        assert_eq!(
            eval(&mut codegen, "true != false").unwrap(),
            RuntimeValue::Bool(true)
        );
        assert_eq!(
            eval(&mut codegen, "(1 < 2) == true").unwrap(),
            RuntimeValue::Bool(true)
        );

        let err = eval(&mut codegen, "true == 1").unwrap_err();
        match err.kind() {
            ErrorKind::TypeMismatch(_) => {}
            kind => panic!("unexpected error kind: {:?}", kind),
        }
    }

    #[test]
    fn test_comparisons() {
        let mut codegen = CodeGen::new(Builder::new());
        for (src, expected) in &[
            ("1 < 2", true),
            ("2 < 1", false),
            ("2 > 1", true),
            ("1 > 2", false),
            ("2 <= 2", true),
            ("3 <= 2", false),
            ("2 >= 2", true),
            ("1 >= 2", false),
        ] {
            assert_eq!(
                eval(&mut codegen, src).unwrap(),
                RuntimeValue::Bool(*expected),
                "{}",
                src
            );
        }
    }

    // Compare instructions of `f` as (predicate, slot read by lhs, slot read by rhs).
    fn compares(codegen: &CodeGen<Builder>, f: FuncId) -> Vec<(FloatPredicate, SlotId, SlotId)> {
        let insts = &codegen.backend().module().function(f).unwrap().blocks[0].insts;
        let slot_of = |v: ValueId| {
            insts
                .iter()
                .find_map(|inst| match inst {
                    Inst::Load { dst, slot } if *dst == v => Some(*slot),
                    _ => None,
                })
                .unwrap()
        };
        insts
            .iter()
            .filter_map(|inst| match inst {
                Inst::FCmp { pred, lhs, rhs, .. } => Some((*pred, slot_of(*lhs), slot_of(*rhs))),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_greater_than_swaps_operands() {
        let mut codegen = CodeGen::new(Builder::new());
        let gt = codegen.codegen_func(function("def gt(a, b) a > b")).unwrap();
        let lt = codegen.codegen_func(function("def lt(a, b) b < a")).unwrap();
        let ge = codegen.codegen_func(function("def ge(a, b) a >= b")).unwrap();
        let le = codegen.codegen_func(function("def le(a, b) b <= a")).unwrap();

        let a = SlotId(0);
        let b = SlotId(1);
        assert_eq!(compares(&codegen, gt), vec![(FloatPredicate::Ult, b, a)]);
        assert_eq!(compares(&codegen, gt), compares(&codegen, lt));
        assert_eq!(compares(&codegen, ge), vec![(FloatPredicate::Ule, b, a)]);
        assert_eq!(compares(&codegen, ge), compares(&codegen, le));
    }

    #[test]
    fn test_greater_than_keeps_source_order() {
        let mut codegen = CodeGen::new(Builder::new());
        codegen
            .codegen_func(function("def f(x) if (x = 1) > (x = 2) then x else x"))
            .unwrap();
        assert_eq!(eval(&mut codegen, "f(0)").unwrap(), RuntimeValue::Number(2.0));
    }

    #[test]
    fn test_unary() {
        let mut codegen = CodeGen::new(Builder::new());
        assert_eq!(eval(&mut codegen, "--3").unwrap(), RuntimeValue::Number(3.0));
        assert_eq!(eval(&mut codegen, "-3 + 1").unwrap(), RuntimeValue::Number(-2.0));
        assert_eq!(eval(&mut codegen, "!!true").unwrap(), RuntimeValue::Bool(true));
        assert_eq!(eval(&mut codegen, "!(1 < 2)").unwrap(), RuntimeValue::Bool(false));

        let err = eval(&mut codegen, "*3").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnsupportedOperator("*".to_owned()));

        let err = eval(&mut codegen, "!1").unwrap_err();
        match err.kind() {
            ErrorKind::TypeMismatch(_) => {}
            kind => panic!("unexpected error kind: {:?}", kind),
        }
    }

    #[test]
    fn test_call_errors() {
        let mut codegen = CodeGen::new(Builder::new());
        let err = eval(&mut codegen, "nope(1)").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnknownFunction("nope".to_owned()));

        codegen.codegen_func(function("def one(x) x")).unwrap();
        let err = eval(&mut codegen, "one(1, 2)").unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::ArityMismatch {
                name: "one".to_owned(),
                expected: 1,
                found: 2
            }
        );
        assert!(codegen.backend().get_function("__anon_expr").is_none());
    }

    #[test]
    fn test_forward_reference() {
        let mut codegen = CodeGen::new(Builder::new());
        codegen.register_prototype(Prototype("later".to_owned(), vec!["x".to_owned()]));
        assert_eq!(codegen.backend().get_function("later"), None);
        codegen
            .codegen_func(function("def early(x) later(x) * 2"))
            .unwrap();
        let later = codegen.backend().get_function("later").unwrap();
        assert_eq!(codegen.backend().param_count(later), 1);
        let err = eval(&mut codegen, "early(2)").unwrap_err();
        assert!(err.to_string().contains("never defined"));

        codegen.codegen_func(function("def later(x) x + 1")).unwrap();
        assert_eq!(eval(&mut codegen, "early(2)").unwrap(), RuntimeValue::Number(6.0));
    }

    #[test]
    fn test_codegen_proto() {
        let mut codegen = CodeGen::new(Builder::new());
        let ext = codegen.codegen_proto(Prototype("ext".to_owned(), vec!["a".to_owned()]));
        assert_eq!(codegen.backend().get_function("ext"), Some(ext));
        assert!(codegen.backend().module().lookup("ext").unwrap().is_declaration());

        let k = codegen.codegen_func(function("def k() 1")).unwrap();
        assert_eq!(codegen.codegen_proto(Prototype("k".to_owned(), vec![])), k);
        assert_eq!(eval(&mut codegen, "k()").unwrap(), RuntimeValue::Number(1.0));
    }

    #[test]
    fn test_redefinition_replaces() {
        let mut codegen = CodeGen::new(Builder::new());
        codegen.codegen_func(function("def k() 1")).unwrap();
        codegen.codegen_func(function("def k() 2")).unwrap();
        assert_eq!(eval(&mut codegen, "k()").unwrap(), RuntimeValue::Number(2.0));
        assert_eq!(
            codegen.prototype("k"),
            Some(&Prototype("k".to_owned(), vec![]))
        );
    }

    #[test]
    fn test_failed_redefinition_keeps_previous() {
        let mut codegen = CodeGen::new(Builder::new());
        let k = codegen.codegen_func(function("def k() 1")).unwrap();
        assert!(codegen.codegen_func(function("def k() zzz")).is_err());
        assert_eq!(codegen.backend().get_function("k"), Some(k));
        assert_eq!(codegen.backend().get_function("k.new"), None);
        assert_eq!(eval(&mut codegen, "k()").unwrap(), RuntimeValue::Number(1.0));
    }

    #[test]
    fn test_recursive_redefinition() {
        let mut codegen = CodeGen::new(Builder::new());
        codegen.codegen_func(function("def sum(n) n")).unwrap();
        codegen
            .codegen_func(function("def sum(n) if n < 1 then 0 else n + sum(n - 1)"))
            .unwrap();
        assert_eq!(eval(&mut codegen, "sum(4)").unwrap(), RuntimeValue::Number(10.0));
        assert_eq!(codegen.backend().module().functions().count(), 1);
    }

    #[test]
    fn test_signature_kept_while_called() {
        let mut codegen = CodeGen::new(Builder::new());
        codegen.codegen_func(function("def k() 1")).unwrap();
        codegen.codegen_func(function("def g() k() + 1")).unwrap();

        let err = codegen.codegen_func(function("def k() true")).unwrap_err();
        match err.kind() {
            ErrorKind::TypeMismatch(message) => assert!(message.contains("'k'")),
            kind => panic!("unexpected error kind: {:?}", kind),
        }
        assert!(codegen.codegen_func(function("def k(x) x")).is_err());
        assert_eq!(eval(&mut codegen, "g()").unwrap(), RuntimeValue::Number(2.0));

        // Only callers pin the signature.
        codegen.codegen_func(function("def lone() 1")).unwrap();
        codegen.codegen_func(function("def lone() 1 == 1")).unwrap();
        assert_eq!(eval(&mut codegen, "lone()").unwrap(), RuntimeValue::Bool(true));
    }

    #[test]
    fn test_recursion() {
        let mut codegen = CodeGen::new(Builder::new());
        codegen
            .codegen_func(function(
                "def fib(n) if n < 2 then n else fib(n - 1) + fib(n - 2)",
            ))
            .unwrap();
        assert_eq!(eval(&mut codegen, "fib(10)").unwrap(), RuntimeValue::Number(55.0));
    }

    #[test]
    fn test_identical_functions_agree() {
        let src = "def g(a, b) if a >= b then a - b else b * 2";
        let mut first = CodeGen::new(Builder::new());
        let mut second = CodeGen::new(Builder::new());
        first.codegen_func(function(src)).unwrap();
        second.codegen_func(function(src)).unwrap();
        for call in &["g(5, 3)", "g(1, 4)", "g(2, 2)"] {
            assert_eq!(
                eval(&mut first, call).unwrap(),
                eval(&mut second, call).unwrap()
            );
        }
    }
}
