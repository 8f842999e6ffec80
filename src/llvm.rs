//! Backend on top of llvm-sys, run through LLVM's IR interpreter.

use llvm_sys::analysis::{LLVMVerifierFailureAction, LLVMVerifyFunction};
use llvm_sys::execution_engine::{
    LLVMCreateInterpreterForModule, LLVMDisposeExecutionEngine, LLVMDisposeGenericValue,
    LLVMExecutionEngineRef, LLVMGenericValueToFloat, LLVMGenericValueToInt, LLVMLinkInInterpreter,
    LLVMRunFunction,
};
use llvm_sys::prelude::*;
use llvm_sys::{core, LLVMIntPredicate, LLVMRealPredicate};

use libc::{c_char, c_uint};
use std::ffi::{CStr, CString};
use std::ptr::null_mut;

use super::backend::{
    ArithOp, Backend, BoolPredicate, Execute, FloatPredicate, RuntimeValue, ValueKind,
};
use super::error::{Error, ErrorKind};

fn c_name(name: &str) -> CString {
    CString::new(name.replace('\0', "")).unwrap_or_default()
}

fn take_message(message: *mut c_char) -> String {
    if message.is_null() {
        return String::new();
    }
    let text = unsafe { CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned();
    unsafe { core::LLVMDisposeMessage(message) };
    text
}

pub struct Llvm {
    context: LLVMContextRef,
    module: LLVMModuleRef,
    builder: LLVMBuilderRef,
    engine: LLVMExecutionEngineRef,
    double_type: LLVMTypeRef,
    bool_type: LLVMTypeRef,
}

impl Llvm {
    /// Creates a module and an interpreter that owns it.
    pub fn new() -> Result<Llvm, Error> {
        unsafe {
            LLVMLinkInInterpreter();

            let context = core::LLVMContextCreate();
            let name = c_name("my cool jit");
            let module = core::LLVMModuleCreateWithNameInContext(name.as_ptr(), context);
            let builder = core::LLVMCreateBuilderInContext(context);

            let mut engine = null_mut();
            let mut message = null_mut();
            if LLVMCreateInterpreterForModule(&mut engine, module, &mut message) != 0 {
                let message = take_message(message);
                core::LLVMDisposeBuilder(builder);
                core::LLVMDisposeModule(module);
                core::LLVMContextDispose(context);
                return Err(Error::from(ErrorKind::Execution(message)));
            }

            Ok(Llvm {
                context,
                module,
                builder,
                engine,
                double_type: core::LLVMDoubleTypeInContext(context),
                bool_type: core::LLVMInt1TypeInContext(context),
            })
        }
    }

    fn llvm_type(&self, kind: ValueKind) -> LLVMTypeRef {
        match kind {
            ValueKind::Number => self.double_type,
            ValueKind::Bool => self.bool_type,
        }
    }

    fn function_type(&self, function: LLVMValueRef) -> LLVMTypeRef {
        unsafe { core::LLVMGetElementType(core::LLVMTypeOf(function)) }
    }

    fn name_of(&self, value: LLVMValueRef) -> CString {
        let name = unsafe { CStr::from_ptr(core::LLVMGetValueName(value)) };
        name.to_owned()
    }

    // True when something other than `function` itself refers to it.
    fn has_outside_uses(&self, function: LLVMValueRef) -> bool {
        unsafe {
            let mut u = core::LLVMGetFirstUse(function);
            while !u.is_null() {
                let user = core::LLVMGetUser(u);
                if core::LLVMIsAInstruction(user).is_null() {
                    return true;
                }
                let block = core::LLVMGetInstructionParent(user);
                if core::LLVMGetBasicBlockParent(block) != function {
                    return true;
                }
                u = core::LLVMGetNextUse(u);
            }
            false
        }
    }

    // Points every use of `old` at `new`, drops `old` and hands its name over.
    fn redirect_function(&mut self, old: LLVMValueRef, new: LLVMValueRef) {
        unsafe {
            let name = self.name_of(old);
            if !core::LLVMGetFirstUse(old).is_null() {
                let cast = core::LLVMConstBitCast(new, core::LLVMTypeOf(old));
                core::LLVMReplaceAllUsesWith(old, cast);
            }
            core::LLVMDeleteFunction(old);
            core::LLVMSetValueName(new, name.as_ptr());
        }
    }
}

impl Drop for Llvm {
    fn drop(&mut self) {
        unsafe {
            core::LLVMDisposeBuilder(self.builder);
            // The engine owns the module.
            LLVMDisposeExecutionEngine(self.engine);
            core::LLVMContextDispose(self.context);
        }
    }
}

impl Backend for Llvm {
    type Value = LLVMValueRef;
    type Block = LLVMBasicBlockRef;
    type Slot = LLVMValueRef;
    type Function = LLVMValueRef;

    fn const_number(&mut self, value: f64) -> LLVMValueRef {
        unsafe { core::LLVMConstReal(self.double_type, value) }
    }

    fn const_bool(&mut self, value: bool) -> LLVMValueRef {
        unsafe { core::LLVMConstInt(self.bool_type, value as u64, 0) }
    }

    fn build_arith(&mut self, op: ArithOp, lhs: LLVMValueRef, rhs: LLVMValueRef) -> LLVMValueRef {
        unsafe {
            match op {
                ArithOp::Add => core::LLVMBuildFAdd(
                    self.builder,
                    lhs,
                    rhs,
                    b"addtmp\0".as_ptr() as *const _,
                ),
                ArithOp::Sub => core::LLVMBuildFSub(
                    self.builder,
                    lhs,
                    rhs,
                    b"subtmp\0".as_ptr() as *const _,
                ),
                ArithOp::Mul => core::LLVMBuildFMul(
                    self.builder,
                    lhs,
                    rhs,
                    b"multmp\0".as_ptr() as *const _,
                ),
                ArithOp::Div => core::LLVMBuildFDiv(
                    self.builder,
                    lhs,
                    rhs,
                    b"divtmp\0".as_ptr() as *const _,
                ),
            }
        }
    }

    fn build_fcmp(
        &mut self,
        pred: FloatPredicate,
        lhs: LLVMValueRef,
        rhs: LLVMValueRef,
    ) -> LLVMValueRef {
        let pred = match pred {
            FloatPredicate::Oeq => LLVMRealPredicate::LLVMRealOEQ,
            FloatPredicate::One => LLVMRealPredicate::LLVMRealONE,
            FloatPredicate::Ult => LLVMRealPredicate::LLVMRealULT,
            FloatPredicate::Ule => LLVMRealPredicate::LLVMRealULE,
        };
        unsafe {
            core::LLVMBuildFCmp(
                self.builder,
                pred,
                lhs,
                rhs,
                b"cmptmp\0".as_ptr() as *const _,
            )
        }
    }

    fn build_bcmp(
        &mut self,
        pred: BoolPredicate,
        lhs: LLVMValueRef,
        rhs: LLVMValueRef,
    ) -> LLVMValueRef {
        let pred = match pred {
            BoolPredicate::Eq => LLVMIntPredicate::LLVMIntEQ,
            BoolPredicate::Ne => LLVMIntPredicate::LLVMIntNE,
        };
        unsafe {
            core::LLVMBuildICmp(
                self.builder,
                pred,
                lhs,
                rhs,
                b"cmptmp\0".as_ptr() as *const _,
            )
        }
    }

    fn build_not(&mut self, operand: LLVMValueRef) -> LLVMValueRef {
        unsafe { core::LLVMBuildNot(self.builder, operand, b"nottmp\0".as_ptr() as *const _) }
    }

    fn build_slot(&mut self, function: LLVMValueRef, name: &str) -> LLVMValueRef {
        let name = c_name(name);
        unsafe {
            let tmp = core::LLVMCreateBuilderInContext(self.context);
            let entry = core::LLVMGetEntryBasicBlock(function);
            let first = core::LLVMGetFirstInstruction(entry);
            if first.is_null() {
                core::LLVMPositionBuilderAtEnd(tmp, entry);
            } else {
                core::LLVMPositionBuilderBefore(tmp, first);
            }
            let slot = core::LLVMBuildAlloca(tmp, self.double_type, name.as_ptr());
            core::LLVMDisposeBuilder(tmp);
            slot
        }
    }

    fn build_load(&mut self, slot: LLVMValueRef, name: &str) -> LLVMValueRef {
        let name = c_name(name);
        unsafe { core::LLVMBuildLoad(self.builder, slot, name.as_ptr()) }
    }

    fn build_store(&mut self, slot: LLVMValueRef, value: LLVMValueRef) {
        unsafe {
            core::LLVMBuildStore(self.builder, value, slot);
        }
    }

    fn append_block(&mut self, function: LLVMValueRef, name: &str) -> LLVMBasicBlockRef {
        let name = c_name(name);
        unsafe { core::LLVMAppendBasicBlockInContext(self.context, function, name.as_ptr()) }
    }

    fn position_at_end(&mut self, block: LLVMBasicBlockRef) {
        unsafe { core::LLVMPositionBuilderAtEnd(self.builder, block) }
    }

    fn insert_block(&self) -> LLVMBasicBlockRef {
        unsafe { core::LLVMGetInsertBlock(self.builder) }
    }

    fn build_br(&mut self, target: LLVMBasicBlockRef) {
        unsafe {
            core::LLVMBuildBr(self.builder, target);
        }
    }

    fn build_cond_br(&mut self, cond: LLVMValueRef, then: LLVMBasicBlockRef, els: LLVMBasicBlockRef) {
        unsafe {
            core::LLVMBuildCondBr(self.builder, cond, then, els);
        }
    }

    fn build_phi(
        &mut self,
        kind: ValueKind,
        incoming: &[(LLVMValueRef, LLVMBasicBlockRef)],
    ) -> LLVMValueRef {
        let mut values: Vec<LLVMValueRef> = incoming.iter().map(|(v, _)| *v).collect();
        let mut blocks: Vec<LLVMBasicBlockRef> = incoming.iter().map(|(_, b)| *b).collect();
        unsafe {
            let phi = core::LLVMBuildPhi(
                self.builder,
                self.llvm_type(kind),
                b"iftmp\0".as_ptr() as *const _,
            );
            core::LLVMAddIncoming(
                phi,
                values.as_mut_ptr(),
                blocks.as_mut_ptr(),
                values.len() as c_uint,
            );
            phi
        }
    }

    fn build_ret(&mut self, value: LLVMValueRef) {
        unsafe {
            core::LLVMBuildRet(self.builder, value);
        }
    }

    fn build_call(&mut self, callee: LLVMValueRef, args: &[LLVMValueRef]) -> LLVMValueRef {
        let mut args = args.to_vec();
        unsafe {
            core::LLVMBuildCall(
                self.builder,
                callee,
                args.as_mut_ptr(),
                args.len() as c_uint,
                b"calltmp\0".as_ptr() as *const _,
            )
        }
    }

    fn declare_function(&mut self, name: &str, params: &[String], ret: ValueKind) -> LLVMValueRef {
        let mut param_types = vec![self.double_type; params.len()];
        let old = self.get_function(name);
        unsafe {
            let function_type = core::LLVMFunctionType(
                self.llvm_type(ret),
                param_types.as_mut_ptr(),
                param_types.len() as c_uint,
                0,
            );
            let cname = c_name(name);
            let function = core::LLVMAddFunction(self.module, cname.as_ptr(), function_type);
            if let Some(old) = old {
                self.redirect_function(old, function);
            }
            for (i, param) in params.iter().enumerate() {
                let pname = c_name(param);
                core::LLVMSetValueName(core::LLVMGetParam(function, i as c_uint), pname.as_ptr());
            }
            function
        }
    }

    fn get_function(&self, name: &str) -> Option<LLVMValueRef> {
        let name = c_name(name);
        let function = unsafe { core::LLVMGetNamedFunction(self.module, name.as_ptr()) };
        if function.is_null() {
            None
        } else {
            Some(function)
        }
    }

    fn param(&mut self, function: LLVMValueRef, index: usize) -> LLVMValueRef {
        unsafe { core::LLVMGetParam(function, index as c_uint) }
    }

    fn param_count(&self, function: LLVMValueRef) -> usize {
        unsafe { core::LLVMCountParams(function) as usize }
    }

    fn return_kind(&self, function: LLVMValueRef) -> ValueKind {
        let ret = unsafe { core::LLVMGetReturnType(self.function_type(function)) };
        if ret == self.bool_type {
            ValueKind::Bool
        } else {
            ValueKind::Number
        }
    }

    // A function still called from elsewhere is swapped for a bare
    // declaration so those calls stay well formed.
    fn replace_function(&mut self, old: LLVMValueRef, new: LLVMValueRef) {
        self.redirect_function(old, new);
    }

    fn has_callers(&self, function: LLVMValueRef) -> bool {
        self.has_outside_uses(function)
    }

    fn delete_function(&mut self, function: LLVMValueRef) {
        if !self.has_outside_uses(function) {
            unsafe { core::LLVMDeleteFunction(function) };
            return;
        }
        let declaration = unsafe {
            core::LLVMAddFunction(
                self.module,
                b"\0".as_ptr() as *const _,
                self.function_type(function),
            )
        };
        self.redirect_function(function, declaration);
    }

    fn finish_function(&mut self, function: LLVMValueRef) -> Result<(), Error> {
        let broken = unsafe {
            LLVMVerifyFunction(function, LLVMVerifierFailureAction::LLVMReturnStatusAction)
        };
        if broken != 0 {
            let name = self.name_of(function);
            return Err(Error::from(ErrorKind::Codegen(format!(
                "function '{}' failed verification",
                name.to_string_lossy()
            ))));
        }
        Ok(())
    }

    fn dump_function(&self, function: LLVMValueRef) -> String {
        take_message(unsafe { core::LLVMPrintValueToString(function) })
    }
}

impl Execute for Llvm {
    fn run(&mut self, function: LLVMValueRef) -> Result<RuntimeValue, Error> {
        if unsafe { core::LLVMCountBasicBlocks(function) } == 0 {
            return Err(Error::from(ErrorKind::Execution(
                "cannot run a function without a body".to_owned(),
            )));
        }
        let kind = self.return_kind(function);
        unsafe {
            let result = LLVMRunFunction(self.engine, function, 0, null_mut());
            let value = match kind {
                ValueKind::Number => RuntimeValue::Number(LLVMGenericValueToFloat(self.double_type, result)),
                ValueKind::Bool => RuntimeValue::Bool(LLVMGenericValueToInt(result, 0) != 0),
            };
            LLVMDisposeGenericValue(result);
            Ok(value)
        }
    }
}
