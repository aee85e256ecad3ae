//! Shared utilities for the integration suites: a configurable metadata
//! stub and simulator harness helpers.

use garnet_core::{JitResult, ValueType};
use garnet_jit::backend::x86::{CodeBuffer, Machine, RunOutcome};
use garnet_jit::ir::{CallKind, ClassRef, FieldRef, MethodRef};
use garnet_jit::runtime::{Dispatch, FieldStorage, MethodMetadata, MethodSite};

/// Metadata stand-in with just enough knobs for the suites. Every field
/// reference resolves to an instance slot at offset 16 and every call
/// site to a direct entry cell, which is all the fixtures here need.
#[derive(Debug, Default)]
pub struct TestMeta {
    pub code: Vec<u8>,
    pub arg_words: u16,
    pub ret: Option<ValueType>,
}

impl TestMeta {
    /// A method taking `arg_words` words and returning `ret`.
    pub fn returning(arg_words: u16, ret: ValueType) -> Self {
        Self {
            code: Vec::new(),
            arg_words,
            ret: Some(ret),
        }
    }
}

impl MethodMetadata for TestMeta {
    fn bytecode(&self) -> &[u8] {
        &self.code
    }

    fn arg_words(&self) -> u16 {
        self.arg_words
    }

    fn return_type(&self) -> Option<ValueType> {
        self.ret
    }

    fn field_storage(&self, _field: FieldRef) -> JitResult<FieldStorage> {
        Ok(FieldStorage::Instance { offset: 16 })
    }

    fn method_site(&self, _kind: CallKind, _method: MethodRef) -> JitResult<MethodSite> {
        Ok(MethodSite {
            arg_words: 0,
            return_type: None,
            dispatch: Dispatch::Direct { entry_cell: 0x2000 },
        })
    }

    fn class_handle(&self, _class: ClassRef) -> JitResult<i32> {
        Ok(0x41)
    }
}

/// Run emitted code on a fresh machine.
pub fn run_code(buf: &CodeBuffer, args: &[i32]) -> RunOutcome {
    let mut machine = Machine::new();
    machine.call(buf, args)
}

/// Run emitted code and insist on a normal integer return.
pub fn run_for_eax(buf: &CodeBuffer, args: &[i32]) -> i32 {
    match run_code(buf, args) {
        RunOutcome::Returned { eax, .. } => eax,
        other => panic!("expected a return, got {other:?}"),
    }
}

/// Run emitted code and insist on a float return on the FPU stack.
pub fn run_for_st0(buf: &CodeBuffer, args: &[i32]) -> f64 {
    match run_code(buf, args) {
        RunOutcome::Returned { st0: Some(v), .. } => v,
        other => panic!("expected a float return, got {other:?}"),
    }
}

/// Split a double's bits into the two argument words, low word first.
pub fn double_words(v: f64) -> [i32; 2] {
    let bits = v.to_bits();
    [bits as u32 as i32, (bits >> 32) as i32]
}
