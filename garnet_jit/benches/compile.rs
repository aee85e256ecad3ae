//! Compilation Pipeline Benchmarks
//!
//! Measures end-to-end compile cost for representative method shapes,
//! the bytecode pre-check in isolation, and the compiled-code cache.
//!
//! # Key Metrics
//!
//! - Straight-line compile time: linear in quad count
//! - Pre-check walk: far below the cost of the pipeline behind it
//! - Cache hit: one map read and a handle clone

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use garnet_core::{JitResult, ValueType};
use garnet_jit::cache::{CodeCache, MethodId};
use garnet_jit::ir::{
    Bci, BinOp, BranchCond, CallKind, ClassRef, FieldRef, MethodIr, MethodRef, Operand, QuadKind,
    VarOrigin,
};
use garnet_jit::precheck;
use garnet_jit::runtime::{Dispatch, FieldStorage, MethodMetadata, MethodSite, TargetConfig};
use garnet_jit::MethodCompiler;

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Debug, Default)]
struct BenchMeta {
    code: Vec<u8>,
    arg_words: u16,
    ret: Option<ValueType>,
}

impl MethodMetadata for BenchMeta {
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

fn int_meta() -> BenchMeta {
    BenchMeta {
        code: Vec::new(),
        arg_words: 1,
        ret: Some(ValueType::Int),
    }
}

/// A straight-line method chaining `adds` additions off one parameter.
fn chain_method(adds: usize) -> MethodIr {
    let mut ir = MethodIr::new();
    let b0 = ir.new_block(Bci::new(0));
    let p = ir.pool.alloc_param(ValueType::Int, VarOrigin::Local(0), 0);
    let mut cur = p;
    for k in 0..adds {
        let next = ir.pool.temp(ValueType::Int);
        ir.push(
            b0,
            Bci::new((2 * k) as u32),
            QuadKind::Binary {
                op: BinOp::Add,
                ty: ValueType::Int,
                dst: next,
                lhs: cur.into(),
                rhs: Operand::int(k as i32 + 1),
            },
        );
        cur = next;
    }
    ir.push(
        b0,
        Bci::new((2 * adds) as u32),
        QuadKind::Return {
            value: Some((ValueType::Int, cur.into())),
        },
    );
    ir
}

/// sum = 0; i = 0; while (i < n) { sum += i; i += 1; } return sum.
fn sum_loop_method() -> MethodIr {
    let mut ir = MethodIr::new();
    let b0 = ir.new_block(Bci::new(0));
    let b1 = ir.new_block(Bci::new(4));
    let b2 = ir.new_block(Bci::new(8));
    let b3 = ir.new_block(Bci::new(16));
    let n = ir.pool.alloc_param(ValueType::Int, VarOrigin::Local(0), 0);
    let sum = ir.pool.alloc(ValueType::Int, VarOrigin::Local(1));
    let i = ir.pool.alloc(ValueType::Int, VarOrigin::Local(2));

    ir.push(
        b0,
        Bci::new(0),
        QuadKind::Assign {
            ty: ValueType::Int,
            dst: sum,
            src: Operand::int(0),
        },
    );
    ir.push(
        b0,
        Bci::new(2),
        QuadKind::Assign {
            ty: ValueType::Int,
            dst: i,
            src: Operand::int(0),
        },
    );
    ir.push(
        b1,
        Bci::new(4),
        QuadKind::Branch {
            cond: BranchCond::Ge,
            lhs: i.into(),
            rhs: n.into(),
            target: Bci::new(16),
        },
    );
    ir.push(
        b2,
        Bci::new(8),
        QuadKind::Binary {
            op: BinOp::Add,
            ty: ValueType::Int,
            dst: sum,
            lhs: sum.into(),
            rhs: i.into(),
        },
    );
    ir.push(
        b2,
        Bci::new(10),
        QuadKind::Binary {
            op: BinOp::Add,
            ty: ValueType::Int,
            dst: i,
            lhs: i.into(),
            rhs: Operand::int(1),
        },
    );
    ir.push(b2, Bci::new(12), QuadKind::Goto { target: Bci::new(4) });
    ir.push(
        b3,
        Bci::new(16),
        QuadKind::Return {
            value: Some((ValueType::Int, sum.into())),
        },
    );
    ir
}

/// iload_0 / iload_1 / iadd / istore_0 repeated, then return.
fn supported_blob(repeats: usize) -> Vec<u8> {
    let mut code = Vec::with_capacity(4 * repeats + 1);
    for _ in 0..repeats {
        code.extend_from_slice(&[0x1A, 0x1B, 0x60, 0x3B]);
    }
    code.push(0xB1);
    code
}

// =============================================================================
// Whole-method compilation
// =============================================================================

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let meta = int_meta();

    group.bench_function("tiny_method", |b| {
        let mut compiler = MethodCompiler::new(TargetConfig::default());
        b.iter(|| black_box(compiler.compile(chain_method(1), &meta).unwrap()))
    });

    // Cost against method size
    for adds in [8usize, 64, 256] {
        group.bench_with_input(BenchmarkId::new("straight_line", adds), &adds, |b, &adds| {
            let mut compiler = MethodCompiler::new(TargetConfig::default());
            b.iter(|| black_box(compiler.compile(chain_method(adds), &meta).unwrap()))
        });
    }

    // Loop with a join point: SSA phis, a backward branch, a yieldpoint
    group.bench_function("loop_method", |b| {
        let mut compiler = MethodCompiler::new(TargetConfig::default());
        b.iter(|| black_box(compiler.compile(sum_loop_method(), &meta).unwrap()))
    });

    // Rejected before any IR stage runs
    group.bench_function("declined_method", |b| {
        let declined = BenchMeta {
            code: vec![0x16, 0x02],
            ..BenchMeta::default()
        };
        let mut compiler = MethodCompiler::new(TargetConfig::default());
        b.iter(|| black_box(compiler.compile(chain_method(1), &declined).is_err()))
    });

    group.finish();
}

// =============================================================================
// Pre-check in isolation
// =============================================================================

fn bench_precheck(c: &mut Criterion) {
    let mut group = c.benchmark_group("precheck");

    for repeats in [16usize, 256] {
        let code = supported_blob(repeats);
        group.bench_with_input(
            BenchmarkId::new("supported", code.len()),
            &code,
            |b, code| b.iter(|| black_box(precheck::check_method(code).is_ok())),
        );
    }

    let mut rejected = supported_blob(16);
    rejected.push(0x58);
    group.bench_function("rejected_at_the_tail", |b| {
        b.iter(|| black_box(precheck::check_method(&rejected).is_err()))
    });

    group.finish();
}

// =============================================================================
// Code cache
// =============================================================================

fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");

    let cache = CodeCache::new();
    let mut compiler = MethodCompiler::new(TargetConfig::default());
    let compiled = compiler.compile(chain_method(4), &int_meta()).unwrap();
    cache.insert(MethodId(7), compiled);

    group.bench_function("hit", |b| b.iter(|| black_box(cache.lookup(MethodId(7)))));

    group.bench_function("miss", |b| b.iter(|| black_box(cache.lookup(MethodId(8)))));

    group.finish();
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(compile_benches, bench_compile, bench_precheck, bench_cache);
criterion_main!(compile_benches);
