//! Method compilation driver.
//!
//! [`MethodCompiler`] runs one method at a time through the tier:
//! compatibility pre-check, optimization pipeline, liveness, linear
//! scan, frame layout, instruction selection. A failure at any stage
//! aborts that method only; nothing is published for it and the
//! compiler is immediately reusable for the next method.
//!
//! The `&mut self` receiver on [`MethodCompiler::compile`] is the
//! concurrency contract: one in-flight compilation per instance.
//! Separate instances share nothing but the read-only metadata
//! collaborator, so separate methods may compile in parallel on
//! separate instances.

use crate::backend::x86::CodeBuffer;
use crate::cfg::Cfg;
use crate::codegen::{CodeGenerator, CodegenStats};
use crate::frame::FrameLayout;
use crate::ir::MethodIr;
use crate::opt::{self, PipelineConfig, PipelineStats};
use crate::precheck;
use crate::regalloc::{self, AllocatorStats};
use crate::runtime::{MethodMetadata, TargetConfig};
use garnet_core::JitResult;

/// Rolled-up counters from every stage of one compilation.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompileStats {
    pub pipeline: PipelineStats,
    pub allocator: AllocatorStats,
    pub codegen: CodegenStats,
}

/// Finished compilation of one method.
///
/// Exists only when every stage succeeded; a failed method never
/// produces one.
#[derive(Debug)]
pub struct CompiledMethod {
    /// Symbolic instruction stream, prologue through the out-of-line
    /// failure blocks.
    pub code: CodeBuffer,
    /// Frame measurements for the emitted prologue and epilogue.
    pub frame: FrameLayout,
    pub stats: CompileStats,
}

/// Compiles methods through the full tier, one at a time.
#[derive(Debug, Default)]
pub struct MethodCompiler {
    target: TargetConfig,
    config: PipelineConfig,
    compiled: usize,
    declined: usize,
}

impl MethodCompiler {
    #[must_use]
    pub fn new(target: TargetConfig) -> Self {
        Self::with_config(target, PipelineConfig::default())
    }

    #[must_use]
    pub fn with_config(target: TargetConfig, config: PipelineConfig) -> Self {
        Self {
            target,
            config,
            compiled: 0,
            declined: 0,
        }
    }

    /// Methods this instance compiled to completion.
    #[inline]
    #[must_use]
    pub fn compiled(&self) -> usize {
        self.compiled
    }

    /// Methods this instance declined as not supported.
    #[inline]
    #[must_use]
    pub fn declined(&self) -> usize {
        self.declined
    }

    /// Compile one method. `ir` is consumed either way: on failure the
    /// partially transformed graph is dropped, never reused.
    pub fn compile<M: MethodMetadata>(
        &mut self,
        ir: MethodIr,
        meta: &M,
    ) -> JitResult<CompiledMethod> {
        let result = self.run_stages(ir, meta);
        match &result {
            Ok(_) => self.compiled += 1,
            Err(e) if e.is_decline() => self.declined += 1,
            Err(_) => {}
        }
        result
    }

    fn run_stages<M: MethodMetadata>(
        &self,
        mut ir: MethodIr,
        meta: &M,
    ) -> JitResult<CompiledMethod> {
        // The opcode walk is far cheaper than anything after it.
        precheck::check_method(meta.bytecode())?;

        let pipeline = opt::optimize(&mut ir, &self.config)?;

        let cfg = Cfg::build(&ir)?;
        let liveness = regalloc::compute_liveness(&ir, &cfg);
        let alloc = regalloc::allocate(&mut ir, &liveness)?;

        let frame = FrameLayout::new(&alloc, meta.arg_words());
        let (code, codegen) = CodeGenerator::new(&ir, meta, &self.target, &frame).run()?;

        Ok(CompiledMethod {
            code,
            frame,
            stats: CompileStats {
                pipeline,
                allocator: alloc.stats,
                codegen,
            },
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
