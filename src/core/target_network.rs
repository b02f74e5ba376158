//! Target critic maintenance.
//!
//! The learner bootstraps its Bellman targets from a slowly moving copy of the
//! critic ensemble, updated after every step by Polyak averaging:
//!
//! ```text
//! θ_target = τ * θ_live + (1 - τ) * θ_target
//! ```
//!
//! The target lives on the inner (non-autodiff) backend, so the live critic is
//! passed through `valid()` before averaging and the target never joins the
//! autodiff graph.
//!
//! Parameters are paired by traversal order, so live and target must share an
//! architecture. [`soft_update`] checks every shape before averaging.

use burn::module::{Module, ModuleMapper, Param};
use burn::prelude::*;

use crate::checkpoint::param_shapes;
use crate::error::{Error, Result};

// ============================================================================
// Soft Update Implementation via ModuleMapper
// ============================================================================

/// Extracts all float parameters of a module, flattened to 1D.
///
/// Parameters are collected in traversal order, which is deterministic for
/// modules with the same architecture.
struct ParamExtractor<B: Backend> {
    params: Vec<Tensor<B, 1>>,
}

impl<B: Backend> ModuleMapper<B> for ParamExtractor<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let val = param.val();
        let total_size: usize = val.dims().iter().product();
        self.params.push(val.reshape([total_size]));
        param
    }
}

/// Interpolates each target parameter towards the live parameter at the same
/// traversal index.
struct SoftUpdateMapper<B: Backend> {
    live_params: Vec<Tensor<B, 1>>,
    tau: f32,
    index: usize,
}

impl<B: Backend> ModuleMapper<B> for SoftUpdateMapper<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let target_val = param.val();
        let shape = target_val.dims();
        let total_size: usize = shape.iter().product();

        let idx = self.index;
        self.index += 1;

        match self.live_params.get(idx) {
            Some(live) if live.dims()[0] == total_size => {
                let interpolated = live.clone().mul_scalar(self.tau)
                    + target_val.reshape([total_size]).mul_scalar(1.0 - self.tau);
                Param::initialized(param.id.clone(), interpolated.reshape(shape))
            }
            // unreachable once soft_update has compared the shapes
            _ => param,
        }
    }
}

/// Polyak-average `live` into `target`.
///
/// - `tau == 1.0` returns an exact copy of `live`
/// - `tau == 0.0` returns `target` unchanged
///
/// Parameters are matched by traversal order, not by `ParamId`, so the two
/// modules may be created independently as long as they share an architecture.
pub fn soft_update<B, M>(live: &M, target: M, tau: f32) -> Result<M>
where
    B: Backend,
    M: Module<B>,
{
    let expected = param_shapes(live);
    let found = param_shapes(&target);
    if expected != found {
        return Err(Error::ShapeMismatch {
            module: "target network".to_string(),
            expected,
            found,
        });
    }

    if (tau - 1.0).abs() < 1e-6 {
        return Ok(hard_copy(live));
    }
    if tau.abs() < 1e-6 {
        return Ok(target);
    }

    let mut extractor = ParamExtractor { params: Vec::new() };
    let _ = live.clone().map(&mut extractor);

    let mut updater = SoftUpdateMapper {
        live_params: extractor.params,
        tau,
        index: 0,
    };
    Ok(target.map(&mut updater))
}

/// Copy of the live module used to initialize a target (tau = 1).
pub fn hard_copy<B, M>(live: &M) -> M
where
    B: Backend,
    M: Module<B>,
{
    live.clone()
}
