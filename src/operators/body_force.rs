//! Right hand side $ (f, v)_\Omega $
use super::cell_loop;
use crate::fe::DgSpace;
use crate::functions::FunctionPtr;
use crate::types::DofVector;

/// Volume source term
#[derive(Clone)]
pub struct BodyForceOperator {
    /// Discrete space
    pub space: DgSpace,
    /// Source $ f(x, t) $
    pub f: FunctionPtr,
}

impl BodyForceOperator {
    /// Source term on `space`
    pub fn new(space: &DgSpace, f: FunctionPtr) -> Self {
        Self {
            space: space.clone(),
            f,
        }
    }

    /// $ dst \mathrel{+}= (f(t), v) $
    pub fn evaluate_add(&self, dst: &mut DofVector, time: f64) {
        let space = &self.space;
        let nn = space.n_cell_nodes();
        cell_loop(space, dst, |cell, out| {
            for (k, o) in out.iter_mut().enumerate() {
                let node = k % nn;
                *o += space.jxw(node) * self.f.value(space.node_point(cell, node), time, k / nn);
            }
        });
    }
}
