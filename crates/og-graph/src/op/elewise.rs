use og_device::Context;
use og_tensor::{Tensor, TensorDesc};

use crate::error::OpError;
use crate::op::{
    bound_ptr, check_arity, check_compute_desc, fetch_f32, store_f32, Operator, Scratch,
};

/// Elementwise operation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElewiseKind {
    Add,
}

#[derive(Debug, Clone, Copy)]
pub struct ElewiseParam {
    pub kind: ElewiseKind,
}

/// Elementwise binary operator: both inputs and the output share one
/// descriptor. Needs no scratch memory.
#[derive(Debug, Clone)]
pub struct Elewise {
    param: ElewiseParam,
    name: &'static str,
}

impl Elewise {
    pub fn new(param: ElewiseParam) -> Self {
        let name = match param.kind {
            ElewiseKind::Add => "elewise.add",
        };
        Elewise { param, name }
    }

    fn check_inputs(&self, inputs: &[TensorDesc]) -> Result<(), OpError> {
        check_arity("input", 2, inputs.len())?;
        check_compute_desc(&inputs[0])?;
        check_compute_desc(&inputs[1])?;
        if inputs[0].dtype() != inputs[1].dtype() {
            return Err(OpError::DTypeMismatch {
                expected: inputs[0].dtype(),
                got: inputs[1].dtype(),
            });
        }
        if inputs[0].dims() != inputs[1].dims() {
            return Err(OpError::ShapeMismatch {
                expected: inputs[0].dims().to_vec(),
                got: inputs[1].dims().to_vec(),
            });
        }
        Ok(())
    }
}

impl Operator for Elewise {
    fn name(&self) -> &str {
        self.name
    }

    fn input_count(&self) -> usize {
        2
    }

    fn output_count(&self) -> usize {
        1
    }

    fn infer_outputs(&self, inputs: &[TensorDesc]) -> Result<Vec<TensorDesc>, OpError> {
        self.check_inputs(inputs)?;
        Ok(vec![inputs[0].clone()])
    }

    fn setup(&mut self, inputs: &[TensorDesc], outputs: &[TensorDesc]) -> Result<usize, OpError> {
        self.check_inputs(inputs)?;
        check_arity("output", 1, outputs.len())?;
        if outputs[0] != inputs[0] {
            return Err(OpError::ShapeMismatch {
                expected: inputs[0].dims().to_vec(),
                got: outputs[0].dims().to_vec(),
            });
        }
        Ok(0)
    }

    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &[&Tensor],
        _scratch: Scratch<'_>,
        ctx: &Context,
    ) -> Result<(), OpError> {
        check_arity("input", 2, inputs.len())?;
        check_arity("output", 1, outputs.len())?;
        self.check_inputs(&[inputs[0].desc().clone(), inputs[1].desc().clone()])?;

        let a_ptr = bound_ptr(inputs[0])?;
        let b_ptr = bound_ptr(inputs[1])?;
        let out_ptr = bound_ptr(outputs[0])?;
        let dtype = inputs[0].desc().dtype();
        let out_dtype = outputs[0].desc().dtype();
        let (a_bytes, b_bytes) = (inputs[0].data_size(), inputs[1].data_size());
        let kind = self.param.kind;

        ctx.stream().enqueue(move || {
            let a = fetch_f32(&a_ptr, dtype, a_bytes)?;
            let b = fetch_f32(&b_ptr, dtype, b_bytes)?;
            let out: Vec<f32> = match kind {
                ElewiseKind::Add => a.iter().zip(b.iter()).map(|(x, y)| x + y).collect(),
            };
            store_f32(&out_ptr, out_dtype, &out)
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use og_tensor::DType;

    fn add_op() -> Elewise {
        Elewise::new(ElewiseParam {
            kind: ElewiseKind::Add,
        })
    }

    #[test]
    fn test_add() {
        let desc = TensorDesc::nd(DType::F32, &[2, 2]).unwrap();
        let a = Tensor::from_host_f32(desc.clone(), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::from_host_f32(desc.clone(), &[5.0, 6.0, 7.0, 8.0]).unwrap();
        let out = Tensor::from_host_f32(desc.clone(), &[0.0; 4]).unwrap();

        let mut op = add_op();
        let ws = op
            .setup(
                &[desc.clone(), desc.clone()],
                std::slice::from_ref(&desc),
            )
            .unwrap();
        assert_eq!(ws, 0);

        let ctx = Context::new();
        op.execute(&[&a, &b], &[&out], Scratch::empty(), &ctx)
            .unwrap();
        ctx.synchronize().unwrap();
        assert_eq!(out.read_f32().unwrap(), vec![6.0, 8.0, 10.0, 12.0]);
    }

    #[test]
    fn test_shape_mismatch() {
        let op = add_op();
        let a = TensorDesc::nd(DType::F32, &[2, 2]).unwrap();
        let b = TensorDesc::nd(DType::F32, &[4]).unwrap();
        assert!(matches!(
            op.infer_outputs(&[a, b]),
            Err(OpError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_dtype_mismatch() {
        let op = add_op();
        let a = TensorDesc::nd(DType::F32, &[2]).unwrap();
        let b = TensorDesc::nd(DType::F16, &[2]).unwrap();
        assert!(matches!(
            op.infer_outputs(&[a, b]),
            Err(OpError::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_infer() {
        let op = add_op();
        let d = TensorDesc::nd(DType::F16, &[3, 3]).unwrap();
        let out = op.infer_outputs(&[d.clone(), d.clone()]).unwrap();
        assert_eq!(out, vec![d]);
    }
}
