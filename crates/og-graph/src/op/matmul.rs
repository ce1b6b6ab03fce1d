use og_device::Context;
use og_tensor::{DType, Tensor, TensorDesc};

use crate::error::OpError;
use crate::op::{
    bound_ptr, check_arity, check_compute_desc, fetch_f32, store_f32, Operator, Scratch,
};

/// Matrix-multiply configuration. The transpose flags change which stored
/// dimension counts as the inner one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatMulParam {
    pub transpose_a: bool,
    pub transpose_b: bool,
}

/// C = op(A) @ op(B) over two 2-D inputs.
///
/// Accumulates in f32; the accumulator is staged in the scratch region
/// before narrowing to the output dtype, so the operator needs
/// `m * n * 4` scratch bytes.
#[derive(Debug, Clone)]
pub struct MatMul {
    param: MatMulParam,
}

impl MatMul {
    pub fn new(param: MatMulParam) -> Self {
        MatMul { param }
    }

    /// Resolve the (m, k, n) problem size from the two input descriptors,
    /// validating rank, dtype, format, and the inner-dimension rule.
    fn problem(&self, a: &TensorDesc, b: &TensorDesc) -> Result<(usize, usize, usize), OpError> {
        for desc in [a, b] {
            check_compute_desc(desc)?;
            if desc.ndim() != 2 {
                return Err(OpError::RankMismatch {
                    expected: 2,
                    got: desc.ndim(),
                });
            }
        }
        if a.dtype() != b.dtype() {
            return Err(OpError::DTypeMismatch {
                expected: a.dtype(),
                got: b.dtype(),
            });
        }

        let (m, k) = if self.param.transpose_a {
            (a.dim(1), a.dim(0))
        } else {
            (a.dim(0), a.dim(1))
        };
        let (k2, n) = if self.param.transpose_b {
            (b.dim(1), b.dim(0))
        } else {
            (b.dim(0), b.dim(1))
        };
        if k != k2 {
            return Err(OpError::MatmulMismatch { m, k, k2, n });
        }
        Ok((m, k, n))
    }

    fn scratch_bytes(m: usize, n: usize) -> usize {
        m * n * std::mem::size_of::<f32>()
    }
}

impl Operator for MatMul {
    fn name(&self) -> &str {
        "matmul"
    }

    fn input_count(&self) -> usize {
        2
    }

    fn output_count(&self) -> usize {
        1
    }

    fn infer_outputs(&self, inputs: &[TensorDesc]) -> Result<Vec<TensorDesc>, OpError> {
        check_arity("input", 2, inputs.len())?;
        let (m, _, n) = self.problem(&inputs[0], &inputs[1])?;
        Ok(vec![TensorDesc::nd(inputs[0].dtype(), &[m, n])?])
    }

    fn setup(&mut self, inputs: &[TensorDesc], outputs: &[TensorDesc]) -> Result<usize, OpError> {
        check_arity("input", 2, inputs.len())?;
        check_arity("output", 1, outputs.len())?;
        let (m, _, n) = self.problem(&inputs[0], &inputs[1])?;

        let out = &outputs[0];
        check_compute_desc(out)?;
        if out.dims() != [m, n] {
            return Err(OpError::ShapeMismatch {
                expected: vec![m, n],
                got: out.dims().to_vec(),
            });
        }
        if out.dtype() != inputs[0].dtype() {
            return Err(OpError::DTypeMismatch {
                expected: inputs[0].dtype(),
                got: out.dtype(),
            });
        }
        Ok(Self::scratch_bytes(m, n))
    }

    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &[&Tensor],
        scratch: Scratch<'_>,
        ctx: &Context,
    ) -> Result<(), OpError> {
        check_arity("input", 2, inputs.len())?;
        check_arity("output", 1, outputs.len())?;
        let (a, b, out) = (inputs[0], inputs[1], outputs[0]);
        let (m, k, n) = self.problem(a.desc(), b.desc())?;

        let ws = scratch.claim(Self::scratch_bytes(m, n))?;
        let a_ptr = bound_ptr(a)?;
        let b_ptr = bound_ptr(b)?;
        let out_ptr = bound_ptr(out)?;
        let dtype = a.desc().dtype();
        let out_dtype = out.desc().dtype();
        let (a_bytes, b_bytes) = (a.data_size(), b.data_size());
        let MatMulParam {
            transpose_a: ta,
            transpose_b: tb,
        } = self.param;

        ctx.stream().enqueue(move || {
            let av = fetch_f32(&a_ptr, dtype, a_bytes)?;
            let bv = fetch_f32(&b_ptr, dtype, b_bytes)?;

            let mut acc = vec![0.0f32; m * n];
            for i in 0..m {
                for j in 0..n {
                    let mut sum = 0.0f32;
                    for p in 0..k {
                        let x = if ta { av[p * m + i] } else { av[i * k + p] };
                        let y = if tb { bv[j * k + p] } else { bv[p * n + j] };
                        sum += x * y;
                    }
                    acc[i * n + j] = sum;
                }
            }

            // Stage the f32 accumulator in the scratch region, then narrow
            // to the output dtype.
            if let Some(ws) = &ws {
                store_f32(ws, DType::F32, &acc)?;
            }
            store_f32(&out_ptr, out_dtype, &acc)
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use og_tensor::Format;

    fn nd(dtype: DType, dims: &[usize]) -> TensorDesc {
        TensorDesc::nd(dtype, dims).unwrap()
    }

    fn run_matmul(param: MatMulParam, a: (&[usize], &[f32]), b: (&[usize], &[f32])) -> Vec<f32> {
        let mut op = MatMul::new(param);
        let a = Tensor::from_host_f32(nd(DType::F32, a.0), a.1).unwrap();
        let b = Tensor::from_host_f32(nd(DType::F32, b.0), b.1).unwrap();
        let out_desc = op.infer_outputs(&[a.desc().clone(), b.desc().clone()]).unwrap();
        let ws = op
            .setup(&[a.desc().clone(), b.desc().clone()], &out_desc)
            .unwrap();
        let out = Tensor::from_host_f32(out_desc[0].clone(), &vec![0.0; out_desc[0].elem_count()])
            .unwrap();

        let ctx = Context::new();
        let ws_ptr = og_device::DevicePtr::alloc(ws).unwrap();
        op.execute(&[&a, &b], &[&out], Scratch::new(&ws_ptr, ws), &ctx)
            .unwrap();
        ctx.synchronize().unwrap();
        out.read_f32().unwrap()
    }

    #[test]
    fn test_basic() {
        // [1,2;3,4] @ [5,6;7,8] = [19,22;43,50]
        let out = run_matmul(
            MatMulParam::default(),
            (&[2, 2], &[1.0, 2.0, 3.0, 4.0]),
            (&[2, 2], &[5.0, 6.0, 7.0, 8.0]),
        );
        assert_eq!(out, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_rectangular() {
        // [1,2,3] @ [[1],[1],[1]] = [6]
        let out = run_matmul(
            MatMulParam::default(),
            (&[1, 3], &[1.0, 2.0, 3.0]),
            (&[3, 1], &[1.0, 1.0, 1.0]),
        );
        assert_eq!(out, vec![6.0]);
    }

    #[test]
    fn test_transpose_b() {
        // A [1,3] @ B^T where B stored [2,3]
        let out = run_matmul(
            MatMulParam {
                transpose_a: false,
                transpose_b: true,
            },
            (&[1, 3], &[1.0, 2.0, 3.0]),
            (&[2, 3], &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
        );
        assert_eq!(out, vec![1.0, 2.0]);
    }

    #[test]
    fn test_transpose_a() {
        // A stored [3,1], logical A^T [1,3]; times ones column
        let out = run_matmul(
            MatMulParam {
                transpose_a: true,
                transpose_b: false,
            },
            (&[3, 1], &[1.0, 2.0, 3.0]),
            (&[3, 1], &[1.0, 1.0, 1.0]),
        );
        assert_eq!(out, vec![6.0]);
    }

    #[test]
    fn test_f16_path() {
        let mut op = MatMul::new(MatMulParam::default());
        let a = Tensor::from_host_f32(nd(DType::F16, &[1, 2]), &[1.0, 2.0]).unwrap();
        let b = Tensor::from_host_f32(nd(DType::F16, &[2, 2]), &[1.0, 0.0, 0.0, 1.0]).unwrap();
        let out_desc = nd(DType::F16, &[1, 2]);
        let ws = op
            .setup(
                &[a.desc().clone(), b.desc().clone()],
                std::slice::from_ref(&out_desc),
            )
            .unwrap();
        assert_eq!(ws, 8);
        let out = Tensor::from_host_f32(out_desc, &[0.0, 0.0]).unwrap();

        let ctx = Context::new();
        let ws_ptr = og_device::DevicePtr::alloc(ws).unwrap();
        op.execute(&[&a, &b], &[&out], Scratch::new(&ws_ptr, ws), &ctx)
            .unwrap();
        ctx.synchronize().unwrap();
        assert_eq!(out.read_f32().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_inner_dim_mismatch() {
        let op = MatMul::new(MatMulParam::default());
        let err = op
            .infer_outputs(&[nd(DType::F32, &[1, 3]), nd(DType::F32, &[2, 2])])
            .unwrap_err();
        assert!(matches!(err, OpError::MatmulMismatch { k: 3, k2: 2, .. }));
    }

    #[test]
    fn test_rank_rejected() {
        let op = MatMul::new(MatMulParam::default());
        let err = op
            .infer_outputs(&[nd(DType::F32, &[3]), nd(DType::F32, &[3, 1])])
            .unwrap_err();
        assert!(matches!(err, OpError::RankMismatch { expected: 2, got: 1 }));
    }

    #[test]
    fn test_i32_rejected() {
        let op = MatMul::new(MatMulParam::default());
        let err = op
            .infer_outputs(&[nd(DType::I32, &[2, 2]), nd(DType::I32, &[2, 2])])
            .unwrap_err();
        assert!(matches!(err, OpError::UnsupportedDType(DType::I32)));
    }

    #[test]
    fn test_nz_format_rejected() {
        let op = MatMul::new(MatMulParam::default());
        let a = TensorDesc::new(DType::F32, Format::Nz, &[2, 2]).unwrap();
        let err = op
            .infer_outputs(&[a, nd(DType::F32, &[2, 2])])
            .unwrap_err();
        assert!(matches!(err, OpError::UnsupportedFormat(Format::Nz)));
    }

    #[test]
    fn test_wrong_output_shape() {
        let mut op = MatMul::new(MatMulParam::default());
        let err = op
            .setup(
                &[nd(DType::F32, &[2, 2]), nd(DType::F32, &[2, 2])],
                &[nd(DType::F32, &[2, 3])],
            )
            .unwrap_err();
        assert!(matches!(err, OpError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_scratch_too_small() {
        let op = MatMul::new(MatMulParam::default());
        let a = Tensor::from_host_f32(nd(DType::F32, &[2, 2]), &[1.0; 4]).unwrap();
        let b = Tensor::from_host_f32(nd(DType::F32, &[2, 2]), &[1.0; 4]).unwrap();
        let out = Tensor::from_host_f32(nd(DType::F32, &[2, 2]), &[0.0; 4]).unwrap();
        let ctx = Context::new();
        let err = op
            .execute(&[&a, &b], &[&out], Scratch::empty(), &ctx)
            .unwrap_err();
        assert!(matches!(err, OpError::ScratchTooSmall { needed: 16, .. }));
        assert_eq!(ctx.stream().pending(), 0);
    }

    #[test]
    fn test_random_against_reference() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        let (m, k, n) = (3, 5, 4);
        let a_data: Vec<f32> = (0..m * k).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let b_data: Vec<f32> = (0..k * n).map(|_| rng.gen_range(-1.0..1.0)).collect();

        let mut expected = vec![0.0f32; m * n];
        for i in 0..m {
            for j in 0..n {
                expected[i * n + j] = (0..k).map(|p| a_data[i * k + p] * b_data[p * n + j]).sum();
            }
        }

        let out = run_matmul(
            MatMulParam::default(),
            (&[m, k], &a_data),
            (&[k, n], &b_data),
        );
        for (got, want) in out.iter().zip(expected.iter()) {
            approx::assert_relative_eq!(got, want, epsilon = 1e-5);
        }
    }
}
