//! C boundary for the opgraph engine.
//!
//! Handles are heap-allocated opaque pointers; every function returns an
//! `OgStatus`, with `og_last_error` holding the message for the most recent
//! failure on the calling thread. The session wraps the bundled
//! matmul-matmul-add wiring: out = a1 @ b1 + a2 @ b2 over `[1, dim]`
//! vectors and `[dim, dim]` matrices.

mod error;
mod types;

pub use error::*;
pub use types::*;

use std::ffi::CString;
use std::os::raw::c_char;

use og_device::{DeviceError, DevicePtr, Stream};
use og_graph::{
    create_operator, ElewiseKind, ElewiseParam, Graph, GraphNode, GraphParam, MatMulParam,
    OpParam, Session, SessionOptions,
};
use og_tensor::{Tensor, TensorDesc};

/// Execute a closure that returns an `OgStatus`, catching any panics and
/// converting them into `OgStatus::ErrorInternal`.
fn catch_panic<F: FnOnce() -> OgStatus>(f: F) -> OgStatus {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(status) => status,
        Err(_) => {
            set_last_error("internal panic".to_string());
            OgStatus::ErrorInternal
        }
    }
}

fn device_error_status(err: &DeviceError) -> OgStatus {
    set_last_error(err.to_string());
    match err {
        DeviceError::AllocationFailure { .. } => OgStatus::ErrorOutOfMemory,
        DeviceError::CopyOutOfBounds { .. } => OgStatus::ErrorInvalidArgument,
        DeviceError::Kernel(_) => OgStatus::ErrorExecute,
    }
}

/// Allocate a zero-initialized device buffer of `bytes` bytes.
///
/// On success, writes a heap-allocated `OgBuffer` pointer into `*buf_out`.
/// The caller must later call `og_buffer_destroy` to release it.
#[no_mangle]
pub extern "C" fn og_buffer_alloc(bytes: usize, buf_out: *mut *mut OgBuffer) -> OgStatus {
    catch_panic(|| {
        if buf_out.is_null() {
            set_last_error("buf_out is null".to_string());
            return OgStatus::ErrorInvalidArgument;
        }
        let ptr = match DevicePtr::alloc(bytes) {
            Ok(p) => p,
            Err(e) => return device_error_status(&e),
        };
        let buf = Box::new(OgBuffer { ptr });
        unsafe {
            *buf_out = Box::into_raw(buf);
        }
        OgStatus::Ok
    })
}

/// Capacity of a buffer in bytes.
#[no_mangle]
pub unsafe extern "C" fn og_buffer_size(buf: *const OgBuffer, bytes_out: *mut usize) -> OgStatus {
    catch_panic(|| {
        if buf.is_null() || bytes_out.is_null() {
            set_last_error("null argument".to_string());
            return OgStatus::ErrorInvalidArgument;
        }
        unsafe { *bytes_out = (*buf).ptr.capacity() };
        OgStatus::Ok
    })
}

/// Copy `len` bytes from host memory into the start of the buffer.
#[no_mangle]
pub unsafe extern "C" fn og_buffer_write(
    buf: *mut OgBuffer,
    data: *const u8,
    len: usize,
) -> OgStatus {
    catch_panic(|| {
        if buf.is_null() || data.is_null() {
            set_last_error("null argument".to_string());
            return OgStatus::ErrorInvalidArgument;
        }
        let bytes = unsafe { std::slice::from_raw_parts(data, len) };
        match unsafe { &*buf }.ptr.copy_from_host(bytes) {
            Ok(()) => OgStatus::Ok,
            Err(e) => device_error_status(&e),
        }
    })
}

/// Copy `len` bytes from the start of the buffer into host memory.
#[no_mangle]
pub unsafe extern "C" fn og_buffer_read(
    buf: *const OgBuffer,
    data: *mut u8,
    len: usize,
) -> OgStatus {
    catch_panic(|| {
        if buf.is_null() || data.is_null() {
            set_last_error("null argument".to_string());
            return OgStatus::ErrorInvalidArgument;
        }
        let bytes = unsafe { std::slice::from_raw_parts_mut(data, len) };
        match unsafe { &*buf }.ptr.copy_to_host(bytes) {
            Ok(()) => OgStatus::Ok,
            Err(e) => device_error_status(&e),
        }
    })
}

/// Destroy a buffer previously created by `og_buffer_alloc`.
///
/// Passing a null pointer is a no-op. The underlying device memory is
/// released once no session or other handle still refers to it.
#[no_mangle]
pub unsafe extern "C" fn og_buffer_destroy(buf: *mut OgBuffer) -> OgStatus {
    if buf.is_null() {
        return OgStatus::Ok;
    }
    drop(Box::from_raw(buf));
    OgStatus::Ok
}

/// Create an execution stream that sessions may share.
#[no_mangle]
pub extern "C" fn og_stream_create(stream_out: *mut *mut OgStream) -> OgStatus {
    catch_panic(|| {
        if stream_out.is_null() {
            set_last_error("stream_out is null".to_string());
            return OgStatus::ErrorInvalidArgument;
        }
        let stream = Box::new(OgStream {
            stream: Stream::new(),
        });
        unsafe {
            *stream_out = Box::into_raw(stream);
        }
        OgStatus::Ok
    })
}

/// Run all queued work on the stream and block until it completes.
#[no_mangle]
pub unsafe extern "C" fn og_stream_synchronize(stream: *mut OgStream) -> OgStatus {
    catch_panic(|| {
        if stream.is_null() {
            set_last_error("stream is null".to_string());
            return OgStatus::ErrorInvalidArgument;
        }
        match unsafe { &*stream }.stream.synchronize() {
            Ok(()) => OgStatus::Ok,
            Err(e) => device_error_status(&e),
        }
    })
}

/// Destroy a stream previously created by `og_stream_create`.
#[no_mangle]
pub unsafe extern "C" fn og_stream_destroy(stream: *mut OgStream) -> OgStatus {
    if stream.is_null() {
        return OgStatus::Ok;
    }
    drop(Box::from_raw(stream));
    OgStatus::Ok
}

fn demo_graph() -> Result<Graph, og_graph::GraphError> {
    Graph::new(GraphParam {
        input_count: 4,
        output_count: 1,
        internal_count: 2,
        nodes: vec![
            GraphNode {
                op: create_operator(OpParam::MatMul(MatMulParam::default())),
                inputs: vec![0, 1],
                outputs: vec![4],
            },
            GraphNode {
                op: create_operator(OpParam::MatMul(MatMulParam::default())),
                inputs: vec![2, 3],
                outputs: vec![5],
            },
            GraphNode {
                op: create_operator(OpParam::Elewise(ElewiseParam {
                    kind: ElewiseKind::Add,
                })),
                inputs: vec![4, 5],
                outputs: vec![6],
            },
        ],
    })
}

/// Create a session running out = a1 @ b1 + a2 @ b2.
///
/// Inputs alternate `[1, dim]` vectors and `[dim, dim]` matrices; the
/// output is a `[1, dim]` vector. `stream` and `workspace` may be null,
/// in which case the session owns a fresh stream and sizes its own
/// workspace. A non-null workspace is used as-is and never reallocated.
#[no_mangle]
pub unsafe extern "C" fn og_session_create(
    dim: usize,
    dtype: OgDType,
    stream: *mut OgStream,
    workspace: *mut OgBuffer,
    sess_out: *mut *mut OgSession,
) -> OgStatus {
    catch_panic(|| {
        if sess_out.is_null() {
            set_last_error("sess_out is null".to_string());
            return OgStatus::ErrorInvalidArgument;
        }
        if dim == 0 {
            set_last_error("dim must be nonzero".to_string());
            return OgStatus::ErrorInvalidArgument;
        }

        let dtype = dtype.to_dtype();
        let vec_desc = match TensorDesc::nd(dtype, &[1, dim]) {
            Ok(d) => d,
            Err(e) => {
                set_last_error(e.to_string());
                return OgStatus::ErrorInvalidArgument;
            }
        };
        let mat_desc = match TensorDesc::nd(dtype, &[dim, dim]) {
            Ok(d) => d,
            Err(e) => {
                set_last_error(e.to_string());
                return OgStatus::ErrorInvalidArgument;
            }
        };

        let graph = match demo_graph() {
            Ok(g) => g,
            Err(e) => return graph_error_status(&e),
        };
        let options = SessionOptions {
            stream: if stream.is_null() {
                None
            } else {
                Some(unsafe { &*stream }.stream.clone())
            },
            workspace: if workspace.is_null() {
                None
            } else {
                Some(unsafe { &*workspace }.ptr.clone())
            },
        };

        let sess = Box::new(OgSession {
            session: Session::new(graph, options),
            input_descs: vec![
                vec_desc.clone(),
                mat_desc.clone(),
                vec_desc.clone(),
                mat_desc,
            ],
            output_descs: vec![vec_desc],
        });
        unsafe {
            *sess_out = Box::into_raw(sess);
        }
        OgStatus::Ok
    })
}

/// Workspace bytes reported by the last run's setup, or 0 before any run.
#[no_mangle]
pub unsafe extern "C" fn og_session_workspace_size(
    sess: *const OgSession,
    bytes_out: *mut usize,
) -> OgStatus {
    catch_panic(|| {
        if sess.is_null() || bytes_out.is_null() {
            set_last_error("null argument".to_string());
            return OgStatus::ErrorInvalidArgument;
        }
        unsafe { *bytes_out = (*sess).session.workspace_size().unwrap_or(0) };
        OgStatus::Ok
    })
}

fn bind_all(descs: &[TensorDesc], bufs: &[*const OgBuffer]) -> Result<Vec<Tensor>, OgStatus> {
    descs
        .iter()
        .zip(bufs)
        .map(|(desc, &buf)| {
            if buf.is_null() {
                set_last_error("null buffer".to_string());
                return Err(OgStatus::ErrorInvalidArgument);
            }
            let mut tensor = Tensor::unbound(desc.clone());
            tensor
                .bind(unsafe { &*buf }.ptr.clone())
                .map_err(|e| {
                    set_last_error(e.to_string());
                    OgStatus::ErrorInvalidArgument
                })?;
            Ok(tensor)
        })
        .collect()
}

/// Run the session over the given buffers and block until the output
/// buffers hold the results.
///
/// `inputs` must hold exactly four buffers (a1, b1, a2, b2) and `outputs`
/// exactly one, each large enough for its descriptor.
#[no_mangle]
pub unsafe extern "C" fn og_session_run(
    sess: *mut OgSession,
    inputs: *const *const OgBuffer,
    input_count: usize,
    outputs: *const *const OgBuffer,
    output_count: usize,
) -> OgStatus {
    catch_panic(|| {
        if sess.is_null() || inputs.is_null() || outputs.is_null() {
            set_last_error("null argument".to_string());
            return OgStatus::ErrorInvalidArgument;
        }
        let sess = unsafe { &mut *sess };
        if input_count != sess.input_descs.len() || output_count != sess.output_descs.len() {
            set_last_error(format!(
                "expected {} inputs and {} outputs, got {} and {}",
                sess.input_descs.len(),
                sess.output_descs.len(),
                input_count,
                output_count
            ));
            return OgStatus::ErrorInvalidArgument;
        }

        let input_bufs = unsafe { std::slice::from_raw_parts(inputs, input_count) };
        let output_bufs = unsafe { std::slice::from_raw_parts(outputs, output_count) };
        let input_tensors = match bind_all(&sess.input_descs, input_bufs) {
            Ok(t) => t,
            Err(status) => return status,
        };
        let output_tensors = match bind_all(&sess.output_descs, output_bufs) {
            Ok(t) => t,
            Err(status) => return status,
        };

        let input_refs: Vec<&Tensor> = input_tensors.iter().collect();
        let output_refs: Vec<&Tensor> = output_tensors.iter().collect();
        match sess.session.run(&input_refs, &output_refs) {
            Ok(()) => OgStatus::Ok,
            Err(e) => graph_error_status(&e),
        }
    })
}

/// Destroy a session previously created by `og_session_create`.
///
/// Graph-owned internal tensors and an owned workspace are released with
/// the session; buffers the caller bound remain the caller's to destroy.
#[no_mangle]
pub unsafe extern "C" fn og_session_destroy(sess: *mut OgSession) -> OgStatus {
    if sess.is_null() {
        return OgStatus::Ok;
    }
    drop(Box::from_raw(sess));
    OgStatus::Ok
}

/// Retrieve the last error message.
///
/// Returns a pointer to a C string describing the most recent error on the
/// calling thread, or null if none has occurred. The caller must free the
/// returned string with `og_string_free`.
#[no_mangle]
pub extern "C" fn og_last_error() -> *const c_char {
    match take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null(),
    }
}

/// Free a string previously returned by `og_last_error`.
#[no_mangle]
pub unsafe extern "C" fn og_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use og_tensor::DType;

    fn buffer_from_f32(values: &[f32]) -> *mut OgBuffer {
        let bytes = og_tensor::encode_f32(DType::F32, values).unwrap();
        let mut buf: *mut OgBuffer = std::ptr::null_mut();
        assert_eq!(og_buffer_alloc(bytes.len(), &mut buf), OgStatus::Ok);
        unsafe {
            assert_eq!(
                og_buffer_write(buf, bytes.as_ptr(), bytes.len()),
                OgStatus::Ok
            );
        }
        buf
    }

    fn read_f32(buf: *const OgBuffer, count: usize) -> Vec<f32> {
        let mut bytes = vec![0u8; count * 4];
        unsafe {
            assert_eq!(
                og_buffer_read(buf, bytes.as_mut_ptr(), bytes.len()),
                OgStatus::Ok
            );
        }
        og_tensor::decode_f32(DType::F32, &bytes).unwrap()
    }

    #[test]
    fn test_buffer_roundtrip() {
        let buf = buffer_from_f32(&[1.0, 2.0, 3.0]);
        assert_eq!(read_f32(buf, 3), vec![1.0, 2.0, 3.0]);

        let mut size = 0usize;
        unsafe {
            assert_eq!(og_buffer_size(buf, &mut size), OgStatus::Ok);
            assert_eq!(size, 12);
            assert_eq!(og_buffer_destroy(buf), OgStatus::Ok);
        }
    }

    #[test]
    fn test_null_arguments() {
        assert_eq!(
            og_buffer_alloc(16, std::ptr::null_mut()),
            OgStatus::ErrorInvalidArgument
        );
        unsafe {
            assert_eq!(
                og_buffer_write(std::ptr::null_mut(), std::ptr::null(), 0),
                OgStatus::ErrorInvalidArgument
            );
            assert_eq!(
                og_buffer_size(std::ptr::null(), std::ptr::null_mut()),
                OgStatus::ErrorInvalidArgument
            );
            assert_eq!(
                og_session_workspace_size(std::ptr::null(), std::ptr::null_mut()),
                OgStatus::ErrorInvalidArgument
            );
            assert_eq!(og_buffer_destroy(std::ptr::null_mut()), OgStatus::Ok);
            assert_eq!(og_session_destroy(std::ptr::null_mut()), OgStatus::Ok);
        }
        let msg = og_last_error();
        assert!(!msg.is_null());
        unsafe { og_string_free(msg as *mut c_char) };
    }

    #[test]
    fn test_session_end_to_end() {
        let dim = 4;
        let mut identity = vec![0.0f32; dim * dim];
        for i in 0..dim {
            identity[i * dim + i] = 1.0;
        }

        let a1 = buffer_from_f32(&[1.0, 2.0, 3.0, 4.0]);
        let b1 = buffer_from_f32(&identity);
        let a2 = buffer_from_f32(&[10.0, 20.0, 30.0, 40.0]);
        let b2 = buffer_from_f32(&identity);
        let out = buffer_from_f32(&[0.0; 4]);

        let mut sess: *mut OgSession = std::ptr::null_mut();
        unsafe {
            assert_eq!(
                og_session_create(
                    dim,
                    OgDType::F32,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    &mut sess,
                ),
                OgStatus::Ok
            );

            let inputs: [*const OgBuffer; 4] = [a1, b1, a2, b2];
            let outputs: [*const OgBuffer; 1] = [out];
            assert_eq!(
                og_session_run(sess, inputs.as_ptr(), 4, outputs.as_ptr(), 1),
                OgStatus::Ok
            );

            let mut ws = 0usize;
            assert_eq!(og_session_workspace_size(sess, &mut ws), OgStatus::Ok);
            assert_eq!(ws, dim * 4);

            assert_eq!(read_f32(out, dim), vec![11.0, 22.0, 33.0, 44.0]);

            assert_eq!(og_session_destroy(sess), OgStatus::Ok);
            for buf in [a1, b1, a2, b2, out] {
                assert_eq!(og_buffer_destroy(buf), OgStatus::Ok);
            }
        }
    }

    #[test]
    fn test_run_with_undersized_buffer() {
        let dim = 4;
        let small = buffer_from_f32(&[0.0; 2]);
        let mat = buffer_from_f32(&vec![0.0; dim * dim]);
        let vec4 = buffer_from_f32(&[0.0; 4]);
        let out = buffer_from_f32(&[0.0; 4]);

        let mut sess: *mut OgSession = std::ptr::null_mut();
        unsafe {
            assert_eq!(
                og_session_create(
                    dim,
                    OgDType::F32,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    &mut sess,
                ),
                OgStatus::Ok
            );

            let inputs: [*const OgBuffer; 4] = [small, mat, vec4, mat];
            let outputs: [*const OgBuffer; 1] = [out];
            assert_eq!(
                og_session_run(sess, inputs.as_ptr(), 4, outputs.as_ptr(), 1),
                OgStatus::ErrorInvalidArgument
            );

            let msg = og_last_error();
            assert!(!msg.is_null());
            og_string_free(msg as *mut c_char);

            assert_eq!(og_session_destroy(sess), OgStatus::Ok);
            for buf in [small, mat, vec4, out] {
                assert_eq!(og_buffer_destroy(buf), OgStatus::Ok);
            }
        }
    }

    #[test]
    fn test_borrowed_workspace_session() {
        let dim = 4;
        let mut ws_buf: *mut OgBuffer = std::ptr::null_mut();
        assert_eq!(og_buffer_alloc(dim * 4, &mut ws_buf), OgStatus::Ok);

        let mut identity = vec![0.0f32; dim * dim];
        for i in 0..dim {
            identity[i * dim + i] = 1.0;
        }
        let a1 = buffer_from_f32(&[1.0; 4]);
        let b1 = buffer_from_f32(&identity);
        let a2 = buffer_from_f32(&[2.0; 4]);
        let b2 = buffer_from_f32(&identity);
        let out = buffer_from_f32(&[0.0; 4]);

        let mut sess: *mut OgSession = std::ptr::null_mut();
        unsafe {
            assert_eq!(
                og_session_create(dim, OgDType::F32, std::ptr::null_mut(), ws_buf, &mut sess),
                OgStatus::Ok
            );
            let inputs: [*const OgBuffer; 4] = [a1, b1, a2, b2];
            let outputs: [*const OgBuffer; 1] = [out];
            assert_eq!(
                og_session_run(sess, inputs.as_ptr(), 4, outputs.as_ptr(), 1),
                OgStatus::Ok
            );
            assert_eq!(read_f32(out, dim), vec![3.0; 4]);

            assert_eq!(og_session_destroy(sess), OgStatus::Ok);
            for buf in [a1, b1, a2, b2, out, ws_buf] {
                assert_eq!(og_buffer_destroy(buf), OgStatus::Ok);
            }
        }
    }
}
