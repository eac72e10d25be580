//! C-callable surface for embedding the evaluation engine.
//!
//! Hosts exchange JSON over C strings: requests go in as UTF-8 JSON, every
//! response comes back as a JSON envelope
//! (`{"status":"success","result":...}` or
//! `{"status":"error","error_kind":"...","message":"..."}`). Returned
//! strings are owned by the caller and must be released with
//! [`flagcast_string_free`]; the engine handle with
//! [`flagcast_engine_free`]. After `flagcast_engine_free`, the handle must
//! not be passed to any other function.
//!
//! No panic crosses this boundary: null pointers, invalid UTF-8, and
//! malformed JSON all produce error envelopes.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::ptr;

use serde::Serialize;

use flagcast_core::types::EvaluationRequest;
use flagcast_core::Error;
use flagcast_evaluation::Engine;

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum Envelope<T: Serialize> {
    Success { result: T },
    Error { error_kind: String, message: String },
}

fn envelope_to_ptr<T: Serialize>(envelope: &Envelope<T>) -> *mut c_char {
    let json = match serde_json::to_string(envelope) {
        Ok(json) => json,
        // Response types serialize infallibly; fall back to a fixed envelope.
        Err(_) => r#"{"status":"error","error_kind":"internal","message":"serialization failed"}"#
            .to_string(),
    };
    // serde_json escapes control characters, so the only NUL a payload could
    // carry is the terminator CString adds.
    match CString::new(json) {
        Ok(s) => s.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn success<T: Serialize>(result: T) -> *mut c_char {
    envelope_to_ptr(&Envelope::Success { result })
}

fn failure(error: &Error) -> *mut c_char {
    envelope_to_ptr::<()>(&Envelope::Error {
        error_kind: error.kind().to_string(),
        message: error.to_string(),
    })
}

fn invalid_input(message: &str) -> *mut c_char {
    failure(&Error::InvalidPayload(message.to_string()))
}

/// # Safety
///
/// `ptr` must be null or a C string valid for the duration of the call.
unsafe fn read_str<'a>(ptr: *const c_char) -> Result<&'a str, *mut c_char> {
    if ptr.is_null() {
        return Err(invalid_input("null pointer"));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| invalid_input("string is not valid UTF-8"))
}

/// # Safety
///
/// `engine_ptr` must be null or a pointer previously returned by
/// [`flagcast_engine_new`] that has not been freed.
unsafe fn engine_ref<'a>(engine_ptr: *mut c_void) -> Option<&'a Engine> {
    if engine_ptr.is_null() {
        None
    } else {
        Some(&*(engine_ptr as *mut Engine))
    }
}

/// Create an engine serving the given namespaces.
///
/// `namespaces` is a null-terminated array of C strings. Returns an opaque
/// handle, or null when the input is null, not valid UTF-8, empty, or
/// contains duplicates.
///
/// # Safety
///
/// `namespaces` must be null or a null-terminated array of valid C strings.
#[no_mangle]
pub unsafe extern "C" fn flagcast_engine_new(namespaces: *const *const c_char) -> *mut c_void {
    if namespaces.is_null() {
        return ptr::null_mut();
    }

    let mut keys = Vec::new();
    let mut index = 0;
    while !(*namespaces.offset(index)).is_null() {
        let c_str = CStr::from_ptr(*namespaces.offset(index));
        match c_str.to_str() {
            Ok(key) => keys.push(key.to_string()),
            Err(_) => return ptr::null_mut(),
        }
        index += 1;
    }

    match Engine::new(keys) {
        Ok(engine) => Box::into_raw(Box::new(engine)) as *mut c_void,
        Err(_) => ptr::null_mut(),
    }
}

/// Parse, validate, and install a whole-namespace configuration payload.
/// A rejected payload leaves the namespace's previous snapshot serving.
///
/// # Safety
///
/// `engine_ptr` must be a live handle from [`flagcast_engine_new`];
/// `namespace` and `payload` must be null or valid C strings.
#[no_mangle]
pub unsafe extern "C" fn flagcast_update_namespace(
    engine_ptr: *mut c_void,
    namespace: *const c_char,
    payload: *const c_char,
) -> *mut c_char {
    let Some(engine) = engine_ref(engine_ptr) else {
        return invalid_input("null engine handle");
    };
    let namespace = match read_str(namespace) {
        Ok(s) => s,
        Err(envelope) => return envelope,
    };
    let payload = match read_str(payload) {
        Ok(s) => s,
        Err(envelope) => return envelope,
    };

    match engine.update_namespace(namespace, payload) {
        Ok(()) => success(()),
        Err(e) => failure(&e),
    }
}

/// Evaluate a variant flag. `request` is a JSON evaluation request
/// (`namespace_key`, `flag_key`, `entity_id`, optional `bucketing_key`,
/// `context` object).
///
/// # Safety
///
/// `engine_ptr` must be a live handle; `request` null or a valid C string.
#[no_mangle]
pub unsafe extern "C" fn flagcast_evaluate_variant(
    engine_ptr: *mut c_void,
    request: *const c_char,
) -> *mut c_char {
    let Some(engine) = engine_ref(engine_ptr) else {
        return invalid_input("null engine handle");
    };
    let request = match parse_request(request) {
        Ok(r) => r,
        Err(envelope) => return envelope,
    };

    match engine.evaluate_variant(&request) {
        Ok(response) => success(response),
        Err(e) => failure(&e),
    }
}

/// Evaluate a boolean flag. Same request shape as
/// [`flagcast_evaluate_variant`].
///
/// # Safety
///
/// `engine_ptr` must be a live handle; `request` null or a valid C string.
#[no_mangle]
pub unsafe extern "C" fn flagcast_evaluate_boolean(
    engine_ptr: *mut c_void,
    request: *const c_char,
) -> *mut c_char {
    let Some(engine) = engine_ref(engine_ptr) else {
        return invalid_input("null engine handle");
    };
    let request = match parse_request(request) {
        Ok(r) => r,
        Err(envelope) => return envelope,
    };

    match engine.evaluate_boolean(&request) {
        Ok(response) => success(response),
        Err(e) => failure(&e),
    }
}

/// Evaluate a JSON array of requests in one call. Each entry of the result
/// array is tagged `variant`, `boolean`, or `error`; a failing request
/// never aborts its siblings.
///
/// # Safety
///
/// `engine_ptr` must be a live handle; `requests` null or a valid C string.
#[no_mangle]
pub unsafe extern "C" fn flagcast_evaluate_batch(
    engine_ptr: *mut c_void,
    requests: *const c_char,
) -> *mut c_char {
    let Some(engine) = engine_ref(engine_ptr) else {
        return invalid_input("null engine handle");
    };
    let raw = match read_str(requests) {
        Ok(s) => s,
        Err(envelope) => return envelope,
    };

    let parsed: Vec<EvaluationRequest> = match serde_json::from_str(raw) {
        Ok(requests) => requests,
        Err(e) => return invalid_input(&format!("batch request: {e}")),
    };

    success(engine.evaluate_batch(&parsed))
}

/// Release a string returned by any function in this library. Null is a
/// no-op.
///
/// # Safety
///
/// `s` must be null or a pointer returned by this library that has not
/// already been freed.
#[no_mangle]
pub unsafe extern "C" fn flagcast_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Destroy the engine and release every snapshot it owns. The caller must
/// guarantee no concurrent or subsequent call uses the handle. Null is a
/// no-op.
///
/// # Safety
///
/// `engine_ptr` must be null or a handle from [`flagcast_engine_new`] that
/// has not already been freed, with no other thread using it.
#[no_mangle]
pub unsafe extern "C" fn flagcast_engine_free(engine_ptr: *mut c_void) {
    if !engine_ptr.is_null() {
        drop(Box::from_raw(engine_ptr as *mut Engine));
    }
}

/// # Safety
///
/// `request` must be null or a valid C string.
unsafe fn parse_request(request: *const c_char) -> Result<EvaluationRequest, *mut c_char> {
    let raw = read_str(request)?;
    serde_json::from_str(raw).map_err(|e| invalid_input(&format!("evaluation request: {e}")))
}
