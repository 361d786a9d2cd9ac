//! FFI bindings for Synheart Glucose
//!
//! This module provides C-compatible functions for calling the engine from
//! mobile host apps. All functions use C strings (null-terminated) and return
//! allocated memory that must be freed by the caller using `glucose_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::{TimeZone, Utc};

use crate::config::Settings;
use crate::error::ComputeError;
use crate::pipeline::{analyze_json, prompt_json, InsightProcessor};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Read an optional C string; NULL maps to `None`
unsafe fn optional_string(ptr: *const c_char, what: &str) -> Result<Option<String>, ComputeError> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(|s| Some(s.to_string()))
        .map_err(|_| ComputeError::ParseError(format!("{what} is not valid UTF-8")))
}

/// Read a required C string; NULL is a missing-input error
unsafe fn required_string(ptr: *const c_char, what: &str) -> Result<String, ComputeError> {
    optional_string(ptr, what)?.ok_or_else(|| ComputeError::MissingInput(what.to_string()))
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => {
            set_last_error("Output contained an interior NUL byte");
            ptr::null_mut()
        }
    }
}

/// Return the string result, or NULL with the last error set
fn string_result(result: Result<String, ComputeError>) -> *mut c_char {
    match result {
        Ok(s) => string_to_cstr(&s),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Return 0 on success, -1 with the last error set
fn status_result(result: Result<(), ComputeError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Analyze a snapshot document and return the insight report JSON.
///
/// # Safety
/// - `snapshot_json` must be a valid null-terminated C string.
/// - `settings_json` may be NULL (default settings) or a valid C string.
/// - Returns a newly allocated string that must be freed with `glucose_free_string`.
/// - Returns NULL on error; call `glucose_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn glucose_analyze_json(
    snapshot_json: *const c_char,
    settings_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let result = (|| -> Result<String, ComputeError> {
        let snapshot = required_string(snapshot_json, "snapshot")?;
        let settings = optional_string(settings_json, "settings")?;
        analyze_json(&snapshot, settings.as_deref())
    })();
    string_result(result)
}

/// Analyze a snapshot document and return the insight prompt text.
///
/// # Safety
/// - `snapshot_json` must be a valid null-terminated C string.
/// - `settings_json` and `personal_json` may be NULL.
/// - Returns a newly allocated string that must be freed with `glucose_free_string`.
/// - Returns NULL on error; call `glucose_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn glucose_prompt_json(
    snapshot_json: *const c_char,
    settings_json: *const c_char,
    personal_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let result = (|| -> Result<String, ComputeError> {
        let snapshot = required_string(snapshot_json, "snapshot")?;
        let settings = optional_string(settings_json, "settings")?;
        let personal = optional_string(personal_json, "personal context")?;
        prompt_json(&snapshot, settings.as_deref(), personal.as_deref())
    })();
    string_result(result)
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to an InsightProcessor
pub struct GlucoseProcessorHandle {
    processor: InsightProcessor,
}

/// Create a new InsightProcessor.
///
/// # Safety
/// - `settings_json` may be NULL (default settings) or a valid C string.
/// - Returns a pointer that must be freed with `glucose_processor_free`.
/// - Returns NULL on error; call `glucose_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn glucose_processor_new(
    settings_json: *const c_char,
) -> *mut GlucoseProcessorHandle {
    clear_last_error();

    let result = (|| -> Result<InsightProcessor, ComputeError> {
        let settings = match optional_string(settings_json, "settings")? {
            Some(json) => Settings::from_json(&json)?,
            None => Settings::default(),
        };
        InsightProcessor::with_settings(settings)
    })();

    match result {
        Ok(processor) => Box::into_raw(Box::new(GlucoseProcessorHandle { processor })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an InsightProcessor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `glucose_processor_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn glucose_processor_free(processor: *mut GlucoseProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Analyze a snapshot document with the processor's settings.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `glucose_processor_new`.
/// - `snapshot_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `glucose_free_string`.
/// - Returns NULL on error; call `glucose_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn glucose_processor_analyze(
    processor: *mut GlucoseProcessorHandle,
    snapshot_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &*processor;

    let result = required_string(snapshot_json, "snapshot")
        .and_then(|snapshot| handle.processor.analyze_json(&snapshot));
    string_result(result)
}

/// Evaluate high/low alerts over a JSON array of glucose records.
///
/// Returns a JSON array of fired alert requests (possibly empty). Fired kinds
/// enter cooldown in the processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `glucose_processor_new`.
/// - `samples_json` must be a valid null-terminated C string.
/// - `now_ms` is the evaluation time in epoch milliseconds.
/// - Returns a newly allocated string that must be freed with `glucose_free_string`.
/// - Returns NULL on error; call `glucose_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn glucose_processor_evaluate_alerts(
    processor: *mut GlucoseProcessorHandle,
    samples_json: *const c_char,
    now_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &mut *processor;

    let result = (|| -> Result<String, ComputeError> {
        let samples = required_string(samples_json, "glucose samples")?;
        let now = Utc
            .timestamp_millis_opt(now_ms)
            .single()
            .ok_or_else(|| ComputeError::ParseError(format!("invalid now_ms: {now_ms}")))?;
        handle.processor.evaluate_alerts_json(&samples, now)
    })();
    string_result(result)
}

/// Save processor cooldowns to JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `glucose_processor_new`.
/// - Returns a newly allocated string that must be freed with `glucose_free_string`.
/// - Returns NULL on error; call `glucose_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn glucose_processor_save_cooldowns(
    processor: *mut GlucoseProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &*processor;
    string_result(handle.processor.save_cooldowns())
}

/// Load processor cooldowns from JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `glucose_processor_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `glucose_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn glucose_processor_load_cooldowns(
    processor: *mut GlucoseProcessorHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }
    let handle = &mut *processor;

    let result = required_string(json, "cooldown state")
        .and_then(|json| handle.processor.load_cooldowns(&json));
    status_result(result)
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by engine functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by an engine function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn glucose_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next engine call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn glucose_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn glucose_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
