//! Conversion between native label buffers and host-visible values
//!
//! The kernel hands out labels as byte buffers that may carry a trailing NUL
//! (xattrs, `SO_PEERSEC`) or newline (some procfs attributes). Host values
//! are `serde_json::Value`s; a label is a string, and an absent label is the
//! empty string.

use std::ffi::CString;

use seclabel_errors::LabelError;
use serde_json::Value;

use crate::context::SecurityContext;

/// Decode a native label buffer.
///
/// Returns `None` for an empty label. The buffer is only read; the caller
/// keeps ownership and releases it.
#[must_use]
pub fn decode(raw: &[u8]) -> Option<String> {
    let end = raw
        .iter()
        .rposition(|&b| b != 0 && b != b'\n')
        .map_or(0, |i| i + 1);
    let trimmed = &raw[..end];
    // Embedded NULs only happen with a truncated read; keep the first label.
    let trimmed = trimmed
        .iter()
        .position(|&b| b == 0)
        .map_or(trimmed, |nul| &trimmed[..nul]);

    if trimmed.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(trimmed).into_owned())
    }
}

/// Encode a context string for a set operation.
///
/// # Errors
///
/// Returns `InvalidArgument` if the text contains an interior NUL byte.
pub fn encode(text: &str) -> Result<CString, LabelError> {
    CString::new(text)
        .map_err(|_| LabelError::invalid_argument("Security context must not contain NUL bytes."))
}

/// Encode a host value, checking that it is text before converting it.
///
/// # Errors
///
/// Returns `InvalidArgument` if the value is not a string or contains NUL.
pub fn encode_value(value: &Value) -> Result<CString, LabelError> {
    let text = value
        .as_str()
        .ok_or_else(|| LabelError::invalid_argument("Param must be string."))?;
    encode(text)
}

/// Host representation of a lookup result; no label becomes `""`.
#[must_use]
pub fn to_value(context: Option<SecurityContext>) -> Value {
    Value::String(context.map(SecurityContext::into_string).unwrap_or_default())
}

/// Scoped owner of a native-sized label buffer.
///
/// Allocation goes through `try_reserve` so that running out of memory in a
/// lookup is reported as `AllocationFailure` instead of aborting the process.
/// The memory is released when the buffer is dropped, on every path.
#[derive(Debug)]
pub struct LabelBuffer {
    bytes: Vec<u8>,
    operation: &'static str,
}

impl LabelBuffer {
    /// Size libselinux starts with before asking the kernel for the real one
    pub const INITIAL_LEN: usize = 255;

    /// Allocate a zeroed buffer of `len` bytes
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if the memory cannot be reserved.
    pub fn new(operation: &'static str, len: usize) -> Result<Self, LabelError> {
        let mut buffer = Self {
            bytes: Vec::new(),
            operation,
        };
        buffer.resize(len)?;
        Ok(buffer)
    }

    /// Grow or shrink to exactly `len` zeroed bytes
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if the memory cannot be reserved.
    pub fn resize(&mut self, len: usize) -> Result<(), LabelError> {
        self.bytes.clear();
        self.bytes
            .try_reserve_exact(len)
            .map_err(|_| LabelError::AllocationFailure {
                operation: self.operation.to_string(),
                requested: len,
            })?;
        self.bytes.resize(len, 0);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Writable view handed to the native call
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Keep only the first `len` bytes the native call reported as written
    pub fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    /// Decode the buffer contents into a context
    #[must_use]
    pub fn into_context(self) -> Option<SecurityContext> {
        decode(&self.bytes).map(SecurityContext::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_strips_terminators() {
        assert_eq!(
            decode(b"system_u:object_r:etc_t:s0\0").as_deref(),
            Some("system_u:object_r:etc_t:s0")
        );
        assert_eq!(
            decode(b"unconfined_u:unconfined_r:unconfined_t:s0\n").as_deref(),
            Some("unconfined_u:unconfined_r:unconfined_t:s0")
        );
    }

    #[test]
    fn decode_empty_is_no_context() {
        assert_eq!(decode(b""), None);
        assert_eq!(decode(b"\0"), None);
        assert_eq!(decode(b"\n\0"), None);
    }

    #[test]
    fn decode_stops_at_embedded_nul() {
        assert_eq!(decode(b"a_t\0garbage\0").as_deref(), Some("a_t"));
    }

    #[test]
    fn encode_rejects_interior_nul() {
        let err = encode("user_u\0:role").unwrap_err();
        assert!(matches!(err, LabelError::InvalidArgument { .. }));
        assert_eq!(encode("user_u:role_r:t:s0").unwrap().as_bytes().len(), 18);
    }

    #[test]
    fn encode_value_requires_text() {
        for value in [json!(42), json!(null), json!(["a"]), json!({"ctx": "a"})] {
            let err = encode_value(&value).unwrap_err();
            assert_eq!(err, LabelError::invalid_argument("Param must be string."));
        }
        assert!(encode_value(&json!("system_u:system_r:init_t:s0")).is_ok());
    }

    #[test]
    fn absent_context_is_empty_string() {
        assert_eq!(to_value(None), json!(""));
        assert_eq!(
            to_value(Some(SecurityContext::new("a:b:c:s0"))),
            json!("a:b:c:s0")
        );
    }

    #[test]
    fn label_buffer_reports_allocation_failure() {
        let err = LabelBuffer::new("getxattr", usize::MAX).unwrap_err();
        assert!(matches!(
            err,
            LabelError::AllocationFailure { requested, .. } if requested == usize::MAX
        ));
    }

    #[test]
    fn label_buffer_truncates_to_written_length() {
        let mut buffer = LabelBuffer::new("getsockopt", LabelBuffer::INITIAL_LEN).unwrap();
        buffer.as_mut_slice()[..4].copy_from_slice(b"x_t\0");
        buffer.truncate(4);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.into_context(), Some(SecurityContext::new("x_t")));
    }
}
