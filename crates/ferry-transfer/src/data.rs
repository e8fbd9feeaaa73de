//! Results handed back by transfer operations.

use std::time::Duration;

use serde_json::Value;

use crate::error::{Error, Result};

/// Completed upload sink: the parsed response body plus transfer timing.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub response:         Value,
    pub bytes:            u64,
    pub milliseconds:     u64,
    pub bytes_per_second: u64,
}

/// Completed end-to-end upload: what the sink reported and the content digest.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub url:              String,
    /// Lowercase hex SHA-256 of the bytes sent.
    pub digest:           String,
    pub response:         Value,
    pub bytes:            u64,
    pub milliseconds:     u64,
    pub bytes_per_second: u64,
}

impl Upload {
    /// Identifier the storage service assigned to the object.
    pub fn id(&self) -> Result<&str> {
        self.response
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol {
                url:    self.url.clone(),
                reason: "upload response has no string `id`".to_string(),
            })
    }
}

/// One timed read-back of a stored object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Retrieval {
    pub bytes:            u64,
    /// Time to first byte, measured from request start.
    pub ttfb:             Duration,
    /// Time to last byte, measured from request start.
    pub ttlb:             Duration,
    pub bytes_per_second: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upload(response: Value) -> Upload {
        Upload {
            url: "http://storage.test/v0/blob".to_string(),
            digest: String::new(),
            response,
            bytes: 0,
            milliseconds: 0,
            bytes_per_second: 0,
        }
    }

    #[test]
    fn test_upload_id() {
        assert_eq!(upload(json!({"id": "abc"})).id().unwrap(), "abc");
    }

    #[test]
    fn test_upload_id_missing_or_mistyped() {
        assert!(matches!(upload(json!({})).id(), Err(Error::Protocol { .. })));
        assert!(matches!(upload(json!({"id": 7})).id(), Err(Error::Protocol { .. })));
        assert!(matches!(upload(json!([1, 2])).id(), Err(Error::Protocol { .. })));
    }
}
