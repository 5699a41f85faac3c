//! JSON response envelopes for the control surface.

use serde::Serialize;

use crate::http::Response;

/// Non-2xx envelope: `{"error": code, "msg": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: u16,
    pub msg: String,
}

/// Generic acknowledgement: `{"success": code, "msg": "..."}`.
#[derive(Debug, Serialize)]
pub struct SuccessBody {
    pub success: u16,
    pub msg: String,
}

/// Upload result: `{"size": bytes_written}`.
#[derive(Debug, Serialize)]
pub struct SizeBody {
    pub size: u64,
}

/// File upload result: `{"fname": "...", "size": N}`.
#[derive(Debug, Serialize)]
pub struct FileOkBody {
    pub fname: String,
    pub size: u64,
}

/// File upload failure: `{"fname": "...", "error": code}`.
#[derive(Debug, Serialize)]
pub struct FileErrorBody {
    pub fname: String,
    pub error: i32,
}

fn to_json<T: Serialize>(body: &T) -> String {
    // Envelope structs serialize infallibly.
    serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string())
}

/// Builds an error response with the same code in the status line and
/// the envelope.
pub fn error_response(status: u16, msg: impl Into<String>) -> Response {
    Response::json(
        status,
        to_json(&ErrorBody {
            error: status,
            msg: msg.into(),
        }),
    )
}

pub fn size_response(size: u64) -> Response {
    Response::json(200, to_json(&SizeBody { size }))
}

pub fn file_ok_response(fname: &str, size: u64) -> Response {
    Response::json(
        200,
        to_json(&FileOkBody {
            fname: fname.to_string(),
            size,
        }),
    )
}

pub fn file_error_response(status: u16, fname: &str, error: i32) -> Response {
    Response::json(
        status,
        to_json(&FileErrorBody {
            fname: fname.to_string(),
            error,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_shape() {
        let json = to_json(&ErrorBody {
            error: 400,
            msg: "invalid url".into(),
        });
        assert_eq!(json, r#"{"error":400,"msg":"invalid url"}"#);
    }

    #[test]
    fn success_body_shape() {
        let json = to_json(&SuccessBody {
            success: 200,
            msg: "rebooting".into(),
        });
        assert_eq!(json, r#"{"success":200,"msg":"rebooting"}"#);
    }

    #[test]
    fn size_body_shape() {
        let json = to_json(&SizeBody { size: 10064 });
        assert_eq!(json, r#"{"size":10064}"#);
    }

    #[test]
    fn file_bodies_shape() {
        assert_eq!(
            to_json(&FileOkBody {
                fname: "a/b.txt".into(),
                size: 3
            }),
            r#"{"fname":"a/b.txt","size":3}"#
        );
        assert_eq!(
            to_json(&FileErrorBody {
                fname: "a/b.txt".into(),
                error: -20
            }),
            r#"{"fname":"a/b.txt","error":-20}"#
        );
    }
}
