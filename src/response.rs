// dmctl - CLI for the dm cluster management API
// Copyright (C) 2024 dmctl contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::client::ResponseData;
use crate::error::CommandError;
use tracing::debug;

/// Returns the body of a successful response, or the error category for its status.
pub fn classify(response: ResponseData, server: &str) -> Result<String, CommandError> {
    let status = response.status;
    if status < 300 {
        return Ok(response.body);
    }

    let detail = error_detail(&response.body, &response.reason);
    let server = server.to_string();
    debug!(status, %detail, "request rejected");

    Err(match status {
        401 => CommandError::AccessDenied {
            status,
            detail,
            server,
        },
        404 => CommandError::NotFound {
            status,
            detail,
            server,
        },
        500.. => CommandError::Server {
            status,
            detail,
            server,
        },
        _ => CommandError::Client {
            status,
            detail,
            server,
        },
    })
}

/// The `message` field of a JSON error body, else the reason phrase.
pub fn error_detail(body: &str, reason: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, reason: &str, body: &str) -> ResponseData {
        ResponseData {
            status,
            reason: reason.into(),
            body: body.into(),
        }
    }

    #[test]
    fn success_returns_body_unchanged() {
        let body = r#"[{"name":"app1","note":"héllo ✓"}]"#;
        let out = classify(response(200, "OK", body), "dm.local").unwrap();
        assert_eq!(out, body);

        let created = classify(response(201, "Created", ""), "dm.local").unwrap();
        assert_eq!(created, "");
    }

    #[test]
    fn unauthorized_is_access_denied() {
        let err = classify(
            response(401, "Unauthorized", r#"{"message":"Bad credentials"}"#),
            "dm.local",
        )
        .unwrap_err();

        assert!(matches!(err, CommandError::AccessDenied { .. }));
        assert!(!err.is_failure());
        let msg = err.to_string();
        assert!(msg.contains("401"));
        assert!(msg.contains("Bad credentials"));
        assert!(msg.contains("dm.local"));
        assert!(msg.contains("--login"));
    }

    #[test]
    fn not_found_falls_back_to_reason_phrase() {
        let err = classify(response(404, "Not Found", "<html>nope</html>"), "dm.local")
            .unwrap_err();

        assert!(matches!(err, CommandError::NotFound { .. }));
        let msg = err.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains("Not Found"));
        assert!(msg.contains("404"));
    }

    #[test]
    fn other_statuses_map_to_client_or_server_errors() {
        let err = classify(response(409, "Conflict", "{}"), "dm.local").unwrap_err();
        assert!(matches!(err, CommandError::Client { status: 409, .. }));
        assert!(err.to_string().contains("--help"));

        let err = classify(response(400, "Bad Request", ""), "dm.local").unwrap_err();
        assert!(matches!(err, CommandError::Client { status: 400, .. }));

        let err = classify(
            response(503, "Service Unavailable", r#"{"message":"down"}"#),
            "dm.local",
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::Server { status: 503, .. }));
        assert!(err.to_string().contains("logs"));
        assert!(!err.is_failure());
    }

    #[test]
    fn error_detail_never_fails() {
        assert_eq!(error_detail(r#"{"message":"boom"}"#, "Bad"), "boom");
        assert_eq!(error_detail(r#"{"message":42}"#, "Bad"), "Bad");
        assert_eq!(error_detail(r#"["message"]"#, "Bad"), "Bad");
        assert_eq!(error_detail("not json", "Bad"), "Bad");
        assert_eq!(error_detail("", ""), "");
    }
}
