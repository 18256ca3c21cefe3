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

use crate::config::Target;
use crate::error::CommandError;
use base64::{Engine as _, engine::general_purpose};
use reqwest::blocking::{Client, RequestBuilder, multipart};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Url};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ResponseData {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

/// How a compose file is put on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UploadEncoding {
    /// Raw bytes with `Content-Type: application/octet-stream`.
    #[default]
    Raw,
    /// A multipart form with a single `file` field.
    Multipart,
}

/// A single connection to one dm server, opened on first use and dropped on
/// any transport error.
#[derive(Debug)]
pub struct Connection {
    target: Target,
    timeout: Duration,
    http: Option<Client>,
}

impl Connection {
    pub fn new(target: Target, timeout: Duration) -> Self {
        Self {
            target,
            timeout,
            http: None,
        }
    }

    pub fn server(&self) -> &str {
        &self.target.server
    }

    pub fn is_open(&self) -> bool {
        self.http.is_some()
    }

    /// Opens the connection if it is not open yet.
    pub fn open(&mut self) -> Result<(), CommandError> {
        if self.is_open() {
            return Ok(());
        }

        let built = Client::builder()
            .user_agent(HeaderValue::from_static("dmctl/0.1"))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(self.timeout)
            .pool_max_idle_per_host(1)
            .build();
        match built {
            Ok(http) => {
                debug!(server = %self.target.server, port = self.target.port, "opened connection");
                self.http = Some(http);
                Ok(())
            }
            Err(err) => Err(self.fail(describe(&err))),
        }
    }

    pub fn close(&mut self) {
        if self.is_open() {
            self.http = None;
            debug!(server = %self.target.server, "closed connection");
        }
    }

    /// Sends one JSON request and returns the raw response, whatever its status.
    pub fn send(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ResponseData, CommandError> {
        let http = self.client()?;
        let url = self.url(path)?;
        debug!(%method, %url, "sending request");

        let mut request = http
            .request(method, url)
            .header(AUTHORIZATION, self.authorization())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        self.dispatch(request)
    }

    /// Posts the contents of `file` to `path`.
    ///
    /// The headers are built here rather than in [`Connection::send`] because the
    /// content type depends on `encoding`.
    pub fn upload(
        &mut self,
        path: &str,
        file: &Path,
        encoding: UploadEncoding,
    ) -> Result<ResponseData, CommandError> {
        let http = self.client()?;
        let url = self.url(path)?;
        let contents = match fs::read(file) {
            Ok(contents) => contents,
            Err(source) => {
                self.close();
                return Err(CommandError::ReadFile {
                    server: self.target.server.clone(),
                    path: file.to_path_buf(),
                    source,
                });
            }
        };
        debug!(%url, file = %file.display(), bytes = contents.len(), ?encoding, "uploading file");

        let request = http.post(url).header(AUTHORIZATION, self.authorization());
        let request = match encoding {
            UploadEncoding::Raw => request
                .header(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                )
                .body(contents),
            UploadEncoding::Multipart => {
                let name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "compose.yaml".to_string());
                let part = multipart::Part::bytes(contents).file_name(name);
                request.multipart(multipart::Form::new().part("file", part))
            }
        };

        self.dispatch(request)
    }

    fn client(&mut self) -> Result<Client, CommandError> {
        self.open()?;
        match &self.http {
            Some(http) => Ok(http.clone()),
            None => Err(self.fail("connection is not open".to_string())),
        }
    }

    /// Appends `path` segment by segment so nothing in it is read as URL syntax.
    fn url(&mut self, path: &str) -> Result<Url, CommandError> {
        let base = format!("http://{}:{}/", self.target.server, self.target.port);
        let mut url = match Url::parse(&base) {
            Ok(url) => url,
            Err(err) => return Err(self.fail(format!("invalid address {base}: {err}"))),
        };
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .clear()
                .extend(path.trim_start_matches('/').split('/'));
        } else {
            return Err(self.fail(format!("invalid address {base}: cannot carry a path")));
        }
        Ok(url)
    }

    fn authorization(&self) -> String {
        format!(
            "Basic {}",
            basic_credentials(&self.target.login, &self.target.password)
        )
    }

    fn dispatch(&mut self, request: RequestBuilder) -> Result<ResponseData, CommandError> {
        let response = match request.send() {
            Ok(response) => response,
            Err(err) => return Err(self.fail(describe(&err))),
        };

        let status = response.status();
        let bytes = match response.bytes() {
            Ok(bytes) => bytes,
            Err(err) => return Err(self.fail(describe(&err))),
        };
        debug!(status = status.as_u16(), bytes = bytes.len(), "received response");

        Ok(ResponseData {
            status: status.as_u16(),
            reason: status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.as_u16().to_string()),
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    fn fail(&mut self, reason: String) -> CommandError {
        self.close();
        warn!(server = %self.target.server, %reason, "request failed, connection discarded");
        CommandError::Transport {
            server: self.target.server.clone(),
            reason,
        }
    }
}

/// `base64("<login>:<password>")`, the payload of a Basic authorization header.
pub fn basic_credentials(login: &str, password: &str) -> String {
    general_purpose::STANDARD.encode(format!("{login}:{password}"))
}

fn describe(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::io::Write;

    fn target_for(server: &MockServer) -> Target {
        Target {
            server: server.host(),
            port: server.port(),
            login: "user".into(),
            password: "pass".into(),
        }
    }

    #[test]
    fn encodes_login_and_password() {
        assert_eq!(basic_credentials("user", "pass"), "dXNlcjpwYXNz");
        assert_eq!(basic_credentials("admin", ""), "YWRtaW46");
    }

    #[test]
    fn sends_basic_auth_and_json_content_type() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/ui/api/application/dev/all")
                .header("Authorization", "Basic dXNlcjpwYXNz")
                .header("Content-Type", "application/json");
            then.status(200).body(r#"[{"name":"app1"}]"#);
        });

        let mut conn = Connection::new(target_for(&server), DEFAULT_TIMEOUT);
        let response = conn
            .send(Method::GET, "/ui/api/application/dev/all", None)
            .unwrap();

        mock.assert();
        assert_eq!(response.status, 200);
        assert_eq!(response.reason, "OK");
        assert_eq!(response.body, r#"[{"name":"app1"}]"#);
    }

    #[test]
    fn posts_json_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/ui/api/application/dev/app1/stop")
                .json_body(json!({"force": true}));
            then.status(200);
        });

        let mut conn = Connection::new(target_for(&server), DEFAULT_TIMEOUT);
        conn.send(
            Method::POST,
            "/ui/api/application/dev/app1/stop",
            Some(&json!({"force": true})),
        )
        .unwrap();

        mock.assert();
    }

    #[test]
    fn returns_error_statuses_unclassified() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(DELETE).path("/ui/api/application/dev/ghost");
            then.status(404).body(r#"{"message":"no such app"}"#);
        });

        let mut conn = Connection::new(target_for(&server), DEFAULT_TIMEOUT);
        let response = conn
            .send(Method::DELETE, "/ui/api/application/dev/ghost", None)
            .unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(response.reason, "Not Found");
        assert!(conn.is_open());
    }

    #[test]
    fn opens_lazily_and_reuses_connection() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/ui/api/application/dev/all");
            then.status(200).body("[]");
        });

        let mut conn = Connection::new(target_for(&server), DEFAULT_TIMEOUT);
        assert!(!conn.is_open());
        conn.open().unwrap();
        conn.open().unwrap();
        assert!(conn.is_open());

        conn.send(Method::GET, "/ui/api/application/dev/all", None)
            .unwrap();
        conn.send(Method::GET, "/ui/api/application/dev/all", None)
            .unwrap();
        assert!(conn.is_open());
        mock.assert_hits(2);
    }

    #[test]
    fn discards_connection_on_transport_error() {
        let target = Target {
            server: "127.0.0.1".into(),
            port: 1,
            login: "user".into(),
            password: "pass".into(),
        };
        let mut conn = Connection::new(target, Duration::from_secs(2));
        conn.open().unwrap();

        let err = conn
            .send(Method::GET, "/ui/api/application/dev/all", None)
            .unwrap_err();

        assert!(err.is_failure());
        assert!(err.to_string().contains("127.0.0.1"));
        assert!(!conn.is_open());
    }

    #[test]
    fn upload_to_unreachable_server_discards_connection() {
        let target = Target {
            server: "127.0.0.1".into(),
            port: 1,
            login: "user".into(),
            password: "pass".into(),
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "image: redis").unwrap();

        let mut conn = Connection::new(target, Duration::from_secs(2));
        conn.open().unwrap();
        let err = conn
            .upload(
                "/ui/api/application/dev/app1/compose",
                file.path(),
                UploadEncoding::Raw,
            )
            .unwrap_err();

        assert!(matches!(err, CommandError::Transport { .. }));
        assert!(err.is_failure());
        assert!(err.to_string().contains("Can not connect to dm 127.0.0.1"));
        assert!(!conn.is_open());
    }

    #[test]
    fn url_escapes_within_segments() {
        let target = Target {
            server: "dm.local".into(),
            port: 8761,
            login: "user".into(),
            password: "pass".into(),
        };
        let mut conn = Connection::new(target, DEFAULT_TIMEOUT);

        let url = conn.url("/ui/api/application/dev/50% off/stop").unwrap();
        assert_eq!(
            url.as_str(),
            "http://dm.local:8761/ui/api/application/dev/50%25%20off/stop"
        );
        assert!(!conn.is_open());
    }

    #[test]
    fn non_standard_status_uses_numeric_reason() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/ui/api/application/dev/all");
            then.status(599).body("upstream gone");
        });

        let mut conn = Connection::new(target_for(&server), DEFAULT_TIMEOUT);
        let response = conn
            .send(Method::GET, "/ui/api/application/dev/all", None)
            .unwrap();

        assert_eq!(response.status, 599);
        assert_eq!(response.reason, "599");
    }

    #[test]
    fn uploads_raw_file_as_octet_stream() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/ui/api/application/dev/app1/compose")
                .header("Authorization", "Basic dXNlcjpwYXNz")
                .header("Content-Type", "application/octet-stream")
                .body("services:\n  web:\n    image: nginx\n");
            then.status(200);
        });

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "services:\n  web:\n    image: nginx\n").unwrap();

        let mut conn = Connection::new(target_for(&server), DEFAULT_TIMEOUT);
        let response = conn
            .upload(
                "/ui/api/application/dev/app1/compose",
                file.path(),
                UploadEncoding::Raw,
            )
            .unwrap();

        mock.assert();
        assert_eq!(response.status, 200);
    }

    #[test]
    fn uploads_multipart_file_field() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/ui/api/application/dev/app1/compose")
                .header("Authorization", "Basic dXNlcjpwYXNz")
                .body_contains("name=\"file\"")
                .body_contains("image: redis");
            then.status(200);
        });

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "image: redis").unwrap();

        let mut conn = Connection::new(target_for(&server), DEFAULT_TIMEOUT);
        conn.upload(
            "/ui/api/application/dev/app1/compose",
            file.path(),
            UploadEncoding::Multipart,
        )
        .unwrap();

        mock.assert();
    }

    #[test]
    fn missing_upload_file_discards_connection() {
        let server = MockServer::start();
        let mut conn = Connection::new(target_for(&server), DEFAULT_TIMEOUT);
        let dir = tempfile::tempdir().unwrap();

        let err = conn
            .upload(
                "/ui/api/application/dev/app1/compose",
                &dir.path().join("missing.yaml"),
                UploadEncoding::Raw,
            )
            .unwrap_err();

        assert!(matches!(err, CommandError::ReadFile { .. }));
        assert!(err.to_string().contains(&server.host()));
        assert!(!conn.is_open());
    }
}
