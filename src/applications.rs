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

use crate::client::{Connection, UploadEncoding};
use crate::error::CommandError;
use crate::response::classify;
use crate::table::{parse_columns, project};
use clap::ValueEnum;
use reqwest::Method;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

const BASE_PATH: &str = "/ui/api/application";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Show the applications of a cluster
    #[default]
    List,
    /// Create an application from a compose file
    Add,
    /// Stop an application
    Stop,
    /// Start an application
    Start,
    /// Remove an application
    Rm,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Raw,
}

/// One resolved `applications` invocation.
#[derive(Debug, Clone)]
pub struct Request {
    pub action: Action,
    pub cluster: String,
    pub application: Option<String>,
    pub file: Option<PathBuf>,
    pub columns: String,
    pub output: OutputFormat,
    pub upload: UploadEncoding,
}

impl Request {
    fn application(&self) -> Option<&str> {
        self.application.as_deref().filter(|a| !a.is_empty())
    }
}

/// Cluster and application names travel as single path segments, so the
/// characters that would end or restructure a path are refused before sending.
fn path_segment<'a>(flag: &str, value: &'a str) -> Result<&'a str, CommandError> {
    if value == "." || value == ".." || value.contains(['/', '?', '#']) {
        return Err(CommandError::Usage(format!(
            "{flag} without '/', '?', '#' or a bare '.'/'..' (got `{value}`)"
        )));
    }
    Ok(value)
}

pub fn list_path(cluster: &str) -> String {
    format!("{BASE_PATH}/{cluster}/all")
}

pub fn application_path(cluster: &str, application: &str) -> String {
    format!("{BASE_PATH}/{cluster}/{application}")
}

pub fn action_path(cluster: &str, application: &str, suffix: &str) -> String {
    format!("{}/{suffix}", application_path(cluster, application))
}

pub fn run<W: Write>(
    conn: &mut Connection,
    request: &Request,
    out: &mut W,
) -> Result<(), CommandError> {
    path_segment("--cluster=<cluster>", &request.cluster)?;
    match request.action {
        Action::List => list(conn, request, out),
        Action::Stop => control(conn, request, "stop", out),
        Action::Start => control(conn, request, "start", out),
        Action::Rm => remove(conn, request, out),
        Action::Add => add(conn, request, out),
    }
}

fn list<W: Write>(
    conn: &mut Connection,
    request: &Request,
    out: &mut W,
) -> Result<(), CommandError> {
    let columns = parse_columns(&request.columns)?;
    let response = conn.send(Method::GET, &list_path(&request.cluster), None)?;
    let body = classify(response, conn.server())?;

    let json = serde_json::from_str::<serde_json::Value>(&body).ok();
    match (request.output, json) {
        (OutputFormat::Raw, _) | (_, None) => writeln!(out, "{body}")?,
        (OutputFormat::Json, Some(json)) => writeln!(out, "{json}")?,
        (OutputFormat::Table, Some(json)) => {
            let table = project(&columns, &json);
            if table.records().is_empty() {
                writeln!(out, "No applications found.")?;
            } else {
                write!(out, "{table}")?;
            }
        }
    }
    Ok(())
}

fn control<W: Write>(
    conn: &mut Connection,
    request: &Request,
    action: &str,
    out: &mut W,
) -> Result<(), CommandError> {
    let Some(application) = request.application() else {
        return Err(CommandError::Usage("--application=<application>".into()));
    };
    let application = path_segment("--application=<application>", application)?;

    let path = action_path(&request.cluster, application, action);
    let response = conn.send(Method::POST, &path, None)?;
    let body = classify(response, conn.server())?;
    info!(cluster = %request.cluster, application, action, "action accepted");
    report(
        out,
        request.output,
        &body,
        &format!(
            "{action} requested for application {application} in cluster {}",
            request.cluster
        ),
    )
}

fn remove<W: Write>(
    conn: &mut Connection,
    request: &Request,
    out: &mut W,
) -> Result<(), CommandError> {
    let Some(application) = request.application() else {
        return Err(CommandError::Usage("--application=<application>".into()));
    };
    let application = path_segment("--application=<application>", application)?;

    let path = application_path(&request.cluster, application);
    let response = conn.send(Method::DELETE, &path, None)?;
    let body = classify(response, conn.server())?;
    info!(cluster = %request.cluster, application, "application removed");
    report(
        out,
        request.output,
        &body,
        &format!(
            "removed application {application} from cluster {}",
            request.cluster
        ),
    )
}

fn add<W: Write>(
    conn: &mut Connection,
    request: &Request,
    out: &mut W,
) -> Result<(), CommandError> {
    let (Some(file), Some(application)) = (request.file.as_deref(), request.application()) else {
        return Err(CommandError::Usage(
            "--file=<path> --application=<application>".into(),
        ));
    };
    let application = path_segment("--application=<application>", application)?;

    let path = action_path(&request.cluster, application, "compose");
    let response = conn.upload(&path, file, request.upload)?;
    let body = classify(response, conn.server())?;
    info!(
        cluster = %request.cluster,
        application,
        file = %file.display(),
        "compose file uploaded"
    );
    report(
        out,
        request.output,
        &body,
        &format!(
            "uploaded {} as application {application} in cluster {}",
            file.display(),
            request.cluster
        ),
    )
}

fn report<W: Write>(
    out: &mut W,
    output: OutputFormat,
    body: &str,
    summary: &str,
) -> Result<(), CommandError> {
    if output != OutputFormat::Table && !body.trim().is_empty() {
        writeln!(out, "{body}")?;
    } else {
        writeln!(out, "{summary}")?;
    }
    Ok(())
}
