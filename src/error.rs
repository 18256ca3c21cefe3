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

//! Outcomes of a command that did not end in success.
//!
//! Remote status errors and usage mistakes are reported to the user and the
//! process still exits cleanly; only local or transport failures are fatal.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Can not connect to dm {server} due to error: {reason}")]
    Transport { server: String, reason: String },

    #[error(
        "Access denied ({status}): {detail}. Check --login and --password for dm at {server}."
    )]
    AccessDenied {
        status: u16,
        detail: String,
        server: String,
    },

    #[error("The entry was not found ({status}): {detail}. Server: {server}.")]
    NotFound {
        status: u16,
        detail: String,
        server: String,
    },

    #[error(
        "Client error ({status}): {detail}. Server: {server}. See `dmctl applications --help`."
    )]
    Client {
        status: u16,
        detail: String,
        server: String,
    },

    #[error("Server error ({status}): {detail}. Check the dm logs on {server}.")]
    Server {
        status: u16,
        detail: String,
        server: String,
    },

    #[error("specify {0}")]
    Usage(String),

    #[error("Can not upload {path:?} to dm {server}: {source}")]
    ReadFile {
        server: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("writing output: {0}")]
    Output(#[from] std::io::Error),
}

impl CommandError {
    /// Whether the process should exit with a failure code.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::ReadFile { .. } | Self::Output(_)
        )
    }
}
