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

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const DEFAULT_SERVER: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8761;
pub const DEFAULT_COLUMNS: &str = "name,cluster,initFile,containers";

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    User,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate a writable config directory for the current user")]
    MissingConfigDir,
    #[error("login and password are required; pass --login/--password or run `dmctl configure`")]
    MissingCredentials,
    #[error("cluster is required; pass --cluster or run `dmctl configure --cluster <name>`")]
    MissingCluster,
}

/// Connection settings after merging config files, flags and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub server: String,
    pub port: u16,
    pub login: String,
    pub password: String,
}

/// Everything the applications command needs, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub target: Target,
    pub cluster: String,
    pub columns: String,
}

pub fn config_path(scope: Scope, cwd: &Path) -> Result<PathBuf> {
    match scope {
        Scope::Local => Ok(cwd.join(".dmctl.yaml")),
        Scope::User => {
            if let Ok(custom) = env::var("DMCTL_CONFIG_DIR") {
                return Ok(PathBuf::from(custom).join("config.yaml"));
            }
            let base = config_dir().ok_or(ConfigError::MissingConfigDir)?;
            Ok(base.join("dmctl").join("config.yaml"))
        }
    }
}

pub fn load(cwd: &Path) -> Result<Config> {
    let user = read_if_exists(&config_path(Scope::User, cwd)?)?.unwrap_or_default();
    let local = read_if_exists(&config_path(Scope::Local, cwd)?)?.unwrap_or_default();
    Ok(merge(user, local))
}

pub fn load_scope(scope: Scope, cwd: &Path) -> Result<Config> {
    Ok(read_if_exists(&config_path(scope, cwd)?)?.unwrap_or_default())
}

pub fn save(scope: Scope, config: &Config, cwd: &Path) -> Result<PathBuf> {
    let path = config_path(scope, cwd)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let serialized = serde_yaml::to_string(config).context("serializing config")?;
    fs::write(&path, serialized).with_context(|| format!("writing {:?}", path))?;
    Ok(path)
}

/// Resolves the full option set for an applications invocation.
pub fn resolve(cwd: &Path, overrides: Config) -> Result<Options> {
    let merged = merge(load(cwd)?, overrides);
    let target = target_from(&merged)?;
    let cluster = merged
        .cluster
        .filter(|c| !c.trim().is_empty())
        .ok_or(ConfigError::MissingCluster)?;
    let columns = merged
        .columns
        .unwrap_or_else(|| DEFAULT_COLUMNS.to_string());

    Ok(Options {
        target,
        cluster,
        columns,
    })
}

fn target_from(config: &Config) -> Result<Target> {
    let login = config
        .login
        .clone()
        .ok_or(ConfigError::MissingCredentials)?;
    let password = config
        .password
        .clone()
        .ok_or(ConfigError::MissingCredentials)?;

    Ok(Target {
        server: config
            .server
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVER.to_string()),
        port: config.port.unwrap_or(DEFAULT_PORT),
        login,
        password,
    })
}

fn read_if_exists(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let config = serde_yaml::from_str(&contents).with_context(|| format!("parsing {:?}", path))?;
    Ok(Some(config))
}

/// Field-wise merge; values in `top` win over `base`.
pub fn merge(base: Config, top: Config) -> Config {
    Config {
        server: top.server.or(base.server),
        port: top.port.or(base.port),
        login: top.login.or(base.login),
        password: top.password.or(base.password),
        cluster: top.cluster.or(base.cluster),
        columns: top.columns.or(base.columns),
    }
}
