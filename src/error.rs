// Copyright 2020 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for the engine and its collaborators.

use thiserror::Error;

/// Errors that abort the whole run. These map to exit code 4.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to allocate event storage: {0}")]
    Allocation(String),
    #[error("failed to install signal handler: {0}")]
    SignalSetup(#[from] std::io::Error),
    #[error("could not drop privileges after a privileged call")]
    PrivilegeDrop,
    #[error("no usable ICMP socket for this run (check -4/-6 and target families)")]
    NoSocket,
}

/// Errors resolving or expanding a single target. These never abort the
/// run; they accumulate into `num_noaddress` (exit code 2 path).
#[derive(Debug, Error, Clone)]
pub enum TargetError {
    #[error("{0}: name or service not known")]
    Unresolvable(String),
    #[error("{0}: target name too long (max {1} bytes)")]
    NameTooLong(String, usize),
    #[error("-g parameter generates too many addresses (max {0})")]
    TooManyGenerated(usize),
    #[error("invalid CIDR or address range: {0}")]
    InvalidRange(String),
    #[error("address family mismatch for {0} (requested -4/-6 does not match)")]
    FamilyMismatch(String),
}

/// Errors reading or parsing a config/target file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse RON config: {0}")]
    Parse(#[from] ron::Error),
}
