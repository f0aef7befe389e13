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

//! SIGINT/SIGQUIT wiring. SIGINT asks the main loop to wind down after
//! the current iteration; SIGQUIT asks for an immediate interval-stats
//! snapshot without stopping. Both are plain `AtomicBool` flags polled
//! once per loop iteration, matching the original's `sig_atomic_t`
//! globals.

use crate::error::EngineError;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Registers SIGINT -> `finish_requested` and SIGQUIT -> `status_snapshot`.
/// Both flags are shared with the `Engine`, which polls and clears them.
pub fn install(finish_requested: Arc<AtomicBool>, status_snapshot: Arc<AtomicBool>) -> Result<(), EngineError> {
    signal_hook::flag::register(signal_hook::consts::SIGINT, finish_requested)?;
    signal_hook::flag::register(signal_hook::consts::SIGQUIT, status_snapshot)?;
    Ok(())
}
