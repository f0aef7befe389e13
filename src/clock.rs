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

//! Monotonic nanosecond time source.
//!
//! The engine reads `now()` once per loop iteration and reuses the cached
//! value for every downstream bookkeeping decision, so a single iteration
//! sees a consistent notion of "now" even if sending/receiving takes a
//! little while.

use std::time::Instant;

/// Nanoseconds since an arbitrary but fixed epoch (process start).
pub type TimeNs = i64;

#[derive(Debug)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Current time in nanoseconds since this clock was created.
    pub fn now_ns(&self) -> TimeNs {
        self.epoch.elapsed().as_nanos() as TimeNs
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn now_ns_is_monotonic_and_advances() {
        let clock = Clock::new();
        let a = clock.now_ns();
        sleep(Duration::from_millis(2));
        let b = clock.now_ns();
        assert!(b > a);
    }

    #[test]
    fn now_ns_starts_near_zero() {
        let clock = Clock::new();
        assert!(clock.now_ns() < Duration::from_secs(1).as_nanos() as TimeNs);
    }
}
