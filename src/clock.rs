// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since UNIX epoch.
pub type Timestamp = u64;

/// Hands out strictly increasing timestamps for locally authored records.
///
/// Record ids are derived from author and creation time, two records of the same author must
/// therefore never share a timestamp.
#[derive(Debug, Default)]
pub(crate) struct Clock {
    last: Timestamp,
}

impl Clock {
    pub fn now(&mut self) -> Timestamp {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_micros() as Timestamp)
            .unwrap_or_default();
        self.last = wall.max(self.last + 1);
        self.last
    }
}
