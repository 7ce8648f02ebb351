// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

/// Default maximum length of invite chains of new groups.
pub const DEFAULT_MAX_DEPTH: u32 = 3;

/// Configuration for a manager instance.
///
/// Values here are defaults for new groups, they can be overridden per group with
/// [`GroupParams`](crate::group::GroupParams).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Maximum delegation depth of groups created without an explicit one.
    pub(crate) default_max_depth: u32,

    /// Whether groups are private unless requested otherwise.
    pub(crate) default_private: bool,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.default_max_depth = max_depth;
        self
    }

    pub fn with_private(mut self, is_private: bool) -> Self {
        self.default_private = is_private;
        self
    }

    pub fn default_max_depth(&self) -> u32 {
        self.default_max_depth
    }

    pub fn default_private(&self) -> bool {
        self.default_private
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_max_depth: DEFAULT_MAX_DEPTH,
            default_private: true,
        }
    }
}
