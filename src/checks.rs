/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::invocation::RequestOutcome;
use serde::{Deserialize, Serialize};

/// A named assertion evaluated against every request outcome.
///
/// A request that failed before a response arrived has no status and therefore fails every check.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Check {
    pub name: String,
    pub status: u16,
}
impl Check {
    pub fn status(code: u16) -> Self {
        Check {
            name: format!("status {}", code),
            status: code,
        }
    }

    pub fn passes(&self, outcome: &RequestOutcome) -> bool {
        outcome.status == Some(self.status)
    }
}

pub fn default_checks() -> Vec<Check> {
    vec![Check::status(200)]
}
