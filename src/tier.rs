use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reading level the site publishes an article at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Kids,
    Students,
    Scholars,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Kids, Tier::Students, Tier::Scholars];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Kids => "kids",
            Tier::Students => "students",
            Tier::Scholars => "scholars",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "kids" => Ok(Tier::Kids),
            "students" => Ok(Tier::Students),
            "scholars" => Ok(Tier::Scholars),
            other => anyhow::bail!("unsupported tier: {other:?} (expected kids, students or scholars)"),
        }
    }
}
