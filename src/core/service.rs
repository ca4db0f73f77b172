//! The closed set of deployable services.

use heck::ToShoutySnakeCase;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceName {
    Account,
    Terminal,
    MasterData,
    Cart,
    Report,
    Journal,
    Stock,
}

impl ServiceName {
    pub const ALL: [ServiceName; 7] = [
        ServiceName::Account,
        ServiceName::Terminal,
        ServiceName::MasterData,
        ServiceName::Cart,
        ServiceName::Report,
        ServiceName::Journal,
        ServiceName::Stock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::Account => "account",
            ServiceName::Terminal => "terminal",
            ServiceName::MasterData => "master-data",
            ServiceName::Cart => "cart",
            ServiceName::Report => "report",
            ServiceName::Journal => "journal",
            ServiceName::Stock => "stock",
        }
    }

    /// Registry image name, e.g. `pos-master-data`.
    pub fn image_name(&self) -> String {
        format!("pos-{}", self.as_str())
    }

    /// Environment variable carrying a pre-resolved digest, e.g. `MASTER_DATA_DIGEST`.
    pub fn env_key(&self) -> String {
        format!("{}_DIGEST", self.as_str().to_shouty_snake_case())
    }

    /// Inverse of [`image_name`](Self::image_name).
    pub fn from_image_name(image: &str) -> Option<Self> {
        let name = image.strip_prefix("pos-")?;
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|svc| svc.as_str() == s)
            .ok_or_else(|| {
                Error::validation_invalid_argument(
                    "service",
                    format!("Unknown service '{}'", s),
                    Some(s.to_string()),
                    Some(Self::ALL.iter().map(|svc| svc.as_str().to_string()).collect()),
                )
            })
    }
}
