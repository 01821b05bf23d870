use serde::{Deserialize, Serialize};
use std::fmt;

/// Liveness status of a store as tracked by the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Online,
    Offline,
    Unknown,
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreStatus::Online => "online",
            StoreStatus::Offline => "offline",
            StoreStatus::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl StoreStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "online" => StoreStatus::Online,
            "offline" => StoreStatus::Offline,
            _ => StoreStatus::Unknown,
        }
    }
}
