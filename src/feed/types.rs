// src/feed/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Opaque upstream payload. Shape is only interpreted during merge; anything
/// that parses as JSON is accepted here.
pub type RawSnapshot = serde_json::Value;

/// One entity's open field set. Participation in merge/diff requires a
/// `"Symbol"` key; everything else is carried through untouched.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Identifier for one of the two upstream sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceId {
    #[serde(rename = "api1")]
    Api1,
    #[serde(rename = "api2")]
    Api2,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Api1 => "api1",
            SourceId::Api2 => "api2",
        }
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch one snapshot. Errors are absorbed by the caller into "absent for
    /// this cycle"; the next poll cycle is the retry.
    async fn fetch(&self) -> Result<RawSnapshot>;
    fn id(&self) -> SourceId;
    fn endpoint(&self) -> &str;
}
