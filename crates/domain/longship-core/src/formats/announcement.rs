use serde::{Deserialize, Serialize};

/// Body of `GET <server>/announcement`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Announcement {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub hash: String,
}

impl Announcement {
    pub fn parse(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(super::trim_json_prefix(data))
    }
}
