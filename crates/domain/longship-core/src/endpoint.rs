use serde::{Deserialize, Serialize};

/// The sync server: serves the manifest, link targets and, as a fallback, file bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerEndpoint {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl Default for ServerEndpoint {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// How a mirror addresses files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MirrorStyle {
    /// Object-storage layout: `<prefix>/<relative_path>`.
    #[default]
    Object,
    /// Same query interface as the sync server: `<prefix>?file=<relative_path>`.
    Query,
}

/// A download mirror for file bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Mirror {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub prefix: String,
    #[serde(rename = "type")]
    pub style: MirrorStyle,
}

impl Default for Mirror {
    fn default() -> Self {
        Self {
            protocol: "https".to_string(),
            host: String::new(),
            port: 443,
            prefix: String::new(),
            style: MirrorStyle::Object,
        }
    }
}
