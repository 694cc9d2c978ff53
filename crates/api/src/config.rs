use serde::Deserialize;

/// Listener configuration (`SERVER_` prefix).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("SERVER_").from_env()
    }
}
