use serde::{Deserialize, Serialize};

/// Default RPC port an Umbra console listens on
pub const DEFAULT_UMBRA_PORT: u16 = 17475;

/// Module configuration as supplied by the hosting control surface
///
/// `host` and `port` are only consulted when discovery is disabled or the
/// advertised RPC port is missing from an announcement. `username` and
/// `password` default to the console's built-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModuleConfig {
    pub host: String,
    pub port: u16,
    pub netid: String,
    pub devicename: String,
    pub username: String,
    pub password: String,
    pub disable_discovery: bool,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_UMBRA_PORT,
            netid: String::new(),
            devicename: "Companion".to_string(),
            username: "DMXCDefault".to_string(),
            password: "DMXC3".to_string(),
            disable_discovery: false,
        }
    }
}

impl ModuleConfig {
    /// Static endpoint used when discovery is disabled
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_console_builtin_account() {
        let config = ModuleConfig::default();
        assert_eq!(config.username, "DMXCDefault");
        assert_eq!(config.password, "DMXC3");
        assert_eq!(config.port, DEFAULT_UMBRA_PORT);
        assert!(!config.disable_discovery);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ModuleConfig =
            serde_json::from_str(r#"{"netid":"ABC","host":"10.0.0.7"}"#).unwrap();
        assert_eq!(config.netid, "ABC");
        assert_eq!(config.host, "10.0.0.7");
        assert_eq!(config.devicename, "Companion");
    }
}
