use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderConfig {
    pub provider: ProviderSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderSection {
    pub network_id: u64,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub account: Option<String>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self { network_id: 1, debug: false, account: None }
    }
}

#[derive(Debug, Deserialize)]
struct ProviderConfigRaw {
    #[serde(default)]
    provider: ProviderSection,
}

impl<'de> Deserialize<'de> for ProviderConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = ProviderConfigRaw::deserialize(deserializer)?;
        let mut provider = raw.provider;
        provider.account =
            provider.account.map(|value| value.trim().to_string()).filter(|value| !value.is_empty());
        provider.validate().map_err(D::Error::custom)?;
        Ok(Self { provider })
    }
}

impl ProviderConfig {
    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}

impl ProviderSection {
    /// Checks a section built from flags the same way a loaded file is checked.
    pub fn validate(&self) -> Result<(), String> {
        if self.network_id == 0 {
            return Err("network_id must be greater than zero".to_string());
        }
        if let Some(account) = &self.account {
            if !is_hex_address(account) {
                return Err("account must be a 0x-prefixed hexadecimal address".to_string());
            }
        }
        Ok(())
    }
}

fn is_hex_address(value: &str) -> bool {
    let Some(digits) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) else {
        return false;
    };
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit())
}
