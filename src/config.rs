//! # Key-value configuration management.

use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::{bail, ensure, Context as _, Result};
use strum::{EnumProperty, IntoEnumIterator};
use strum_macros::{AsRefStr, Display, EnumIter, EnumProperty, EnumString};

use crate::constants::PgpScheme;
use crate::context::Context;

/// The available configuration keys.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
    EnumProperty,
)]
#[strum(serialize_all = "snake_case")]
pub enum Config {
    /// Sender-level default for signing mail to recipients without a contact preference.
    #[strum(props(default = "0"))]
    SignMessages,

    /// PGP scheme for external recipients with a key and no contact preference,
    /// `inline` or `mime`.
    #[strum(props(default = "inline"))]
    DefaultPgpScheme,

    /// If set, a recipient whose public key lookup failed is still sent the message in
    /// cleartext instead of being left out.
    #[strum(props(default = "0"))]
    CleartextOnKeyLookupFailure,

    /// Upper bound of blocking crypto jobs running at the same time.
    ///
    /// Only accepted by [`crate::ContextBuilder`]; the pool is sized once when the
    /// context is built.
    #[strum(props(default = "4"))]
    MaxConcurrentCryptoJobs,

    /// Seconds the transport holds a message back before delivery, if the caller does
    /// not pass its own delay.
    #[strum(props(default = "0"))]
    UndoSendDelay,

    /// `Content-Language` of the HTML part of MIME renderings.
    #[strum(props(default = "en-US"))]
    MimeContentLanguage,
}

impl Config {
    /// Whether the config option only accepts "0" and "1".
    fn is_bool(&self) -> bool {
        matches!(self, Self::SignMessages | Self::CleartextOnKeyLookupFailure)
    }

    /// Whether the key can only be set before the context is built.
    fn is_build_time(&self) -> bool {
        matches!(self, Self::MaxConcurrentCryptoJobs)
    }

    fn is_int(&self) -> bool {
        matches!(self, Self::MaxConcurrentCryptoJobs | Self::UndoSendDelay)
    }

    fn validate(&self, value: &str) -> Result<()> {
        if self.is_bool() {
            ensure!(
                matches!(value, "0" | "1"),
                "{} must be set to \"0\" or \"1\"",
                self
            );
        } else if self.is_int() {
            let value: i64 = value
                .parse()
                .with_context(|| format!("{} must be an integer", self))?;
            ensure!(value >= 0, "{} must not be negative", self);
        } else if *self == Self::DefaultPgpScheme {
            PgpScheme::from_str(value)
                .with_context(|| format!("{}: unknown PGP scheme {:?}", self, value))?;
        }
        Ok(())
    }
}

/// Returns a space-separated list of all config keys.
pub fn get_config_keys_string() -> String {
    let keys = Config::iter().fold(String::new(), |mut acc, key| {
        acc += key.as_ref();
        acc += " ";
        acc
    });

    format!(" {keys} ")
}

impl Context {
    /// Returns the value of the config key, or its default if it is not set.
    pub async fn get_config(&self, key: Config) -> Result<Option<String>> {
        let value = self.inner.config.read().await.get(&key).cloned();
        Ok(value.or_else(|| key.get_str("default").map(|s| s.to_string())))
    }

    /// Returns config value parsed into the given type.
    pub async fn get_config_parsed<T: FromStr>(&self, key: Config) -> Result<Option<T>> {
        self.get_config(key)
            .await
            .map(|s: Option<String>| s.and_then(|s| s.parse().ok()))
    }

    /// Returns 32-bit signed integer configuration value for the given key.
    pub async fn get_config_int(&self, key: Config) -> Result<i32> {
        Ok(self.get_config_parsed(key).await?.unwrap_or_default())
    }

    /// Returns 64-bit signed integer configuration value for the given key.
    pub async fn get_config_i64(&self, key: Config) -> Result<i64> {
        Ok(self.get_config_parsed(key).await?.unwrap_or_default())
    }

    /// Returns boolean configuration value for the given key.
    pub async fn get_config_bool(&self, key: Config) -> Result<bool> {
        Ok(self
            .get_config_parsed::<i32>(key)
            .await?
            .map(|x| x != 0)
            .unwrap_or_default())
    }

    /// Sets configuration for the given key.
    ///
    /// `None` resets the key to its default.
    pub async fn set_config(&self, key: Config, value: Option<&str>) -> Result<()> {
        ensure!(!key.is_build_time(), "{} can only be set when building the context", key);
        let mut config = self.inner.config.write().await;
        match value {
            Some(value) => {
                key.validate(value)?;
                config.insert(key, value.to_string());
            }
            None => {
                config.remove(&key);
            }
        }
        Ok(())
    }

    /// Sets boolean configuration for the given key.
    pub async fn set_config_bool(&self, key: Config, value: bool) -> Result<()> {
        self.set_config(key, Some(if value { "1" } else { "0" }))
            .await
    }

    /// Loads all keys of a TOML document into the configuration.
    ///
    /// Fails without changing anything if a key is unknown, a value is invalid or
    /// a key can only be set when building the context.
    pub async fn load_config_toml(&self, toml: &str) -> Result<()> {
        let parsed = parse_config_toml(toml)?;
        if let Some(key) = parsed.keys().find(|key| key.is_build_time()) {
            bail!("{} can only be set when building the context", key);
        }
        self.inner.config.write().await.extend(parsed);
        Ok(())
    }
}

/// Parses a TOML document of config keys.
///
/// Booleans become "0"/"1", integers and strings are taken as is.
pub(crate) fn parse_config_toml(toml: &str) -> Result<BTreeMap<Config, String>> {
    let table: toml::Table = toml.parse().context("config is not valid TOML")?;
    let mut config = BTreeMap::new();
    for (name, value) in table {
        let key = Config::from_str(&name).with_context(|| format!("unknown config key {name:?}"))?;
        let value = match value {
            toml::Value::String(s) => s,
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Boolean(b) => (if b { "1" } else { "0" }).to_string(),
            other => bail!("config key {name:?} has unsupported type {}", other.type_str()),
        };
        key.validate(&value)?;
        config.insert(key, value);
    }
    Ok(config)
}
