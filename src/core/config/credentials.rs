//! Gemini credential and endpoint resolution.

use std::error::Error;
use std::fmt;

use keyring::Entry;
use tracing::{debug, warn};

use crate::core::client::gemini::{GeminiSettings, DEFAULT_GEMINI_BASE_URL};
use crate::core::config::data::Config;
use crate::core::error::EngineError;
use crate::core::models::DEFAULT_MODEL;

pub const KEYRING_SERVICE: &str = "xang";
pub const KEYRING_USER: &str = "gemini";

/// Environment variables checked for an API key, in order.
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GEMINI_KEY"];
pub const MODEL_VAR: &str = "GEMINI_MODEL";
pub const BASE_URL_VAR: &str = "GEMINI_BASE_URL";

/// Describes failures when attempting to access the system keyring.
///
/// Recoverable errors indicate that the credential backend was
/// temporarily unavailable (for example when the keychain service is
/// locked or inaccessible).
#[derive(Debug)]
pub enum KeyringAccessError {
    Recoverable(keyring::Error),
    Permanent(keyring::Error),
}

impl KeyringAccessError {
    fn inner(&self) -> &keyring::Error {
        match self {
            KeyringAccessError::Recoverable(err) | KeyringAccessError::Permanent(err) => err,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, KeyringAccessError::Recoverable(_))
    }
}

impl From<keyring::Error> for KeyringAccessError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_) => {
                KeyringAccessError::Recoverable(err)
            }
            other => KeyringAccessError::Permanent(other),
        }
    }
}

impl fmt::Display for KeyringAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner())
    }
}

impl Error for KeyringAccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner())
    }
}

/// Where an API key may be stored outside the config file.
pub trait CredentialStore {
    fn get(&self) -> Result<Option<String>, KeyringAccessError>;
    fn set(&self, key: &str) -> Result<(), KeyringAccessError>;
}

/// The platform keyring entry `xang`/`gemini`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemKeyring;

impl CredentialStore for SystemKeyring {
    fn get(&self) -> Result<Option<String>, KeyringAccessError> {
        let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
        match entry.get_password() {
            Ok(key) => Ok(Some(key)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str) -> Result<(), KeyringAccessError> {
        let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
        entry.set_password(key)?;
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Resolve the API key: environment, then keyring, then the config file.
/// A keyring that cannot be reached is skipped with a warning.
pub fn resolve_api_key<E>(config: &Config, env: E, store: &dyn CredentialStore) -> Option<String>
where
    E: Fn(&str) -> Option<String>,
{
    for var in API_KEY_VARS {
        if let Some(key) = non_blank(env(var)) {
            debug!(source = var, "using API key from environment");
            return Some(key);
        }
    }

    match store.get() {
        Ok(Some(key)) if !key.trim().is_empty() => {
            debug!(source = "keyring", "using API key from keyring");
            return Some(key.trim().to_string());
        }
        Ok(_) => {}
        Err(err) => warn!(
            error = %err,
            recoverable = err.is_recoverable(),
            "keyring lookup failed, falling back to config file"
        ),
    }

    non_blank(config.gemini_key.clone())
}

/// Build client settings from config, environment overrides and stored
/// credentials. Without a key this is [`EngineError::MissingCredential`].
///
/// The model comes from `model_override` (the `--model` flag), then
/// `GEMINI_MODEL`, then the config file.
pub fn resolve_settings<E>(
    config: &Config,
    model_override: Option<&str>,
    env: E,
    store: &dyn CredentialStore,
) -> Result<GeminiSettings, EngineError>
where
    E: Fn(&str) -> Option<String>,
{
    let api_key = resolve_api_key(config, &env, store).ok_or(EngineError::MissingCredential)?;

    let model = non_blank(model_override.map(str::to_string))
        .or_else(|| non_blank(env(MODEL_VAR)))
        .or_else(|| non_blank(config.gemini_model.clone()))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let base_url = non_blank(env(BASE_URL_VAR))
        .or_else(|| non_blank(config.gemini_base_url.clone()))
        .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string());

    let settings = GeminiSettings::new(api_key, &model).with_base_url(base_url);
    if settings.model != model {
        warn!(requested = %model, using = %settings.model, "model name mapped onto a current model");
    }
    Ok(settings)
}

/// Process environment lookup for [`resolve_settings`].
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
