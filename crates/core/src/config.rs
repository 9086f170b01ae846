//! Configuration loading and management.
//!
//! The credential is read once here and then handed to the Gemini model
//! explicitly. Nothing else in the crate reads the environment.

use crate::error::{AppError, Result};
use dotenvy::dotenv;
use std::env;

/// Model used when `GEMINI_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

#[derive(Clone, Debug)]
pub struct Config {
    /// `None` when no key was configured; requests then fail individually.
    pub gemini_api_key: Option<String>,
    pub model_name: String,
}

impl Config {
    /// Loads configuration from the environment (and `.env` if present).
    ///
    /// A missing API key is not an error: a warning is logged and every
    /// generation request will fail at call time instead.
    pub fn load() -> Result<Self> {
        // Load .env file if it exists, ignore if it doesn't
        let _ = dotenv();

        let api_key = api_key_from(|name| env::var(name).ok());

        let model_name = env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let config = Self::builder()
            .with_optional_api_key(api_key)
            .with_model(&model_name)
            .build()?;

        if !config.has_api_key() {
            log::warn!("GEMINI_API_KEY environment variable not set. Gemini API calls will fail.");
        }

        Ok(config)
    }

    /// Starts a builder with the default model and no credential.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn has_api_key(&self) -> bool {
        self.gemini_api_key.is_some()
    }

    /// Replaces the model name, keeping the credential.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if `model` is blank.
    pub fn with_model_override(self, model: &str) -> Result<Self> {
        Self::builder()
            .with_optional_api_key(self.gemini_api_key)
            .with_model(model)
            .build()
    }
}

/// `GEMINI_API_KEY`, falling back to `API_KEY`. Blank values count as unset.
fn api_key_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    ["GEMINI_API_KEY", "API_KEY"]
        .into_iter()
        .find_map(|name| lookup(name).filter(|key| !key.trim().is_empty()))
}

/// Builder for [`Config`], used by tests and by callers overriding the environment.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    api_key: Option<String>,
    model_name: String,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            model_name: DEFAULT_MODEL.to_string(),
        }
    }
}

impl ConfigBuilder {
    pub fn with_api_key(self, key: &str) -> Self {
        self.with_optional_api_key(Some(key.to_string()))
    }

    pub fn with_optional_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model_name = model.trim().to_string();
        self
    }

    /// Finalizes the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the model name is empty.
    pub fn build(self) -> Result<Config> {
        if self.model_name.is_empty() {
            return Err(AppError::config("Model name must not be empty"));
        }

        Ok(Config {
            gemini_api_key: self.api_key,
            model_name: self.model_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_still_builds() {
        let config = Config::builder().build().expect("config");
        assert!(!config.has_api_key());
        assert_eq!(config.model_name, DEFAULT_MODEL);
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let config = Config::builder().with_api_key("   ").build().expect("config");
        assert!(config.gemini_api_key.is_none());
    }

    #[test]
    fn blank_gemini_key_falls_back_to_api_key() {
        let key = api_key_from(|name| match name {
            "GEMINI_API_KEY" => Some(String::new()),
            "API_KEY" => Some("real-key".to_string()),
            _ => None,
        });
        assert_eq!(key.as_deref(), Some("real-key"));

        let both = api_key_from(|name| Some(format!("{}-value", name)));
        assert_eq!(both.as_deref(), Some("GEMINI_API_KEY-value"));
        assert_eq!(api_key_from(|_| Some("  ".to_string())), None);
    }

    #[test]
    fn model_override_goes_through_validation() {
        let config = Config::builder().with_api_key("k").build().expect("config");
        let custom = config.clone().with_model_override("gemini-custom").expect("override");
        assert_eq!(custom.model_name, "gemini-custom");
        assert_eq!(custom.gemini_api_key.as_deref(), Some("k"));
        assert!(matches!(config.with_model_override(""), Err(AppError::Config(_))));
    }

    #[test]
    fn empty_model_is_rejected() {
        let result = Config::builder().with_api_key("k").with_model(" ").build();
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
