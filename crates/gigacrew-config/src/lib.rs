//! Configuration loading for GigaCrew agents.
//!
//! Reads a TOML file, substitutes `${VAR}` placeholders from the
//! environment, applies `GIGACREW_*` overrides and validates the result.

use regex::Regex;
use std::env;
use std::path::Path;
use thiserror::Error;

pub mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "GIGACREW_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let file_path = self.file_path.as_deref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;
		if !Path::new(file_path).exists() {
			return Err(ConfigError::FileNotFound(file_path.to_string()));
		}

		let content = tokio::fs::read_to_string(file_path).await?;
		let mut config = self.parse(&content)?;
		self.apply_env_overrides(&mut config)?;
		validate(&config)?;
		Ok(config)
	}

	/// Parses configuration text after placeholder substitution.
	pub fn parse(&self, content: &str) -> Result<Config, ConfigError> {
		let substituted = substitute_env_vars(content)?;
		toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			config.gigacrew.log_level = log_level;
		}

		if let Ok(rpc_url) = env::var(format!("{}RPC_URL", self.env_prefix)) {
			config.chain.rpc_url = rpc_url;
		}

		if let Ok(from_block) = env::var(format!("{}FROM_BLOCK", self.env_prefix)) {
			config.sync.start_block = from_block.parse().map_err(|e| {
				ConfigError::ValidationError(format!("Invalid start block: {}", e))
			})?;
		}

		if let Ok(force) = env::var(format!("{}FORCE_FROM_BLOCK", self.env_prefix)) {
			config.sync.force_start_block = force.eq_ignore_ascii_case("true");
		}

		Ok(())
	}
}

fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::ParseError(e.to_string()))?;
	let mut result = content.to_string();

	for cap in re.captures_iter(content) {
		let full_match = &cap[0];
		let var_name = &cap[1];

		let env_value =
			env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

		result = result.replace(full_match, &env_value);
	}

	Ok(result)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
	let catalog_enabled = config.catalog.as_ref().is_some_and(|c| c.enabled);
	if config.buyer.is_none() && config.seller.is_none() && !catalog_enabled {
		return Err(ConfigError::ValidationError(
			"At least one of buyer, seller or catalog must be configured".to_string(),
		));
	}

	let rpc_url = &config.chain.rpc_url;
	if !["http://", "https://", "ws://", "wss://"]
		.iter()
		.any(|scheme| rpc_url.starts_with(scheme))
	{
		return Err(ConfigError::ValidationError(format!(
			"RPC URL must start with http://, https://, ws:// or wss://: {}",
			rpc_url
		)));
	}

	check_hex("contract_address", &config.chain.contract_address, 20)?;

	if config.sync.max_block_range == 0 {
		return Err(ConfigError::ValidationError(
			"max_block_range must be at least 1".to_string(),
		));
	}
	if config.sync.batch_size == 0 {
		return Err(ConfigError::ValidationError(
			"batch_size must be at least 1".to_string(),
		));
	}

	if let Some(buyer) = &config.buyer {
		check_hex("buyer.private_key", &buyer.private_key, 32)?;
	}
	if let Some(seller) = &config.seller {
		check_hex("seller.private_key", &seller.private_key, 32)?;
		if seller.service_id.is_none() {
			return Err(ConfigError::ValidationError(
				"seller.service_id is required".to_string(),
			));
		}
	}

	Ok(())
}

fn check_hex(field: &str, value: &str, len: usize) -> Result<(), ConfigError> {
	let bytes = hex::decode(value.trim_start_matches("0x"))
		.map_err(|e| ConfigError::ValidationError(format!("{} is not hex: {}", field, e)))?;
	if bytes.len() != len {
		return Err(ConfigError::ValidationError(format!(
			"{} must be {} bytes, got {}",
			field,
			len,
			bytes.len()
		)));
	}
	Ok(())
}
