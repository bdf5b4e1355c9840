//! Load: layered config loading from defaults, TOML files, `.env` and the environment.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::ConfigBuilder;

use super::model::RouterConfig;

/// Optional config files, lowest priority first.
const CONFIG_PATHS: &[&str] = &["/etc/router/router", "config/router"];

/// Names the environment variable that points at an explicit config file.
pub const CONFIG_FILE_ENV: &str = "ROUTER_CONFIG_FILE";

impl RouterConfig {
    /// Load configuration from router.toml and environment variables
    /// Priority: Credential env vars > ROUTER_* env vars > config files > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut builder = Self::defaults_builder()?;

        for path in CONFIG_PATHS {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            tracing::info!("Loading configuration from: {}", path);
            builder = builder.add_source(config::File::with_name(&path).required(true));
        }

        // Double underscore for nested keys: ROUTER_SINK__URL
        builder = builder.add_source(Self::environment(None));

        let mut config: RouterConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.apply_credential_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML document layered over the defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Self::defaults_builder()?
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Compile-time defaults as the foundation, so keys missing from files
    /// and the environment still resolve.
    fn defaults_builder() -> Result<ConfigBuilder<DefaultState>> {
        let defaults = config::Config::try_from(&RouterConfig::default())
            .context("Failed to serialize default configuration")?;
        Ok(config::Config::builder().add_source(defaults))
    }

    /// `ROUTER_`-prefixed environment source. `source` replaces the process
    /// environment when given.
    fn environment(source: Option<config::Map<String, String>>) -> config::Environment {
        config::Environment::with_prefix("ROUTER")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(source)
    }

    /// Search backend credentials injected by the deployment take precedence
    /// over everything else.
    pub fn apply_credential_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = lookup("ELASTIC_USERNAME") {
            self.sink.username = user;
        }
        if let Some(password) = lookup("ELASTIC_PASSWORD") {
            self.sink.password = password;
        }
    }

    /// Validate addresses, limits and the routing/sink sections
    pub fn validate(&self) -> Result<()> {
        self.bind_address
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid bind_address: {}", self.bind_address))?;

        if self.monitor.enabled {
            self.monitor
                .bind_address
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid monitor.bind_address: {}", self.monitor.bind_address))?;
        }

        if self.max_connections == 0 {
            anyhow::bail!("max_connections must be > 0");
        }
        if self.max_line_bytes == 0 {
            anyhow::bail!("max_line_bytes must be > 0");
        }

        self.routing.validate().map_err(anyhow::Error::msg)?;
        self.sink.validate().map_err(anyhow::Error::msg)?;
        Ok(())
    }
}
