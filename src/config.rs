use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Url;

/// Default backend location
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Versioned prefix prepended to every request path
pub const DEFAULT_API_PREFIX: &str = "/api/v1";

/// Propsearch API client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Backend base URL
    #[arg(short = 'u', long, env = "API_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Versioned API path prefix
    #[arg(long, env = "API_PREFIX", default_value = DEFAULT_API_PREFIX)]
    pub api_prefix: String,

    /// Account email used to sign in before running the command
    #[arg(short, long, env = "PROPSEARCH_EMAIL")]
    pub email: Option<String>,

    /// Account password
    #[arg(short, long, env = "PROPSEARCH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Count properties matching the filters
    Count(FilterArgs),

    /// Fetch the short listing for the filters
    Listing(FilterArgs),

    /// Show the signed-in user's profile
    Me,

    /// GET an arbitrary API path and print the JSON body
    Get {
        /// Path relative to the API prefix, e.g. /properties/42
        path: String,
    },
}

#[derive(clap::Args, Debug, Clone, Default, PartialEq)]
pub struct FilterArgs {
    #[arg(long)]
    pub city: Option<String>,
    #[arg(long = "type")]
    pub property_type: Option<String>,
    #[arg(long)]
    pub operation: Option<String>,
    #[arg(long)]
    pub min_price: Option<u64>,
    #[arg(long)]
    pub max_price: Option<u64>,
    #[arg(long)]
    pub rooms: Option<u32>,
    #[arg(long)]
    pub page: Option<u32>,
    #[arg(long)]
    pub limit: Option<u32>,
}

/// Paths of the authentication endpoints, relative to the API prefix
#[derive(Clone, Debug, PartialEq)]
pub struct AuthPaths {
    pub login: String,
    pub register: String,
    pub refresh: String,
    pub logout: String,
    pub me: String,
}

impl Default for AuthPaths {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            register: "/auth/register".to_string(),
            refresh: "/auth/refresh".to_string(),
            logout: "/auth/logout".to_string(),
            me: "/auth/me".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    // Backend location
    pub base_url: String,
    pub api_prefix: String,

    // Authentication endpoints
    pub auth_paths: AuthPaths,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    pub log_level: String,
}

impl Config {
    /// Default configuration pointing at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            auth_paths: AuthPaths::default(),
            http_connect_timeout: 10,
            http_request_timeout: 30,
            log_level: "info".to_string(),
        }
    }

    /// Load configuration with priority: CLI > ENV > .env > defaults
    pub fn load() -> Result<(Self, CliArgs)> {
        dotenvy::dotenv().ok();
        let args = CliArgs::parse();
        let config = Self::from_args(&args);
        Ok((config, args))
    }

    /// Build configuration from parsed CLI arguments
    ///
    /// Endpoint paths and the connect timeout are environment-only settings.
    pub fn from_args(args: &CliArgs) -> Self {
        let defaults = AuthPaths::default();
        Self {
            base_url: args.base_url.clone(),
            api_prefix: args.api_prefix.clone(),
            auth_paths: AuthPaths {
                login: env_or("AUTH_LOGIN_PATH", defaults.login),
                register: env_or("AUTH_REGISTER_PATH", defaults.register),
                refresh: env_or("AUTH_REFRESH_PATH", defaults.refresh),
                logout: env_or("AUTH_LOGOUT_PATH", defaults.logout),
                me: env_or("AUTH_ME_PATH", defaults.me),
            },
            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            http_request_timeout: args.http_timeout,
            log_level: args.log_level.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .with_context(|| format!("API_BASE_URL is not a valid URL: {}", self.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("API_BASE_URL must use http or https: {}", self.base_url);
        }

        let paths = [
            ("API_PREFIX", &self.api_prefix),
            ("AUTH_LOGIN_PATH", &self.auth_paths.login),
            ("AUTH_REGISTER_PATH", &self.auth_paths.register),
            ("AUTH_REFRESH_PATH", &self.auth_paths.refresh),
            ("AUTH_LOGOUT_PATH", &self.auth_paths.logout),
            ("AUTH_ME_PATH", &self.auth_paths.me),
        ];
        for (name, path) in paths {
            if !path.is_empty() && !path.starts_with('/') {
                anyhow::bail!("{} must start with '/': {}", name, path);
            }
        }

        if self.http_connect_timeout == 0 || self.http_request_timeout == 0 {
            anyhow::bail!("HTTP timeouts must be greater than zero");
        }

        Ok(())
    }

    /// Base URL joined with the API prefix, without a trailing slash
    pub fn api_root(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.api_prefix.trim_end_matches('/')
        )
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}
