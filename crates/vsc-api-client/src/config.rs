// Configuration for VscApiClient

use std::{str::FromStr, time::Duration};

use config::{Config, Environment};

use crate::{
    constants::{DEFAULT_HOSTNAME, DEFAULT_TIMEOUT},
    error::{Result, VscError},
};

/// Environment variable prefix used by [`VscClientConfig::from_env`]
pub const ENV_PREFIX: &str = "VSC";

/// How credentials are transported to the server.
///
/// Deployments differ in which scheme they accept, so the caller picks one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CredentialMode {
    /// `Authorization: Basic base64(username:password)`
    #[default]
    Basic,
    /// Username and password as two separate plain headers
    PlainHeaders,
}

impl FromStr for CredentialMode {
    type Err = VscError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(CredentialMode::Basic),
            "plain_headers" | "plain-headers" | "plain" => Ok(CredentialMode::PlainHeaders),
            other => Err(VscError::bad_argument(format!(
                "unknown credential mode '{other}'"
            ))),
        }
    }
}

/// Configuration for the VSC API client
#[derive(Clone, Debug)]
pub struct VscClientConfig {
    /// API endpoint hostname, literal IP address or SRV service name
    pub hostname: String,
    /// Explicit TCP port. SRV records override it; otherwise defaults to 8914
    pub port: Option<u16>,
    /// Username for authentication
    pub username: Option<String>,
    /// Password for authentication
    pub password: Option<String>,
    /// Use HTTPS (default: true)
    pub use_tls: bool,
    /// Per-request timeout (default: 5s)
    pub timeout: Duration,
    /// Credential transport (default: Basic)
    pub credential_mode: CredentialMode,
}

impl Default for VscClientConfig {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            port: None,
            username: None,
            password: None,
            use_tls: true,
            timeout: DEFAULT_TIMEOUT,
            credential_mode: CredentialMode::Basic,
        }
    }
}

impl VscClientConfig {
    /// Create a config pointing at the given hostname
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            ..Default::default()
        }
    }

    /// Set an explicit TCP port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set authentication credentials
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Switch HTTPS on or off
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the credential transport
    pub fn with_credential_mode(mut self, mode: CredentialMode) -> Self {
        self.credential_mode = mode;
        self
    }

    /// Load the configuration from `VSC_*` environment variables.
    ///
    /// Recognised keys: `VSC_HOSTNAME`, `VSC_PORT`, `VSC_USERNAME`,
    /// `VSC_PASSWORD`, `VSC_USE_TLS`, `VSC_TIMEOUT_SECS` and
    /// `VSC_CREDENTIAL_MODE`. Unset keys keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_environment(Environment::with_prefix(ENV_PREFIX))
    }

    /// Values are kept as strings; numeric and boolean keys are parsed on
    /// read so credentials such as `0123` survive untouched.
    pub(crate) fn from_environment(environment: Environment) -> Result<Self> {
        let settings = Config::builder().add_source(environment).build()?;

        let mut config = Self::default();
        if let Ok(hostname) = settings.get_string("hostname") {
            config.hostname = hostname;
        }
        if let Ok(port) = settings.get_int("port") {
            let port = u16::try_from(port)
                .ok()
                .filter(|port| *port != 0)
                .ok_or_else(|| VscError::bad_argument(format!("invalid port {port}")))?;
            config.port = Some(port);
        }
        config.username = settings.get_string("username").ok();
        config.password = settings.get_string("password").ok();
        if let Ok(use_tls) = settings.get_bool("use_tls") {
            config.use_tls = use_tls;
        }
        if let Ok(timeout) = settings.get_int("timeout_secs") {
            let timeout = u64::try_from(timeout)
                .map_err(|_| VscError::bad_argument(format!("invalid timeout {timeout}")))?;
            config.timeout = Duration::from_secs(timeout);
        }
        if let Ok(mode) = settings.get_string("credential_mode") {
            config.credential_mode = mode.parse()?;
        }

        Ok(config)
    }
}
