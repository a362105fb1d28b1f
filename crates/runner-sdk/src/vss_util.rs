use crate::action_plugin::ServiceEndpoint;
use crate::build_constants::RunnerPackage;
use crate::certificate_settings::RunnerClientCertificateManager;
use crate::error::Result;
use crate::string_util::StringUtil;
use crate::vss_connection::VssConnection;
use crate::web_proxy::RunnerWebProxy;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use reqwest::Client;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Name of the endpoint the runner hands every plugin for talking back to the service.
pub const SYSTEM_VSS_CONNECTION: &str = "SystemVssConnection";

/// Credentials derived from a service endpoint.
#[derive(Clone, PartialEq, Eq)]
pub enum VssCredentials {
    /// An OAuth access token, sent as a bearer token.
    OAuthAccessToken(String),
}

impl fmt::Debug for VssCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OAuthAccessToken(_) => f.write_str("OAuthAccessToken(***)"),
        }
    }
}

/// Derives credentials for a service endpoint.
pub trait CredentialProvider: Send + Sync {
    /// Returns `None` when the endpoint carries nothing usable.
    fn get_credentials(&self, endpoint: &ServiceEndpoint) -> Option<VssCredentials>;
}

/// Reads the OAuth access token the runner places in the endpoint's
/// authorization parameters.
#[derive(Debug, Clone, Default)]
pub struct EndpointCredentialProvider;

impl EndpointCredentialProvider {
    pub const OAUTH_SCHEME: &'static str = "OAuth";
    pub const ACCESS_TOKEN: &'static str = "AccessToken";
}

impl CredentialProvider for EndpointCredentialProvider {
    fn get_credentials(&self, endpoint: &ServiceEndpoint) -> Option<VssCredentials> {
        let authorization = endpoint.authorization.as_ref()?;
        if !authorization.scheme.eq_ignore_ascii_case(Self::OAUTH_SCHEME) {
            tracing::warn!(
                "Unsupported authorization scheme '{}' on endpoint '{}'",
                authorization.scheme,
                endpoint.name
            );
            return None;
        }

        authorization
            .parameters
            .get(Self::ACCESS_TOKEN)
            .filter(|token| !token.is_empty())
            .map(|token| VssCredentials::OAuthAccessToken(token.clone()))
    }
}

/// Process-wide HTTP settings applied to every connection a plugin creates.
#[derive(Debug, Clone, Default)]
pub struct VssClientHttpRequestSettings {
    /// Product tokens joined into the `User-Agent` header, most specific first.
    pub user_agent: Vec<String>,
    pub client_certificate_manager: Option<Arc<RunnerClientCertificateManager>>,
    pub skip_server_certificate_validation: bool,
    pub web_proxy: Option<Arc<RunnerWebProxy>>,
}

/// A settings instance shared between execution contexts.
pub type SharedHttpRequestSettings = Arc<RwLock<VssClientHttpRequestSettings>>;

static DEFAULT_SETTINGS: Lazy<SharedHttpRequestSettings> =
    Lazy::new(|| Arc::new(RwLock::new(VssClientHttpRequestSettings::default())));

impl VssClientHttpRequestSettings {
    /// The process-wide settings.
    pub fn global() -> SharedHttpRequestSettings {
        Arc::clone(&DEFAULT_SETTINGS)
    }

    /// A fresh settings instance not shared with the rest of the process.
    pub fn isolated() -> SharedHttpRequestSettings {
        Arc::new(RwLock::new(Self::default()))
    }
}

/// Connection and HTTP client helpers.
pub struct VssUtil;

impl VssUtil {
    /// The environment variable name for configuring HTTP timeout in seconds.
    pub const HTTP_TIMEOUT_ENV: &'static str = "GITHUB_ACTIONS_RUNNER_HTTP_TIMEOUT";
    /// The environment variable name for disabling TLS verification.
    pub const TLS_NO_VERIFY_ENV: &'static str = "GITHUB_ACTIONS_RUNNER_TLS_NO_VERIFY";

    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 100;
    /// Maximum allowed timeout in seconds.
    pub const MAX_TIMEOUT_SECS: u64 = 1200;

    /// Product token identifying plugin traffic.
    pub const PRODUCT_NAME: &'static str = "GitHubActionsRunner-Plugin";

    /// Read the configured timeout from the environment.
    ///
    /// Clamps the value to `[100, 1200]` seconds. Defaults to 100s if unset or invalid.
    pub fn get_timeout() -> Duration {
        let raw = std::env::var(Self::HTTP_TIMEOUT_ENV).unwrap_or_default();
        Self::parse_timeout(&raw)
    }

    fn parse_timeout(raw: &str) -> Duration {
        let secs = raw.trim().parse::<u64>().unwrap_or(Self::DEFAULT_TIMEOUT_SECS);
        Duration::from_secs(secs.clamp(Self::DEFAULT_TIMEOUT_SECS, Self::MAX_TIMEOUT_SECS))
    }

    /// Check whether TLS verification should be disabled.
    pub fn is_tls_no_verify() -> bool {
        let raw = std::env::var(Self::TLS_NO_VERIFY_ENV).unwrap_or_default();
        StringUtil::convert_to_bool(&raw) == Some(true)
    }

    /// Human readable description of the operating system.
    pub fn os_description() -> String {
        sysinfo::System::long_os_version()
            .unwrap_or_else(|| std::env::consts::OS.to_string())
            .trim()
            .to_string()
    }

    /// The product tokens a plugin prepends to the `User-Agent`.
    pub fn client_identification() -> Vec<String> {
        vec![
            format!("{}/{}", Self::PRODUCT_NAME, RunnerPackage::VERSION),
            format!("({})", Self::os_description()),
        ]
    }

    /// Build an authenticated connection to `url` honoring `settings`.
    pub async fn create_connection(
        url: Url,
        credentials: VssCredentials,
        settings: &VssClientHttpRequestSettings,
    ) -> Result<VssConnection> {
        let client = Self::create_http_client(settings).await?;
        Ok(VssConnection::new(url, credentials, client))
    }

    /// Create a `reqwest::Client` configured with user agent, timeout, TLS and proxy settings.
    pub async fn create_http_client(settings: &VssClientHttpRequestSettings) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(Self::get_timeout())
            .connect_timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(60));

        if !settings.user_agent.is_empty() {
            builder = builder.user_agent(settings.user_agent.join(" "));
        }

        if settings.skip_server_certificate_validation || Self::is_tls_no_verify() {
            tracing::warn!("Server certificate validation is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(ref manager) = settings.client_certificate_manager {
            if let Some(identity) = manager.load_identity().await? {
                builder = builder.identity(identity);
            }
        }

        if let Some(ref proxy) = settings.web_proxy {
            tracing::debug!("Routing service traffic through proxy {}", proxy.address());
            builder = builder.proxy(proxy.to_reqwest_proxy());
        }

        Ok(builder.build()?)
    }
}
