use crate::error::{PluginError, Result};
use regex::{Regex, RegexBuilder};
use std::sync::Arc;
use url::{Host, Url};

/// Keys read from the `runner` context.
pub mod keys {
    pub const PROXY_URL: &str = "ProxyUrl";
    pub const PROXY_USERNAME: &str = "ProxyUsername";
    pub const PROXY_PASSWORD: &str = "ProxyPassword";
    pub const PROXY_BYPASS_LIST: &str = "ProxyBypassList";
}

/// Proxy configuration the runner was set up with.
#[derive(Debug, Clone)]
pub struct RunnerWebProxySettings {
    pub proxy_address: String,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    pub proxy_bypass_list: Vec<String>,
    pub web_proxy: Arc<RunnerWebProxy>,
}

impl RunnerWebProxySettings {
    /// Resolve proxy settings through `lookup`, which reads a key from the
    /// `runner` context. Returns `Ok(None)` when `ProxyUrl` is not configured.
    pub fn resolve<F>(lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Result<Option<String>>,
    {
        let proxy_url = match lookup(keys::PROXY_URL)? {
            Some(url) if !url.is_empty() => url,
            _ => return Ok(None),
        };

        let proxy_username = lookup(keys::PROXY_USERNAME)?;
        let proxy_password = lookup(keys::PROXY_PASSWORD)?;
        let proxy_bypass_list = parse_bypass_list(lookup(keys::PROXY_BYPASS_LIST)?.as_deref())?;

        let web_proxy = RunnerWebProxy::new(
            &proxy_url,
            proxy_username.as_deref(),
            proxy_password.as_deref(),
            &proxy_bypass_list,
        )?;

        Ok(Some(Self {
            proxy_address: proxy_url,
            proxy_username,
            proxy_password,
            proxy_bypass_list,
            web_proxy: Arc::new(web_proxy),
        }))
    }
}

/// Parse the JSON-encoded bypass list. Absent or empty means no entries.
pub fn parse_bypass_list(raw: Option<&str>) -> Result<Vec<String>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(json) => serde_json::from_str(json).map_err(PluginError::InvalidProxyBypassList),
    }
}

/// Proxy selector built from the runner's proxy settings.
///
/// Each bypass entry is a case-insensitive regular expression matched against
/// `scheme://host` (or `scheme://host:port` when the destination names a
/// non-default port). Loopback destinations always bypass the proxy.
#[derive(Debug)]
pub struct RunnerWebProxy {
    address: Url,
    username: Option<String>,
    password: Option<String>,
    bypass_list: Vec<Regex>,
}

impl RunnerWebProxy {
    pub fn new(
        address: &str,
        username: Option<&str>,
        password: Option<&str>,
        bypass_list: &[String],
    ) -> Result<Self> {
        let raw = Self::prepend_http_if_missing(address.trim());
        let parsed = Url::parse(&raw).map_err(|source| PluginError::InvalidProxyUrl {
            address: address.to_string(),
            source,
        })?;

        let (username, password) = match username.filter(|u| !u.is_empty()) {
            Some(user) => (Some(user.to_string()), password.map(str::to_string)),
            None => Self::extract_user_info(&parsed),
        };

        let mut patterns = Vec::with_capacity(bypass_list.len());
        for entry in bypass_list {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            match RegexBuilder::new(entry).case_insensitive(true).build() {
                Ok(re) => patterns.push(re),
                Err(e) => tracing::warn!("Ignoring invalid proxy bypass entry '{}': {}", entry, e),
            }
        }

        Ok(Self {
            address: parsed,
            username,
            password,
            bypass_list: patterns,
        })
    }

    pub fn address(&self) -> &Url {
        &self.address
    }

    /// Username and password to authenticate against the proxy, if any.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username
            .as_deref()
            .map(|u| (u, self.password.as_deref().unwrap_or_default()))
    }

    /// The proxy to use for `destination`, or `None` to connect directly.
    pub fn get_proxy(&self, destination: &Url) -> Option<Url> {
        if self.is_bypassed(destination) {
            None
        } else {
            Some(self.address.clone())
        }
    }

    pub fn is_bypassed(&self, destination: &Url) -> bool {
        Self::is_loopback(destination) || self.is_match_in_bypass_list(destination)
    }

    /// Wrap this selector into a `reqwest` proxy.
    pub fn to_reqwest_proxy(self: &Arc<Self>) -> reqwest::Proxy {
        let selector = Arc::clone(self);
        let mut proxy = reqwest::Proxy::custom(move |url| selector.get_proxy(url));
        if let Some((user, pass)) = self.credentials() {
            proxy = proxy.basic_auth(user, pass);
        }
        proxy
    }

    fn is_loopback(destination: &Url) -> bool {
        match destination.host() {
            Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
            Some(Host::Ipv4(ip)) => ip.is_loopback(),
            Some(Host::Ipv6(ip)) => ip.is_loopback(),
            None => false,
        }
    }

    fn is_match_in_bypass_list(&self, destination: &Url) -> bool {
        let Some(host) = destination.host_str() else {
            return false;
        };
        let target = match destination.port() {
            Some(port) => format!("{}://{}:{}", destination.scheme(), host, port),
            None => format!("{}://{}", destination.scheme(), host),
        };
        self.bypass_list.iter().any(|re| re.is_match(&target))
    }

    /// Extract username and password from a proxy URL's user-info.
    fn extract_user_info(url: &Url) -> (Option<String>, Option<String>) {
        let username = if url.username().is_empty() {
            None
        } else {
            Some(
                percent_encoding::percent_decode_str(url.username())
                    .decode_utf8_lossy()
                    .to_string(),
            )
        };

        let password = url.password().map(|p| {
            percent_encoding::percent_decode_str(p)
                .decode_utf8_lossy()
                .to_string()
        });

        (username, password)
    }

    /// Prepend `http://` to a proxy address if it doesn't already have a scheme.
    fn prepend_http_if_missing(address: &str) -> String {
        if !address.starts_with("http://") && !address.starts_with("https://") {
            let prepended = format!("http://{address}");
            if Url::parse(&prepended).is_ok() {
                return prepended;
            }
        }
        address.to_string()
    }
}
