use crate::vss_util::VssCredentials;
use reqwest::{Client, Method, RequestBuilder};
use url::Url;

/// An authenticated handle to the service that issued the job.
///
/// Created once per execution context and shared by everything the plugin
/// does afterwards; clone the `Arc` it is handed out in rather than the
/// connection itself.
#[derive(Debug)]
pub struct VssConnection {
    uri: Url,
    credentials: VssCredentials,
    client: Client,
}

impl VssConnection {
    pub fn new(uri: Url, credentials: VssCredentials, client: Client) -> Self {
        Self {
            uri,
            credentials,
            client,
        }
    }

    /// Base url of the service.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn credentials(&self) -> &VssCredentials {
        &self.credentials
    }

    /// The configured HTTP client (user agent, TLS and proxy already applied).
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Resolve `path` against the service base url.
    pub fn url_for(&self, path: &str) -> Result<Url, url::ParseError> {
        self.uri.join(path)
    }

    /// Start an authenticated request.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.credentials {
            VssCredentials::OAuthAccessToken(token) => builder.bearer_auth(token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> VssConnection {
        VssConnection::new(
            Url::parse("https://pipelines.example.com/tenant/").unwrap(),
            VssCredentials::OAuthAccessToken("token123".to_string()),
            Client::new(),
        )
    }

    #[test]
    fn url_for_joins_relative_paths() {
        let conn = connection();
        assert_eq!(
            conn.url_for("_apis/connectionData").unwrap().as_str(),
            "https://pipelines.example.com/tenant/_apis/connectionData"
        );
    }

    #[test]
    fn request_carries_bearer_token() {
        let conn = connection();
        let url = conn.url_for("_apis/x").unwrap();
        let request = conn.request(Method::GET, url).build().unwrap();
        assert_eq!(
            request.headers().get(reqwest::header::AUTHORIZATION).unwrap(),
            "Bearer token123"
        );
        assert_eq!(request.method(), Method::GET);
    }
}
