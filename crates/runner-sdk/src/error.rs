use std::path::PathBuf;

/// Errors raised by the plugin execution context.
///
/// Every variant is fatal for the plugin invocation. Optional configuration
/// that is simply not present never produces one of these; it surfaces as
/// `Ok(None)` from the relevant accessor instead.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The context tree has no dictionary under a namespace the caller relies on.
    #[error("Execution context is malformed: '{namespace}' is missing or is not a dictionary.")]
    MalformedContext { namespace: String },

    /// A required input was absent or empty.
    #[error("Input required and not supplied: {name}")]
    InputRequired { name: String },

    #[error("Service endpoint '{name}' was not found.")]
    SystemEndpointNotFound { name: String },

    #[error("Service endpoint '{name}' has an empty url.")]
    SystemEndpointUrlEmpty { name: String },

    #[error("Service endpoint '{name}' has an invalid url '{url}': {source}")]
    InvalidEndpointUrl {
        name: String,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Unable to derive credentials for service endpoint '{name}'.")]
    CredentialsNotFound { name: String },

    #[error("Proxy bypass list is not a JSON array of strings: {0}")]
    InvalidProxyBypassList(#[source] serde_json::Error),

    #[error("Proxy address '{address}' is not a valid url: {source}")]
    InvalidProxyUrl {
        address: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Unable to load client certificate archive '{}': {message}", path.display())]
    ClientCertificate { path: PathBuf, message: String },

    #[error("Failed to create the http client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("The operation was cancelled.")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, PluginError>;
