use crate::action_command::{self, escape, keywords};
use crate::case_insensitive::CaseInsensitiveMap;
use crate::certificate_settings::RunnerCertificateSettings;
use crate::context_data::{self, DictionaryContextData, GITHUB_CONTEXT, RUNNER_CONTEXT};
use crate::error::{PluginError, Result};
use crate::string_util::StringUtil;
use crate::trace::{OutputSink, StdoutSink, TraceWriter, TraceWriterSink};
use crate::vss_connection::VssConnection;
use crate::vss_util::{
    CredentialProvider, EndpointCredentialProvider, SharedHttpRequestSettings,
    VssClientHttpRequestSettings, VssUtil, SYSTEM_VSS_CONNECTION,
};
use crate::web_proxy::RunnerWebProxySettings;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Variable that turns on step debug output.
pub const DEBUG_VARIABLE: &str = "ACTIONS_STEP_DEBUG";

/// Execution context handed to an action plugin.
///
/// The runner serializes the inputs, variables, endpoints and context tree;
/// the plugin host deserializes them and passes this value to
/// [`ActionPlugin::run`]. It is shared by reference across every task the
/// plugin spawns. Output goes through one sink behind one lock, so each
/// emitted line reaches the runner whole.
#[derive(Serialize, Deserialize)]
pub struct ActionPluginContext {
    /// Service endpoints available to the plugin.
    #[serde(default)]
    pub endpoints: Vec<ServiceEndpoint>,

    /// Variables available to the plugin (e.g., `ACTIONS_STEP_DEBUG`).
    #[serde(default)]
    pub variables: CaseInsensitiveMap<VariableValue>,

    /// Input key-value pairs for the plugin.
    #[serde(default)]
    pub inputs: CaseInsensitiveMap<String>,

    /// The `runner` / `github` context tree.
    #[serde(default)]
    pub context: DictionaryContextData,

    #[serde(skip, default = "default_sink")]
    sink: Arc<dyn OutputSink>,

    #[serde(skip)]
    output_lock: Mutex<()>,

    #[serde(skip)]
    connection: OnceCell<Arc<VssConnection>>,

    #[serde(skip, default = "VssClientHttpRequestSettings::global")]
    http_settings: SharedHttpRequestSettings,

    #[serde(skip, default = "default_credential_provider")]
    credential_provider: Arc<dyn CredentialProvider>,
}

fn default_sink() -> Arc<dyn OutputSink> {
    Arc::new(StdoutSink)
}

fn default_credential_provider() -> Arc<dyn CredentialProvider> {
    Arc::new(EndpointCredentialProvider)
}

/// A service endpoint (connection) available to a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// The name of the endpoint (e.g., "SystemVssConnection").
    pub name: String,

    /// The URL of the endpoint.
    #[serde(default)]
    pub url: String,

    /// Authorization parameters.
    #[serde(default)]
    pub authorization: Option<EndpointAuthorization>,
}

/// Authorization information for a service endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointAuthorization {
    /// The authorization scheme (e.g., "OAuth").
    pub scheme: String,

    /// Authorization parameters (e.g., access token).
    #[serde(default)]
    pub parameters: CaseInsensitiveMap<String>,
}

/// A variable value and whether the runner considers it secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "VariableValueRepr", rename_all = "camelCase")]
pub struct VariableValue {
    pub value: String,
    pub is_secret: bool,
}

/// Variables arrive either as a bare string or as `{ value, isSecret }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum VariableValueRepr {
    Plain(String),
    Full {
        #[serde(default)]
        value: String,
        #[serde(default, rename = "isSecret")]
        is_secret: bool,
    },
}

impl From<VariableValueRepr> for VariableValue {
    fn from(repr: VariableValueRepr) -> Self {
        match repr {
            VariableValueRepr::Plain(value) => Self {
                value,
                is_secret: false,
            },
            VariableValueRepr::Full { value, is_secret } => Self { value, is_secret },
        }
    }
}

impl VariableValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_secret: false,
        }
    }

    pub fn secret(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_secret: true,
        }
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl ActionPluginContext {
    /// Create an empty context that writes commands to standard output.
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            variables: CaseInsensitiveMap::new(),
            inputs: CaseInsensitiveMap::new(),
            context: DictionaryContextData::new(),
            sink: default_sink(),
            output_lock: Mutex::new(()),
            connection: OnceCell::new(),
            http_settings: VssClientHttpRequestSettings::global(),
            credential_provider: default_credential_provider(),
        }
    }

    /// Create an empty context that hands every command line to `trace`
    /// instead of standard output.
    pub fn with_trace(trace: Arc<dyn TraceWriter>) -> Self {
        Self::new().with_sink(Arc::new(TraceWriterSink::new(trace)))
    }

    /// Replace the output sink.
    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Use `settings` instead of the process-wide HTTP settings.
    pub fn with_http_settings(mut self, settings: SharedHttpRequestSettings) -> Self {
        self.http_settings = settings;
        self
    }

    /// Replace how credentials are derived from the system endpoint.
    pub fn with_credential_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credential_provider = provider;
        self
    }

    /// The HTTP settings connections are built from.
    pub fn http_settings(&self) -> &SharedHttpRequestSettings {
        &self.http_settings
    }

    // -----------------------------------------------------------------------
    // Inputs / variables
    // -----------------------------------------------------------------------

    /// Get an input value by name (case-insensitive).
    ///
    /// The resolved value is traced through [`debug`](Self::debug). If
    /// `required` is true and the input is missing or empty, returns
    /// [`PluginError::InputRequired`].
    pub fn get_input(&self, name: &str, required: bool) -> Result<Option<String>> {
        let value = self.inputs.get(name).cloned();

        self.debug(&format!(
            "Input '{name}': '{}'",
            value.as_deref().unwrap_or_default()
        ));

        if required && value.as_deref().map_or(true, str::is_empty) {
            return Err(PluginError::InputRequired {
                name: name.to_string(),
            });
        }

        Ok(value)
    }

    /// Get a variable by name (case-insensitive).
    pub fn get_variable(&self, name: &str) -> Option<&VariableValue> {
        self.variables.get(name)
    }

    /// Check if step debug is enabled via `ACTIONS_STEP_DEBUG` variable.
    pub fn is_debug(&self) -> bool {
        self.get_variable(DEBUG_VARIABLE)
            .and_then(|v| StringUtil::convert_to_bool(&v.value))
            .unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Same as [`debug`](Self::debug): plugin info output only shows with step debug on.
    pub fn info(&self, message: &str) {
        self.debug(message);
    }

    /// Same as [`debug`](Self::debug).
    pub fn verbose(&self, message: &str) {
        self.debug(message);
    }

    /// Emit one `##[debug]` line per line of `message` when step debug is enabled.
    pub fn debug(&self, message: &str) {
        if !self.is_debug() {
            return;
        }

        for line in message.replace("\r\n", "\n").split('\n') {
            self.output(&action_command::format_command(keywords::DEBUG, &[], &escape(line)));
        }
    }

    pub fn warning(&self, message: &str) {
        self.output(&action_command::format_command(keywords::WARNING, &[], &escape(message)));
    }

    pub fn error(&self, message: &str) {
        self.output(&action_command::format_command(keywords::ERROR, &[], &escape(message)));
    }

    /// Ask the runner to mask `secret` in all subsequent log output.
    pub fn add_mask(&self, secret: &str) {
        self.output(&action_command::format_command(keywords::ADD_MASK, &[], &escape(secret)));
    }

    /// Echo a command line the plugin is about to run.
    pub fn command(&self, command: &str) {
        self.output(&action_command::format_command(keywords::COMMAND, &[], &escape(command)));
    }

    /// Tell the runner where a repository was checked out. `path` is sent as-is.
    pub fn set_repository_path(&self, repo_name: &str, path: &str, workspace_repo: bool) {
        let repo_name = escape(repo_name);
        self.output(&action_command::format_command(
            keywords::SET_REPO_PATH,
            &[
                ("repoFullName", repo_name.as_str()),
                ("workspaceRepo", action_command::format_bool(workspace_repo)),
            ],
            path,
        ));
    }

    /// Save state the post step of this action can read back.
    pub fn set_intra_action_state(&self, name: &str, value: &str) {
        let name = escape(name);
        self.output(&action_command::format_command(
            keywords::SAVE_STATE,
            &[("name", name.as_str())],
            &escape(value),
        ));
    }

    /// Write one already formatted line to the sink.
    pub fn output(&self, line: &str) {
        let _guard = self.output_lock.lock();
        self.sink.write_line(line);
    }

    // -----------------------------------------------------------------------
    // Context tree
    // -----------------------------------------------------------------------

    /// Read `key` from the `namespace` dictionary of the context tree.
    pub fn get_context(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        context_data::get_scoped_value(&self.context, namespace, key)
    }

    /// Get the runner context value for a given key.
    pub fn get_runner_context(&self, key: &str) -> Result<Option<String>> {
        self.get_context(RUNNER_CONTEXT, key)
    }

    /// Get the github context value for a given key.
    pub fn get_github_context(&self, key: &str) -> Result<Option<String>> {
        self.get_context(GITHUB_CONTEXT, key)
    }

    pub fn get_cert_configuration(&self) -> Result<Option<RunnerCertificateSettings>> {
        RunnerCertificateSettings::resolve(|key| self.get_runner_context(key))
    }

    pub fn get_proxy_configuration(&self) -> Result<Option<RunnerWebProxySettings>> {
        RunnerWebProxySettings::resolve(|key| self.get_runner_context(key))
    }

    // -----------------------------------------------------------------------
    // Connection
    // -----------------------------------------------------------------------

    /// The connection to the service that issued the job.
    ///
    /// The first call bootstraps it; concurrent callers wait for that
    /// bootstrap and every caller gets the same `Arc`. If `cancel` fires
    /// first the call returns [`PluginError::Cancelled`] and a later call
    /// starts over.
    pub async fn get_connection(&self, cancel: &CancellationToken) -> Result<Arc<VssConnection>> {
        self.connection
            .get_or_try_init(|| async {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(PluginError::Cancelled),
                    connection = self.initialize_vss_connection() => connection.map(Arc::new),
                }
            })
            .await
            .map(Arc::clone)
    }

    /// The connection, if it has already been created.
    pub fn connection(&self) -> Option<Arc<VssConnection>> {
        self.connection.get().cloned()
    }

    /// Runs the bootstrap against a private copy of the HTTP settings. The
    /// copy replaces the shared settings only once the connection exists, so
    /// a failed or cancelled attempt leaves nothing behind for the retry.
    async fn initialize_vss_connection(&self) -> Result<VssConnection> {
        let mut settings = self.http_settings.read().clone();

        let mut user_agent = VssUtil::client_identification();
        user_agent.append(&mut settings.user_agent);
        settings.user_agent = user_agent;

        if let Some(cert) = self.get_cert_configuration()? {
            if let Some(manager) = cert
                .client_certificate_manager
                .filter(|m| m.archive_file().is_some())
            {
                settings.client_certificate_manager = Some(manager);
            }

            if cert.skip_server_certificate_validation {
                settings.skip_server_certificate_validation = true;
            }
        }

        if let Some(proxy) = self.get_proxy_configuration()? {
            if !proxy.proxy_address.is_empty() {
                settings.web_proxy = Some(proxy.web_proxy);
            }
        }

        let system_connection = self
            .endpoints
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(SYSTEM_VSS_CONNECTION))
            .ok_or_else(|| PluginError::SystemEndpointNotFound {
                name: SYSTEM_VSS_CONNECTION.to_string(),
            })?;

        if system_connection.url.trim().is_empty() {
            return Err(PluginError::SystemEndpointUrlEmpty {
                name: system_connection.name.clone(),
            });
        }

        let url = Url::parse(system_connection.url.trim()).map_err(|source| {
            PluginError::InvalidEndpointUrl {
                name: system_connection.name.clone(),
                url: system_connection.url.clone(),
                source,
            }
        })?;

        let credentials = self
            .credential_provider
            .get_credentials(system_connection)
            .ok_or_else(|| PluginError::CredentialsNotFound {
                name: system_connection.name.clone(),
            })?;

        tracing::debug!("Creating connection to {}", url);
        let connection = VssUtil::create_connection(url, credentials, &settings).await?;
        *self.http_settings.write() = settings;
        Ok(connection)
    }
}

impl Default for ActionPluginContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ActionPluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionPluginContext")
            .field("endpoints", &self.endpoints)
            .field("variables", &self.variables)
            .field("inputs", &self.inputs)
            .field("context", &self.context)
            .field("connected", &self.connection.initialized())
            .finish_non_exhaustive()
    }
}

impl TraceWriter for ActionPluginContext {
    fn info(&self, message: &str) {
        ActionPluginContext::info(self, message);
    }

    fn verbose(&self, message: &str) {
        ActionPluginContext::verbose(self, message);
    }

    fn warning(&self, message: &str) {
        ActionPluginContext::warning(self, message);
    }

    fn error(&self, message: &str) {
        ActionPluginContext::error(self, message);
    }
}

/// Trait for action plugins.
///
/// The context is shared, so a plugin may hand `&ActionPluginContext` to as
/// many concurrent tasks as it likes. `cancel` fires when the host is asked
/// to stop; plugins check it cooperatively and pass it to
/// [`ActionPluginContext::get_connection`].
#[async_trait]
pub trait ActionPlugin: Send + Sync {
    async fn run(&self, context: &ActionPluginContext, cancel: CancellationToken) -> anyhow::Result<()>;
}
