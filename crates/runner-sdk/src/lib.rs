// runner-sdk: the contract between the runner and an out-of-process plugin.
// Holds the plugin execution context, the `##[...]` command encoder, the
// context tree accessor, certificate/proxy resolution and the lazily created
// service connection.

pub mod action_command;
pub mod action_plugin;
pub mod build_constants;
pub mod case_insensitive;
pub mod certificate_settings;
pub mod context_data;
pub mod error;
pub mod string_util;
pub mod trace;
pub mod vss_connection;
pub mod vss_util;
pub mod web_proxy;

// Re-export commonly used items at crate root
pub use action_plugin::{
    ActionPlugin, ActionPluginContext, EndpointAuthorization, ServiceEndpoint, VariableValue,
};
pub use build_constants::RunnerPackage;
pub use case_insensitive::CaseInsensitiveMap;
pub use certificate_settings::{RunnerCertificateSettings, RunnerClientCertificateManager};
pub use context_data::{DictionaryContextData, PipelineContextData};
pub use error::PluginError;
pub use string_util::StringUtil;
pub use trace::{
    CollectingTraceWriter, OutputSink, StdoutSink, TraceLevel, TraceWriter, TraceWriterSink,
};
pub use vss_connection::VssConnection;
pub use vss_util::{
    CredentialProvider, EndpointCredentialProvider, VssClientHttpRequestSettings, VssCredentials,
    VssUtil,
};
pub use web_proxy::{RunnerWebProxy, RunnerWebProxySettings};
