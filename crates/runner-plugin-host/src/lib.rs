// runner-plugin-host: Out-of-process plugin executor.
//
// A plugin binary builds a `PluginHost`, registers its plugins and calls
// `run_main`. The runner launches it as:
//
//   <binary> action <plugin-name>
//
// and writes the serialized execution context to its stdin (one line).
// Everything the plugin reports travels back over stdout as `##[...]`
// commands; host diagnostics go to stderr through `tracing`.

use anyhow::{Context, Result};
use clap::Parser;
use runner_sdk::{ActionPlugin, ActionPluginContext, CaseInsensitiveMap, StringUtil};
use std::io::{BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The only plugin kind the runner launches through this host.
pub const ACTION_PLUGIN_TYPE: &str = "action";

/// Command-line arguments passed by the runner.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "Runner.PluginHost", about = "GitHub Actions Runner plugin host")]
pub struct HostArgs {
    /// Kind of plugin to run. Only `action` is supported.
    pub plugin_type: String,

    /// Name the plugin was registered under, optionally assembly-qualified
    /// (`Name, Assembly`).
    pub plugin_name: String,
}

impl HostArgs {
    fn validate(&self) -> Result<()> {
        if !self.plugin_type.eq_ignore_ascii_case(ACTION_PLUGIN_TYPE) {
            anyhow::bail!("Unsupported plugin type: {}", self.plugin_type);
        }
        if self.plugin_name.trim().is_empty() {
            anyhow::bail!("Plugin name must not be empty");
        }
        Ok(())
    }
}

/// Registry of the plugins a host binary can run.
#[derive(Default)]
pub struct PluginHost {
    plugins: CaseInsensitiveMap<Arc<dyn ActionPlugin>>,
}

impl PluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `plugin` under `name` (matched case-insensitively).
    pub fn register(mut self, name: impl Into<String>, plugin: impl ActionPlugin + 'static) -> Self {
        self.plugins.insert(name, Arc::new(plugin));
        self
    }

    /// Resolve a plugin by name. The runner may pass an assembly-qualified
    /// name such as `"Publish, Runner.Plugins"`; only the part before the
    /// comma is matched.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn ActionPlugin>> {
        let normalized = name.split(',').next().unwrap_or(name).trim();
        self.plugins.get(normalized).cloned()
    }

    /// Read the serialized execution context (first line of `input`).
    pub fn read_context<R: BufRead>(mut input: R) -> Result<ActionPluginContext> {
        let mut line = String::new();
        input
            .read_line(&mut line)
            .context("Failed to read execution context from stdin")?;

        let serialized = line.trim_end();
        if serialized.is_empty() {
            anyhow::bail!("Execution context from stdin must not be empty");
        }

        StringUtil::convert_from_json(serialized).context("Failed to deserialize execution context")
    }

    /// Run the plugin named in `args` against `context`.
    ///
    /// A failing plugin is reported to the runner as `##[error]`, with the
    /// full error chain added through debug output when step debug is on.
    pub async fn run(
        &self,
        args: &HostArgs,
        context: &ActionPluginContext,
        cancel: CancellationToken,
    ) -> Result<()> {
        args.validate()?;

        let plugin = self
            .resolve(&args.plugin_name)
            .ok_or_else(|| anyhow::anyhow!("Unknown plugin: {}", args.plugin_name))?;

        tracing::debug!("Running plugin {}", args.plugin_name);

        if let Err(e) = plugin.run(context, cancel).await {
            context.error(&format!("{e:#}"));
            context.debug(&format!("{e:?}"));
            anyhow::bail!("Plugin execution failed: {e:#}");
        }

        Ok(())
    }

    /// Validate `args`, read the context from `input` and run the plugin on a
    /// fresh multi-thread runtime.
    pub fn execute<R: BufRead>(&self, args: &HostArgs, input: R, cancel: CancellationToken) -> Result<()> {
        args.validate()?;
        let context = Self::read_context(input)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to build tokio runtime")?;

        runtime.block_on(self.run(args, &context, cancel))
    }

    /// Process entry point for plugin binaries.
    pub fn run_main(self) -> ExitCode {
        init_tracing();

        let cancel = CancellationToken::new();
        {
            let cancel = cancel.clone();
            if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
                tracing::warn!("Failed to install Ctrl-C handler: {}", e);
            }
        }

        let args = HostArgs::parse();
        let stdin = std::io::stdin();

        match self.execute(&args, stdin.lock(), cancel) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                report_failure(&mut std::io::stderr().lock(), &e);
                ExitCode::FAILURE
            }
        }
    }
}

/// One line per failure: the error chain, `outer: inner`.
fn report_failure<W: Write>(out: &mut W, error: &anyhow::Error) {
    let _ = writeln!(out, "{error:#}");
}

/// Diagnostics go to stderr so stdout carries nothing but protocol lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use runner_sdk::{CollectingTraceWriter, VariableValue};

    struct SaveInput;

    #[async_trait]
    impl ActionPlugin for SaveInput {
        async fn run(&self, context: &ActionPluginContext, _cancel: CancellationToken) -> Result<()> {
            let path = context.get_input("path", true)?.unwrap_or_default();
            context.set_intra_action_state("path", &path);
            Ok(())
        }
    }

    struct Fails;

    #[async_trait]
    impl ActionPlugin for Fails {
        async fn run(&self, _context: &ActionPluginContext, _cancel: CancellationToken) -> Result<()> {
            Err(anyhow::anyhow!("boom").context("upload failed"))
        }
    }

    struct WaitsForCancel;

    #[async_trait]
    impl ActionPlugin for WaitsForCancel {
        async fn run(&self, _context: &ActionPluginContext, cancel: CancellationToken) -> Result<()> {
            cancel.cancelled().await;
            anyhow::bail!("cancelled")
        }
    }

    fn host() -> PluginHost {
        PluginHost::new()
            .register("GitHub.Runner.Plugins.SaveInput", SaveInput)
            .register("Fails", Fails)
            .register("WaitsForCancel", WaitsForCancel)
    }

    fn args(plugin_type: &str, name: &str) -> HostArgs {
        HostArgs {
            plugin_type: plugin_type.to_string(),
            plugin_name: name.to_string(),
        }
    }

    fn collecting_context(json: &str) -> (ActionPluginContext, Arc<CollectingTraceWriter>) {
        let writer = Arc::new(CollectingTraceWriter::new());
        let context = PluginHost::read_context(json.as_bytes())
            .unwrap()
            .with_sink(Arc::new(runner_sdk::TraceWriterSink::new(writer.clone())));
        (context, writer)
    }

    #[test]
    fn resolve_ignores_case_and_assembly_qualifier() {
        let host = host();
        assert!(host.resolve("github.runner.plugins.saveinput").is_some());
        assert!(host
            .resolve("GitHub.Runner.Plugins.SaveInput, Runner.Plugins")
            .is_some());
        assert!(host.resolve("NoSuchPlugin").is_none());
    }

    #[test]
    fn parses_positional_args() {
        let parsed = HostArgs::try_parse_from(["Runner.PluginHost", "action", "Fails"]).unwrap();
        assert_eq!(parsed, args("action", "Fails"));
        assert!(HostArgs::try_parse_from(["Runner.PluginHost", "action"]).is_err());
    }

    #[test]
    fn read_context_rejects_empty_input() {
        let err = PluginHost::read_context("\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn read_context_rejects_invalid_json() {
        assert!(PluginHost::read_context("{not json}\n".as_bytes()).is_err());
    }

    #[test]
    fn read_context_uses_first_line() {
        let ctx = PluginHost::read_context(
            "{\"inputs\":{\"path\":\"dist\"}}\n{\"ignored\":true}\n".as_bytes(),
        )
        .unwrap();
        assert_eq!(ctx.inputs.get("PATH"), Some(&"dist".to_string()));
    }

    #[tokio::test]
    async fn runs_registered_plugin() {
        let (ctx, writer) = collecting_context(r#"{"inputs":{"Path":"out;dir"}}"#);
        host()
            .run(
                &args("Action", "GitHub.Runner.Plugins.SaveInput"),
                &ctx,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(writer.lines(), vec!["##[save-state name=path]out%3Bdir".to_string()]);
    }

    #[tokio::test]
    async fn unsupported_type_and_unknown_plugin_fail() {
        let (ctx, _) = collecting_context("{}");
        let host = host();
        let err = host
            .run(&args("task", "Fails"), &ctx, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported plugin type"));

        let err = host
            .run(&args("action", "Missing"), &ctx, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown plugin"));
    }

    #[tokio::test]
    async fn plugin_failure_is_reported_as_error_command() {
        let (ctx, writer) = collecting_context("{}");
        let result = host()
            .run(&args("action", "Fails"), &ctx, CancellationToken::new())
            .await;
        assert!(result.is_err());
        assert_eq!(writer.lines(), vec!["##[error]upload failed: boom".to_string()]);
    }

    #[tokio::test]
    async fn plugin_failure_adds_chain_when_debugging() {
        let (mut ctx, writer) = collecting_context("{}");
        ctx.variables
            .insert("ACTIONS_STEP_DEBUG", VariableValue::from("true"));
        let _ = host()
            .run(&args("action", "Fails"), &ctx, CancellationToken::new())
            .await;
        let lines = writer.lines();
        assert_eq!(lines[0], "##[error]upload failed: boom");
        assert!(lines[1..].iter().all(|l| l.starts_with("##[debug]")));
        assert!(lines.len() > 1);
    }

    #[tokio::test]
    async fn missing_required_input_fails_plugin() {
        let (ctx, writer) = collecting_context("{}");
        let result = host()
            .run(
                &args("action", "GitHub.Runner.Plugins.SaveInput"),
                &ctx,
                CancellationToken::new(),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(
            writer.lines(),
            vec!["##[error]Input required and not supplied: path".to_string()]
        );
    }

    #[tokio::test]
    async fn cancellation_reaches_plugin() {
        let (ctx, _) = collecting_context("{}");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = host()
            .run(&args("action", "WaitsForCancel"), &ctx, cancel)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn failure_is_reported_once_with_its_chain() {
        let error = anyhow::anyhow!("boom").context("Plugin execution failed");
        let mut out = Vec::new();
        report_failure(&mut out, &error);
        assert_eq!(String::from_utf8(out).unwrap(), "Plugin execution failed: boom\n");
    }

    #[test]
    fn execute_validates_args_before_reading_stdin() {
        let err = host()
            .execute(&args("task", "Fails"), "".as_bytes(), CancellationToken::new())
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported plugin type"));
    }
}
