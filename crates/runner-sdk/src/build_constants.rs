/// Build-time metadata for the plugin SDK.
#[derive(Debug, Clone)]
pub struct RunnerPackage;

impl RunnerPackage {
    /// The runner version plugins report in their client identification.
    /// `RUNNER_VERSION` at compile time overrides the crate version.
    pub const VERSION: &'static str = match option_env!("RUNNER_VERSION") {
        Some(v) => v,
        None => env!("CARGO_PKG_VERSION"),
    };
}
