//! Engine command assembly with per-argument secrecy masking

use buildpod_config::EngineEndpoint;
use std::collections::HashMap;

/// One command-line argument and whether it may be rendered in logs.
#[derive(Debug, Clone)]
pub struct CommandArg {
    pub value: String,
    pub secret: bool,
}

/// An ordered, maskable argument list for one engine invocation.
///
/// Built fresh per call and never reused: masking state is positional, so
/// recycling a spec across invocations would leak or misplace secrets.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    args: Vec<CommandArg>,
    env: HashMap<String, String>,
    /// Stream stdout lines to the log sink instead of capturing them
    /// (pull/build progress)
    pub forward_stdout: bool,
}

impl CommandSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(&mut self, value: impl Into<String>) -> &mut Self {
        self.args.push(CommandArg {
            value: value.into(),
            secret: false,
        });
        self
    }

    pub fn arg_masked(&mut self, value: impl Into<String>, secret: bool) -> &mut Self {
        self.args.push(CommandArg {
            value: value.into(),
            secret,
        });
        self
    }

    pub fn env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The binary to launch (always the first argument).
    pub fn program(&self) -> Option<&str> {
        self.args.first().map(|a| a.value.as_str())
    }

    /// Arguments after the program, in order, unmasked.
    pub fn argv(&self) -> impl Iterator<Item = &str> {
        self.args.iter().skip(1).map(|a| a.value.as_str())
    }

    pub fn args(&self) -> &[CommandArg] {
        &self.args
    }

    pub fn envs(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// Render the command line with secret arguments replaced.
    ///
    /// This is the only form that may ever reach a log.
    pub fn masked(&self) -> String {
        self.args
            .iter()
            .map(|a| if a.secret { "******" } else { a.value.as_str() })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.masked())
    }
}

/// Start a command spec for the configured engine: the binary name first,
/// then `-H <uri>` when a remote endpoint is configured. Endpoint
/// environment overrides are attached to the spec.
pub fn engine_command(endpoint: &EngineEndpoint) -> CommandSpec {
    let mut spec = CommandSpec::new();
    spec.arg(&endpoint.binary);
    if let Some(uri) = &endpoint.uri {
        spec.arg("-H");
        spec.arg(uri);
    }
    for (key, value) in &endpoint.env {
        spec.env(key, value);
    }
    spec
}
