//! Output rendering for command results

use std::io::{self, Write};

use seclabel_errors::LabelError;
use seclabel_events::FailureContext;
use seclabel_platform::SecurityContext;
use serde::Serialize;

use crate::error::CliError;

/// Shown in plain output when a lookup found no context
const NO_CONTEXT: &str = "<<none>>";

/// Result of a command, before rendering
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandOutput {
    /// One context for one subject (process, file, socket peer)
    Context {
        subject: String,
        context: Option<SecurityContext>,
    },
    /// Policy defaults for a list of paths
    Matches { results: Vec<PathMatch> },
}

#[derive(Debug, Serialize)]
pub struct PathMatch {
    pub path: String,
    pub context: Option<SecurityContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureContext>,
}

impl PathMatch {
    pub fn new(path: String, outcome: Result<Option<SecurityContext>, LabelError>) -> Self {
        match outcome {
            Ok(context) => Self {
                path,
                context,
                error: None,
            },
            Err(err) => Self {
                path,
                context: None,
                error: Some(FailureContext::from_label_error(&err)),
            },
        }
    }
}

/// Renders results as plain text or JSON
pub struct OutputRenderer {
    json: bool,
}

impl OutputRenderer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn render(&self, output: &CommandOutput) -> Result<(), CliError> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if self.json {
            serde_json::to_writer_pretty(&mut out, output).map_err(io::Error::from)?;
            writeln!(out)?;
            return Ok(());
        }

        match output {
            CommandOutput::Context { context, .. } => {
                writeln!(out, "{}", context.as_ref().map_or(NO_CONTEXT, SecurityContext::as_str))?;
            }
            CommandOutput::Matches { results } => {
                for result in results {
                    match (&result.context, &result.error) {
                        (_, Some(failure)) => {
                            writeln!(out, "{}\t<<error: {}>>", result.path, failure.message)?;
                        }
                        (Some(context), None) => writeln!(out, "{}\t{context}", result.path)?,
                        (None, None) => writeln!(out, "{}\t{NO_CONTEXT}", result.path)?,
                    }
                }
            }
        }
        Ok(())
    }
}
