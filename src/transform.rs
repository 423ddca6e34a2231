//! The stylesheet engine seam used by the Transform action.
//!
//! XSLT execution itself is an external collaborator; the core only consumes
//! this trait. The default implementation shells out to an XSLT processor
//! (`xsltproc` unless configured otherwise), reading the document on stdin
//! and the transformed document on stdout.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::HarvestError;

pub trait StylesheetEngine: Send + Sync {
    /// Apply the precompiled stylesheet identified by `stylesheet` to the
    /// document, returning the transformed document.
    fn transform(&self, stylesheet: &Path, document: &str) -> Result<String, HarvestError>;
}

/// Runs an external XSLT processor: `{command} {stylesheet} -`.
pub struct CommandEngine {
    command: String,
}

impl CommandEngine {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for CommandEngine {
    fn default() -> Self {
        Self::new("xsltproc")
    }
}

impl StylesheetEngine for CommandEngine {
    fn transform(&self, stylesheet: &Path, document: &str) -> Result<String, HarvestError> {
        let mut child = Command::new(&self.command)
            .arg(stylesheet)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| HarvestError::Pipeline(format!("cannot run {}: {e}", self.command)))?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(document.as_bytes())
                .map_err(|e| HarvestError::Pipeline(format!("{}: {e}", self.command)))?;
        }
        drop(child.stdin.take());

        let output = child
            .wait_with_output()
            .map_err(|e| HarvestError::Pipeline(format!("{}: {e}", self.command)))?;
        if !output.status.success() {
            return Err(HarvestError::Pipeline(format!(
                "{} {} failed: {}",
                self.command,
                stylesheet.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|e| HarvestError::Pipeline(format!("{}: non-UTF-8 output: {e}", self.command)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_engine_pipes_the_document_through() {
        // cat ignores /dev/null and copies stdin, standing in for a
        // processor that happens to apply the identity transform
        let engine = CommandEngine::new("cat");
        let out = engine
            .transform(Path::new("/dev/null"), "<doc>payload</doc>")
            .unwrap();
        assert_eq!(out, "<doc>payload</doc>");
    }

    #[test]
    fn missing_processor_is_a_pipeline_error() {
        let engine = CommandEngine::new("definitely-not-an-xslt-processor");
        let err = engine
            .transform(Path::new("style.xsl"), "<doc/>")
            .unwrap_err();
        assert!(matches!(err, HarvestError::Pipeline(_)));
    }
}
