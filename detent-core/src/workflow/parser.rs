use crate::workflow::models::Workflow;
use crate::CoreResult;

use std::fs;
use std::path::Path;

/// Bytes inspected when deciding whether a document looks binary.
pub const BINARY_SNIFF_BYTES: usize = 8 * 1024;

/// Parser and writer for GitHub Actions workflow YAML files.
pub struct WorkflowParser;

impl WorkflowParser {
    /// Parse a workflow from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> CoreResult<Workflow> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a workflow from a YAML string.
    pub fn parse(content: &str) -> CoreResult<Workflow> {
        let workflow: Workflow = serde_yaml::from_str(content)?;
        Ok(workflow)
    }

    /// Serialize a (possibly instrumented) workflow back to YAML.
    pub fn to_yaml(workflow: &Workflow) -> CoreResult<String> {
        Ok(serde_yaml::to_string(workflow)?)
    }

    /// Heuristic binary check: a NUL byte near the start of the file.
    pub fn looks_binary(bytes: &[u8]) -> bool {
        bytes.iter().take(BINARY_SNIFF_BYTES).any(|&b| b == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_workflow() {
        let yaml = r#"
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: echo "Hello"
"#;
        let workflow = WorkflowParser::parse(yaml).unwrap();
        assert!(workflow.name.is_none());
        assert!(workflow.jobs.contains_key("build"));
    }

    #[test]
    fn test_parse_rejects_document_without_jobs() {
        let yaml = "name: not a workflow\non: push\n";
        assert!(WorkflowParser::parse(yaml).is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_yaml() {
        let yaml = "jobs:\n  build:\n    steps: [\n";
        assert!(WorkflowParser::parse(yaml).is_err());
    }

    #[test]
    fn test_to_yaml_keeps_trigger_key() {
        let yaml = r#"
on:
  pull_request:
    branches: [main]
jobs:
  lint:
    steps:
      - run: cargo clippy
"#;
        let workflow = WorkflowParser::parse(yaml).unwrap();
        let written = WorkflowParser::to_yaml(&workflow).unwrap();
        assert!(written.contains("pull_request"));

        let reparsed = WorkflowParser::parse(&written).unwrap();
        assert!(reparsed.extra.contains_key("on"));
        assert_eq!(reparsed.jobs["lint"].steps().len(), 1);
    }

    #[test]
    fn test_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("ci.yml");
        fs::write(&path, "on: push\njobs:\n  a:\n    steps:\n      - run: true\n").unwrap();

        let workflow = WorkflowParser::from_file(&path).unwrap();
        assert!(workflow.jobs.contains_key("a"));
    }

    #[test]
    fn test_looks_binary() {
        assert!(WorkflowParser::looks_binary(b"jobs:\0\x01"));
        assert!(!WorkflowParser::looks_binary(b"jobs: {}\n"));
    }
}
