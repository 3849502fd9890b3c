use crate::{config::Config, util::sorted_files};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One document as written by the pipeline: `{"text": ..., "metadata": {...}}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OcrRecord {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty_map")]
    pub metadata: Map<String, Value>,
}

fn null_as_empty_map<'de, D>(de: D) -> Result<Map<String, Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(de)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    NoResultsDir {
        dir: PathBuf,
    },
    NoOutputFile {
        dir: PathBuf,
    },
    EmptyOutput {
        path: PathBuf,
    },
    Invalid {
        path: PathBuf,
        error: String,
    },
    Parsed {
        path: PathBuf,
        /// How many files matched; only the first is consumed.
        candidates: usize,
        text: String,
        record: OcrRecord,
    },
}

impl fmt::Display for ParseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseOutcome::NoResultsDir { dir } => write!(
                f,
                "pipeline completed with no results directory ({})",
                dir.display()
            ),
            ParseOutcome::NoOutputFile { dir } => write!(
                f,
                "pipeline completed with no output file in {}",
                dir.display()
            ),
            ParseOutcome::EmptyOutput { path } => {
                write!(f, "output file empty: {}", path.display())
            }
            ParseOutcome::Invalid { path, error } => write!(
                f,
                "failed to parse output file {}: {}",
                path.display(),
                error
            ),
            ParseOutcome::Parsed { path, .. } => write!(f, "parsed {}", path.display()),
        }
    }
}

/// Finds the pipeline's output file in `results_dir` (normally
/// `<workspace>/<results.dir_name>`, see `Job::results_dir`) and parses its
/// first record. Every failure is folded into the outcome.
pub fn locate_and_parse(cfg: &Config, results_dir: &Path) -> ParseOutcome {
    let dir = results_dir.to_path_buf();
    if !dir.is_dir() {
        return ParseOutcome::NoResultsDir { dir };
    }

    let files = match locate_output_files(cfg, &dir) {
        Ok(files) => files,
        Err(err) => {
            warn!("listing {} failed: {err:#}", dir.display());
            Vec::new()
        }
    };
    let Some(path) = files.first().cloned() else {
        return ParseOutcome::NoOutputFile { dir };
    };
    if files.len() > 1 {
        warn!(
            "{} output files found; using {}",
            files.len(),
            path.display()
        );
    }

    match std::fs::read_to_string(&path) {
        Ok(raw) => parse_output(cfg, &path, &raw, files.len()),
        Err(err) => ParseOutcome::Invalid {
            error: format!("read failed: {err}"),
            path,
        },
    }
}

/// Output files in `dir` matching `<prefix>*<suffix>`, sorted by name.
pub fn locate_output_files(cfg: &Config, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let prefix = cfg.results.file_prefix.as_str();
    let suffix = cfg.results.file_suffix.as_str();
    sorted_files(dir, |name| {
        name.len() >= prefix.len() + suffix.len()
            && name.starts_with(prefix)
            && name.ends_with(suffix)
    })
}

/// Parses the first non-blank line of a JSONL document.
pub fn parse_output(cfg: &Config, path: &Path, raw: &str, candidates: usize) -> ParseOutcome {
    let Some(first) = raw.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return ParseOutcome::EmptyOutput {
            path: path.to_path_buf(),
        };
    };
    let extra = raw.lines().filter(|l| !l.trim().is_empty()).count() - 1;
    if extra > 0 {
        debug!("{} ignoring {extra} further record(s)", path.display());
    }

    let value = match serde_json::from_str::<Value>(first) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(other) => {
            return ParseOutcome::Invalid {
                path: path.to_path_buf(),
                error: format!("expected a JSON object, found {}", json_kind(&other)),
            };
        }
        Err(err) => {
            return ParseOutcome::Invalid {
                path: path.to_path_buf(),
                error: err.to_string(),
            };
        }
    };

    match serde_json::from_value::<OcrRecord>(value) {
        Ok(record) => {
            let text = record
                .text
                .clone()
                .unwrap_or_else(|| cfg.results.missing_text.clone());
            ParseOutcome::Parsed {
                path: path.to_path_buf(),
                candidates,
                text,
                record,
            }
        }
        Err(err) => ParseOutcome::Invalid {
            path: path.to_path_buf(),
            error: err.to_string(),
        },
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_metadata_becomes_empty() {
        let cfg = Config::default();
        let out = parse_output(
            &cfg,
            Path::new("output_a.jsonl"),
            r#"{"text": null, "metadata": null}"#,
            1,
        );
        match out {
            ParseOutcome::Parsed { text, record, .. } => {
                assert_eq!(text, "no text found");
                assert!(record.metadata.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn only_first_record_is_consumed() {
        let cfg = Config::default();
        let raw = "\n{\"text\":\"one\"}\n{\"text\":\"two\"}\n";
        match parse_output(&cfg, Path::new("output_a.jsonl"), raw, 1) {
            ParseOutcome::Parsed { text, .. } => assert_eq!(text, "one"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_object_is_invalid() {
        let cfg = Config::default();
        let out = parse_output(&cfg, Path::new("output_a.jsonl"), "[1,2]", 1);
        assert!(matches!(out, ParseOutcome::Invalid { .. }));
    }

    #[test]
    fn well_typed_array_is_still_invalid() {
        let cfg = Config::default();
        let out = parse_output(
            &cfg,
            Path::new("output_a.jsonl"),
            r#"["Hello", {"pages": 1}]"#,
            1,
        );
        match out {
            ParseOutcome::Invalid { error, .. } => {
                assert_eq!(error, "expected a JSON object, found an array")
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
