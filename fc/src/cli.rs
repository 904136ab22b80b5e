//! CLI argument parsing for fc

use clap::{Parser, Subcommand};
use eyre::{Result, eyre};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fc")]
#[command(author, version, about = "Inspect and batch-update persisted filter values", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the filter store (overrides config)
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List all persisted filter values
    List,

    /// Show one persisted filter value
    Get {
        /// Filter key (without the persistence prefix)
        #[arg(required = true)]
        key: String,
    },

    /// Set one or more filter values in a single batch
    Set {
        /// Assignments as key=value; values are parsed as JSON, else taken as strings
        #[arg(required = true)]
        assignments: Vec<String>,
    },
}

/// Parse a `key=value` assignment
pub fn parse_assignment(input: &str) -> Result<(String, Value)> {
    let (key, raw) = input
        .split_once('=')
        .ok_or_else(|| eyre!("Invalid assignment '{}', expected key=value", input))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(eyre!("Invalid assignment '{}', key is empty", input));
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_json_values() {
        assert_eq!(parse_assignment("page=5").unwrap(), ("page".to_string(), json!(5)));
        assert_eq!(parse_assignment("open=true").unwrap(), ("open".to_string(), json!(true)));
        assert_eq!(parse_assignment("tags=[\"a\"]").unwrap(), ("tags".to_string(), json!(["a"])));
        assert_eq!(parse_assignment("status=null").unwrap(), ("status".to_string(), Value::Null));
    }

    #[test]
    fn test_parse_falls_back_to_string() {
        assert_eq!(parse_assignment("status=open").unwrap(), ("status".to_string(), json!("open")));
        assert_eq!(parse_assignment("q=a=b").unwrap(), ("q".to_string(), json!("a=b")));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_assignment("status").is_err());
        assert!(parse_assignment("=open").is_err());
    }

    #[test]
    fn test_cli_parses_set() {
        let cli = Cli::parse_from(["fc", "--store", "/tmp/f.json", "set", "a=1", "b=x"]);
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/f.json")));
        match cli.command {
            Command::Set { assignments } => assert_eq!(assignments, vec!["a=1", "b=x"]),
            other => panic!("Wrong command: {:?}", other),
        }
    }
}
