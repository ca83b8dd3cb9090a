use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use tether_core::{Outcome, ProcessResult, ProcessSpec, TetherError};
use tether_runner::ProcessRunner;

const CONFIG_TEMPLATE: &str = r#"# tether.toml - defaults for `tether run`

# Wall-clock timeout in seconds. Remove to wait forever.
timeout_secs = 300

# Working directory for the child process. Defaults to the current directory.
# working_dir = "/path/to/project"

# Extra environment entries added on top of the parent environment.
[env]
# CI = "true"
"#;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Run external processes under a wall-clock bound", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command under the harness and report its outcome
    Run {
        /// Wall-clock timeout in seconds (unset = wait forever)
        #[arg(short, long)]
        timeout_secs: Option<u64>,

        /// Working directory for the child process
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Extra environment entry, KEY=VALUE (repeatable)
        #[arg(short, long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        /// Print the result as JSON instead of human-readable text
        #[arg(long)]
        json: bool,

        /// Path to a config file with default settings
        #[arg(long, default_value = "tether.toml")]
        config: PathBuf,

        /// Program to run, followed by its arguments
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    /// Generate a tether.toml template
    Init,
}

/// Optional defaults loaded from tether.toml; flags win over file values.
#[derive(Debug, Default, Deserialize)]
struct Config {
    timeout_secs: Option<u64>,
    working_dir: Option<PathBuf>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            timeout_secs,
            cwd,
            env,
            json,
            config,
            command,
        } => {
            run_command(command, timeout_secs, cwd, env, json, config).await?;
        }
        Commands::Init => {
            generate_config_template()?;
        }
    }

    Ok(())
}

async fn run_command(
    command: Vec<String>,
    timeout_secs: Option<u64>,
    cwd: Option<PathBuf>,
    env: Vec<String>,
    json: bool,
    config_path: PathBuf,
) -> anyhow::Result<()> {
    let config = load_config(&config_path)?;
    let env_pairs = parse_env_pairs(&env)?;
    let spec = build_spec(&command, timeout_secs, cwd, env_pairs, &config);

    let runner = ProcessRunner::new();
    let result = runner.execute(&spec).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    // Nonzero child exit fails the invocation; stderr content alone only
    // warns (see print_result). Timeout and launch failure get the
    // conventional 124 / 127.
    let code = exit_code_for(&result.outcome);
    if code != 0 {
        process::exit(code);
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))
}

fn parse_env_pairs(pairs: &[String]) -> Result<Vec<(String, String)>, TetherError> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| {
                    TetherError::InvalidConfiguration(format!(
                        "environment entry '{}' is not KEY=VALUE",
                        pair
                    ))
                })
        })
        .collect()
}

fn build_spec(
    command: &[String],
    timeout_secs: Option<u64>,
    cwd: Option<PathBuf>,
    env_pairs: Vec<(String, String)>,
    config: &Config,
) -> ProcessSpec {
    let mut spec = ProcessSpec::new(resolve_program(&command[0])).args(command[1..].iter().cloned());

    if let Some(dir) = cwd.or_else(|| config.working_dir.clone()) {
        spec = spec.working_dir(dir);
    }
    if let Some(secs) = timeout_secs.or(config.timeout_secs) {
        spec = spec.timeout(Duration::from_secs(secs));
    }
    for (key, value) in &config.env {
        spec = spec.env(key, value);
    }
    for (key, value) in env_pairs {
        spec = spec.env(key, value);
    }

    spec
}

fn resolve_program(program: &str) -> String {
    // Resolution failures are left to the harness, which reports them as a
    // LaunchFailed outcome rather than a CLI error.
    which::which(program)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| program.to_string())
}

fn exit_code_for(outcome: &Outcome) -> i32 {
    match outcome {
        Outcome::Completed { exit_code } => *exit_code,
        Outcome::TimedOut => 124,
        Outcome::LaunchFailed { .. } => 127,
    }
}

fn print_result(result: &ProcessResult) {
    println!("Execution: {}", result.id);
    println!("Outcome: {}", format_outcome(&result.outcome));
    println!("Duration: {}ms", result.duration_ms);

    if !result.stdout.is_empty() {
        println!("\nStdout:\n{}", result.stdout.trim_end());
    }
    if result.stderr_had_output {
        eprintln!("\nStderr:\n{}", result.stderr.trim_end());
    }
    if result.success() && result.stderr_had_output {
        eprintln!("\nWarning: process succeeded but wrote to stderr");
    }
}

fn format_outcome(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Completed { exit_code } => format!("COMPLETED (exit code {})", exit_code),
        Outcome::TimedOut => "TIMED OUT".to_string(),
        Outcome::LaunchFailed { cause } => format!("LAUNCH FAILED ({})", cause),
    }
}

fn generate_config_template() -> anyhow::Result<()> {
    let path = "tether.toml";
    if Path::new(path).exists() {
        eprintln!("Error: tether.toml already exists at {}", path);
        eprintln!("Use a different filename or remove the existing file.");
        process::exit(1);
    }

    fs::write(path, CONFIG_TEMPLATE)?;
    println!("✓ Created tether.toml template at {}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_pairs() {
        let pairs =
            parse_env_pairs(&["A=1".to_string(), "B=two=2".to_string()]).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two=2".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_env_pairs_rejects_missing_separator() {
        assert!(parse_env_pairs(&["NOVALUE".to_string()]).is_err());
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code_for(&Outcome::Completed { exit_code: 0 }), 0);
        assert_eq!(exit_code_for(&Outcome::Completed { exit_code: 7 }), 7);
        assert_eq!(exit_code_for(&Outcome::TimedOut), 124);
        assert_eq!(
            exit_code_for(&Outcome::LaunchFailed {
                cause: "missing".to_string()
            }),
            127
        );
    }

    #[test]
    fn test_config_template_is_valid_toml() {
        let config: Config = toml::from_str(CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.timeout_secs, Some(300));
        assert_eq!(config.working_dir, None);
        assert!(config.env.is_empty());
    }

    #[test]
    fn test_flags_override_config_defaults() {
        let config = Config {
            timeout_secs: Some(60),
            working_dir: Some(PathBuf::from("/from-config")),
            env: BTreeMap::from([("CI".to_string(), "true".to_string())]),
        };
        let command = vec!["some-program".to_string(), "--flag".to_string()];
        let spec = build_spec(
            &command,
            Some(5),
            None,
            vec![("EXTRA".to_string(), "1".to_string())],
            &config,
        );

        assert_eq!(spec.timeout, Some(Duration::from_secs(5)));
        assert_eq!(spec.working_dir, PathBuf::from("/from-config"));
        assert_eq!(spec.args, vec!["--flag"]);
        // Config entries first, CLI entries appended after.
        assert_eq!(
            spec.env,
            vec![
                ("CI".to_string(), "true".to_string()),
                ("EXTRA".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_config_defaults_apply_when_no_flags() {
        let config = Config {
            timeout_secs: Some(60),
            working_dir: None,
            env: BTreeMap::new(),
        };
        let command = vec!["some-program".to_string()];
        let spec = build_spec(&command, None, None, Vec::new(), &config);

        assert_eq!(spec.timeout, Some(Duration::from_secs(60)));
        assert_eq!(spec.working_dir, PathBuf::from("."));
        assert!(spec.args.is_empty());
    }
}
