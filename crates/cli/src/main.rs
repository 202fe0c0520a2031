// Market Pulse CLI - headless color ranking, rule checks and manual review

mod batch;
mod exit_codes;
mod read;
mod review;
mod rules;
mod util;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pulse_engine::PulseError;

use exit_codes::{
    pulse_exit_code, EXIT_ERROR, EXIT_INPUT_READ, EXIT_RULES_INVALID, EXIT_SINK, EXIT_SUCCESS,
    EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "mpulse")]
#[command(about = "Rank, filter and review market price colors")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Log progress to stderr (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Automated run: normalize, exclude by rule, rank, append to the output
    #[command(after_help = "\
Examples:
  mpulse run colors.csv --rules rules.json
  mpulse run colors.csv --rules rules.json --output processed.jsonl --json
  mpulse run colors.csv --override
  mpulse run colors.csv --config desk.toml --strict")]
    Run {
        /// Input CSV file
        input: PathBuf,

        /// Rule document (JSON) whose active rules exclude records
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Skip rule evaluation and rank every record
        #[arg(long = "override")]
        r#override: bool,

        /// Output JSON-lines file (default: config output.path)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// TOML config file
        #[arg(long, short = 'c', env = "MPULSE_CONFIG")]
        config: Option<PathBuf>,

        /// Print the batch report as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Fail without committing if any row is dropped by normalization
        #[arg(long)]
        strict: bool,
    },

    /// Manual review: import into a session, prune, and optionally save
    #[command(after_help = "\
Examples:
  mpulse review colors.csv --delete 102,108
  mpulse review colors.csv --preset-delete rules.json --preset-id 10 --save
  mpulse review colors.csv --apply-rules rules.json --rule-id 1 --rule-id 3 --save --json")]
    Review {
        /// Input CSV file
        input: PathBuf,

        /// Message ids to delete (comma-separated or repeated)
        #[arg(long, value_delimiter = ',')]
        delete: Vec<i64>,

        /// Document holding the presets named by --preset-id
        #[arg(long, value_name = "FILE", requires = "preset_id")]
        preset_delete: Option<PathBuf>,

        /// Delete every record the preset selects (repeatable)
        #[arg(long, requires = "preset_delete")]
        preset_id: Vec<i64>,

        /// Document holding the rules to apply
        #[arg(long, value_name = "FILE")]
        apply_rules: Option<PathBuf>,

        /// Apply only these rules (repeatable; default: all active rules)
        #[arg(long, requires = "apply_rules")]
        rule_id: Vec<i64>,

        /// Commit the remaining records as MANUAL
        #[arg(long)]
        save: bool,

        /// Output JSON-lines file (default: config output.path)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// TOML config file
        #[arg(long, short = 'c', env = "MPULSE_CONFIG")]
        config: Option<PathBuf>,

        /// Print the session as JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Validate or dry-run rule documents
    #[command(subcommand)]
    Rules(rules::RulesCommands),

    /// Print committed records as JSON
    #[command(after_help = "\
Examples:
  mpulse read
  mpulse read --output processed.jsonl --limit 20")]
    Read {
        /// Output JSON-lines file (default: config output.path)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Only the most recent N records
        #[arg(long)]
        limit: Option<usize>,

        /// TOML config file
        #[arg(long, short = 'c', env = "MPULSE_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  pulse-engine ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        None => {
            eprintln!("Usage: mpulse <command> [options]");
            eprintln!("       mpulse --help for more information");
            Err(CliError::usage(""))
        }
        Some(Commands::Run {
            input,
            rules,
            r#override,
            output,
            config,
            json,
            strict,
        }) => batch::cmd_run(input, rules, r#override, output, config, json, strict),
        Some(Commands::Review {
            input,
            delete,
            preset_delete,
            preset_id,
            apply_rules,
            rule_id,
            save,
            output,
            config,
            json,
        }) => review::cmd_review(review::ReviewArgs {
            input,
            delete,
            preset_delete,
            preset_ids: preset_id,
            apply_rules,
            rule_ids: rule_id,
            save,
            output,
            config,
            json,
        }),
        Some(Commands::Rules(cmd)) => rules::cmd_rules(cmd),
        Some(Commands::Read {
            output,
            limit,
            config,
        }) => read::cmd_read(output, limit, config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Self::new(EXIT_INPUT_READ, msg)
    }

    pub fn rules(msg: impl Into<String>) -> Self {
        Self::new(EXIT_RULES_INVALID, msg)
    }

    pub fn sink(msg: impl Into<String>) -> Self {
        Self::new(EXIT_SINK, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(EXIT_ERROR, msg)
    }

    /// Error from the engine, with the exit code registered for its kind.
    pub fn engine(err: PulseError) -> Self {
        let hint = match &err {
            PulseError::EmptyCommit(_) => {
                Some("every record was deleted or excluded; nothing to save".to_string())
            }
            PulseError::ConfigValidation(_) => {
                Some("each alias may belong to one column only".to_string())
            }
            PulseError::RuleEvaluation { .. } => {
                Some("run `mpulse rules validate <file>` to check every rule".to_string())
            }
            _ => None,
        };
        Self { code: pulse_exit_code(&err), message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<PulseError> for CliError {
    fn from(err: PulseError) -> Self {
        Self::engine(err)
    }
}
