use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use ledger_cli::{
    parse_digest, resolve_root, run_hash, run_ingest, run_init, run_refs_get, run_refs_list,
    run_refs_set, run_replay, run_verify, run_verify_reachable, CheckReport, CliError,
    IngestInput, ReplayInput, VerifyInput,
};
use ledger_verify::Verdict;

/// Exit code for a failed verification or replay, distinct from usage and
/// environment errors.
const EXIT_CHECK_FAILED: u8 = 2;

#[derive(Parser)]
#[command(
    name = "ledger",
    version,
    about = "Append-only, content-addressed lineage ledger (minimal kernel)"
)]
struct Cli {
    /// Repo root; defaults to walking up from the working directory until a
    /// `ledger/` directory is found
    #[arg(long, value_name = "PATH", global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the ledger directory skeleton in the repo root
    Init,
    /// Compute the sha256 of a file
    Hash(HashArgs),
    /// Store an artifact and write its immutable node manifest (append-only)
    Ingest(IngestArgs),
    /// Verify a node: object hash + parent reachability, optional replay
    Verify(VerifyArgs),
    /// Verify a node and every reachable ancestor, parents first
    VerifyReachable(VerifyArgs),
    /// Replay a node's derivation and check the output hash
    Replay(ReplayArgs),
    /// Manage mutable convenience refs
    Refs(RefsArgs),
}

#[derive(Args)]
struct HashArgs {
    #[arg(value_name = "PATH")]
    path: PathBuf,
}

#[derive(Args)]
struct IngestArgs {
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Parent node id (sha256 hex); repeatable, order is semantic
    #[arg(long = "parent", value_name = "ID")]
    parents: Vec<String>,

    /// Transform name/identifier (hashed as the digest if no file is given)
    #[arg(long)]
    transform: Option<String>,

    /// Transform definition file; its digest pins the transform and its
    /// bytes are stored so the node can be replayed
    #[arg(long, value_name = "PATH")]
    transform_file: Option<PathBuf>,

    /// Replay runner argv prefix (repeatable), e.g. --runner python3
    #[arg(long = "runner", value_name = "ARG")]
    runner: Vec<String>,

    /// sha256 of an execution-environment description blob
    #[arg(long, value_name = "HEX")]
    env_digest: Option<String>,

    /// JSON object of semantic transform parameters
    #[arg(long, value_name = "JSON")]
    params_json: Option<String>,

    /// Non-semantic note stored under meta
    #[arg(long, value_name = "TEXT")]
    note: Option<String>,

    /// Disable the repo-wide ingest-session lock (not recommended)
    #[arg(long)]
    no_session_lock: bool,
}

#[derive(Args)]
struct VerifyArgs {
    #[arg(value_name = "ID")]
    id: String,

    /// Also replay derivations (requires transform blobs in the store)
    #[arg(long)]
    replay: bool,

    /// Per-replay timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Emit a JSON report instead of OK/error lines
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ReplayArgs {
    #[arg(value_name = "ID")]
    id: String,

    /// Materialize inputs/output here instead of an ephemeral workspace
    #[arg(long, value_name = "PATH")]
    workdir: Option<PathBuf>,

    /// Keep the ephemeral workspace after replay (debugging)
    #[arg(long)]
    keep: bool,

    /// Kill the transform after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Emit a JSON report instead of OK/error lines
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct RefsArgs {
    #[command(subcommand)]
    command: RefsCommands,
}

#[derive(Subcommand)]
enum RefsCommands {
    /// Point a name at a node id (last writer wins)
    Set {
        #[arg(value_name = "NAME")]
        name: String,
        #[arg(value_name = "ID")]
        id: String,
        /// Allow pointing at an id with no manifest yet
        #[arg(long)]
        allow_dangling: bool,
    },
    /// Print the node id a name points at
    Get {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Print all refs, sorted by name
    List,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, CliError> {
    match cli.command {
        Commands::Init => {
            let root = match &cli.root {
                Some(root) => root.clone(),
                None => std::env::current_dir().map_err(|_| CliError::RootNotFound)?,
            };
            let ledger_dir = run_init(&root)?;
            println!("initialized {}", ledger_dir.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Hash(args) => {
            println!("{}", run_hash(&args.path)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Ingest(args) => {
            let paths = resolve_root(cli.root.as_deref())?;
            let input = IngestInput {
                path: args.path,
                parents: args.parents,
                transform: args.transform,
                transform_file: args.transform_file,
                runner: if args.runner.is_empty() {
                    None
                } else {
                    Some(args.runner)
                },
                env_digest: args.env_digest,
                params_json: args.params_json,
                note: args.note,
                no_session_lock: args.no_session_lock,
            };
            println!("{}", run_ingest(&paths, &input)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Verify(args) => {
            let paths = resolve_root(cli.root.as_deref())?;
            let input = VerifyInput {
                id: args.id.clone(),
                replay: args.replay,
                timeout_secs: args.timeout_secs,
            };
            let verdict = run_verify(&paths, &input)?;
            finish_verdict(&args, &verdict)
        }
        Commands::VerifyReachable(args) => {
            let paths = resolve_root(cli.root.as_deref())?;
            let input = VerifyInput {
                id: args.id.clone(),
                replay: args.replay,
                timeout_secs: args.timeout_secs,
            };
            let verdict = run_verify_reachable(&paths, &input)?;
            finish_verdict(&args, &verdict)
        }
        Commands::Replay(args) => {
            let paths = resolve_root(cli.root.as_deref())?;
            let id = parse_digest(&args.id)?;
            let input = ReplayInput {
                id: args.id.clone(),
                workdir: args.workdir,
                keep: args.keep,
                timeout_secs: args.timeout_secs,
            };
            let outcome = run_replay(&paths, &input);
            let report = CheckReport::for_replay(&id, &outcome);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report).expect("report"));
            } else if report.ok {
                println!("OK");
            } else if let Some(detail) = &report.detail {
                eprintln!("{}", detail);
            }
            if report.ok {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_CHECK_FAILED))
            }
        }
        Commands::Refs(args) => {
            let paths = resolve_root(cli.root.as_deref())?;
            match args.command {
                RefsCommands::Set {
                    name,
                    id,
                    allow_dangling,
                } => {
                    run_refs_set(&paths, &name, &id, allow_dangling)?;
                    Ok(ExitCode::SUCCESS)
                }
                RefsCommands::Get { name } => {
                    println!("{}", run_refs_get(&paths, &name)?);
                    Ok(ExitCode::SUCCESS)
                }
                RefsCommands::List => {
                    for (name, id) in run_refs_list(&paths)? {
                        println!("{} {}", name, id);
                    }
                    Ok(ExitCode::SUCCESS)
                }
            }
        }
    }
}

fn finish_verdict(args: &VerifyArgs, verdict: &Verdict) -> Result<ExitCode, CliError> {
    let id = parse_digest(&args.id)?;
    let report = CheckReport::for_verdict(&id, verdict);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report).expect("report"));
    } else if report.ok {
        println!("OK");
    } else if let Some(detail) = &report.detail {
        eprintln!("{}", detail);
    }
    if report.ok {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_CHECK_FAILED))
    }
}
