//! gitspace - git-backed workspace storage
//!
//! command-line front end over [`WorkspaceStore`]. Every command prints its
//! result as JSON on stdout; logs and errors go to stderr.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use gitspace::storage::{GitSignature, StorageError, StoreConfig, WorkspaceStore};

#[derive(Parser)]
#[command(name = "gitspace", version, about = "Git-backed workspace storage")]
struct Cli {
    /// Directory holding one `<slug>.git` repository per workspace
    #[arg(long, env = "REPOS_PATH", global = true)]
    root: Option<PathBuf>,

    /// Lock timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct Author {
    /// Author name
    #[arg(long, default_value = "gitspace-cli")]
    author: String,

    /// Author email
    #[arg(long, default_value = "cli@gitspace.local")]
    email: String,
}

impl Author {
    fn signature(&self) -> GitSignature {
        GitSignature::new(&self.author, &self.email)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Create a workspace with a seed README
    Create { slug: String },
    /// Copy a workspace into a new, independent one
    Fork { from: String, to: String },
    /// Print a file from the working tree, or from a branch/commit with --rev
    Read {
        slug: String,
        path: String,
        #[arg(long)]
        rev: Option<String>,
    },
    /// Write a file (content from --content or stdin) and commit it
    Write {
        slug: String,
        path: String,
        #[arg(long)]
        content: Option<String>,
        #[arg(short, long, default_value = "")]
        message: String,
        #[command(flatten)]
        author: Author,
    },
    /// Delete a file and commit the removal
    Rm {
        slug: String,
        path: String,
        #[arg(short, long, default_value = "")]
        message: String,
        #[command(flatten)]
        author: Author,
    },
    /// List commits from HEAD, newest first
    Log {
        slug: String,
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one commit
    Show { slug: String, hash: String },
    /// Create a branch at HEAD
    Branch { slug: String, name: String },
    /// List branches
    Branches { slug: String },
    /// Diff a commit against its first parent
    Diff { slug: String, hash: String },
    /// Diff what SOURCE changes relative to TARGET
    Compare { slug: String, source: String, target: String },
    /// Merge SOURCE into TARGET (overwrite union)
    Merge {
        slug: String,
        source: String,
        target: String,
        #[arg(short, long)]
        message: Option<String>,
        #[command(flatten)]
        author: Author,
    },
    /// List files on a branch (HEAD by default)
    Files {
        slug: String,
        #[arg(long)]
        branch: Option<String>,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error ({}): {}", e.kind(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = StoreConfig::from_env()?;
    if let Some(root) = cli.root {
        config.root = root;
    }
    if let Some(ms) = cli.timeout_ms {
        config.lock_timeout = std::time::Duration::from_millis(ms);
    }
    let store = WorkspaceStore::open(config)?;

    match cli.command {
        Command::Create { slug } => {
            let path = store.create_repository(&slug)?;
            print_json(&serde_json::json!({ "slug": slug, "path": path }))
        }
        Command::Fork { from, to } => {
            let path = store.duplicate_repository(&from, &to)?;
            print_json(&serde_json::json!({ "slug": to, "forked_from": from, "path": path }))
        }
        Command::Read { slug, path, rev } => {
            let content = match rev {
                Some(rev) => store.read_file_at(&slug, &rev, &path)?,
                None => store.read_file(&slug, &path)?,
            };
            print_json(&serde_json::json!({
                "path": path,
                "content": String::from_utf8_lossy(&content),
            }))
        }
        Command::Write {
            slug,
            path,
            content,
            message,
            author,
        } => {
            let content = match content {
                Some(c) => c.into_bytes(),
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf).map_err(CliError::Stdin)?;
                    buf
                }
            };
            print_json(&store.write_file(&slug, &path, content, &message, &author.signature())?)
        }
        Command::Rm {
            slug,
            path,
            message,
            author,
        } => print_json(&store.delete_file(&slug, &path, &message, &author.signature())?),
        Command::Log { slug, limit } => print_json(&store.list_commits(&slug, limit)?),
        Command::Show { slug, hash } => print_json(&store.get_commit(&slug, &hash)?),
        Command::Branch { slug, name } => {
            store.create_branch(&slug, &name)?;
            print_json(&serde_json::json!({ "slug": slug, "branch": name }))
        }
        Command::Branches { slug } => print_json(&store.list_branches(&slug)?),
        Command::Diff { slug, hash } => print_json(&store.diff_commit(&slug, &hash)?),
        Command::Compare { slug, source, target } => print_json(&store.diff_branches(&slug, &source, &target)?),
        Command::Merge {
            slug,
            source,
            target,
            message,
            author,
        } => print_json(&store.merge(&slug, &source, &target, &author.signature(), message.as_deref())?),
        Command::Files { slug, branch } => print_json(&store.list_files(&slug, branch.as_deref())?),
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to read stdin: {0}")]
    Stdin(std::io::Error),

    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    fn kind(&self) -> String {
        match self {
            CliError::Storage(e) => e.kind().to_string(),
            CliError::Stdin(_) | CliError::Output(_) => "cli".to_string(),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
