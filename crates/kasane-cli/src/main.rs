//! kasane binary
//!
//! Browse and edit a directory through the kasane file node layer.
//!
//! ## Usage
//!
//! ```bash
//! kasane --root ./data ls -r /
//! echo hello | kasane --root ./data put /notes/hello.txt
//! kasane --root ./data cp /notes /backup/notes
//! kasane --root ./data import ~/Documents /docs
//! kasane --root ./data replicate /docs -- ls -la
//! ```

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use kasane_vfs::{
    AllSelector, ChildrenSelector, FileNode, FileSelector, FileSystem, FileType, LocalBackend,
    SelfAndChildrenSelector, VfsConfig,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Virtual filesystem over a local directory.
#[derive(Parser, Debug)]
#[command(name = "kasane")]
#[command(about = "Browse and edit a directory through kasane file nodes")]
struct Args {
    /// Directory the virtual root maps to
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List a folder
    Ls {
        /// List the whole subtree
        #[arg(short, long)]
        recursive: bool,
        #[arg(default_value = "/")]
        path: String,
    },
    /// Print a file to stdout
    Cat { path: String },
    /// Write stdin to a file, creating parent folders
    Put { path: String },
    /// Create a folder and its parents
    Mkdir { path: String },
    /// Create an empty file if it does not exist
    Touch { path: String },
    /// Delete a file or a whole subtree
    Rm { path: String },
    /// Copy a file or subtree
    Cp { src: String, dst: String },
    /// Copy a local directory tree into the file system
    Import { local_dir: PathBuf, dst: String },
    /// Show type, size and modification time
    Stat { path: String },
    /// Replicate a subtree to local disk and run a command on it
    Replicate {
        path: String,
        /// Command to run; the replica path is appended as the last argument
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("kasane: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => VfsConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => VfsConfig::default(),
    };
    let fs = open(&args.root, config.clone())?;
    tracing::debug!(root = %args.root.display(), "opened file system");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = match args.command {
        Cmd::Ls { recursive, path } => ls(&fs, &path, recursive, &mut out),
        Cmd::Cat { path } => cat(&fs, &path, &mut out),
        Cmd::Put { path } => put(&fs, &path, &mut io::stdin().lock()),
        Cmd::Mkdir { path } => create(&fs, &path, FileType::Folder),
        Cmd::Touch { path } => create(&fs, &path, FileType::File),
        Cmd::Rm { path } => rm(&fs, &path, &mut out),
        Cmd::Cp { src, dst } => cp(&fs, &fs, &src, &dst, &mut out),
        Cmd::Import { local_dir, dst } => {
            let source = open(&local_dir, config)?;
            cp(&source, &fs, "/", &dst, &mut out)
        }
        Cmd::Stat { path } => stat(&fs, &path, &mut out),
        Cmd::Replicate { path, command } => replicate(&fs, &path, &command),
    };

    let closed = fs.close().context("closing file system");
    result.and(closed)
}

fn open(root: &Path, config: VfsConfig) -> Result<Arc<FileSystem>> {
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    Ok(FileSystem::builder(LocalBackend::new(root))
        .config(config)
        .build())
}

fn ls(fs: &FileSystem, path: &str, recursive: bool, out: &mut impl Write) -> Result<()> {
    let node = fs.resolve(path)?;
    let selector: &dyn FileSelector = match (recursive, node.file_type()?) {
        (_, FileType::File) => &SelfAndChildrenSelector,
        (true, FileType::Folder) => &AllSelector,
        (false, FileType::Folder) => &ChildrenSelector,
    };

    for file in node.find_files(selector, false)? {
        if recursive && Arc::ptr_eq(&file, &node) && file.file_type()? == FileType::Folder {
            continue;
        }
        let suffix = if file.file_type()? == FileType::Folder { "/" } else { "" };
        writeln!(out, "{}{suffix}", file.name())?;
    }
    Ok(())
}

fn cat(fs: &FileSystem, path: &str, out: &mut impl Write) -> Result<()> {
    let mut reader = fs.resolve(path)?.content()?.input_stream()?;
    io::copy(&mut reader, out)?;
    reader.close()?;
    Ok(())
}

fn put(fs: &FileSystem, path: &str, input: &mut impl Read) -> Result<()> {
    let mut writer = fs.resolve(path)?.output_stream()?;
    let written = io::copy(input, &mut writer)?;
    writer.close()?;
    tracing::info!(path, bytes = written, "wrote file");
    Ok(())
}

fn create(fs: &FileSystem, path: &str, kind: FileType) -> Result<()> {
    fs.resolve(path)?.create(kind)?;
    Ok(())
}

fn rm(fs: &FileSystem, path: &str, out: &mut impl Write) -> Result<()> {
    let node = fs.resolve(path)?;
    if !node.exists()? {
        bail!("{path} does not exist");
    }
    let deleted = node.delete(&AllSelector)?;
    writeln!(out, "deleted {deleted} file(s)")?;
    Ok(())
}

fn cp(
    from: &FileSystem,
    to: &FileSystem,
    src: &str,
    dst: &str,
    out: &mut impl Write,
) -> Result<()> {
    let source = from.resolve(src)?;
    let dest = to.resolve(dst)?;
    let copied = dest.copy_from(&source, &AllSelector)?;
    writeln!(out, "copied {copied} file(s)")?;
    Ok(())
}

fn stat(fs: &FileSystem, path: &str, out: &mut impl Write) -> Result<()> {
    let node = fs.resolve(path)?;
    let kind = node.file_type()?;
    let content = node.content()?;

    writeln!(out, "path: {}", node.name())?;
    writeln!(out, "type: {kind}")?;
    if kind == FileType::File {
        writeln!(out, "size: {}", content.size()?)?;
    }
    if let Ok(modified) = content.last_modified() {
        let secs = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        writeln!(out, "modified: {secs}")?;
    }
    writeln!(out, "read-only: {}", node.is_read_only())?;
    Ok(())
}

fn replicate(fs: &FileSystem, path: &str, command: &[String]) -> Result<()> {
    let node: Arc<FileNode> = fs.resolve(path)?;
    let local = node.replicate(&AllSelector)?;
    tracing::info!(path, local = %local.display(), "replicated");

    let Some((program, rest)) = command.split_first() else {
        bail!("no command given");
    };
    let status = Command::new(program)
        .args(rest)
        .arg(&local)
        .status()
        .with_context(|| format!("running {program}"))?;
    if !status.success() {
        bail!("{program} exited with {status}");
    }
    Ok(())
}
