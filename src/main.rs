use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use patchwright::index::model::{path_key, FileId};
use patchwright::review::ReviewReport;
use patchwright::transaction::StagedFile;
use patchwright::{CancellationToken, EditBatch, NodeRef, Project, SymbolDescriptor};
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "patchwright")]
#[command(about = "Index a codebase and apply proposed edits transactionally", long_about = None)]
#[command(version)]
struct Cli {
    /// Project root
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum BatchFormat {
    /// `{"edits": [...]}` or a bare array of edits
    Json,
    /// SEARCH/REPLACE blocks preceded by the file path
    Blocks,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the project and report what was indexed
    Index,

    /// Find a symbol by name
    Lookup {
        name: String,

        /// Only consider symbols in this file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Enclosing class, impl or module
        #[arg(short, long)]
        container: Option<String>,
    },

    /// Show what a file imports and what imports it
    Deps { file: PathBuf },

    /// List files and symbols affected by changing a file or symbol
    Impact {
        /// File path or symbol name
        target: String,

        #[arg(short, long, default_value = "3")]
        depth: usize,
    },

    /// Resolve, stage and apply a batch of proposed edits
    Apply {
        /// Batch file
        batch: PathBuf,

        #[arg(short, long, value_enum, default_value = "json")]
        format: BatchFormat,

        /// Stage and report without writing files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Apply the resolved edits even when some edits were rejected
        #[arg(long)]
        allow_partial: bool,
    },

    /// Restore the snapshot of an applied transaction
    Rollback { tx_id: String },

    /// List applied, rolled back and rejected transactions
    History,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let project = Project::open(&cli.root)
        .with_context(|| format!("cannot open project at {}", cli.root.display()))?;

    match cli.command {
        Commands::Index => cmd_index(&project, cli.json),
        Commands::Lookup {
            name,
            file,
            container,
        } => cmd_lookup(&project, name, file, container, cli.json),
        Commands::Deps { file } => cmd_deps(&project, &file, cli.json),
        Commands::Impact { target, depth } => cmd_impact(&project, &target, depth, cli.json),
        Commands::Apply {
            batch,
            format,
            dry_run,
            diff,
            allow_partial,
        } => cmd_apply(&project, &batch, format, dry_run, diff, allow_partial, cli.json),
        Commands::Rollback { tx_id } => cmd_rollback(&project, &tx_id, cli.json),
        Commands::History => cmd_history(&project, cli.json),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn scan(project: &Project) -> Result<patchwright::index::ScanReport> {
    Ok(project.scan(&CancellationToken::new())?)
}

fn cmd_index(project: &Project, json: bool) -> Result<()> {
    let report = scan(project)?;
    if json {
        return print_json(&report);
    }

    println!("{}", format!("Indexed {}", project.root().display()).bold());
    println!("  {} files parsed", format!("{}", report.indexed.len()).green());
    println!("  {} unchanged or skipped", report.skipped);
    if !report.removed.is_empty() {
        println!("  {} removed", report.removed.len());
    }
    for (path, error) in &report.unparseable {
        eprintln!("{} {}: {}", "✗".red(), path.display(), error);
    }

    let stats = project.index().graph_stats();
    println!(
        "  {} edges ({} imports, {} calls, {} inherits), {} unresolved imports",
        stats.edges, stats.imports, stats.calls, stats.inherits, stats.unresolved_imports
    );
    Ok(())
}

fn cmd_lookup(
    project: &Project,
    name: String,
    file: Option<PathBuf>,
    container: Option<String>,
    json: bool,
) -> Result<()> {
    scan(project)?;
    let descriptor = SymbolDescriptor::Name {
        name,
        file,
        container,
    };
    match project.index().lookup(&descriptor) {
        Ok(symbol) => {
            if json {
                return print_json(&symbol);
            }
            println!(
                "{} {} {}",
                "✓".green(),
                symbol.qualified_name.bold(),
                format!("({})", symbol.kind).dimmed()
            );
            println!("  {}:{}", path_key(&symbol.path), symbol.span);
            println!("  id {}", symbol.id);
            if !symbol.signature.is_empty() {
                println!("  {}", symbol.signature);
            }
            Ok(())
        }
        Err(patchwright::index::LookupError::NotFound) => {
            bail!("symbol not found: {descriptor}")
        }
        Err(patchwright::index::LookupError::Ambiguous(candidates)) => {
            if json {
                print_json(&candidates)?;
            } else {
                eprintln!("{} {} is ambiguous:", "✗".red(), descriptor);
                for symbol in &candidates {
                    eprintln!(
                        "  {}::{} ({}, {})",
                        path_key(&symbol.path),
                        symbol.qualified_name,
                        symbol.kind,
                        symbol.id
                    );
                }
            }
            bail!("narrow the lookup with --file or --container")
        }
    }
}

fn cmd_deps(project: &Project, file: &Path, json: bool) -> Result<()> {
    scan(project)?;
    let index = project.index();
    let rel = index.relative(file)?;
    if index.file(&rel).is_none() {
        bail!("{} is not indexed", rel.display());
    }
    let imports = index.dependencies_of(&rel);
    let imported_by = index.dependents_of(&rel);
    let unresolved = index.unresolved_imports(&rel);

    if json {
        return print_json(&serde_json::json!({
            "file": rel,
            "imports": imports,
            "imported_by": imported_by,
            "unresolved": unresolved,
        }));
    }

    println!("{}", path_key(&rel).bold());
    println!("  imports:");
    for path in &imports {
        println!("    {}", path_key(path));
    }
    println!("  imported by:");
    for path in &imported_by {
        println!("    {}", path_key(path));
    }
    if !unresolved.is_empty() {
        println!("  unresolved:");
        for module in &unresolved {
            println!("    {}", module.dimmed());
        }
    }
    Ok(())
}

fn cmd_impact(project: &Project, target: &str, depth: usize, json: bool) -> Result<()> {
    scan(project)?;
    let index = project.index();

    let as_file = index
        .relative(Path::new(target))
        .ok()
        .filter(|rel| index.file(rel).is_some());
    let node = match as_file {
        Some(rel) => NodeRef::File(FileId::for_path(&rel)),
        None => {
            let symbol = index
                .lookup(&SymbolDescriptor::name(target))
                .map_err(|_| anyhow::anyhow!("no unique file or symbol named {target}"))?;
            NodeRef::Symbol(symbol.id)
        }
    };

    let affected: Vec<String> = index
        .affected_by(node, depth)
        .into_iter()
        .map(|node| index.describe(node))
        .collect();

    if json {
        return print_json(&serde_json::json!({
            "target": index.describe(node),
            "depth": depth,
            "affected": affected,
        }));
    }

    println!("{} {}", "Impact of".bold(), index.describe(node));
    if affected.is_empty() {
        println!("  nothing depends on it");
    }
    for name in &affected {
        println!("  {name}");
    }
    Ok(())
}

fn read_batch(path: &Path, format: BatchFormat) -> Result<EditBatch> {
    let input = fs::read_to_string(path)
        .with_context(|| format!("cannot read batch {}", path.display()))?;
    match format {
        BatchFormat::Json => Ok(EditBatch::from_json(&input)?),
        BatchFormat::Blocks => {
            let parsed = EditBatch::from_blocks(&input);
            for error in &parsed.errors {
                eprintln!("{} {}", "⚠".yellow(), error);
            }
            if parsed.batch.is_empty() {
                bail!("no usable edit blocks in {}", path.display());
            }
            Ok(parsed.batch)
        }
    }
}

fn display_diff(file: &Path, original: &str, modified: &str) {
    println!("\n{}", format!("--- a/{}", path_key(file)).dimmed());
    println!("{}", format!("+++ b/{}", path_key(file)).dimmed());

    let diff = TextDiff::from_lines(original, modified);
    for change in diff.iter_all_changes() {
        let line = match change.tag() {
            ChangeTag::Delete => format!("-{change}").red(),
            ChangeTag::Insert => format!("+{change}").green(),
            ChangeTag::Equal => continue,
        };
        print!("{line}");
    }
}

fn print_review(review: &ReviewReport, staged: &[StagedFile], show_diff: bool) {
    for rejected in &review.rejected {
        eprintln!(
            "{} {}: {} ({})",
            "✗".red(),
            rejected.edit_id,
            rejected.message,
            rejected.code
        );
    }
    if let Some(error) = &review.error {
        eprintln!("{} {} ({})", "CONFLICT:".red().bold(), error.message, error.code);
    }
    for file in &review.files {
        println!(
            "{} {} [{}]",
            "✓".green(),
            path_key(&file.path),
            file.edits.join(", ")
        );
    }
    if show_diff {
        for file in staged {
            display_diff(&file.path, &file.before, &file.after);
        }
    }
}

fn cmd_apply(
    project: &Project,
    batch_path: &Path,
    format: BatchFormat,
    dry_run: bool,
    show_diff: bool,
    allow_partial: bool,
    json: bool,
) -> Result<()> {
    let batch = read_batch(batch_path, format)?;
    scan(project)?;
    let mut proposal = project.propose(&batch)?;
    let review = proposal.review();

    if !json {
        print_review(&review, proposal.transaction.files(), show_diff);
    }

    if let Some(conflict) = proposal.conflict.take() {
        if json {
            print_json(&review)?;
        }
        bail!("transaction {} not staged: {conflict}", review.tx_id);
    }
    if !review.rejected.is_empty() && !allow_partial {
        if json {
            print_json(&review)?;
        }
        project.reject(&mut proposal.transaction)?;
        bail!(
            "{} edit(s) could not be resolved; rerun with --allow-partial to apply the rest",
            review.rejected.len()
        );
    }

    if dry_run {
        if json {
            return print_json(&review);
        }
        println!(
            "\n{} transaction {} staged, nothing written",
            "DRY RUN:".yellow().bold(),
            review.tx_id
        );
        return Ok(());
    }

    let applied = project.apply(&mut proposal.transaction)?;
    if json {
        return print_json(&ReviewReport::new(&proposal.transaction, &proposal.report.rejected));
    }
    println!(
        "\n{} {} ({} file(s))",
        "APPLIED".green().bold(),
        applied.tx_id,
        applied.files.len()
    );
    println!("  undo with: patchwright rollback {}", applied.tx_id);
    Ok(())
}

fn cmd_rollback(project: &Project, tx_id: &str, json: bool) -> Result<()> {
    let tx = project.rollback(tx_id)?;
    if json {
        return print_json(&ReviewReport::new(&tx, &[]));
    }
    println!(
        "{} {} ({} file(s) restored)",
        "ROLLED BACK".green().bold(),
        tx.id(),
        tx.files().len()
    );
    Ok(())
}

fn cmd_history(project: &Project, json: bool) -> Result<()> {
    let records = project.history()?;
    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No transactions recorded.");
    }
    for record in &records {
        let state = match record.state {
            patchwright::TxState::Applied => record.state.as_str().green(),
            patchwright::TxState::RolledBack => record.state.as_str().yellow(),
            _ => record.state.as_str().dimmed(),
        };
        println!(
            "{}  {:<12} {}  {}",
            record.at.format("%Y-%m-%d %H:%M:%S"),
            state,
            record.tx_id,
            record
                .files
                .iter()
                .map(|p| path_key(p))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}
