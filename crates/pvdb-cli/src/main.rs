//! pv_db Conflict Resolver CLI
//!
//! Command-line tool for scanning mod song databases, detecting PV id and
//! title conflicts, and resolving them on disk.

use clap::{Parser, Subcommand};
use pvdb_core::{
    apply_plan, build_catalog, build_report, detect_conflicts, plan_resolutions,
    restore_backups, scan_mods, write_csv_report, write_json_report, BackupStore, Conflicts,
    LoadOrder, NormalizePolicy, ResolvedConflict, SourceId, SourceRegistry,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pvdb-cli")]
#[command(about = "pv_db song conflict scanner and resolver", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the mods root and list discovered databases
    Scan {
        /// Path to the base game's pv_db file
        #[arg(short, long)]
        game: Option<PathBuf>,

        /// Path to the directory containing mod folders
        #[arg(short, long)]
        mods: Option<PathBuf>,

        /// Load-order TOML file (priorities, ignore, exempt)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Detect conflicts and print (or export) the groups
    Conflicts {
        /// Path to the base game's pv_db file
        #[arg(short, long)]
        game: Option<PathBuf>,

        /// Path to the directory containing mod folders
        #[arg(short, long)]
        mods: Option<PathBuf>,

        /// Load-order TOML file (priorities, ignore, exempt)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print every group member, not just the summary
        #[arg(short, long)]
        verbose: bool,

        /// Export a report to this path (a directory for csv, a file for json)
        #[arg(short, long)]
        export: Option<PathBuf>,

        /// Report format (csv or json)
        #[arg(long, default_value = "csv")]
        format: String,
    },

    /// Plan and apply conflict resolution (comment out losing entries)
    Resolve {
        /// Path to the base game's pv_db file
        #[arg(short, long)]
        game: Option<PathBuf>,

        /// Path to the directory containing mod folders
        #[arg(short, long)]
        mods: Option<PathBuf>,

        /// Load-order TOML file (priorities, ignore, exempt)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory where pre-mutation backups are stored
        #[arg(short, long, default_value = "backups")]
        backup_root: PathBuf,

        /// Only print the actions that would be taken
        #[arg(long)]
        dry_run: bool,
    },

    /// Restore databases from their pre-mutation backups
    Restore {
        /// Directory where pre-mutation backups are stored
        #[arg(short, long, default_value = "backups")]
        backup_root: PathBuf,

        /// Restore a single mod instead of everything backed up
        #[arg(long)]
        mod_name: Option<String>,
    },

    /// Parse and display a single pv_db file
    Parse {
        /// Path to a pv_db file
        #[arg(short, long)]
        file: PathBuf,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pvdb_core=warn,pvdb_cli=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> pvdb_core::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { game, mods, config } => cmd_scan(game, mods, config),
        Commands::Conflicts {
            game,
            mods,
            config,
            verbose,
            export,
            format,
        } => cmd_conflicts(game, mods, config, verbose, export, &format),
        Commands::Resolve {
            game,
            mods,
            config,
            backup_root,
            dry_run,
        } => cmd_resolve(game, mods, config, &backup_root, dry_run),
        Commands::Restore {
            backup_root,
            mod_name,
        } => cmd_restore(&backup_root, mod_name.as_deref()),
        Commands::Parse { file } => cmd_parse(&file),
    }
}

/// Resolve the mods root and build the per-run source registry
fn build_registry(
    game: Option<PathBuf>,
    mods: Option<PathBuf>,
    config: Option<PathBuf>,
) -> pvdb_core::Result<SourceRegistry> {
    let order = match &config {
        Some(path) => LoadOrder::load(path)?,
        None => LoadOrder::default(),
    };

    let mods_root = mods
        .or_else(|| {
            config
                .as_ref()
                .and_then(|path| order.mods_root(path))
        })
        .ok_or_else(|| pvdb_core::Error::Config {
            path: config.clone().unwrap_or_default(),
            message: "no mods root: pass --mods or a config with a 'mods' entry".to_string(),
        })?;

    let discovered = scan_mods(&mods_root)?;
    Ok(SourceRegistry::build(game, &discovered, &order))
}

fn cmd_scan(
    game: Option<PathBuf>,
    mods: Option<PathBuf>,
    config: Option<PathBuf>,
) -> pvdb_core::Result<()> {
    let registry = build_registry(game, mods, config)?;
    let catalog = build_catalog(&registry, &NormalizePolicy::default());

    println!("Sources ({}):", registry.len());
    for (id, source) in registry.iter() {
        let status = if source.ignored {
            " [ignored]"
        } else if source.exempt {
            " [exempt]"
        } else {
            ""
        };
        println!(
            "  {:<4} {} ({} songs){}",
            source.priority,
            source.name,
            catalog.count_for(id),
            status
        );
    }
    println!();
    println!("Total songs indexed: {}", catalog.songs.len());

    print_diagnostics(&catalog.diagnostics);
    Ok(())
}

fn cmd_conflicts(
    game: Option<PathBuf>,
    mods: Option<PathBuf>,
    config: Option<PathBuf>,
    verbose: bool,
    export: Option<PathBuf>,
    format: &str,
) -> pvdb_core::Result<()> {
    let registry = build_registry(game, mods, config)?;
    let catalog = build_catalog(&registry, &NormalizePolicy::default());
    let conflicts = detect_conflicts(&catalog, &registry);
    let (resolved, _) = plan_resolutions(&conflicts, &registry);

    println!(
        "Found {} PV id conflict(s) and {} title conflict(s)",
        conflicts.id_conflicts.len(),
        conflicts.title_conflicts.len()
    );

    if verbose {
        println!();
        print_groups(&registry, &conflicts, &resolved);
    }

    if let Some(path) = export {
        let report = build_report(&registry, &catalog, &resolved);
        match format.to_lowercase().as_str() {
            "csv" => write_csv_report(&report, &path)?,
            "json" => write_json_report(&report, &path)?,
            _ => {
                eprintln!("Unknown format: {}. Supported formats: csv, json", format);
                std::process::exit(1);
            }
        }
        println!("Report saved to {}", path.display());
    }

    print_diagnostics(&catalog.diagnostics);
    Ok(())
}

fn cmd_resolve(
    game: Option<PathBuf>,
    mods: Option<PathBuf>,
    config: Option<PathBuf>,
    backup_root: &PathBuf,
    dry_run: bool,
) -> pvdb_core::Result<()> {
    let registry = build_registry(game, mods, config)?;
    let catalog = build_catalog(&registry, &NormalizePolicy::default());
    let conflicts = detect_conflicts(&catalog, &registry);
    let (_, plan) = plan_resolutions(&conflicts, &registry);

    if plan.is_empty() {
        println!("No actionable conflicts detected. Nothing to resolve.");
        return Ok(());
    }

    println!(
        "Planned {} suppression(s) across {} conflict group(s)",
        plan.actions.len(),
        conflicts.len()
    );
    if dry_run {
        println!("Dry run: no files will be modified.");
    }

    let mut store = BackupStore::open(backup_root)?;
    let outcome = apply_plan(&plan, &registry, &mut store, dry_run);

    println!();
    for file in &outcome.files {
        match &file.error {
            Some(err) => println!("  {}: FAILED: {}", file.path.display(), err),
            None => println!(
                "  {}: {} entr{} suppressed, {} line(s) marked, {} already marked{}",
                file.path.display(),
                file.entries_suppressed,
                if file.entries_suppressed == 1 { "y" } else { "ies" },
                file.lines_marked,
                file.lines_already_marked,
                if file.exempt_skipped > 0 {
                    format!(", {} exempt action(s) skipped", file.exempt_skipped)
                } else {
                    String::new()
                }
            ),
        }
    }

    if !outcome.is_clean() {
        println!();
        println!("Some files failed; already-modified files are left as-is.");
        println!("Use 'pvdb-cli restore' to roll back from backups.");
    }

    print_diagnostics(&catalog.diagnostics);
    Ok(())
}

fn cmd_restore(backup_root: &PathBuf, mod_name: Option<&str>) -> pvdb_core::Result<()> {
    let mut store = BackupStore::open(backup_root)?;
    let reports = restore_backups(&mut store, mod_name);

    if reports.is_empty() {
        println!("No backups found under {}", backup_root.display());
        return Ok(());
    }

    for report in &reports {
        match (&report.restored, &report.error) {
            (Some(path), _) => println!("  {}: restored to {}", report.source, path.display()),
            (None, Some(err)) => println!("  {}: {}", report.source, err),
            (None, None) => {}
        }
    }
    Ok(())
}

fn cmd_parse(file: &PathBuf) -> pvdb_core::Result<()> {
    let content = std::fs::read_to_string(file)?;
    let outcome = pvdb_core::parse_pvdb_str(&content, SourceId(0), "file", file);

    println!("File: {}", file.display());
    println!("Songs: {}", outcome.songs.len());
    println!("Already suppressed: {}", outcome.suppressed.len());
    println!();

    for song in outcome.songs.iter().take(20) {
        println!(
            "  pv_{:<4} {}{}",
            song.pv_id,
            song.display_title(),
            song.title_en
                .as_deref()
                .map(|en| format!(" / {}", en))
                .unwrap_or_default()
        );
    }
    if outcome.songs.len() > 20 {
        println!("  ... ({} more)", outcome.songs.len() - 20);
    }

    for diag in &outcome.diagnostics {
        println!(
            "  warning: {} (line {})",
            diag.message,
            diag.line.unwrap_or(0)
        );
    }
    Ok(())
}

fn print_groups(
    registry: &SourceRegistry,
    conflicts: &Conflicts,
    resolved: &[ResolvedConflict],
) {
    let groups = conflicts
        .id_conflicts
        .iter()
        .chain(conflicts.title_conflicts.iter());
    for group in groups {
        println!("Conflict on {}:", group.key);
        let winner = resolved
            .iter()
            .find(|r| r.key == group.key)
            .map(|r| &r.winner);
        for member in &group.members {
            let source = registry.get(member.source);
            let marker = match winner {
                Some(w) if w == member => " <-- keep",
                _ => "",
            };
            println!(
                "  pv_{} '{}' from {} (rank {}){}",
                member.pv_id,
                member.display_title(),
                source.name,
                source.priority,
                marker
            );
        }
        println!();
    }
}

fn print_diagnostics(diagnostics: &[pvdb_core::Diagnostic]) {
    if diagnostics.is_empty() {
        return;
    }
    println!();
    println!("Diagnostics ({}):", diagnostics.len());
    for diag in diagnostics {
        let line = diag
            .line
            .map(|l| format!(":{}", l))
            .unwrap_or_default();
        println!(
            "  [{}] {}{}: {}",
            diag.source,
            diag.path.display(),
            line,
            diag.message
        );
    }
}
