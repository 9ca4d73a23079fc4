//! Feature Tracker CLI
//!
//! Creates, moves, validates, and locks feature records in a file-based store.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use feature_tracker::workflow::validate_status;
use feature_tracker::{
    FeatureManager, LockManager, TemplateProcessor, TrackerConfig, TrackerError, Validator,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "feat")]
#[command(about = "Track feature work items through their lifecycle")]
struct Cli {
    /// Store root (overrides config)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Path to a config file
    #[arg(short, long)]
    config: Option<String>,

    /// Report what would change without touching disk
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold the store layout, starter template, and record schema
    Init,

    /// Create a feature in the backlog
    Create {
        /// Feature title
        title: String,
        /// Label to attach (repeatable)
        #[arg(short, long)]
        label: Vec<String>,
    },

    /// Show one feature
    Show {
        /// Feature id
        id: String,
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// List features across all statuses
    List {
        /// Only this status
        #[arg(short, long)]
        status: Option<String>,
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Move a feature to a new status
    Move {
        /// Feature id
        id: String,
        /// Target status
        status: String,
        /// Owner to record on the move
        #[arg(short, long)]
        owner: Option<String>,
    },

    /// Delete a feature
    Delete {
        /// Feature id
        id: String,
    },

    /// Validate the store (or a single feature)
    Validate {
        /// Only this feature
        #[arg(long)]
        id: Option<String>,
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-apply the canonical template to features
    Fix {
        /// Feature ids to fix
        ids: Vec<String>,
        /// Fix every feature in the store
        #[arg(long)]
        all: bool,
    },

    /// Take an advisory edit lock on a feature
    Lock {
        /// Feature id
        id: String,
        /// Lock holder
        #[arg(short, long)]
        owner: String,
        /// Lock lifetime in minutes
        #[arg(long, default_value_t = 60)]
        ttl: i64,
        /// Steal an existing lock
        #[arg(long)]
        force: bool,
    },

    /// Release an advisory lock
    Unlock {
        /// Feature id
        id: String,
    },

    /// List outstanding locks
    Locks {
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        if let Some(detail) = e
            .downcast_ref::<TrackerError>()
            .map(TrackerError::batch_detail)
        {
            for line in detail {
                eprintln!("  └─ {}", line);
            }
        }
        std::process::exit(exit_code(&e));
    }
}

fn exit_code(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<TrackerError>() {
        Some(TrackerError::NotFound { .. }) => 2,
        Some(TrackerError::UnknownStatus(_)) | Some(TrackerError::InvalidTransition { .. }) => 3,
        Some(TrackerError::DependencyBlocked { .. }) => 4,
        Some(TrackerError::ActiveLock { .. }) => 5,
        Some(TrackerError::MalformedRecord { .. })
        | Some(TrackerError::MalformedBatch { .. })
        | Some(TrackerError::InvalidArgument(_)) => 6,
        _ => 1,
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = TrackerConfig::load_from(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.store.root = root;
    }
    if cli.dry_run {
        config.store.dry_run = true;
    }

    match cli.command {
        Commands::Init => {
            let manager = FeatureManager::new(config.clone())?;
            let created = manager.init()?;

            if created.is_empty() {
                println!("✅ Store at {} already initialized", config.root().display());
            } else if config.store.dry_run {
                println!("🔍 Dry-run: init would create:");
                for path in created {
                    println!("  └─ {}", path.display());
                }
            } else {
                println!("✅ Initialized store at {}", config.root().display());
                for path in created {
                    println!("  └─ {}", path.display());
                }
            }
            Ok(())
        }

        Commands::Create { title, label } => {
            let manager = FeatureManager::new(config)?;
            let record = manager.create(&title, label)?;
            println!("✅ Created {} - {}", record.id(), record.path.display());
            Ok(())
        }

        Commands::Show { id, json } => {
            let manager = FeatureManager::new(config)?;
            let record = manager.load_by_id(&id)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("{} - {}", record.id(), record.header.title);
                println!("  status:     {}", record.header.status);
                println!("  owner:      {}", record.header.owner);
                println!(
                    "  priority:   {} (complexity {})",
                    record.header.priority, record.header.complexity
                );
                println!(
                    "  created:    {} (updated {})",
                    record.header.created, record.header.updated
                );
                if !record.header.labels.is_empty() {
                    println!("  labels:     {}", record.header.labels.join(", "));
                }
                if !record.header.dependencies.is_empty() {
                    println!("  depends on: {}", record.header.dependencies.join(", "));
                }
                if let Some(epic) = &record.header.epic {
                    println!("  epic:       {}", epic);
                }
                for name in record.body.section_names() {
                    println!("  ## {}", name);
                }
            }
            Ok(())
        }

        Commands::List { status, json } => {
            let manager = FeatureManager::new(config)?;
            let mut listing = manager.list()?;

            if let Some(slug) = &status {
                let wanted = validate_status(slug)?;
                listing.features.retain(|r| r.status() == Some(wanted));
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
                return Ok(());
            }

            if listing.features.is_empty() && listing.failures.is_empty() {
                println!("No features found");
            }
            for record in &listing.features {
                println!(
                    "{}  {:<12} {:<14} {}",
                    record.id(),
                    record.header.status,
                    record.header.owner,
                    record.header.title
                );
            }
            for failure in &listing.failures {
                println!("❌ {}: {}", failure.path.display(), failure.reason);
            }
            Ok(())
        }

        Commands::Move { id, status, owner } => {
            let manager = FeatureManager::new(config)?;
            let (record, receipt) = manager.move_to(&id, &status, owner.as_deref())?;

            println!(
                "✅ Moved {} from {} to {} ({})",
                receipt.id,
                receipt.from,
                receipt.to,
                record.path.display()
            );
            for warning in &receipt.warnings {
                println!("⚠️  {}", warning);
            }
            Ok(())
        }

        Commands::Delete { id } => {
            let manager = FeatureManager::new(config)?;
            let path = manager.delete(&id)?;
            println!("✅ Deleted {} ({})", id, path.display());
            Ok(())
        }

        Commands::Validate { id, json } => {
            let validator = Validator::new(config)?;

            match id {
                Some(id) => {
                    let report = validator.validate_one(&id)?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else if report.is_clean() {
                        println!("✅ {} - no issues", report.id);
                    } else {
                        println!("❌ {} - {} issue(s)", report.id, report.issues.len());
                        for issue in &report.issues {
                            println!("  └─ [{}] {}", issue.code.as_str(), issue.message);
                        }
                    }
                    if !report.is_clean() {
                        std::process::exit(1);
                    }
                }
                None => {
                    println!("🔍 Validating feature store...");
                    let summary = validator.validate_all()?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&summary)?);
                    } else if summary.is_clean() {
                        println!("✅ {} record(s), no issues", summary.checked);
                    } else {
                        print!("{}", summary.format_all());
                    }
                    if !summary.is_clean() {
                        std::process::exit(1);
                    }
                }
            }
            Ok(())
        }

        Commands::Fix { ids, all } => {
            let manager = FeatureManager::new(config.clone())?;
            let validator = Validator::new(config.clone())?;
            let template = TemplateProcessor::load(&config)?;

            let ids = if all {
                manager
                    .list()?
                    .features
                    .iter()
                    .map(|r| r.id().to_string())
                    .filter(|id| !id.is_empty())
                    .collect()
            } else {
                ids
            };
            if ids.is_empty() {
                return Err(TrackerError::InvalidArgument(
                    "no ids to fix; pass ids or --all".to_string(),
                )
                .into());
            }

            let fixed = validator.apply_fixes(&ids, &template)?;
            if fixed.is_empty() {
                println!("✅ Nothing to fix");
            } else {
                for id in &fixed {
                    println!("✅ Fixed {}", id);
                }
            }
            Ok(())
        }

        Commands::Lock {
            id,
            owner,
            ttl,
            force,
        } => {
            let locks = LockManager::new(config);
            let record = locks.acquire(&id, &owner, ttl, force)?;
            println!(
                "✅ Locked {} for {} ({}m)",
                record.id, record.owner, record.ttl_minutes
            );
            Ok(())
        }

        Commands::Unlock { id } => {
            let locks = LockManager::new(config);
            locks.release(&id)?;
            println!("✅ Unlocked {}", id);
            Ok(())
        }

        Commands::Locks { json } => {
            let locks = LockManager::new(config);
            let outstanding = locks.list()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outstanding)?);
                return Ok(());
            }

            if outstanding.is_empty() {
                println!("No outstanding locks");
            }
            for state in &outstanding {
                let suffix = if state.expired { " (expired)" } else { "" };
                println!(
                    "{}  {}  acquired {}  ttl {}m{}",
                    state.record.id,
                    state.record.owner,
                    state.record.acquired_at.format("%Y-%m-%d %H:%M UTC"),
                    state.record.ttl_minutes,
                    suffix
                );
            }
            Ok(())
        }
    }
}
