use std::{path::PathBuf, process};

use clap::{Parser, Subcommand};
use codeworm::{
   analyzer::CodeAnalyzer,
   config::{RepoEntry, WormConfig},
   daemon::Daemon,
   error::Result,
   gitops::DevlogRepository,
   memory::Memory,
   prompts, scheduler, style,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "codeworm", version, about = "Autonomous code documentation daemon")]
struct Cli {
   /// Enable debug logging
   #[arg(long, global = true)]
   debug: bool,

   /// Path to a YAML config file (default: CODEWORM_CONFIG or codeworm.yaml)
   #[arg(long, global = true)]
   config: Option<PathBuf>,

   #[command(subcommand)]
   command: Commands,
}

#[derive(Subcommand)]
enum Commands {
   /// Run the daemon on the human-like schedule
   Run {
      /// Devlog repository path (overrides config)
      #[arg(long)]
      devlog_path: Option<PathBuf>,

      /// Generate documentation but skip commit and push
      #[arg(long)]
      dry_run: bool,
   },

   /// Execute a single documentation cycle immediately and exit
   RunOnce {
      /// Devlog repository path (overrides config)
      #[arg(long)]
      devlog_path: Option<PathBuf>,

      /// Generate documentation but skip commit and push
      #[arg(long)]
      dry_run: bool,
   },

   /// Rank documentation candidates in one repository
   Analyze {
      /// Path to the repository to analyze
      repo: PathBuf,

      /// How many candidates to show
      #[arg(long, default_value_t = 10)]
      limit: usize,
   },

   /// Preview upcoming scheduled commit times
   SchedulePreview {
      /// Days to preview
      #[arg(long, default_value_t = 1)]
      days: u32,
   },

   /// Show documentation statistics
   Stats,

   /// Initialize the devlog repository and prompt templates
   Init,

   /// Show version information
   Version,
}

fn init_logging(debug: bool) {
   let filter = EnvFilter::try_from_default_env()
      .unwrap_or_else(|_| EnvFilter::new(if debug { "codeworm=debug,info" } else { "info" }));
   tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_target(false)
      .init();
}

fn load_config(cli: &Cli) -> Result<WormConfig> {
   let mut config = match &cli.config {
      Some(path) => WormConfig::from_file(path)?,
      None => WormConfig::load()?,
   };
   if cli.debug {
      config.debug = true;
   }
   Ok(config)
}

fn cmd_run(mut config: WormConfig, devlog_path: Option<PathBuf>, dry_run: bool) -> Result<i32> {
   if let Some(path) = devlog_path {
      config.devlog.repo_path = path;
   }
   Daemon::new(config, dry_run)?.run()
}

fn cmd_run_once(
   mut config: WormConfig,
   devlog_path: Option<PathBuf>,
   dry_run: bool,
) -> Result<i32> {
   if let Some(path) = devlog_path {
      config.devlog.repo_path = path;
   }
   Daemon::new(config, dry_run)?.run_once()
}

fn cmd_analyze(config: &WormConfig, repo_path: &std::path::Path, limit: usize) -> Result<i32> {
   let name = repo_path
      .file_name()
      .map_or_else(|| "repo".to_string(), |n| n.to_string_lossy().into_owned());
   let repo = RepoEntry { name, path: repo_path.to_path_buf(), weight: 5, enabled: true };

   let mut analyzer = CodeAnalyzer::new(config.analyzer.clone())?;
   let stats = analyzer.scanner().repo_stats(&repo.path, &repo.name);

   println!("\n{}", style::bold(&format!("Repository: {}", repo.name)));
   println!(
      "  {} files, {} bytes{}",
      stats.total_files,
      stats.total_size_bytes,
      if stats.is_git_repo { "" } else { " (not a git repo)" }
   );
   for (language, count) in &stats.files_by_language {
      println!("  {language}: {count}");
   }

   let candidates = analyzer.find_candidates(&repo, limit);
   if candidates.is_empty() {
      println!("\n{}", style::warning("No documentation candidates found"));
      return Ok(0);
   }

   println!("\n{}", style::bold("Top candidates:"));
   for candidate in &candidates {
      println!(
         "  {:>5.1}  {}  {}",
         candidate.score(),
         style::info(&candidate.snippet.display_name()),
         style::dim(&candidate.relative_path.to_string_lossy())
      );
   }
   Ok(0)
}

fn cmd_schedule_preview(config: &WormConfig, days: u32) -> Result<i32> {
   let scheduler = scheduler::Scheduler::new(&config.schedule);
   let slots = scheduler.preview(days)?;

   println!(
      "\n{}",
      style::bold(&format!("Schedule preview ({days} day{})", if days == 1 { "" } else { "s" }))
   );

   let mut current_date = None;
   for slot in &slots {
      let date = slot.date_naive();
      if current_date != Some(date) {
         println!("\n  {}", style::info(&date.to_string()));
         current_date = Some(date);
      }
      println!("    {}", slot.format("%H:%M:%S"));
   }
   println!("\n{} slots total", slots.len());
   Ok(0)
}

fn cmd_stats(config: &WormConfig) -> Result<i32> {
   let memory = Memory::open(&config.db_path())?;
   let stats = memory.get_stats()?;

   println!("\n{}", style::bold("CodeWorm Statistics"));
   println!("Total documented: {}", style::success(&stats.total_documented.to_string()));
   println!("Last 7 days: {}", style::info(&stats.last_7_days.to_string()));

   if !stats.by_repo.is_empty() {
      println!("\n{}", style::bold("By repository:"));
      for (repo, count) in &stats.by_repo {
         println!("  {repo}: {count}");
      }
   }
   Ok(0)
}

fn cmd_init(config: &WormConfig) -> Result<i32> {
   let devlog = DevlogRepository::new(&config.devlog);
   devlog.ensure_repo()?;
   devlog.ensure_directory_structure()?;
   prompts::ensure_prompts_dir()?;
   println!(
      "{} Initialized devlog at {}",
      style::success("\u{2713}"),
      config.devlog.repo_path.display()
   );
   Ok(0)
}

fn run_cli() -> Result<i32> {
   let cli = Cli::parse();
   let config = load_config(&cli)?;
   init_logging(config.debug);

   match cli.command {
      Commands::Run { devlog_path, dry_run } => cmd_run(config, devlog_path, dry_run),
      Commands::RunOnce { devlog_path, dry_run } => cmd_run_once(config, devlog_path, dry_run),
      Commands::Analyze { repo, limit } => cmd_analyze(&config, &repo, limit),
      Commands::SchedulePreview { days } => cmd_schedule_preview(&config, days),
      Commands::Stats => cmd_stats(&config),
      Commands::Init => cmd_init(&config),
      Commands::Version => {
         println!("codeworm v{}", env!("CARGO_PKG_VERSION"));
         Ok(0)
      },
   }
}

fn main() {
   dotenvy::dotenv().ok();

   let code = match run_cli() {
      Ok(code) => code,
      Err(e) => {
         eprintln!("{} {e}", style::error("Error:"));
         1
      },
   };
   process::exit(code);
}
