//! Basketball results CLI
//!
//! Fills in results for the club's played matches by reading the federation portal.

use basket::{Config, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "basket")]
#[command(about = "Keep a basketball club's match files in sync with published results", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape results for matches that should have finished
    Results {
        /// Only list the matches that are due, without opening a browser
        #[arg(long)]
        check: bool,
        /// Run the browser without a window
        #[arg(long)]
        headless: bool,
    },
    /// Retry ledger commands
    Ledger {
        #[command(subcommand)]
        action: LedgerCommands,
    },
    /// Write today's fixtures for the scheduler
    Today,
    /// Initialize a new config file
    Init,
}

#[derive(Subcommand)]
enum LedgerCommands {
    /// Show retry counters
    Show,
    /// Delete the ledger so every match starts from zero
    Reset,
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match cli.command {
        Commands::Results { check, headless } => commands::results(&config, check, headless),
        Commands::Ledger { action } => match action {
            LedgerCommands::Show => commands::ledger_show(&config),
            LedgerCommands::Reset => commands::ledger_reset(&config),
        },
        Commands::Today => commands::today(&config),
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use basket::data::scrapers::chrome::ChromeDriver;
    use basket::data::scrapers::with_retry;
    use basket::data::{AttemptLedger, CompetitionUrls, MatchStore};
    use basket::reconcile::{DueMatchDetector, Reconciler, TodayEntry};
    use chrono::{Duration, Local, NaiveDateTime};

    fn now() -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn open_ledger(config: &Config, now: NaiveDateTime) -> Result<AttemptLedger> {
        AttemptLedger::load(
            &config.paths.ledger_path,
            Duration::hours(config.retry.ledger_expiry_hours),
            now,
        )
    }

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all(&config.paths.data_dir)?;
        println!("Created {}/ directory", config.paths.data_dir);

        println!("\nNext steps:");
        println!("  1. Set team.slug in {}", config_path);
        println!(
            "  2. Map competition folders to portal URLs in {}",
            config.paths.url_map_path
        );
        println!("  3. Run 'basket results --check' to see which matches are due");

        Ok(())
    }

    pub fn results(config: &Config, check: bool, headless: bool) -> Result<()> {
        config.validate()?;
        let now = now();
        let store = MatchStore::new(&config.paths.data_dir, &config.team.slug);
        let ledger = open_ledger(config, now)?;

        if check {
            let due = DueMatchDetector::new(&store, config).find_due(&ledger, now);
            if due.is_empty() {
                println!("No matches waiting on a result");
            }
            for p in &due {
                println!(
                    "  [{}/{}] {} vs {} ({}, {} {}) {}",
                    p.attempt,
                    config.retry.max_attempts,
                    p.record.team,
                    p.record.opponent,
                    p.record.side,
                    p.record.date,
                    p.record.time,
                    p.key
                );
            }
            return Ok(());
        }

        let urls = CompetitionUrls::load(&config.paths.url_map_path);
        let mut browser = config.browser.clone();
        browser.headless |= headless;

        let mut reconciler = Reconciler::new(config, store, ledger, urls);
        let summary = reconciler.reconcile(now, || with_retry(|| ChromeDriver::launch(&browser), 2))?;

        println!("\nResults");
        println!("───────────────────────────────");
        println!("  Due:              {}", summary.due);
        println!("  Resolved:         {}", summary.resolved);
        println!("  Postponed:        {}", summary.postponed);
        println!("  Awaiting result:  {}", summary.awaiting_result);
        println!("  Still pending:    {}", summary.still_pending());
        if summary.groups_failed + summary.groups_skipped > 0 {
            println!(
                "  Groups:           {} scraped, {} failed, {} skipped",
                summary.groups_scraped, summary.groups_failed, summary.groups_skipped
            );
        }

        Ok(())
    }

    pub fn ledger_show(config: &Config) -> Result<()> {
        let ledger = open_ledger(config, now())?;

        println!("Retry Ledger");
        println!("───────────────────────────────");
        println!("  Path:     {}", ledger.path().display());
        println!("  Entries:  {}", ledger.len());
        for (id, entry) in ledger.entries() {
            println!(
                "  {:<50} {}/{}  last {}",
                id,
                entry.attempts,
                config.retry.max_attempts,
                entry.last_attempt.format("%d/%m/%Y %H:%M")
            );
        }

        Ok(())
    }

    pub fn ledger_reset(config: &Config) -> Result<()> {
        if AttemptLedger::reset(&config.paths.ledger_path)? {
            println!("Removed {}", config.paths.ledger_path);
        } else {
            println!("No ledger at {}", config.paths.ledger_path);
        }
        Ok(())
    }

    pub fn today(config: &Config) -> Result<()> {
        config.validate()?;
        let store = MatchStore::new(&config.paths.data_dir, &config.team.slug);
        let matches = DueMatchDetector::new(&store, config).find_today(now().date());

        let entries: Vec<TodayEntry> = matches
            .iter()
            .map(|p| TodayEntry::from_pending(p, &store))
            .collect();
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&config.paths.today_path, json)?;

        println!(
            "{} match(es) today, written to {}",
            entries.len(),
            config.paths.today_path
        );
        for e in &entries {
            println!("  {} {} vs {} ({})", e.time, e.team, e.opponent, e.category);
        }

        Ok(())
    }
}
