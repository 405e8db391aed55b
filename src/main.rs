use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use podvault::{
    Config, FeedConfig, FeedSource, NoopReporter, ProgressEvent, ProgressReporter, ReqwestClient,
    SharedProgressReporter, SyncOptions, sync_feed,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");
static RECYCLE: Emoji<'_, '_> = Emoji("🔄 ", "[u] ");
static MEMO: Emoji<'_, '_> = Emoji("📝 ", "[m] ");
static TRASH: Emoji<'_, '_> = Emoji("🗑️  ", "[d] ");
static RESTORE: Emoji<'_, '_> = Emoji("♻️  ", "[r] ");
static BROOM: Emoji<'_, '_> = Emoji("🧹 ", "[c] ");

/// Archive podcast RSS feeds with a durable version history
#[derive(Parser, Debug)]
#[command(name = "podvault")]
#[command(about = "Archive podcast RSS feeds with a durable version history")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Synchronize only the feed with this name
    #[arg(long)]
    feed: Option<String>,

    /// Maximum number of concurrent downloads
    #[arg(long, default_value = "3")]
    concurrent: usize,

    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<usize, ProgressBar>>,
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .unwrap();

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            main_bar,
        }
    }

    fn get_or_create_bar(&self, download_id: usize) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap();

        if let Some(bar) = bars.get(&download_id) {
            return bar.clone();
        }

        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .unwrap()
            .progress_chars("█▓░");

        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(style);
        bars.insert(download_id, bar.clone());
        bar
    }

    fn finish_bar(&self, download_id: usize) {
        let mut bars = self.bars.lock().unwrap();
        if let Some(bar) = bars.remove(&download_id) {
            bar.finish_and_clear();
        }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingFeed { url } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Fetching feed: {}", url.cyan()));
            }

            ProgressEvent::FeedParsed {
                podcast_title,
                total_episodes,
                to_fetch,
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} • {} episodes total, {} to fetch",
                    podcast_title.bold().green(),
                    total_episodes.to_string().cyan(),
                    to_fetch.to_string().yellow()
                ));
            }

            ProgressEvent::PartialFilesCleanedUp { count } => {
                self.multi
                    .println(format!(
                        "{BROOM}Cleaned up {} partial file(s) from an interrupted run",
                        count.to_string().yellow()
                    ))
                    .ok();
            }

            ProgressEvent::DownloadStarting {
                download_id,
                episode_title,
                episode_index,
                total_to_download,
                content_length,
            } => {
                let bar = self.get_or_create_bar(download_id);
                bar.set_length(content_length.unwrap_or(0));
                bar.set_position(0);
                bar.set_message(format!(
                    "[{}/{}] {}",
                    (episode_index + 1).to_string().cyan(),
                    total_to_download.to_string().cyan(),
                    truncate_title(&episode_title, 40)
                ));
            }

            ProgressEvent::DownloadProgress {
                download_id,
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                let bar = self.get_or_create_bar(download_id);
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_downloaded);
            }

            ProgressEvent::DownloadCompleted {
                download_id,
                episode_title,
                bytes_downloaded,
            } => {
                let bar = self.get_or_create_bar(download_id);
                bar.set_position(bytes_downloaded);
                bar.set_message(format!(
                    "{SUCCESS}{}",
                    truncate_title(&episode_title, 40).green()
                ));
                self.finish_bar(download_id);
            }

            ProgressEvent::DownloadFailed {
                download_id,
                episode_title,
                error,
            } => {
                let bar = self.get_or_create_bar(download_id);
                bar.abandon_with_message(format!(
                    "{FAILURE}{} - {}",
                    truncate_title(&episode_title, 30).red(),
                    error.red()
                ));
                self.finish_bar(download_id);
            }

            ProgressEvent::ContentVersioned {
                episode_title,
                reason,
            } => {
                self.multi
                    .println(format!(
                        "{RECYCLE}{} - {}",
                        truncate_title(&episode_title, 40).yellow(),
                        reason.dimmed()
                    ))
                    .ok();
            }

            ProgressEvent::MetadataVersioned {
                episode_title,
                reason,
            } => {
                self.multi
                    .println(format!(
                        "{MEMO}{} - {}",
                        truncate_title(&episode_title, 40),
                        truncate_title(&reason, 60).dimmed()
                    ))
                    .ok();
            }

            ProgressEvent::EpisodeDeleted { episode_title } => {
                self.multi
                    .println(format!(
                        "{TRASH}{} - removed from feed",
                        truncate_title(&episode_title, 40).yellow()
                    ))
                    .ok();
            }

            ProgressEvent::EpisodeRestored { episode_title } => {
                self.multi
                    .println(format!(
                        "{RESTORE}{} - restored",
                        truncate_title(&episode_title, 40).green()
                    ))
                    .ok();
            }

            ProgressEvent::SyncCompleted {
                downloaded_count,
                updated_count,
                metadata_count,
                unchanged_count,
                deleted_count,
                restored_count,
                failed_count,
            } => {
                self.main_bar.finish_and_clear();
                println!(
                    "\n{PARTY}{} {} downloaded, {} updated, {} metadata, {} unchanged, {} deleted, {} restored, {} failed",
                    "Sync complete:".bold().green(),
                    downloaded_count.to_string().green().bold(),
                    updated_count.to_string().cyan(),
                    metadata_count.to_string().cyan(),
                    unchanged_count.to_string().dimmed(),
                    deleted_count.to_string().yellow(),
                    restored_count.to_string().green(),
                    if failed_count > 0 {
                        failed_count.to_string().red().bold()
                    } else {
                        failed_count.to_string().green()
                    }
                );
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let kept: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podvault".bold().magenta(),
            "- Podcast Feed Archiver".dimmed()
        );
    }

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;

    let feeds: Vec<&FeedConfig> = match &args.feed {
        Some(name) => {
            let selected: Vec<&FeedConfig> =
                config.feeds.iter().filter(|f| &f.name == name).collect();
            if selected.is_empty() {
                bail!("No feed named '{}' in {}", name, args.config.display());
            }
            selected
        }
        None => config.feeds.iter().collect(),
    };

    let client = ReqwestClient::new();

    let mut succeeded = 0usize;
    let mut failed = 0usize;

    for feed in feeds {
        if !args.quiet {
            println!("{HEADPHONES}{}", feed.name.bold().cyan());
        }

        let source = match FeedSource::parse(&feed.url) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("{FAILURE}{}: {e}", feed.name.red().bold());
                failed += 1;
                continue;
            }
        };

        let storage_dir = config.feed_storage_dir(feed);
        let options = SyncOptions {
            max_downloads: config.feed_max_downloads(feed),
            max_age_days: config.feed_max_age_days(feed),
            max_concurrent: args.concurrent,
            base_url: feed.base_url.clone(),
        };

        let reporter: SharedProgressReporter = if args.quiet {
            NoopReporter::shared()
        } else {
            Arc::new(IndicatifReporter::new())
        };

        match sync_feed(&client, &source, &storage_dir, &options, &reporter).await {
            Ok(summary) => {
                succeeded += 1;

                if !args.quiet && !summary.failed_episodes.is_empty() {
                    println!("\n{}", "Failed episodes:".red().bold());
                    for (title, error) in &summary.failed_episodes {
                        println!(
                            "  {}{} - {}",
                            CROSS,
                            title.yellow(),
                            error.to_string().dimmed()
                        );
                    }
                }

                if !args.quiet {
                    println!(
                        "\n{FOLDER}Archive: {}\n",
                        storage_dir.display().to_string().cyan()
                    );
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("{FAILURE}{}: {e}", feed.name.red().bold());
            }
        }
    }

    // Exit code 1 only when every feed failed.
    if failed > 0 && succeeded == 0 {
        std::process::exit(1);
    }

    Ok(())
}
