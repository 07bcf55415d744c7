mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, PageArgs};
use dotenv::dotenv;
use progress::CliReporter;
use shoebox_core::storage::{OutcomingRecord, Page};
use shoebox_core::{AppConfig, CancellationToken, Engine, ScanRequest, ScanState};
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let args = Cli::parse();
    let _guard = logging::init_logger(args.verbose);

    let config = match shoebox_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return;
    };

    if let Err(err) = run(command, config) {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn run(command: Commands, mut config: AppConfig) -> Result<()> {
    match command {
        Commands::Scan { src, dest, json } => {
            if src.is_some() {
                config.source_root = src;
            }
            if dest.is_some() {
                config.dest_root = dest;
            }
            run_scan(config, json)
        }
        Commands::Incoming(page) => {
            let engine = Engine::new(config);
            let listing = engine.list_incoming(page.offset, page.limit)?;
            if page.json {
                return print_json(&listing);
            }
            print_page_header("Incoming", listing.total, &page);
            for item in &listing.items {
                let state = match (&item.error, item.copied) {
                    (Some(reason), _) => format!("failed: {}", reason).red(),
                    (None, true) => "copied".green(),
                    (None, false) => "pending".yellow(),
                };
                println!("{:>6}  {:<40} {}", item.id, item.src_path, state);
            }
            Ok(())
        }
        Commands::Outcoming(page) => {
            let engine = Engine::new(config);
            let listing = engine.list_outcoming(page.offset, page.limit)?;
            if page.json {
                return print_json(&listing);
            }
            print_outcoming(&listing, &page);
            Ok(())
        }
        Commands::Show { id } => {
            let record = Engine::new(config).get_outcoming(id)?;
            print_json(&record)
        }
        Commands::Tag { id, tags } => {
            let record = Engine::new(config).update_tags(id, &tags)?;
            println!(
                "{} {} tagged [{}]",
                "✓".green(),
                record.name,
                record.tags.join(", ").cyan()
            );
            Ok(())
        }
        Commands::Clear { yes } => {
            let confirmed = yes
                || prompt_confirm(
                    "Are you SURE you want to delete every incoming and outcoming record?",
                    Some(false),
                )?;
            if !confirmed {
                info!("Clear aborted");
                return Ok(());
            }
            Engine::new(config).clear_all()?;
            println!("All records deleted");
            Ok(())
        }
        Commands::PrintConfig => {
            println!("Configuration: {:#?}", config);
            println!("Database: {}", config.resolved_database_path().display());
            Ok(())
        }
    }
}

fn run_scan(config: AppConfig, json: bool) -> Result<()> {
    let Some(source_root) = config.source_root.clone() else {
        bail!("no source folder: pass --src or set SHOEBOX_SOURCE_ROOT");
    };
    let Some(dest_root) = config.dest_root.clone() else {
        bail!("no destination folder: pass --dest or set SHOEBOX_DEST_ROOT");
    };

    let token = CancellationToken::new();
    {
        let token = token.clone();
        ctrlc::set_handler(move || {
            warn!("Interrupt received, finishing the current file");
            token.cancel();
        })
        .context("installing Ctrl-C handler")?;
    }

    let engine = Engine::new(config).with_cancellation(token);
    let request = ScanRequest {
        source_root,
        dest_root,
    };
    let handle = engine.start_scan(request, Arc::new(CliReporter::new()))?;
    let outcome = handle.wait();
    let status = engine.status();

    if json {
        print_json(&*status)?;
    } else if let Ok(report) = &outcome {
        info!(
            "Finished in {}: {} incoming records retired",
            format!("{:.2}s", report.duration.as_secs_f64()).green(),
            format!("{}", report.retired_incoming).cyan(),
        );
        for failure in &report.failures {
            warn!("{}: {}", failure.src_path.display(), failure.reason);
        }
    }

    match outcome {
        Ok(_) => Ok(()),
        Err(_) if status.status == ScanState::Cancelled => {
            println!("{}", "Scan cancelled".yellow());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_page_header(title: &str, total: i64, page: &PageArgs) {
    println!(
        "{} {} (offset {}, limit {})",
        title.bold(),
        format!("{} total", total).cyan(),
        page.offset,
        page.limit
    );
}

fn print_outcoming(listing: &Page<OutcomingRecord>, page: &PageArgs) {
    print_page_header("Outcoming", listing.total, page);
    for item in &listing.items {
        let tags = if item.tags.is_empty() {
            String::new()
        } else {
            format!("[{}]", item.tags.join(", "))
        };
        println!(
            "{:>6}  {:<6} {:<50} {}",
            item.id,
            item.file_category.as_str(),
            item.dest_path,
            tags.cyan()
        );
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(default.unwrap_or(false));
        }

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
