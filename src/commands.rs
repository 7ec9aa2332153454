use crate::api::FontsApi;
use crate::catalog;
use crate::colors;
use crate::config::{Config, InstallOptions, Scope};
use crate::error::Result;
use crate::formats;
use crate::pipeline::{FontInstaller, RunSummary, StagingRoot};
use crate::platform;
use crate::registry;
use colored::Colorize;

pub async fn list(config: &Config, filter: Option<&str>) -> Result<()> {
    let api = FontsApi::new(config)?;
    let fonts = catalog::load_catalog(&api, config).await?;
    let matches = catalog::filter_catalog(&fonts, filter);

    if matches.is_empty() {
        println!(
            "{} No fonts matching '{}'",
            "✗".red(),
            filter.unwrap_or_default()
        );
        return Ok(());
    }

    let width = matches.iter().map(|e| e.cask_name.len()).max().unwrap_or(0);
    for entry in &matches {
        let name = format!("{:<width$}", entry.cask_name, width = width);
        print!("{}  {}", name.bold(), entry.display_name());
        if !entry.description.is_empty() {
            print!(" {}", format!("- {}", entry.description).dimmed());
        }
        println!();
    }
    println!("\n{} {} fonts", "✓".green(), matches.len().to_string().bold());

    Ok(())
}

pub async fn install(
    config: &Config,
    names: &[String],
    all: bool,
    options: &InstallOptions,
) -> Result<RunSummary> {
    platform::check_environment()?;
    platform::check_scope(options.scope)?;

    let api = FontsApi::new(config)?;
    let fonts = catalog::load_catalog(&api, config).await?;
    let entries = catalog::select_entries(&fonts, names, all)?;

    let supported = formats::detect_supported_formats();
    let dest_dir = platform::font_dir(options.scope, &config.data_home)?;
    // Machine-wide registrations store bare names relative to this directory
    let system_fonts = platform::font_dir(Scope::AllUsers, &config.data_home)?;

    if options.dry_run {
        println!("{} Dry run, nothing will be installed", "⚠".yellow());
    }
    println!(
        "{} Installing {} font(s) into {}",
        "==>".bold().green(),
        entries.len().to_string().bold(),
        dest_dir.display()
    );

    let summary = FontInstaller::new(
        &api,
        options,
        supported,
        dest_dir,
        registry::platform_registry(system_fonts),
        StagingRoot::create()?,
    )
    .with_progress(colors::stdout_is_tty())
    .run(&entries)
    .await?;

    println!(
        "\n{} {} installed, {} skipped, {} failed",
        "==>".bold().green(),
        (summary.installed.len() + summary.planned.len()).to_string().bold(),
        summary.skipped.len(),
        summary.failed.len()
    );

    Ok(summary)
}
