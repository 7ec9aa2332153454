use clap::{Parser, Subcommand};
use nerdfont_installer::config::{Config, FontType, InstallOptions, Scope, Variant};
use nerdfont_installer::{colors, commands};

#[derive(Parser)]
#[command(name = "nfi")]
#[command(author, version, about = "Install Nerd Fonts from their upstream releases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and install fonts
    Install {
        /// Font short names (see `nfi list`)
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        names: Vec<String>,

        /// Install every font in the catalog
        #[arg(long)]
        all: bool,

        /// Prefer variable or static font files
        #[arg(long, value_enum, default_value_t = Variant::Variable)]
        variant: Variant,

        /// Font file types in order of preference [default: ttf,otf,woff2]
        #[arg(long = "type", value_delimiter = ',')]
        types: Vec<String>,

        /// Install for the current user or for all users
        #[arg(long, value_enum, default_value_t = Scope::CurrentUser)]
        scope: Scope,

        /// Overwrite fonts that are already installed
        #[arg(long)]
        force: bool,

        /// Show what would be installed without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// List available fonts
    List {
        /// Only show fonts whose name or description contains this
        filter: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    colors::init_colors();

    let config = Config::from_env();

    match cli.command {
        Commands::Install {
            names,
            all,
            variant,
            types,
            scope,
            force,
            dry_run,
        } => {
            let font_types = if types.is_empty() {
                FontType::DEFAULT_ORDER.to_vec()
            } else {
                types
                    .iter()
                    .map(|t| t.parse::<FontType>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(anyhow::Error::msg)?
            };

            let options = InstallOptions {
                variant,
                font_types,
                scope,
                force,
                dry_run,
            };

            let summary = commands::install(&config, &names, all, &options).await?;
            if summary.has_failures() {
                std::process::exit(1);
            }
        }
        Commands::List { filter } => {
            commands::list(&config, filter.as_deref()).await?;
        }
    }

    Ok(())
}
