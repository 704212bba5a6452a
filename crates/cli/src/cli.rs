use std::path::PathBuf;

#[derive(clap::Parser, Debug)]
#[clap(name = "modreg", about = "Manage the CMS module registry")]
pub struct Cli {
    /// Use this config file instead of the default location
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Locale used to resolve module names (overrides session.locale)
    #[clap(long, global = true)]
    pub locale: Option<String>,

    /// Act as this user group (overrides session.group_id)
    #[clap(long, global = true)]
    pub group: Option<u32>,

    /// Show what would happen without changing anything
    #[clap(long, global = true)]
    pub dry_run: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// List registered modules
    List {
        /// Include disabled modules
        #[clap(long)]
        all: bool,
        /// Only modules with a frontend
        #[clap(long)]
        frontend: bool,
        /// Only modules with a backend the current group may administer
        #[clap(long)]
        backend: bool,
        /// Only core (true) or third-party (false) modules
        #[clap(long)]
        core: Option<bool>,
        /// Only modules that do (true) or do not (false) appear in the admin menu
        #[clap(long)]
        backend_menu: Option<bool>,
        /// Print JSON instead of a table
        #[clap(long)]
        json: bool,
    },
    /// Show a single module
    Show {
        slug: String,
        /// Print JSON instead of text
        #[clap(long)]
        json: bool,
    },
    /// Install a third-party module from its manifest
    Install { slug: String },
    /// Uninstall a third-party module
    Uninstall {
        slug: String,
        /// Skip confirmation prompt
        #[clap(long)]
        force: bool,
    },
    /// Enable a registered module
    Enable { slug: String },
    /// Disable a registered module
    Disable { slug: String },
    /// Rebuild the registry from the module directories
    Import {
        /// Skip confirmation prompt
        #[clap(long)]
        force: bool,
    },
    /// List controllers of a module, or the methods of one controller
    Controllers {
        slug: String,
        controller: Option<String>,
    },
    /// Manage CLI configuration
    Config {
        #[clap(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigCommands {
    /// Set a configuration value
    Set { key: String, value: String },
    /// Get a configuration value
    Get { key: String },
    /// Show all configuration
    Show,
    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation prompt
        #[clap(long)]
        force: bool,
    },
}
