use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use texpm::commands;
use texpm::session::SessionOptions;

/// texpm - TeX package metadata manager
///
/// Inspect the package definitions and install state of a TeX installation.
///
/// Examples:
///   texpm list                 # List all known packages
///   texpm info amsmath         # Show one package
///   texpm verify amsmath       # Check installed files against the package digest
#[derive(Parser, Debug)]
#[command(author, version = env!("TEXPM_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Machine-wide installation root (also via TEXPM_COMMON_ROOT)
    #[arg(long, env = "TEXPM_COMMON_ROOT", value_name = "PATH", global = true)]
    common_root: Option<PathBuf>,

    /// Per-user installation root (also via TEXPM_USER_ROOT)
    #[arg(long, env = "TEXPM_USER_ROOT", value_name = "PATH", global = true)]
    user_root: Option<PathBuf>,

    /// Operate on the machine-wide installation only (also via TEXPM_ADMIN)
    #[arg(long, env = "TEXPM_ADMIN", global = true)]
    admin: bool,

    /// Treat every defined package as installed (also via TEXPM_DIRECT)
    #[arg(long, env = "TEXPM_DIRECT", global = true)]
    direct: bool,
}

impl Cli {
    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            common_root: self.common_root.clone(),
            user_root: self.user_root.clone(),
            // Without --admin, privilege detection decides
            admin_mode: self.admin.then_some(true),
            direct_mode: self.direct,
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List all known packages
    List,

    /// Show details of a package
    Info(InfoArgs),

    /// Verify installed packages against their digests
    Verify(VerifyArgs),

    /// Write the file name database listing
    Fndb(FndbArgs),

    /// Show the default package repository
    Repository,

    /// Show the proxy used for a URL
    Proxy(ProxyArgs),
}

#[derive(clap::Args, Debug)]
struct InfoArgs {
    /// Package name
    #[arg(value_name = "PACKAGE")]
    name: String,

    /// Print the record as JSON
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct VerifyArgs {
    /// Packages to verify (default: all installed packages)
    #[arg(value_name = "PACKAGE")]
    names: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct FndbArgs {
    /// Write to a file instead of stdout
    #[arg(long, short, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct ProxyArgs {
    /// URL the proxy would be used for
    #[arg(value_name = "URL")]
    url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = texpm::runtime::RealRuntime;
    let options = cli.session_options();

    match cli.command {
        Commands::List => commands::list(runtime, options).await?,
        Commands::Info(args) => commands::info(runtime, options, &args.name, args.json).await?,
        Commands::Verify(args) => commands::verify(runtime, options, &args.names).await?,
        Commands::Fndb(args) => commands::fndb(runtime, options, args.output).await?,
        Commands::Repository => commands::repository(runtime, options)?,
        Commands::Proxy(args) => commands::proxy(runtime, options, args.url.as_deref())?,
    }
    Ok(())
}
