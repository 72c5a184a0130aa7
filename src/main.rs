use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::Result;
use tracing_subscriber::{fmt, EnvFilter};

use privguard::privilege::loader;
use privguard::settings::Settings;

#[derive(Parser, Debug)]
#[command(
    name = "privguard",
    version,
    about = "Enforce privilege escalation policy for sudo and polkit"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "privguard.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile the policy entries and install the generated files
    Apply {
        /// Name of the directory object the entries belong to
        #[arg(long)]
        object: String,
        #[arg(long, value_enum, default_value_t = ObjectKind::Computer)]
        kind: ObjectKind,
        /// KDL file listing the policy entries in order
        #[arg(long)]
        policy: PathBuf,
    },
    /// Print what `apply` would install, without touching the host
    Compile {
        #[arg(long)]
        policy: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ObjectKind {
    Computer,
    User,
}

fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let settings = Settings::load(&cli.config)?;
    tracing::debug!(?settings, "Loaded configuration");
    let manager = settings.privilege.manager();

    match cli.command {
        Command::Apply {
            object,
            kind,
            policy,
        } => {
            let entries = loader::load_entries(&policy)?;
            manager.apply_policy(&object, kind == ObjectKind::Computer, &entries)?;
        }
        Command::Compile { policy } => {
            let entries = loader::load_entries(&policy)?;
            let targets = manager.targets();

            // No entries means both files go, with no fragment lookup.
            if entries.is_empty() {
                println!("==> {}\n(removed)", targets.escalation_rules.display());
                println!("==> {}\n(removed)", targets.authorization.display());
                return Ok(());
            }

            let compiled = manager.compile(&entries)?;
            println!("==> {}", targets.escalation_rules.display());
            print!("{}", compiled.render_escalation_rules());

            println!("==> {}", targets.authorization.display());
            match compiled.authorization.render() {
                Some(content) => print!("{content}"),
                None => println!("(removed)"),
            }
        }
    }

    Ok(())
}
