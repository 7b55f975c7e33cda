//! buildpod - disposable container build environments from the command line

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "buildpod")]
#[command(version, about = "Provision disposable container build environments", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the engine endpoint URI (e.g. tcp://host:2376)
    #[arg(long, global = true)]
    host: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the engine server version
    Version,

    /// Pull an image from a registry
    Pull {
        /// Image reference
        image: String,
    },

    /// Build an image from a Dockerfile context
    Build {
        /// Build context path
        path: String,
        /// Image tag
        #[arg(short, long)]
        tag: String,
        /// Always attempt to pull newer base images
        #[arg(long)]
        pull: bool,
    },

    /// Create an anonymous volume and print its name
    Volume,

    /// Force-remove a container
    Rm {
        /// Container ID or name
        container: String,
    },

    /// Run a command inside a running container
    Exec {
        /// Container ID or name
        container: String,
        /// Working directory inside the container
        #[arg(short, long)]
        workdir: Option<String>,
        /// Command to run
        #[arg(trailing_var_arg = true, required = true)]
        cmd: Vec<String>,
    },

    /// Provision a remoting container plus optional build/side siblings
    Provision {
        /// Image for the remoting container
        #[arg(long)]
        image: String,
        /// Host directory mounted as the build workspace
        #[arg(long)]
        workdir: String,
        /// Path to the build-agent bootstrap binary
        #[arg(long)]
        agent: String,
        /// Path to the trampoline helper binary
        #[arg(long)]
        trampoline: String,
        /// Images for sibling build containers
        #[arg(long = "build-image")]
        build_images: Vec<String>,
        /// Images for sibling side containers
        #[arg(long = "side-image")]
        side_images: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = buildpod_config::GlobalConfig::load().unwrap_or_default();
    if let Some(host) = cli.host {
        config.engine.uri = Some(host);
    }
    if cli.verbose {
        config.defaults.verbose = true;
    }

    match cli.command {
        Commands::Version => commands::version(&config).await,
        Commands::Pull { image } => commands::pull(&config, &image).await,
        Commands::Build { path, tag, pull } => commands::build(&config, &path, &tag, pull).await,
        Commands::Volume => commands::volume_create(&config).await,
        Commands::Rm { container } => commands::rm(&config, &container).await,
        Commands::Exec {
            container,
            workdir,
            cmd,
        } => commands::exec(&config, &container, workdir, cmd).await,
        Commands::Provision {
            image,
            workdir,
            agent,
            trampoline,
            build_images,
            side_images,
        } => {
            commands::provision(
                &config,
                commands::ProvisionArgs {
                    image,
                    workdir,
                    agent,
                    trampoline,
                    build_images,
                    side_images,
                },
            )
            .await
        }
    }
}
