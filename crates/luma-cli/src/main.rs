//! Luma web runner - run Luma snippets over HTTP
//!
//! Usage:
//!   luma-web --interpreter target/release/luma
//!   luma-web --profile permissive --build-dir ..

mod server;

use clap::{Parser, ValueEnum};
use luma_core::{BuildStep, Profile, RunnerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "luma-web")]
#[command(author = "HeyBattle1")]
#[command(version)]
#[command(about = "Runs Luma code submitted over HTTP under time and size limits", long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "LUMA_BIND", default_value = "0.0.0.0:5000")]
    bind: SocketAddr,

    /// Path to the Luma interpreter executable
    #[arg(long, env = "LUMA_INTERPRETER", default_value = "target/release/luma")]
    interpreter: PathBuf,

    /// Deployment profile supplying the defaults below
    #[arg(long, env = "LUMA_PROFILE", value_enum, default_value_t = ProfileArg::Lean)]
    profile: ProfileArg,

    /// Directory holding index.html
    #[arg(long, env = "LUMA_WEB_DIR", default_value = "web")]
    web_dir: PathBuf,

    /// Where submissions are written before running (defaults to the OS temp dir)
    #[arg(long, env = "LUMA_ARTIFACT_DIR")]
    artifact_dir: Option<PathBuf>,

    /// Wall-clock limit per run
    #[arg(long, env = "LUMA_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[arg(long, env = "LUMA_MAX_CODE_CHARS")]
    max_code_chars: Option<usize>,

    #[arg(long, env = "LUMA_MAX_UNBOUNDED_LOOPS")]
    max_unbounded_loops: Option<usize>,

    #[arg(long, env = "LUMA_MAX_OUTPUT_CHARS")]
    max_output_chars: Option<usize>,

    #[arg(long, env = "LUMA_MAX_ERROR_CHARS")]
    max_error_chars: Option<usize>,

    /// Run `cargo build --release` in this directory before every submission
    #[arg(long, env = "LUMA_BUILD_DIR")]
    build_dir: Option<PathBuf>,

    /// Skip the while/true loop check (the length limit still applies)
    #[arg(long)]
    no_screening: bool,

    /// Do not ask the interpreter for benchmark output
    #[arg(long)]
    no_benchmark: bool,

    /// Do not append the processing-time line to output
    #[arg(long)]
    no_annotate: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileArg {
    Lean,
    Permissive,
}

impl From<ProfileArg> for Profile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Lean => Profile::Lean,
            ProfileArg::Permissive => Profile::Permissive,
        }
    }
}

impl Cli {
    fn runner_config(&self) -> RunnerConfig {
        let mut config = RunnerConfig::new(self.profile.into(), &self.interpreter);

        if let Some(dir) = &self.artifact_dir {
            config.artifact_dir = dir.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = self.max_code_chars {
            config.max_code_chars = n;
        }
        if let Some(n) = self.max_unbounded_loops {
            config.max_unbounded_loops = n;
        }
        if let Some(n) = self.max_output_chars {
            config.max_output_chars = n;
        }
        if let Some(n) = self.max_error_chars {
            config.max_error_chars = n;
        }
        if let Some(dir) = &self.build_dir {
            config.build = Some(BuildStep::cargo_release(dir));
        }
        config.screening &= !self.no_screening;
        config.benchmark_mode &= !self.no_benchmark;
        config.annotate_performance &= !self.no_annotate;

        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.runner_config();

    if config.build.is_none() && !config.interpreter.exists() {
        tracing::warn!(
            interpreter = %config.interpreter.display(),
            "interpreter not found; runs will fail until it is built"
        );
    }
    tracing::info!(
        profile = ?cli.profile,
        interpreter = %config.interpreter.display(),
        timeout_secs = config.timeout.as_secs(),
        screening = config.screening,
        benchmark = config.benchmark_mode,
        build = config.build.is_some(),
        "runner configured"
    );

    let app = server::router(Arc::new(config), &cli.web_dir);

    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, web_dir = %cli.web_dir.display(), "Luma runner listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("luma-web").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_is_lean() {
        let config = parse(&["--interpreter", "/opt/luma"]).runner_config();
        assert_eq!(config.interpreter, PathBuf::from("/opt/luma"));
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert!(config.screening);
        assert!(config.benchmark_mode);
        assert!(config.build.is_none());
    }

    #[test]
    fn test_permissive_with_build() {
        let config = parse(&["--profile", "permissive", "--build-dir", "/src/luma"]).runner_config();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(!config.screening);
        let build = config.build.unwrap();
        assert_eq!(build.working_dir, PathBuf::from("/src/luma"));
    }

    #[test]
    fn test_overrides() {
        let config = parse(&[
            "--timeout-secs",
            "3",
            "--max-code-chars",
            "50",
            "--max-output-chars",
            "80",
            "--no-screening",
            "--no-annotate",
        ])
        .runner_config();
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.max_code_chars, 50);
        assert_eq!(config.max_output_chars, 80);
        assert!(!config.screening);
        assert!(!config.annotate_performance);
        assert!(config.benchmark_mode);
    }

    #[test]
    fn test_bad_profile_rejected() {
        assert!(Cli::try_parse_from(["luma-web", "--profile", "reckless"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
