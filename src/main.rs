use compose_role::cli::{CliArgs, OutputFormatter};
use compose_role::util::{init_logging, LoggingConfig};
use compose_role::{transform_descriptor, ComposeCli, RealFileSystem, VERSION};

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

fn main() {
    let args = CliArgs::parse();
    init_logging(LoggingConfig::from_flags(
        args.log_level.as_deref(),
        args.verbose,
        args.quiet,
    ));

    debug!("compose-role v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match run(&args) {
        Ok(()) => 0,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };

    std::process::exit(exit_code);
}

fn run(args: &CliArgs) -> Result<()> {
    let config = args.to_config();
    let descriptor = absolute(&args.file)?;
    let canonicalizer = ComposeCli::new(&args.compose_command);

    let document = transform_descriptor(&config, &descriptor, &RealFileSystem, &canonicalizer)?;
    let output = OutputFormatter::new(args.format.into()).format(&document)?;

    match &args.out {
        Some(path) => {
            std::fs::write(path, output)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            info!(path = %path.display(), "Output written");
        }
        None => print!("{}", output),
    }

    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    Ok(cwd.join(path))
}
