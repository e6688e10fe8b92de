use std::error::Error as StdError;
use std::process::ExitCode;

use clap::Parser;
use log::debug;
use thiserror::Error;

use remote::glacier::{Glacier, GlacierConfig};
use remote::sql::MemoryVault;
use remote::{ArchiveReceipt, Remote, RemoteError};

mod cli;
use crate::cli::Cli;
use crate::cli::Config;
use crate::cli::ConfigError;
use crate::cli::Settings;

mod session;
mod source;
mod upload;
use crate::upload::{UploadError, UploadOptions};

#[derive(Error, Debug)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not open {path}")]
    Source {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not set up the remote")]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

fn main() -> ExitCode {
    // Progress is part of the output, so info is on unless RUST_LOG says otherwise
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse the cli
    let cli = Cli::parse();
    let skip_parts = cli.skip_parts;

    match run(cli) {
        Ok(receipt) => {
            println!("Archive successfully uploaded.");
            print!("{}", receipt);
            ExitCode::SUCCESS
        }
        Err(e) => {
            debug!("{:?}", e);
            eprintln!("ERROR: {}", e);

            let mut cause = e.source();
            while let Some(err) = cause {
                eprintln!("\tcaused by: {}", err);
                cause = err.source();
            }

            if let AppError::Upload(err) = &e {
                if let Some(part) = err.part() {
                    eprintln!("{}", rerun_hint(part, skip_parts));
                }
            }
            ExitCode::FAILURE
        }
    }
}

// A re-run always opens a new session, skipping only saves sending the parts
// again. Parts below the old skip were never sent by this run.
fn rerun_hint(failed: u64, skip_parts: Option<u64>) -> String {
    let skip = skip_parts.unwrap_or(0);
    let sent = if failed > skip {
        format!("Parts {} to {} were sent before the failure.", skip, failed - 1)
    } else {
        "No parts were sent before the failure.".to_string()
    };
    format!(
        "{} To avoid re-sending data on a re-run, pass --skip-parts {} (the re-run opens a new upload session).",
        sent,
        failed.max(skip)
    )
}

fn run(cli: Cli) -> Result<ArchiveReceipt, AppError> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let settings = Settings::resolve(cli, config)?;
    debug!("SETTINGS: {:?}", settings);

    // Open the input before talking to the remote so a typo costs nothing
    let mut input = source::open(&settings.file).map_err(|source| AppError::Source {
        path: settings.file.clone(),
        source,
    })?;

    let opts = UploadOptions {
        vault: settings.vault_name.clone(),
        description: settings.description.clone(),
        part_size: settings.part_size,
        skip_parts: settings.skip_parts,
    };

    if settings.dry_run {
        // In memory remote that verifies every part and the final tree hash
        let remote = MemoryVault::new(None)?;
        remote.create_vault(&settings.vault_name)?;
        upload_with(&remote, &mut input, &opts)
    } else {
        let remote = Glacier::new(GlacierConfig {
            region: settings.region,
            endpoint: settings.endpoint,
            account_id: settings.account_id,
            timeout: settings.timeout,
        })?;
        upload_with(&remote, &mut input, &opts)
    }
}

fn upload_with<B: Remote, S: source::ByteSource>(
    remote: &B,
    input: &mut S,
    opts: &UploadOptions,
) -> Result<ArchiveReceipt, AppError> {
    let done = upload::upload(remote, input, opts)?;
    debug!(
        "uploaded {} bytes in {} leaves, tree hash {:?}",
        done.session.archive_size(),
        done.session.leaves().len(),
        done.session.checksum()
    );
    Ok(done.receipt)
}
