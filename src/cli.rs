use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

const MIB: usize = 1024 * 1024;

// Part size bounds in MiB, the same for the command line and the config file
const MIN_PART_MIB: u64 = 1;
const MAX_PART_MIB: u64 = 4096;

#[derive(Parser, Debug)]
#[command(name = "Permafrost")]
#[command(about = "Multipart archive upload to a remote cold storage vault (AWS Glacier)")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Part size (in MiB) to use during upload, should be a power of 2 [default: 1]
    #[arg(short = 's', long, value_parser = clap::value_parser!(u64).range(MIN_PART_MIB..=MAX_PART_MIB))]
    pub part_size: Option<u64>,

    /// AWS region (e.g. eu-central-1)
    #[arg(short, long)]
    pub region: Option<String>,

    /// Vault name
    #[arg(short, long)]
    pub vault_name: Option<String>,

    /// Archive description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Retry upload but skip all previously uploaded parts before given part number
    #[arg(short = 'k', long, value_name = "PART")]
    pub skip_parts: Option<u64>,

    /// Custom service endpoint
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Upload into a local in-memory vault instead, to check the hashing
    #[arg(long)]
    pub dry_run: bool,

    /// File to upload (use `-` for stdin)
    pub file: String,
}

// Configuration
// Credentials are not in here, those come from the usual aws env/profile chain
#[derive(Deserialize, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub vault_name: Option<String>,
    pub part_size: Option<u64>,
    pub account_id: String,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            region: None,
            endpoint: None,
            vault_name: None,
            part_size: None,
            account_id: "-".to_string(),
            timeout_secs: 300,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no vault name given, use --vault-name or set vault_name in the config")]
    MissingVault,
    #[error("part size of {0} MiB is out of range, must be 1 to 4096 MiB")]
    PartSize(u64),
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Everything needed for one run, command line wins over the config file
#[derive(Debug, PartialEq, Eq)]
pub struct Settings {
    pub file: String,
    pub vault_name: String,
    pub description: Option<String>,
    pub part_size: usize,
    pub skip_parts: Option<u64>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub account_id: String,
    pub timeout: Duration,
    pub dry_run: bool,
}

impl Settings {
    pub fn resolve(cli: Cli, config: Config) -> Result<Settings, ConfigError> {
        let vault_name = cli
            .vault_name
            .or(config.vault_name)
            .ok_or(ConfigError::MissingVault)?;

        let part_size = match cli.part_size.or(config.part_size).unwrap_or(MIN_PART_MIB) {
            mib @ MIN_PART_MIB..=MAX_PART_MIB => mib as usize * MIB,
            mib => return Err(ConfigError::PartSize(mib)),
        };

        Ok(Settings {
            file: cli.file,
            vault_name,
            description: cli.description,
            part_size,
            skip_parts: cli.skip_parts,
            region: cli.region.or(config.region),
            endpoint: cli.endpoint.or(config.endpoint),
            account_id: config.account_id,
            timeout: Duration::from_secs(config.timeout_secs),
            dry_run: cli.dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("permafrost").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let cli = parse(&["-v", "photos", "backup.tar"]);
        let settings = Settings::resolve(cli, Config::default()).unwrap();

        assert_eq!(settings.file, "backup.tar");
        assert_eq!(settings.vault_name, "photos");
        assert_eq!(settings.part_size, MIB);
        assert_eq!(settings.skip_parts, None);
        assert_eq!(settings.account_id, "-");
        assert_eq!(settings.timeout, Duration::from_secs(300));
        assert!(!settings.dry_run);
    }

    #[test]
    fn all_flags() {
        let cli = parse(&[
            "-s", "4", "-r", "eu-central-1", "-v", "photos", "-d", "old photos", "-k", "3",
            "--dry-run", "-",
        ]);
        let settings = Settings::resolve(cli, Config::default()).unwrap();

        assert_eq!(settings.file, "-");
        assert_eq!(settings.part_size, 4 * MIB);
        assert_eq!(settings.region.as_deref(), Some("eu-central-1"));
        assert_eq!(settings.description.as_deref(), Some("old photos"));
        assert_eq!(settings.skip_parts, Some(3));
        assert!(settings.dry_run);
    }

    #[test]
    fn part_size_out_of_range() {
        let args = ["permafrost", "-s", "0", "-v", "photos", "file"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn config_part_size_out_of_range() {
        for mib in [0, 4097, 5000, 1 << 44, u64::MAX] {
            let config = Config {
                part_size: Some(mib),
                ..Config::default()
            };
            let cli = parse(&["-v", "photos", "file"]);

            let err = Settings::resolve(cli, config).unwrap_err();
            assert!(matches!(err, ConfigError::PartSize(m) if m == mib));
        }
    }

    #[test]
    fn config_part_size_upper_bound() {
        let config = Config {
            part_size: Some(4096),
            ..Config::default()
        };
        let cli = parse(&["-v", "photos", "file"]);

        let settings = Settings::resolve(cli, config).unwrap();
        assert_eq!(settings.part_size as u64, 4096 * MIB as u64);
    }

    #[test]
    fn file_is_required() {
        assert!(Cli::try_parse_from(["permafrost", "-v", "photos"]).is_err());
    }

    #[test]
    fn missing_vault() {
        let cli = parse(&["file"]);
        let err = Settings::resolve(cli, Config::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVault));
    }

    #[test]
    fn config_file_fills_gaps() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            region = "us-west-2"
            vault_name = "from-config"
            part_size = 8
            timeout_secs = 60
            "#
        )
        .unwrap();
        let config = Config::load(file.path()).unwrap();

        let cli = parse(&["-r", "eu-west-1", "file"]);
        let settings = Settings::resolve(cli, config).unwrap();

        assert_eq!(settings.region.as_deref(), Some("eu-west-1"));
        assert_eq!(settings.vault_name, "from-config");
        assert_eq!(settings.part_size, 8 * MIB);
        assert_eq!(settings.timeout, Duration::from_secs(60));
        assert_eq!(settings.account_id, "-");
    }

    #[test]
    fn config_rejects_unknown_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bucket = \"nope\"").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn config_missing_file() {
        let err = Config::load(Path::new("/nonexistent/permafrost.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
