use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use schoolnet_core::{Latest, MeasurementRecord, Verification, VerifiedRecord};
use schoolnet_crypto::{encode, parse_entity_id, Commitment, CommitmentScheme, MeasurementFields};
use schoolnet_wallet_core::{connect, ClientConfig};

#[derive(Parser)]
#[command(name = "schoolnet")]
#[command(about = "Submit and audit school connectivity measurements on the ledger", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./schoolnet.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a measurement and wait for it to be confirmed
    Submit {
        #[command(flatten)]
        measurement: MeasurementArgs,

        /// Return once the transaction is broadcast
        #[arg(long)]
        no_wait: bool,
    },

    /// Show the latest measurement for a school
    Latest {
        #[arg(long)]
        school_id: String,
    },

    /// Show every measurement ever submitted for a school
    History {
        #[arg(long)]
        school_id: String,
    },

    /// Compute the commitment for a measurement without touching the ledger
    Commit {
        #[command(flatten)]
        measurement: MeasurementArgs,
    },

    /// Check a measurement against a claimed commitment without touching the ledger
    Verify {
        #[command(flatten)]
        measurement: RecordedMeasurementArgs,

        #[arg(long)]
        commitment: String,
    },
}

#[derive(Args)]
struct MeasurementArgs {
    #[arg(long)]
    school_id: String,

    /// Seconds since epoch; defaults to now
    #[arg(long)]
    timestamp: Option<String>,

    /// Download speed in Mbps
    #[arg(long)]
    download: String,

    /// Upload speed in Mbps
    #[arg(long)]
    upload: String,

    /// Latency in milliseconds
    #[arg(long)]
    latency: String,
}

impl MeasurementArgs {
    fn fields(&self) -> Result<MeasurementFields> {
        let timestamp = match &self.timestamp {
            Some(t) => t.clone(),
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .context("system clock is before the Unix epoch")?
                .as_secs()
                .to_string(),
        };
        Ok(MeasurementFields::normalize(
            self.school_id.as_str(),
            timestamp.as_str(),
            self.download.as_str(),
            self.upload.as_str(),
            self.latency.as_str(),
        )?)
    }
}

/// A measurement as it was recorded; the timestamp has no default.
#[derive(Args)]
struct RecordedMeasurementArgs {
    #[arg(long)]
    school_id: String,

    /// Seconds since epoch, as recorded
    #[arg(long)]
    timestamp: String,

    /// Download speed in Mbps
    #[arg(long)]
    download: String,

    /// Upload speed in Mbps
    #[arg(long)]
    upload: String,

    /// Latency in milliseconds
    #[arg(long)]
    latency: String,
}

impl RecordedMeasurementArgs {
    fn fields(&self) -> Result<MeasurementFields> {
        Ok(MeasurementFields::normalize(
            self.school_id.as_str(),
            self.timestamp.as_str(),
            self.download.as_str(),
            self.upload.as_str(),
            self.latency.as_str(),
        )?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Commit { measurement } => {
            let fields = measurement.fields()?;
            let commitment = CommitmentScheme::CURRENT.commit(&fields);
            emit(
                cli.json,
                json!({
                    "scheme": CommitmentScheme::CURRENT.name(),
                    "fields": fields,
                    "packed": format!("0x{}", hex::encode(encode(&fields))),
                    "commitment": commitment,
                }),
                || format!("{commitment}"),
            );
        }
        Commands::Verify { measurement, commitment } => {
            let claimed: Commitment = commitment.parse()?;
            let record = MeasurementRecord::from_stored(measurement.fields()?, claimed);
            let verified = VerifiedRecord::check(record);
            emit(cli.json, json!(verified), || describe(&verified));
            verified.into_valid()?;
        }
        Commands::Submit { measurement, no_wait } => {
            let fields = measurement.fields()?;
            let config = load_config(&cli)?;
            let (submitter, _) = connect(&config)?;

            let handle = submitter.submit_fields(fields).await?;
            info!("Submitted, waiting for confirmation");
            if *no_wait {
                emit(
                    cli.json,
                    json!({ "status": "submitted", "tx_hash": handle.tx_hash(), "record": handle.record() }),
                    || format!("submitted: tx {:#x}\n  {}", handle.tx_hash(), handle.record()),
                );
                return Ok(());
            }
            if !cli.json {
                println!("submitted: tx {:#x}, waiting for confirmation", handle.tx_hash());
            }

            let finalized = handle.wait_finalized().await?;
            emit(
                cli.json,
                json!({ "status": "confirmed", "record": finalized.record, "receipt": finalized.receipt }),
                || {
                    format!(
                        "confirmed in block {}\n  {}",
                        finalized.receipt.block_number, finalized.record
                    )
                },
            );
        }
        Commands::Latest { school_id } => {
            let entity_id = parse_entity_id(school_id)?;
            let config = load_config(&cli)?;
            let (_, query) = connect(&config)?;

            match query.get_latest(entity_id).await? {
                Latest::Found(verified) => {
                    emit(cli.json, json!(verified), || describe(&verified));
                    if !verified.is_valid() {
                        bail!("latest record for school {} failed integrity verification", entity_id);
                    }
                }
                Latest::NotFound => emit(cli.json, json!({ "result": "not_found" }), || {
                    format!("no data for school {entity_id}")
                }),
            }
        }
        Commands::History { school_id } => {
            let entity_id = parse_entity_id(school_id)?;
            let config = load_config(&cli)?;
            let (_, query) = connect(&config)?;

            let history = query.get_history(entity_id).await?;
            let tampered = history.iter().filter(|r| !r.is_valid()).count();
            emit(cli.json, json!(history), || {
                if history.is_empty() {
                    return format!("no submissions for school {entity_id}");
                }
                history.iter().map(describe).collect::<Vec<_>>().join("\n")
            });
            if tampered > 0 {
                warn!("{} record(s) failed integrity verification", tampered);
                bail!("{} of {} records for school {} failed integrity verification", tampered, history.len(), entity_id);
            }
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    ClientConfig::load(cli.config.as_deref()).context("could not load client configuration")
}

fn emit(json: bool, value: serde_json::Value, text: impl FnOnce() -> String) {
    if json {
        println!("{value}");
    } else {
        println!("{}", text());
    }
}

fn describe(verified: &VerifiedRecord) -> String {
    let status = match verified.verification {
        Verification::Valid => "VALID".to_string(),
        Verification::Tampered { recomputed, .. } => format!("TAMPERED (recomputed {recomputed})"),
    };
    match verified.position {
        Some(pos) => format!(
            "[block {} log {}] {} -- {}",
            pos.block_number, pos.log_index, verified.record, status
        ),
        None => format!("{} -- {}", verified.record, status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_submit_with_global_flags() {
        let cli = Cli::try_parse_from([
            "schoolnet", "submit", "--school-id", "1", "--timestamp", "1700000000", "--download", "50", "--upload",
            "10", "--latency", "20", "--no-wait", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Submit { measurement, no_wait } => {
                assert!(no_wait);
                let fields = measurement.fields().unwrap();
                assert_eq!(
                    CommitmentScheme::CURRENT.commit(&fields).to_hex(),
                    "0x2f1af810d4bf81bca1968270fe4747a69a1bbea0192fcc3797cc84622f5296fe"
                );
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_bad_school_id_fails_locally() {
        let cli = Cli::try_parse_from([
            "schoolnet", "commit", "--school-id=-3", "--timestamp", "1", "--download", "1", "--upload", "1",
            "--latency", "1",
        ])
        .unwrap();
        match cli.command {
            Commands::Commit { measurement } => assert!(measurement.fields().is_err()),
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_missing_timestamp_defaults_to_now() {
        let cli = Cli::try_parse_from([
            "schoolnet", "commit", "--school-id", "1", "--download", "1", "--upload", "1", "--latency", "1",
        ])
        .unwrap();
        match cli.command {
            Commands::Commit { measurement } => {
                assert!(!measurement.fields().unwrap().timestamp.is_zero());
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_verify_requires_timestamp() {
        let without = Cli::try_parse_from([
            "schoolnet", "verify", "--school-id", "1", "--download", "50", "--upload", "10", "--latency", "20",
            "--commitment", "0x2f1af810d4bf81bca1968270fe4747a69a1bbea0192fcc3797cc84622f5296fe",
        ]);
        assert!(without.is_err());

        let cli = Cli::try_parse_from([
            "schoolnet", "verify", "--school-id", "1", "--timestamp", "1700000000", "--download", "50", "--upload",
            "10", "--latency", "20", "--commitment",
            "0x2f1af810d4bf81bca1968270fe4747a69a1bbea0192fcc3797cc84622f5296fe",
        ])
        .unwrap();
        match cli.command {
            Commands::Verify { measurement, commitment } => {
                let claimed: Commitment = commitment.parse().unwrap();
                let record = MeasurementRecord::from_stored(measurement.fields().unwrap(), claimed);
                assert!(VerifiedRecord::check(record).is_valid());
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_describe_marks_tampered_records() {
        let fields = MeasurementFields::normalize(1u64, 1u64, 1u32, 1u32, 1u32).unwrap();
        let verified = VerifiedRecord::check(MeasurementRecord::from_stored(fields, Commitment::ZERO));
        assert!(describe(&verified).contains("TAMPERED"));
    }
}
