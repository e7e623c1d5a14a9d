use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rsvend::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rsvend", about = "Vend AWS accounts through Service Catalog")]
struct Cli {
    /// Declared accounts
    #[arg(short, long, env = "RSVEND_FILE", default_value = "vend.json")]
    file: PathBuf,
    /// State store
    #[arg(short, long, env = "RSVEND_STORE", default_value = DEFAULT_STORE)]
    store: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision declared accounts and terminate the rest
    Apply,
    /// Re-read stored accounts and drop the ones that vanished
    Refresh,
    /// Terminate every stored account
    Destroy,
    /// Print stored accounts as JSON
    Show,
    /// Adopt an existing provisioned product under a declared name
    Import { name: String, external_id: String },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rsvend=info")),
        )
        .init();
    let cli = Cli::parse();
    let settings = Settings::from_env().context("Could not read settings")?;
    let rt = tokio::runtime::Runtime::new()?;

    let cancel = CancellationToken::new();
    rt.spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping after the current poll");
                cancel.cancel();
            }
        }
    });

    let declaration = match cli.command {
        Command::Apply | Command::Import { .. } => Declaration::from_file(&cli.file)
            .with_context(|| format!("Could not load {}", cli.file.display()))?,
        _ => Declaration::default(),
    };
    let aws = AwsProvider::new(rt.handle(), &settings);
    let mut cloud = VendCloud::new(
        declaration,
        Datastore::new(FileStorage::new(&cli.store)),
        aws.account_vending(&cancel),
    );

    match cli.command {
        Command::Apply => cloud.apply().context("Could not apply declared accounts"),
        Command::Refresh => cloud.refresh().context("Could not refresh accounts"),
        Command::Destroy => cloud.destroy().context("Could not destroy accounts"),
        Command::Show => {
            let resources = cloud.show().context("Could not read the state store")?;
            let view: Vec<_> = resources
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "name": r.name,
                        "external_id": r.output.external_id,
                        "arn": r.output.arn,
                        "created_time": r.output.created_time,
                        "operation_id": r.output.operation_id,
                        "provisioning_status": r.output.provisioning_status,
                        "account_id": r.output.account_id(),
                        "derived_attributes": r.output.derived_attributes,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Command::Import { name, external_id } => cloud
            .import(&name, &external_id)
            .with_context(|| format!("Could not import {} as {}", external_id, name)),
    }
}
