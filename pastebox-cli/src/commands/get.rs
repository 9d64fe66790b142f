//! Read a document straight from the store

use anyhow::{bail, Context, Result};
use clap::Parser;

use pastebox_server::PasteboxConfig;

use super::{open_store, DatabaseArgs};

/// Arguments for the get command
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Document key
    pub key: String,

    /// Print only the document text
    #[arg(long)]
    pub raw: bool,

    #[command(flatten)]
    pub db: DatabaseArgs,
}

/// Print a live document; fails when the key is absent or expired
pub async fn run_get(mut config: PasteboxConfig, args: GetArgs) -> Result<()> {
    args.db.apply(&mut config);
    let store = open_store(&config).await?;

    let found = store
        .get(&args.key)
        .await
        .with_context(|| format!("Failed to read document '{}'", args.key))?;
    store.manager().pool().close().await;

    let Some(doc) = found else {
        bail!("document '{}' not found", args.key);
    };

    if args.raw {
        print!("{}", doc.text);
    } else {
        println!("{}", serde_json::to_string_pretty(&doc)?);
    }
    Ok(())
}
