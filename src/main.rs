//! doorway-jwk - resolve or generate the signing key of a JSON Web Key Set

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use doorway_jwk::{
    config::{Args, OutputFormat},
    jwk::{
        exclude_opaque_private_keys, exclude_private_keys, pem_block_for_key, InMemoryKeyManager,
        KeyGenFlight, KeyManager, KeyResolver,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging (stderr, so stdout stays machine readable)
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("doorway_jwk={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!(jwks = %args.set, alg = %args.alg, kid = %args.kid(), "Resolving signing key");

    let manager = Arc::new(InMemoryKeyManager::new(args.generator_config()));
    if let Some(path) = &args.jwks_file {
        manager.load_file(&args.set, path).await?;
    }
    let flight = Arc::new(KeyGenFlight::new());
    let resolver = KeyResolver::new(manager.clone(), flight);

    let key = resolver
        .get_or_generate_keys(&args.set, args.kid(), &args.alg)
        .await?;
    info!(kid = %key.kid, alg = %key.alg, "Resolved signing key");

    if let Some(path) = &args.jwks_file {
        if manager.generation_count() > 0 {
            manager.save_file(&args.set, path).await?;
        }
    }

    match args.format {
        OutputFormat::Jwks => {
            let set = manager.get_key_set(&args.set).await?;
            println!("{}", serde_json::to_string_pretty(&exclude_private_keys(&set))?);
        }
        OutputFormat::JwksPrivate => {
            let set = manager.get_key_set(&args.set).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&exclude_opaque_private_keys(&set))?
            );
        }
        OutputFormat::Pem => {
            let block = pem_block_for_key(&key.material)?;
            print!("{}", pem::encode(&block));
        }
    }

    Ok(())
}
