//! WirePact translator - identity translation sidecar for Envoy
//!
//! Runs the ingress and egress ext_authz listeners with the header based
//! reference translation. Integrators embedding their own translation logic
//! use the `wirepact-translator` library directly.

mod header;

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wirepact_translator::{TranslatorArgs, TranslatorServer};

use crate::header::{HeaderTranslator, DEFAULT_USER_ID_HEADER};

/// WirePact translator - turns request credentials into mesh identities and back
#[derive(Parser, Debug)]
#[command(name = "wirepact-translator", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    translator: TranslatorArgs,

    /// Header carrying the plain user id on the service side
    #[arg(long, env = "USER_ID_HEADER", default_value = DEFAULT_USER_ID_HEADER)]
    user_id_header: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install the aws-lc-rs crypto provider before any TLS client is built
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install aws-lc-rs crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = cli.translator.into_config()?;
    info!(
        common_name = %config.pki.common_name,
        pki = %config.pki.base_address,
        ingress = %config.ingress_addr(),
        egress = %config.egress_addr(),
        "Starting WirePact translator"
    );

    let translator = Arc::new(HeaderTranslator::new(cli.user_id_header));
    let server = TranslatorServer::bind(config, translator.clone(), translator).await?;
    server.run_until_signal().await?;

    Ok(())
}

fn init_tracing(json: bool) {
    let registry = tracing_subscriber::registry().with(EnvFilter::from_default_env());
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
