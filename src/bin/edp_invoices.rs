use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use edp_invoices::auth::{AuthorizationFlow, TokenManager, TokenStore};
use edp_invoices::config::{
    self, DEFAULT_CONFIG_FILE, DEFAULT_CREDENTIALS_FILE, DEFAULT_REDIRECT_URI, DEFAULT_SENDER,
    DEFAULT_TOKEN_FILE, GMAIL_READONLY_SCOPE,
};
use edp_invoices::mail::decoders::DateZone;
use edp_invoices::mail::{GmailClient, SearchQuery};
use edp_invoices::scan::Scanner;
use edp_invoices::shutdown::ShutdownSignal;
use edp_invoices::store::Emitter;

#[derive(Parser)]
#[command(name = "edp_invoices")]
#[command(about = "Download EDP invoice PDFs and raw messages from Gmail", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args)]
struct AuthArgs {
    /// OAuth client secret downloaded from the Google Cloud console
    #[arg(long, default_value = DEFAULT_CREDENTIALS_FILE)]
    credentials: PathBuf,

    /// Where the authorized token is cached
    #[arg(long, default_value = DEFAULT_TOKEN_FILE)]
    token: PathBuf,

    #[arg(long, default_value = DEFAULT_REDIRECT_URI)]
    redirect_uri: String,
}

#[derive(Subcommand)]
enum Command {
    /// Search the mailbox and save every invoice found
    Fetch {
        #[command(flatten)]
        auth: AuthArgs,

        /// Contract alias file
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Sender to search for
        #[arg(long, default_value = DEFAULT_SENDER)]
        from: String,

        /// Date file names in UTC instead of local time
        #[arg(long)]
        utc: bool,
    },

    /// Authorize access and cache the token without scanning
    Login {
        #[command(flatten)]
        auth: AuthArgs,

        /// Run the browser flow even if a usable token is cached
        #[arg(long)]
        force: bool,
    },
}

fn token_manager(auth: &AuthArgs, force_consent: bool) -> Result<TokenManager> {
    let secret = config::load_client_secret(&auth.credentials)?;
    let flow = AuthorizationFlow::new(&secret, &auth.redirect_uri, GMAIL_READONLY_SCOPE)?
        .force_consent(force_consent);
    Ok(TokenManager::new(TokenStore::new(&auth.token), flow))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let shutdown = ShutdownSignal::new();
    shutdown.install_ctrlc()?;

    match cli.cmd {
        Command::Login { auth, force } => {
            let tokens = token_manager(&auth, force)?;
            if force {
                tokens.authorize(&shutdown)?;
            } else {
                tokens.credential(&shutdown)?;
            }
            log::info!("Token cached in {}", auth.token.display());
            Ok(())
        }

        Command::Fetch {
            auth,
            config: config_path,
            output_dir,
            from,
            utc,
        } => {
            let cfg = config::load_config(&config_path)
                .map_err(|e| anyhow!("Configuration error: {e:#}"))?;
            log::info!("{} contract alias(es) loaded", cfg.contracts.len());

            let tokens = token_manager(&auth, false)?;
            let credential = tokens.credential(&shutdown)?;
            let gmail = GmailClient::new(&credential)?.with_token_source(tokens);

            let query = SearchQuery::new()
                .with("from", from)
                .with("has", "attachment");
            let zone = if utc { DateZone::Utc } else { DateZone::Local };

            let mut emitter = Emitter::new(&output_dir)?;
            log::info!("Saving invoices to {}", emitter.output_dir().display());
            let report = Scanner::new(&gmail, &cfg.contracts, zone, &mut emitter)?
                .with_shutdown(shutdown.clone())
                .run(&query)?;

            log::info!(
                "{} message(s) listed, {} classified, {} skipped; {} invoice(s) saved, {} failed; {} raw message(s) saved, {} failed",
                report.listed,
                report.classified,
                report.skipped,
                report.attachments_saved,
                report.attachments_failed,
                report.raw_saved,
                report.raw_failed
            );
            if report.cancelled {
                log::warn!("Scan was interrupted before the last message");
            }
            Ok(())
        }
    }
}
