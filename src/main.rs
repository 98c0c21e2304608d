use anyhow::Context;
use google_gmail1::Gmail;
use inbox_archiver::archive::NotionSink;
use inbox_archiver::auth;
use inbox_archiver::classifier::Classifier;
use inbox_archiver::config::Settings;
use inbox_archiver::gmail::GmailClient;
use inbox_archiver::mail::MailSource;
use inbox_archiver::pipeline::Pipeline;
use std::process::ExitCode;
use tracing::{Level, error, info};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let debug_logging = std::env::args().any(|arg| arg == "--debug");
    let run_once = std::env::args().any(|arg| arg == "--once");

    tracing_subscriber::fmt()
        .with_max_level(if debug_logging { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    // Handle token reset
    if std::env::args().any(|arg| arg == "--reset-token") {
        auth::RingStorage.clear_token().await?;
        println!("Token cleared. Run again without --reset-token to re-authenticate.");
        return Ok(ExitCode::SUCCESS);
    }

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::from(2));
        }
    };

    // Without a target database nothing can be archived; stop before
    // touching the mailbox.
    let target = match settings.archive_target() {
        Ok(target) => target,
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::from(2));
        }
    };

    let config = &settings.config;
    let classifier = Classifier::from_config(&config.classifier, settings.openai_api_key.clone())
        .context("Failed to set up classifier")?;
    let sink = NotionSink::new(&config.archive, target);

    let secret = auth::Authenticator::load_secret(&config.mail.client_secret_path).await?;
    let authenticator = auth::Authenticator::authenticate(secret).await?;

    let hub = Gmail::new(
        hyper::Client::builder().build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .context("Failed to load native roots")?
                .https_only()
                .enable_http1()
                .build(),
        ),
        authenticator,
    );

    let pipeline = Pipeline::new(
        MailSource::new(GmailClient::new(hub)),
        classifier,
        sink,
        config.mail.query.clone(),
        config.archive.fallback_category.clone(),
    );

    match settings.poll_interval() {
        Some(interval) if !run_once => {
            info!("Polling every {}s, Ctrl-C to stop", interval.as_secs());
            // One listener for the whole loop, so a Ctrl-C during a run is kept.
            pipeline
                .run_every(interval, async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                })
                .await;
        }
        _ => {
            pipeline.run_once().await;
        }
    }

    Ok(ExitCode::SUCCESS)
}
