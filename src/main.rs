//! OpenSASE Order Economics - NATS request/reply worker

mod commands;

use anyhow::{Context, Result};
use commands::{dispatch, Command};
use futures::StreamExt;
use opensase_order_economics::config::Config;
use opensase_order_economics::{Engine, PgStore};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new().max_connections(config.database_max_connections).connect(&config.database_url).await.context("connecting to postgres")?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let Some(nats_url) = config.nats_url.as_deref() else {
        warn!("NATS_URL not set; migrations applied, nothing to serve");
        return Ok(());
    };
    let client = async_nats::connect(nats_url).await.context("connecting to nats")?;
    let engine = Engine::new(PgStore::new(db)).with_nats(client.clone(), config.event_subject.clone());

    let mut subscriptions = Vec::with_capacity(Command::ALL.len());
    for command in Command::ALL {
        subscriptions.push(client.subscribe(config.subject(command.suffix())).await?);
    }
    let mut requests = futures::stream::select_all(subscriptions);
    info!("🚀 OpenSASE Order Economics listening on {}.*", config.subject_prefix);

    while let Some(message) = requests.next().await {
        let subject = message.subject.to_string();
        let Some(command) = Command::from_subject(&config.subject_prefix, &subject) else { continue };
        let Some(reply_to) = message.reply.as_ref().map(|r| r.to_string()) else {
            warn!(%subject, "command without reply subject dropped");
            continue;
        };
        let engine = engine.clone();
        let client = client.clone();
        tokio::spawn(async move {
            let body = dispatch(&engine, command, &message.payload).await;
            let payload = match serde_json::to_vec(&body) {
                Ok(payload) => payload,
                Err(e) => { warn!(%subject, error = %e, "failed to encode reply"); return; }
            };
            if let Err(e) = client.publish(reply_to, payload.into()).await {
                warn!(%subject, error = %e, "failed to send reply");
            }
        });
    }
    Ok(())
}
