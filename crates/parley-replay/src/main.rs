//! # parley-replay
//!
//! Feeds a recorded bus capture through a live [`SyncEngine`].
//!
//! The engine bootstraps against the chat server named by the `PARLEY_*`
//! environment, then consumes the capture in order. Notifications are
//! printed as JSON lines while replaying; the final channel ranking and
//! tracking totals are printed once the capture is exhausted.
//!
//! ```text
//! parley-replay <capture.jsonl>
//! ```

mod capture;
mod report;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::mpsc;
use tracing::{info, warn};

use parley_client::{logging, ClientConfig, HttpChatApi, Notifier, SyncEngine};
use parley_store::ChatApi;

use crate::report::Report;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        bail!("usage: parley-replay <capture.jsonl>");
    };
    let envelopes = capture::read_capture(&path)?;
    info!(path = %path.display(), envelopes = envelopes.len(), "Loaded capture");

    // -----------------------------------------------------------------------
    // Engine
    // -----------------------------------------------------------------------
    let config = ClientConfig::from_env();
    let api: Arc<dyn ChatApi> = Arc::new(HttpChatApi::new(&config)?);
    let (notifier, mut notifications) = Notifier::channel(config.queue_capacity);
    let mut engine = SyncEngine::new(api, config.user_id).with_notifier(notifier);

    engine
        .bootstrap()
        .await
        .with_context(|| format!("bootstrapping against {}", config.base_url))?;

    for (channel_id, thread_id) in capture::thread_topics(&envelopes) {
        if let Err(e) = engine.open_thread(channel_id, thread_id).await {
            warn!(
                channel = %channel_id,
                thread = %thread_id,
                error = %e,
                "Cannot open thread topic"
            );
        }
    }

    let printer = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            match serde_json::to_string(&notification) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Unprintable notification"),
            }
        }
    });

    // -----------------------------------------------------------------------
    // Replay
    // -----------------------------------------------------------------------
    let (tx, rx) = mpsc::channel(config.queue_capacity);
    let feeder = tokio::spawn(async move {
        for envelope in envelopes {
            if tx.send(envelope).await.is_err() {
                break;
            }
        }
    });
    engine.run(rx).await;
    feeder.await.context("capture feeder panicked")?;

    let report = Report::from_engine(&engine);
    drop(engine);
    printer.await.context("notification printer panicked")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
