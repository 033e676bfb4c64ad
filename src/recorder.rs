// ===============================
// src/recorder.rs
// ===============================
//
// Append-only JSONL event journal for diagnostics. One line per event,
// buffered, flushed every second or every 1000 events. Nothing is ever read
// back at startup; the journal exists so a session can be inspected later.
//
// Enabled by setting RECORD_FILE (see config.rs).

use std::path::Path;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

use crate::domain::Event;

const FLUSH_EVERY_N_EVENTS: u32 = 1000;

async fn open_writer(path: &str) -> std::io::Result<BufWriter<tokio::fs::File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

pub async fn run(mut rx: mpsc::Receiver<Event>, path: String) {
    let mut writer = match open_writer(&path).await {
        Ok(w) => {
            info!(%path, "recorder started");
            w
        }
        Err(e) => {
            error!(?e, %path, "recorder disabled, open failed");
            return;
        }
    };

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut since_flush: u32 = 0;

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                let Some(ev) = maybe_ev else {
                    let _ = writer.flush().await;
                    info!("recorder stopped");
                    break;
                };
                let mut line = match serde_json::to_vec(&ev) {
                    Ok(v) => v,
                    Err(e) => {
                        error!(?e, "recorder serialize error, event dropped");
                        continue;
                    }
                };
                line.push(b'\n');

                if let Err(e) = writer.write_all(&line).await {
                    error!(?e, "recorder write failed, reopening");
                    match open_writer(&path).await {
                        Ok(w) => {
                            writer = w;
                            if let Err(e2) = writer.write_all(&line).await {
                                error!(?e2, "recorder write failed after reopen, event dropped");
                                continue;
                            }
                        }
                        Err(e2) => {
                            error!(?e2, "recorder reopen failed, event dropped");
                            continue;
                        }
                    }
                }

                since_flush += 1;
                if since_flush >= FLUSH_EVERY_N_EVENTS {
                    let _ = writer.flush().await;
                    since_flush = 0;
                }
            }
            _ = tick.tick() => {
                let _ = writer.flush().await;
                since_flush = 0;
            }
        }
    }
}
