// ===============================
// src/recorder.rs
// ===============================
//
// JSONL recorder untuk snapshot, quote dan settlement request:
// - satu Event per baris (append)
// - BufWriter, flush tiap 1s dan saat channel ditutup
// - parent directory dibuat otomatis
// - gagal buka file -> log, event dibuang (recorder bersifat opsional)
//
// ENV: `RECORD_FILE=/path/to/events.jsonl`
//
use std::path::Path;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

use crate::domain::Event;

async fn open_writer(path: &str) -> Option<BufWriter<tokio::fs::File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent).await {
                error!(?e, %path, "recorder: create_dir_all failed");
            }
        }
    }
    match OpenOptions::new().create(true).append(true).open(path).await {
        Ok(file) => Some(BufWriter::new(file)),
        Err(e) => {
            error!(?e, %path, "recorder: open failed, recording disabled");
            None
        }
    }
}

pub async fn run(mut rx: mpsc::Receiver<Event>, path: String) {
    let mut writer = match open_writer(&path).await {
        Some(w) => w,
        None => {
            // kosongkan channel supaya pengirim tidak penuh
            while rx.recv().await.is_some() {}
            return;
        }
    };
    info!(%path, "recorder: started");

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                let Some(ev) = maybe_ev else {
                    let _ = writer.flush().await;
                    info!("recorder: channel closed, stopped");
                    break;
                };
                let mut line = match serde_json::to_string(&ev) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(?e, "recorder: serialize error, skip event");
                        continue;
                    }
                };
                line.push('\n');
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    error!(?e, "recorder: write failed, drop event");
                }
            }
            _ = tick.tick() => {
                let _ = writer.flush().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::domain::{PaymentRail, SettlementQuote};
    use crate::merchants::MerchantDirectory;
    use crate::pricing::PricingEngine;
    use chrono::Utc;

    fn quote_event(unit_price: f64) -> Event {
        let dir = MerchantDirectory::builtin();
        let offer = PricingEngine::new("KES").offer_at(unit_price, PaymentRail::MobileMoney, dir.default_merchant(), Utc::now());
        Event::Quote { offer, quote: SettlementQuote::zero() }
    }

    #[tokio::test]
    async fn writes_one_json_line_per_event() {
        let dir = std::env::temp_dir().join(format!("wld_p2p_desk_rec_{}", std::process::id()));
        let path = dir.join("events.jsonl");
        let _ = std::fs::remove_file(&path);
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(run(rx, path.to_string_lossy().to_string()));
        tx.send(quote_event(660.0)).await.unwrap();
        tx.send(quote_event(661.5)).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("660"));
        assert!(lines[1].contains("661.5"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
