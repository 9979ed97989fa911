// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Market data --------
pub static FEED_FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("feed_fetches_total", "market data fetches by outcome (live | degraded)"),
        &["outcome", "range"],
    )
    .unwrap()
});

pub static STALE_DISCARDED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("feed_stale_responses_total", "fetch results discarded as out of order").unwrap()
});

pub static REFERENCE_PRICE: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("reference_price", "last published reference price (quote currency)").unwrap()
});

pub static DEGRADED: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("feed_degraded", "1 if the last published snapshot came from the fallback generator"),
        &["range"],
    )
    .unwrap()
});

// -------- Settlement --------
pub static QUOTES: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("settlement_quotes_total", "non-zero settlement quotes computed").unwrap());

pub static ORDERS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("settlement_requests_total", "settlement requests built").unwrap());

pub static CHANNEL_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("channel_delivery_failures_total", "best-effort link/clipboard deliveries that failed").unwrap()
});

// ---- Config visibility ----
pub static CONFIG_FEED_MODE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("config_feed_mode", "feed mode (label: mode)"), &["mode"]).unwrap()
});

pub fn init() {
    for m in [
        REGISTRY.register(Box::new(FEED_FETCHES.clone())),
        REGISTRY.register(Box::new(STALE_DISCARDED.clone())),
        REGISTRY.register(Box::new(REFERENCE_PRICE.clone())),
        REGISTRY.register(Box::new(DEGRADED.clone())),
        REGISTRY.register(Box::new(QUOTES.clone())),
        REGISTRY.register(Box::new(ORDERS.clone())),
        REGISTRY.register(Box::new(CHANNEL_FAILURES.clone())),
        REGISTRY.register(Box::new(CONFIG_FEED_MODE.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Route by request line: `/` dan `/metrics` -> exposition, `/healthz` -> ok,
// lainnya 404.
fn respond(request_line: &str) -> (&'static str, &'static str, Vec<u8>) {
    let path = request_line
        .split_whitespace()
        .nth(1)
        .map(|t| t.split('?').next().unwrap_or(t))
        .unwrap_or("/");
    match path {
        "/" | "/metrics" => ("200 OK", "text/plain; version=0.0.4; charset=utf-8", encode_metrics()),
        "/healthz" => ("200 OK", "text/plain; charset=utf-8", b"ok\n".to_vec()),
        _ => ("404 Not Found", "text/plain; charset=utf-8", b"not found\n".to_vec()),
    }
}

// Satu request per koneksi, lalu close
fn handle_client(mut stream: TcpStream) {
    let mut req_buf = [0u8; 1024];
    let n = stream.read(&mut req_buf).unwrap_or(0);
    let req = String::from_utf8_lossy(&req_buf[..n]);
    let (status, content_type, body) = respond(req.lines().next().unwrap_or(""));
    let header = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Metrics server di OS thread terpisah; gagal bind -> log dan lanjut tanpa metrics
pub fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("127.0.0.1:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(%addr, ?e, "metrics bind failed, metrics disabled");
                return;
            }
        };
        tracing::info!("metrics listening on http://{addr}/metrics");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => tracing::warn!(?e, "metrics accept error"),
            }
        }
    });
}
