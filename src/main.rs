// ===============================
// src/main.rs
// ===============================
/*
 # lihat harga live (ketik 1H/1D/1W/1M/1Y + Enter untuk ganti range)
 cargo run -- watch --range 1D
 curl -s localhost:9899/metrics | egrep '^(feed_|reference_price)'

 # quote & order dengan harga listing tetap
 cargo run -- quote --rail bank --qty 1000 --unit-price 660
 cargo run -- --entry-url 'https://wekewa.app/?ref=alice' order --rail mpesa --qty 50 --account 0712345678
*/
/*
=============================================================================
Project : wld_p2p_desk — WLD P2P pricing & settlement desk in Rust
Module  : main.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
License : MIT (see LICENSE)

Summary : Polls a live WLD reference price (degraded random-walk fallback),
          derives the merchant offer (3% margin), applies the flat transfer
          fee schedule per payment rail, and builds the settlement request
          message with session referral attribution.
=============================================================================
*/
mod channel;
mod config;
mod domain;
mod fallback;
mod feed;
mod fees;
mod merchants;
mod metrics;
mod order;
mod pricing;
mod recorder;
mod referral;
mod scheduler;
mod settlement;
#[cfg(test)]
mod testutil;

use chrono::Utc;
use clap::Parser;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    select,
    sync::mpsc,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::channel::Channel;
use crate::config::{Args, Cli, Command};
use crate::domain::{Event, Merchant, MarketSnapshot, PaymentRail, TimeRange, TradeOffer};
use crate::feed::{FeedCfg, MarketFeed};
use crate::merchants::MerchantDirectory;
use crate::pricing::PricingEngine;
use crate::referral::{EntryContext, FileSession, ReferralTracker};
use crate::fees::FeeSchedule;
use crate::settlement::{check_limits, LimitCheck, SettlementCalculator, SettlementError};

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ---- CLI + config ----
    let cli = Cli::parse();
    let args = config::load();

    metrics::init();
    metrics::CONFIG_FEED_MODE
        .with_label_values(&[args.feed_mode.as_str()])
        .set(1);
    info!(
        feed_mode = args.feed_mode.as_str(),
        api = %args.price_api_url,
        asset = %args.asset_id,
        quote = %args.quote_currency,
        local = %args.local_currency,
        refresh_s = args.refresh_every.as_secs(),
        "startup config"
    );

    // ---- Recorder (optional) ----
    let (rec_tx, rec_task) = match args.record_file.clone() {
        Some(path) => {
            let (tx, rx) = mpsc::channel::<Event>(1024);
            (Some(tx), Some(tokio::spawn(recorder::run(rx, path))))
        }
        None => (None, None),
    };

    // ---- Referral (sekali per sesi) ----
    let mut session = FileSession::new(args.session_file.clone());
    let entry = cli
        .entry_url
        .as_deref()
        .map(EntryContext::from_url)
        .unwrap_or_default();
    let referral = ReferralTracker::new().init(&entry, &mut session);

    let feed = MarketFeed::new(FeedCfg {
        base_url: args.price_api_url.clone(),
        asset_id: args.asset_id.clone(),
        quote_currency: args.quote_currency.clone(),
        local_currency: args.local_currency.clone(),
        timeout: args.feed_timeout,
        display_offset: args.display_offset,
        live: args.feed_mode == config::FeedMode::Live,
    });
    let directory = MerchantDirectory::builtin();
    let pricing = PricingEngine::new(args.local_currency.to_ascii_uppercase());
    let calc = SettlementCalculator::new(FeeSchedule::standard());
    let channel = Channel::new(args.open_links);

    match cli.command {
        Command::Watch { range } => {
            watch(feed, range, &args, &pricing, rec_tx.clone()).await;
        }
        Command::Quote { rail, qty, unit_price } => {
            let merchant = directory.default_merchant();
            let offer = lock_offer(&feed, &pricing, unit_price, rail, merchant).await;
            match calc.quote_raw(&offer, qty.as_deref(), Utc::now()) {
                Ok(q) => {
                    print_quote(&offer, &q);
                    if let Some(tx) = &rec_tx {
                        let _ = tx.send(Event::Quote { offer: offer.clone(), quote: q }).await;
                    }
                }
                Err(e) => warn!(error = %e, "quote rejected"),
            }
        }
        Command::Order { rail, qty, unit_price, network, account, merchant } => {
            let Some(m) = directory.get(&merchant) else {
                warn!(%merchant, "unknown merchant");
                return;
            };
            let offer = lock_offer(&feed, &pricing, unit_price, rail, m).await;
            let quote = match calc.order_quote(&offer, qty.as_deref(), Utc::now()) {
                Ok(q) => q,
                Err(SettlementError::PriceUnavailable) => {
                    warn!("offer price unavailable, no settlement request sent; pass --unit-price to order at a listing price");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, qty = ?qty, "order rejected");
                    return;
                }
            };
            print_quote(&offer, &quote);
            let net = directory.network(m, network);
            if net.is_none() {
                warn!(network, "unknown network index, sending placeholder");
            }
            let req = order::build(
                order::OrderInput {
                    offer: &offer,
                    quote: &quote,
                    network: net,
                    account_ref: account.as_deref(),
                    referral: &referral,
                    merchant: Some(m),
                },
                Utc::now(),
                args.display_offset,
                &mut rand::thread_rng(),
            );
            println!("\n{}\n", req.render());
            channel.deliver("settlement_request", &req.deep_link(args.whatsapp_number.as_deref()));
            info!(order = req.order_number, referred = req.referral.referrer_id.is_some(), "settlement request built");
            if let Some(tx) = &rec_tx {
                let _ = tx.send(Event::Settlement(req)).await;
            }
        }
        Command::Share { handle } => {
            let link = referral::share_link(&args.share_base_url, &handle);
            for (target, url) in referral::share_targets(&link) {
                println!("{:<9} {}", target.name(), url);
            }
        }
        Command::Networks { merchant } => match directory.get(&merchant) {
            Some(m) => print_networks(m),
            None => warn!(%merchant, "unknown merchant"),
        },
    }

    // tutup recorder dan tunggu flush
    drop(rec_tx);
    if let Some(task) = rec_task {
        let _ = task.await;
    }
}

async fn lock_offer(
    feed: &MarketFeed,
    pricing: &PricingEngine,
    unit_price: Option<f64>,
    rail: PaymentRail,
    merchant: &Merchant,
) -> TradeOffer {
    let now = Utc::now();
    if let Some(p) = unit_price {
        return pricing.offer_at(p, rail, merchant, now);
    }
    let snap = feed.fetch(TimeRange::H1).await;
    if snap.local_price.is_none() {
        warn!(degraded = snap.degraded, "local reference price unavailable; pass --unit-price to quote at a listing price");
    }
    pricing.lock_offer(snap.local_price, rail, merchant, now)
}

fn print_quote(offer: &TradeOffer, q: &domain::SettlementQuote) {
    let cur = &offer.local_currency;
    if !offer.is_available() {
        println!("offer price unavailable");
    }
    println!("rail        : {}", offer.rail);
    println!("unit price  : {:.2} {cur} (locked until {})", offer.unit_price, offer.expires_at.format("%H:%M:%S UTC"));
    println!("quantity    : {} WLD", q.quantity);
    println!("gross       : {:.2} {cur}", q.gross);
    println!("fee         : {:.2} {cur}", q.fee);
    println!("net         : {:.2} {cur}", q.net);
    match check_limits(offer, q) {
        LimitCheck::Within => {}
        LimitCheck::BelowMin => warn!(min = offer.limits.min, "gross below listing minimum"),
        LimitCheck::AboveMax => warn!(max = offer.limits.max, "gross above listing maximum"),
    }
}

fn print_networks(m: &Merchant) {
    println!("{} deposit address: {}", m.name, m.deposit_address.as_deref().unwrap_or(order::PLACEHOLDER));
    for (i, n) in m.networks.iter().enumerate() {
        println!("  [{i}] {} - {}", n.name, n.notes);
    }
}

fn print_snapshot(s: &MarketSnapshot, pricing: &PricingEngine, quote_ccy: &str) {
    let offer = pricing.offer_price(s.local_price.unwrap_or(0.0));
    println!(
        "[{}] {:.4} {} ({:+.2}%) points={}{}{} offer={:.2} {}",
        s.range,
        s.reference_price,
        quote_ccy.to_ascii_uppercase(),
        s.change_percent,
        s.series.len(),
        if s.degraded { " DEGRADED" } else { "" },
        if s.provisional { " provisional" } else { "" },
        offer,
        pricing.local_currency,
    );
}

async fn watch(
    feed: MarketFeed,
    range: TimeRange,
    args: &Args,
    pricing: &PricingEngine,
    rec_tx: Option<mpsc::Sender<Event>>,
) {
    metrics::serve_metrics(args.metrics_port);
    let handle = scheduler::spawn(feed, range, args.refresh_every, rec_tx);
    let mut snaps = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        select! {
            changed = snaps.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = snaps.borrow_and_update().clone();
                if let Some(s) = latest {
                    print_snapshot(&s, pricing, &args.quote_currency);
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(l)) if l.trim().is_empty() => {}
                Ok(Some(l)) => match l.parse::<TimeRange>() {
                    Ok(r) => handle.select_range(r),
                    Err(e) => warn!(%e, "ignored input"),
                },
                Ok(None) | Err(_) => stdin_open = false,
            },
            _ = &mut ctrl_c => {
                info!("ctrl-c, stopping");
                break;
            }
        }
    }
    if let Some(last) = handle.latest() {
        info!(range = %last.range, price = last.reference_price, degraded = last.degraded, "last snapshot");
    }
    handle.shutdown().await;
}
