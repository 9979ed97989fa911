// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : wld_p2p_desk — WLD P2P pricing & settlement desk in Rust
Module  : config.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
License : MIT (see LICENSE)

Summary : Polls a live WLD reference price (degraded random-walk fallback),
          derives the merchant offer (3% margin), applies the flat transfer
          fee schedule per payment rail, and builds the settlement request
          message with session referral attribution.
=============================================================================
*/
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;

use crate::domain::{PaymentRail, TimeRange};

/// Sumber market data
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedMode {
    Live,
    Offline, // langsung pakai fallback generator (degraded)
}

impl FeedMode {
    pub fn from_env(key: &str, default_mode: FeedMode) -> FeedMode {
        match env::var(key).unwrap_or_default().to_ascii_lowercase().as_str() {
            "live" | "coingecko" => FeedMode::Live,
            "offline" | "mock"   => FeedMode::Offline,
            _ => default_mode,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedMode::Live => "live",
            FeedMode::Offline => "offline",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Args {
    // market data
    pub feed_mode: FeedMode,
    pub price_api_url: String,
    pub asset_id: String,
    pub quote_currency: String,  // mata uang chart (usd)
    pub local_currency: String,  // mata uang settlement (kes)
    pub feed_timeout: Duration,
    pub refresh_every: Duration,
    pub display_offset: FixedOffset,

    // session / files / metrics
    pub session_file: PathBuf,
    pub record_file: Option<String>,
    pub metrics_port: u16,

    // messaging channel
    pub whatsapp_number: Option<String>,
    pub open_links: bool,
    pub share_base_url: String,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

pub fn load() -> Args {
    // Pastikan .env dibaca
    let _ = dotenv();

    // ===== Market data =====
    let feed_mode = FeedMode::from_env("FEED_MODE", FeedMode::Live);
    let price_api_url = env::var("PRICE_API_URL")
        .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string());
    let asset_id = env::var("ASSET_ID").unwrap_or_else(|_| "worldcoin-wld".to_string());
    let quote_currency = env::var("QUOTE_CURRENCY")
        .unwrap_or_else(|_| "usd".to_string())
        .to_ascii_lowercase();
    let local_currency = env::var("LOCAL_CURRENCY")
        .unwrap_or_else(|_| "kes".to_string())
        .to_ascii_lowercase();
    let feed_timeout = Duration::from_millis(env_parse("FEED_TIMEOUT_MS", 8_000u64));
    let refresh_every = Duration::from_secs(env_parse("REFRESH_SECS", 60u64).max(1));

    // Default East Africa Time (+03:00)
    let offset_min: i32 = env_parse("DISPLAY_TZ_OFFSET_MINUTES", 180);
    let display_offset = FixedOffset::east_opt(offset_min.saturating_mul(60)).unwrap_or_else(|| Utc.fix());

    // ===== Session / files =====
    let session_file = env::var("SESSION_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("wld_p2p_desk.session.json"));
    let record_file = env::var("RECORD_FILE").ok();
    let metrics_port = env_parse("METRICS_PORT", 9899u16);

    // ===== Channel =====
    let whatsapp_number = env::var("WHATSAPP_NUMBER")
        .ok()
        .map(|s| s.chars().filter(|c| c.is_ascii_digit()).collect::<String>())
        .filter(|s| !s.is_empty());
    let open_links = matches!(
        env::var("OPEN_LINKS").unwrap_or_default().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    );
    let share_base_url = env::var("SHARE_BASE_URL")
        .unwrap_or_else(|_| "https://wekewa.app/".to_string());

    Args {
        feed_mode,
        price_api_url,
        asset_id,
        quote_currency,
        local_currency,
        feed_timeout,
        refresh_every,
        display_offset,
        session_file,
        record_file,
        metrics_port,
        whatsapp_number,
        open_links,
        share_base_url,
    }
}

// ===== CLI =====
#[derive(Parser, Debug)]
#[command(name = "wld_p2p_desk", version, about = "WLD P2P pricing & settlement desk")]
pub struct Cli {
    /// Entry URL of this session (carries `?ref=<handle>` when referred)
    #[arg(long, global = true)]
    pub entry_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Poll the market and print every published snapshot (type 1H/1D/1W/1M/1Y + Enter to switch range)
    Watch {
        #[arg(long, default_value = "1D")]
        range: TimeRange,
    },
    /// Lock an offer and print the settlement quote
    Quote {
        #[arg(long)]
        rail: PaymentRail,
        /// Quantity as typed by the user (invalid input yields a zero quote)
        #[arg(long)]
        qty: Option<String>,
        /// Fixed listing price in local currency (skips the live feed)
        #[arg(long)]
        unit_price: Option<f64>,
    },
    /// Build the settlement request and hand it to the messaging channel
    Order {
        #[arg(long)]
        rail: PaymentRail,
        #[arg(long)]
        qty: Option<String>,
        #[arg(long)]
        unit_price: Option<f64>,
        /// Index into the merchant's network list (see `networks`)
        #[arg(long, default_value_t = 0)]
        network: usize,
        /// Counterparty account (M-Pesa number, bank + account, LN address)
        #[arg(long)]
        account: Option<String>,
        #[arg(long, default_value = "m0")]
        merchant: String,
    },
    /// Print share links carrying your own handle as referrer
    Share {
        #[arg(long)]
        handle: String,
    },
    /// List the merchant's deposit networks
    Networks {
        #[arg(long, default_value = "m0")]
        merchant: String,
    },
}
