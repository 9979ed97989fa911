// ===============================
// src/channel.rs
// ===============================
//
// Messaging channel: fire-and-forget. Link is always printed (the "copy"
// path); when OPEN_LINKS is set we also try the platform opener. Failures
// are logged and ignored, nothing is awaited.
//
use std::process::{Command, Stdio};
use std::thread;

use thiserror::Error;
use tracing::{info, warn};

use crate::metrics::CHANNEL_FAILURES;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to launch `{opener}`: {source}")]
    Launch { opener: &'static str, source: std::io::Error },
}

#[derive(Debug, Clone)]
pub struct Channel {
    open_links: bool,
}

impl Channel {
    pub fn new(open_links: bool) -> Self { Self { open_links } }

    pub fn deliver(&self, what: &str, link: &str) {
        println!("{link}");
        if !self.open_links {
            return;
        }
        match open_in_new_context(link) {
            Ok(()) => info!(what, "link handed to opener"),
            Err(e) => {
                CHANNEL_FAILURES.inc();
                warn!(what, error = %e, "could not open link, ignoring");
            }
        }
    }
}

const OPENER: (&str, &[&str]) = if cfg!(target_os = "macos") {
    ("open", &[])
} else if cfg!(target_os = "windows") {
    ("cmd", &["/C", "start", ""])
} else {
    ("xdg-open", &[])
};

fn open_in_new_context(link: &str) -> Result<(), ChannelError> {
    let (bin, pre) = OPENER;
    launch(bin, pre, link)
}

// Opener biasanya langsung exit; child di-wait di thread sendiri supaya
// tidak jadi zombie dan caller tidak menunggu.
fn launch(bin: &'static str, pre: &[&str], link: &str) -> Result<(), ChannelError> {
    let mut child = Command::new(bin)
        .args(pre)
        .arg(link)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| ChannelError::Launch { opener: bin, source })?;
    thread::spawn(move || {
        if let Err(e) = child.wait() {
            warn!(opener = bin, error = %e, "opener wait failed");
        }
    });
    Ok(())
}
