// ===============================
// src/referral.rs
// ===============================
//
// Referral capture (once per session) + outbound share links.
//
// Resolution order on init:
//   1) value already adopted by this tracker
//   2) value already in the session store
//   3) `ref` field of the entry URL (then written to the store)
// Setelah diadopsi, nilainya tidak pernah ditimpa dalam sesi yang sama.
//
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::ReferralState;

pub const REFERRER_FIELD: &str = "ref";
pub const SESSION_KEY: &str = "referrer_id";
pub const SHARE_HASHTAGS: &str = "#Worldcoin #WLD #P2P #Wekewa";
pub const SHARE_TEXT: &str = "Sell your WLD for local currency on Wekewa P2P";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file io: {0}")]
    Io(#[from] io::Error),
    #[error("session file is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Narrow port to session-scoped storage (one string per key).
pub trait SessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), SessionError>;
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySession {
    values: HashMap<String, String>,
}

#[cfg(test)]
impl SessionStore for MemorySession {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.values.get(key).cloned())
    }
    fn set(&mut self, key: &str, value: &str) -> Result<(), SessionError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Session persisted as a small JSON object (lifetime = the file's).
#[derive(Debug, Clone)]
pub struct FileSession {
    path: PathBuf,
}

impl FileSession {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

    fn load(&self) -> Result<HashMap<String, String>, SessionError> {
        match fs::read_to_string(&self.path) {
            Ok(s) if s.trim().is_empty() => Ok(HashMap::new()),
            Ok(s) => Ok(serde_json::from_str(&s)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl SessionStore for FileSession {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.load()?.remove(key))
    }
    fn set(&mut self, key: &str, value: &str) -> Result<(), SessionError> {
        let mut map = self.load()?;
        map.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(&map)?)?;
        Ok(())
    }
}

/// How the session was entered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryContext {
    pub referrer: Option<String>,
}

impl EntryContext {
    pub fn from_url(raw: &str) -> Self {
        let referrer = Url::parse(raw).ok().and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == REFERRER_FIELD)
                .map(|(_, v)| v.trim().to_string())
        });
        Self { referrer: referrer.filter(|r| !r.is_empty()) }
    }

    #[cfg(test)]
    pub fn with_referrer(referrer: &str) -> Self {
        Self { referrer: Some(referrer.to_string()).filter(|r| !r.trim().is_empty()) }
    }
}

#[derive(Debug, Default)]
pub struct ReferralTracker {
    adopted: OnceCell<ReferralState>,
}

impl ReferralTracker {
    pub fn new() -> Self { Self::default() }

    pub fn init(&self, entry: &EntryContext, store: &mut dyn SessionStore) -> ReferralState {
        self.adopted.get_or_init(|| resolve(entry, store)).clone()
    }

    #[cfg(test)]
    pub fn state(&self) -> ReferralState {
        self.adopted.get().cloned().unwrap_or_default()
    }
}

fn resolve(entry: &EntryContext, store: &mut dyn SessionStore) -> ReferralState {
    let stored = store.get(SESSION_KEY).unwrap_or_else(|e| {
        warn!(error = %e, "session store read failed, treating referral as absent");
        None
    });
    if let Some(id) = stored.filter(|s| !s.is_empty()) {
        if entry.referrer.as_deref().is_some_and(|r| r != id) {
            debug!(stored = %id, ignored = ?entry.referrer, "referral already set for this session");
        }
        return ReferralState { referrer_id: Some(id) };
    }
    match &entry.referrer {
        Some(id) => {
            if let Err(e) = store.set(SESSION_KEY, id) {
                warn!(error = %e, "session store write failed, referral kept in memory only");
            }
            info!(referrer = %id, "referral captured");
            ReferralState { referrer_id: Some(id.clone()) }
        }
        None => ReferralState::default(),
    }
}

// ---- Sharing (one-way, does not touch ReferralState) ----

/// Link carrying the current user's own handle as referrer tag.
pub fn share_link(base_url: &str, own_handle: &str) -> String {
    let handle = own_handle.trim().trim_start_matches('@');
    match Url::parse(base_url) {
        Ok(mut u) => {
            let kept: Vec<(String, String)> = u
                .query_pairs()
                .filter(|(k, _)| k != REFERRER_FIELD)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            u.query_pairs_mut().clear().extend_pairs(kept).append_pair(REFERRER_FIELD, handle);
            u.to_string()
        }
        Err(_) => format!("{}?{}={}", base_url, REFERRER_FIELD, urlencoding::encode(handle)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareTarget { WhatsApp, X, Facebook, Telegram, LinkedIn, Reddit, Email, Sms, Copy }

impl ShareTarget {
    pub const ALL: [ShareTarget; 9] = [
        ShareTarget::WhatsApp,
        ShareTarget::X,
        ShareTarget::Facebook,
        ShareTarget::Telegram,
        ShareTarget::LinkedIn,
        ShareTarget::Reddit,
        ShareTarget::Email,
        ShareTarget::Sms,
        ShareTarget::Copy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ShareTarget::WhatsApp => "whatsapp",
            ShareTarget::X => "x",
            ShareTarget::Facebook => "facebook",
            ShareTarget::Telegram => "telegram",
            ShareTarget::LinkedIn => "linkedin",
            ShareTarget::Reddit => "reddit",
            ShareTarget::Email => "email",
            ShareTarget::Sms => "sms",
            ShareTarget::Copy => "copy",
        }
    }

    pub fn url(&self, link: &str) -> String {
        let text = format!("{SHARE_TEXT} {SHARE_HASHTAGS}");
        let l = urlencoding::encode(link);
        let t = urlencoding::encode(&text);
        let body = urlencoding::encode(&format!("{text} {link}")).into_owned();
        match self {
            ShareTarget::WhatsApp => format!("https://wa.me/?text={body}"),
            ShareTarget::X => format!("https://twitter.com/intent/tweet?text={t}&url={l}"),
            ShareTarget::Facebook => format!("https://www.facebook.com/sharer/sharer.php?u={l}"),
            ShareTarget::Telegram => format!("https://t.me/share/url?url={l}&text={t}"),
            ShareTarget::LinkedIn => format!("https://www.linkedin.com/sharing/share-offsite/?url={l}"),
            ShareTarget::Reddit => format!("https://www.reddit.com/submit?url={l}&title={t}"),
            ShareTarget::Email => format!("mailto:?subject={}&body={body}", urlencoding::encode(SHARE_TEXT)),
            ShareTarget::Sms => format!("sms:?body={body}"),
            ShareTarget::Copy => link.to_string(),
        }
    }
}

pub fn share_targets(link: &str) -> Vec<(ShareTarget, String)> {
    ShareTarget::ALL.iter().map(|t| (*t, t.url(link))).collect()
}
