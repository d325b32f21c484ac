//! Sender configuration: variants, uploaded profiles, and env resolution.
//!
//! Sender credentials come from the process environment (optionally prefixed
//! per variant) or from `.env`-style profiles uploaded at runtime. The store
//! is an explicit object shared behind an `RwLock`; nothing here is a process
//! global. Resolution happens once per batch and the resolved record is
//! immutable for the batch's duration.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use config::ConfigError;

use crate::Error;

/// Deserialize any config struct straight from environment variables.
pub trait EnvConfig: Sized {
    fn from_env() -> Result<Self, ConfigError>;
    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError>;
}

impl<D> EnvConfig for D
where
    D: DeserializeOwned,
{
    fn from_env() -> Result<Self, ConfigError> {
        let c = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .expect("basic config builder");
        c.try_deserialize()
    }

    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let c = config::Config::builder()
            .add_source(config::Environment::with_prefix(prefix))
            .build()
            .expect("basic config builder");
        c.try_deserialize()
    }
}

/// Named sender profile selecting which credentials and host a batch uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    #[default]
    Default,
    Icpep,
    Cisco,
    Cyberph,
    CyberphNoreply,
}

impl Variant {
    /// Parse a requested variant name; `None` for anything unrecognized so
    /// the caller can fall back to the system variant.
    pub fn parse(value: &str) -> Option<Variant> {
        match value.to_lowercase().as_str() {
            "default" => Some(Variant::Default),
            "icpep" => Some(Variant::Icpep),
            "cisco" => Some(Variant::Cisco),
            "cyberph" => Some(Variant::Cyberph),
            "cyberph-noreply" => Some(Variant::CyberphNoreply),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Default => "default",
            Variant::Icpep => "icpep",
            Variant::Cisco => "cisco",
            Variant::Cyberph => "cyberph",
            Variant::CyberphNoreply => "cyberph-noreply",
        }
    }

    /// Variants that send through their own SMTP host instead of the hosted
    /// provider.
    pub fn is_direct_smtp(self) -> bool {
        matches!(self, Variant::Cyberph | Variant::CyberphNoreply)
    }

    fn env_prefix(self) -> Option<&'static str> {
        match self {
            Variant::Default => None,
            Variant::Icpep => Some("ICPEP"),
            Variant::Cisco => Some("CISCO"),
            Variant::Cyberph | Variant::CyberphNoreply => Some("CYBERPH"),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three sender keys a usable profile must carry.
pub const REQUIRED_SENDER_KEYS: [&str; 3] =
    ["SENDER_EMAIL", "SENDER_APP_PASSWORD", "SENDER_NAME"];

/// Partial sender settings as read from the environment or an uploaded
/// profile. Ports stay strings until transport construction; a non-numeric
/// alternate port simply disables the fallback transport.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SenderEnv {
    pub sender_email: Option<String>,
    #[serde(alias = "sender_password")]
    pub sender_app_password: Option<String>,
    pub sender_name: Option<String>,
    pub host_domain: Option<String>,
    pub port: Option<String>,
    pub port_alt: Option<String>,
}

impl SenderEnv {
    /// Extract the sender keys from `.env`-style text. Other keys are ignored.
    pub fn from_dotenv_text(text: &str) -> SenderEnv {
        let parsed = parse_dotenv(text);
        SenderEnv {
            sender_email: parsed.get("SENDER_EMAIL").cloned(),
            sender_app_password: parsed.get("SENDER_APP_PASSWORD").cloned(),
            sender_name: parsed.get("SENDER_NAME").cloned(),
            ..SenderEnv::default()
        }
    }

    fn get(&self, key: &str) -> Option<&String> {
        let value = match key {
            "SENDER_EMAIL" => &self.sender_email,
            "SENDER_APP_PASSWORD" => &self.sender_app_password,
            "SENDER_NAME" => &self.sender_name,
            _ => &None,
        };
        value.as_ref().filter(|v| !v.is_empty())
    }

    /// The required keys this profile carries, with their values.
    pub fn sender_entries(&self) -> BTreeMap<&'static str, String> {
        REQUIRED_SENDER_KEYS
            .into_iter()
            .filter_map(|key| self.get(key).map(|value| (key, value.clone())))
            .collect()
    }

    /// Keys from [`REQUIRED_SENDER_KEYS`] this profile does not carry.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        REQUIRED_SENDER_KEYS
            .into_iter()
            .filter(|key| self.get(key).is_none())
            .collect()
    }

    /// Field-wise merge, preferring `self` and filling gaps from `base`.
    fn merged_with(self, base: SenderEnv) -> SenderEnv {
        SenderEnv {
            sender_email: self.sender_email.filter(|v| !v.is_empty()).or(base.sender_email),
            sender_app_password: self
                .sender_app_password
                .filter(|v| !v.is_empty())
                .or(base.sender_app_password),
            sender_name: self.sender_name.filter(|v| !v.is_empty()).or(base.sender_name),
            host_domain: self.host_domain.filter(|v| !v.is_empty()).or(base.host_domain),
            port: self.port.filter(|v| !v.is_empty()).or(base.port),
            port_alt: self.port_alt.filter(|v| !v.is_empty()).or(base.port_alt),
        }
    }
}

/// Parse `KEY=VALUE` lines; blank lines and `#` comments are skipped.
pub fn parse_dotenv(text: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if !key.is_empty() {
            out.insert(key.to_string(), value.trim().to_string());
        }
    }
    out
}

/// Direct-SMTP connection parameters for variants that bypass the hosted
/// provider.
#[derive(Debug, Clone)]
pub struct DirectSmtp {
    pub host: String,
    pub port: u16,
    pub port_alt: Option<u16>,
}

/// Sender configuration resolved for one batch. Immutable once built.
#[derive(Debug, Clone)]
pub struct ResolvedSender {
    pub email: String,
    pub app_password: String,
    pub name: String,
    pub smtp: Option<DirectSmtp>,
}

impl ResolvedSender {
    pub fn from_parts(variant: Variant, env: SenderEnv) -> Result<ResolvedSender, Error> {
        let email = env
            .sender_email
            .filter(|v| !v.is_empty())
            .ok_or(Error::SenderNotConfigured)?;
        let app_password = env
            .sender_app_password
            .filter(|v| !v.is_empty())
            .ok_or(Error::SenderNotConfigured)?;
        let name = env
            .sender_name
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| email.clone());

        let smtp = if variant.is_direct_smtp() {
            let host = env
                .host_domain
                .filter(|v| !v.is_empty())
                .ok_or(Error::SenderNotConfigured)?;
            let port = env
                .port
                .as_deref()
                .and_then(|p| p.trim().parse::<u16>().ok())
                .ok_or(Error::SenderNotConfigured)?;
            let port_alt = env
                .port_alt
                .as_deref()
                .and_then(|p| p.trim().parse::<u16>().ok());
            Some(DirectSmtp {
                host,
                port,
                port_alt,
            })
        } else {
            None
        };

        Ok(ResolvedSender {
            email,
            app_password,
            name,
            smtp,
        })
    }

    /// RFC 5322 `From` mailbox: `Sender Name <sender@host>`.
    pub fn from_mailbox(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }
}

#[derive(Default)]
struct StoreInner {
    profiles: HashMap<String, SenderEnv>,
    active: Option<String>,
    variant: Variant,
}

/// Shared store of uploaded profiles and the current system variant.
///
/// Handlers read and write this concurrently; all access goes through the
/// lock. Poisoning is treated as unrecoverable.
pub struct SenderStore {
    inner: RwLock<StoreInner>,
}

impl Default for SenderStore {
    fn default() -> Self {
        SenderStore {
            inner: RwLock::new(StoreInner::default()),
        }
    }
}

impl SenderStore {
    /// Build the store, picking the startup variant from the environment:
    /// `cyberph` when a complete CYBERPH connection is configured.
    pub fn from_env() -> SenderStore {
        let cyberph = SenderEnv::from_env_with_prefix("CYBERPH").unwrap_or_default();
        let complete = cyberph.sender_email.as_deref().is_some_and(|v| !v.is_empty())
            && cyberph
                .sender_app_password
                .as_deref()
                .is_some_and(|v| !v.is_empty())
            && cyberph.host_domain.as_deref().is_some_and(|v| !v.is_empty())
            && cyberph.port.as_deref().is_some_and(|v| !v.is_empty());

        let variant = if complete {
            Variant::Cyberph
        } else {
            Variant::Default
        };

        SenderStore {
            inner: RwLock::new(StoreInner {
                variant,
                ..StoreInner::default()
            }),
        }
    }

    pub fn set_profile(&self, name: &str, env: SenderEnv) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let mut inner = self.inner.write().expect("sender store lock");
        inner.profiles.insert(name.to_string(), env);
        inner.active = Some(name.to_string());
    }

    pub fn profiles(&self) -> Vec<String> {
        let inner = self.inner.read().expect("sender store lock");
        let mut names: Vec<String> = inner.profiles.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn active_profile(&self) -> Option<String> {
        self.inner.read().expect("sender store lock").active.clone()
    }

    pub fn clear_profiles(&self) {
        let mut inner = self.inner.write().expect("sender store lock");
        inner.profiles.clear();
        inner.active = None;
    }

    pub fn system_variant(&self) -> Variant {
        self.inner.read().expect("sender store lock").variant
    }

    pub fn set_system_variant(&self, variant: Variant) {
        self.inner.write().expect("sender store lock").variant = variant;
    }

    /// Settle the variant for a request: the requested name when recognized,
    /// otherwise the current system variant.
    pub fn settle_variant(&self, requested: Option<&str>) -> Variant {
        requested
            .and_then(Variant::parse)
            .unwrap_or_else(|| self.system_variant())
    }

    /// The pre-merge settings a variant sees: the active profile for
    /// `default`, otherwise that variant's prefixed environment.
    fn overlay_for(&self, variant: Variant) -> SenderEnv {
        if variant == Variant::Default {
            let inner = self.inner.read().expect("sender store lock");
            if let Some(profile) = inner
                .active
                .as_ref()
                .and_then(|name| inner.profiles.get(name))
            {
                return profile.clone();
            }
        }
        match variant.env_prefix() {
            Some(prefix) => SenderEnv::from_env_with_prefix(prefix).unwrap_or_default(),
            None => SenderEnv::from_env().unwrap_or_default(),
        }
    }

    /// Resolve the effective sender settings for a request, filling gaps
    /// from the base (unprefixed) environment.
    pub fn resolve(&self, requested: Option<&str>) -> (Variant, SenderEnv) {
        let variant = self.settle_variant(requested);
        let overlay = self.overlay_for(variant);
        let base = SenderEnv::from_env().unwrap_or_default();
        (variant, overlay.merged_with(base))
    }

    /// Presence report for the required sender keys under a variant.
    pub fn env_status(&self, requested: Option<&str>) -> EnvStatus {
        let variant = self.settle_variant(requested);
        let overlay = self.overlay_for(variant);
        let using_profile = variant == Variant::Default && self.active_profile().is_some();

        let mut present = BTreeMap::new();
        let mut source = BTreeMap::new();
        let mut missing = Vec::new();
        for key in REQUIRED_SENDER_KEYS {
            let has = overlay.get(key).is_some();
            present.insert(key, has);
            source.insert(
                key,
                match (has, using_profile) {
                    (true, true) => "profile",
                    (true, false) => "env",
                    (false, _) => "missing",
                },
            );
            if !has {
                missing.push(key);
            }
        }

        EnvStatus {
            ok: missing.is_empty(),
            present,
            missing,
            source,
            active_profile: self.active_profile(),
            profiles: self.profiles(),
            system_variant: variant,
            hint: ENV_HINT,
            example: ENV_EXAMPLE,
        }
    }
}

const ENV_HINT: &str = "Create a .env file with SENDER_EMAIL, SENDER_APP_PASSWORD \
(e.g. a Gmail App Password), and SENDER_NAME, or upload one as a profile.";
const ENV_EXAMPLE: &str =
    "SENDER_EMAIL=you@example.com\nSENDER_APP_PASSWORD=abcd abcd abcd abcd\nSENDER_NAME=Your Name";

/// Response body for the env status endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvStatus {
    pub ok: bool,
    pub present: BTreeMap<&'static str, bool>,
    pub missing: Vec<&'static str>,
    pub source: BTreeMap<&'static str, &'static str>,
    pub active_profile: Option<String>,
    pub profiles: Vec<String>,
    pub system_variant: Variant,
    pub hint: &'static str,
    pub example: &'static str,
}
