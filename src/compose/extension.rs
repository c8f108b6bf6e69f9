//! Typed `x-defang-*` extensions
//!
//! Project files carry extensions as an untyped bag. Everything the platform
//! understands is decoded into [`Extension`]; any other key is reported as
//! unknown so the caller can warn about it without failing.

use serde_json::Value;
use thiserror::Error;

pub const DNS_ROLE: &str = "x-defang-dns-role";
pub const STATIC_FILES: &str = "x-defang-static-files";
pub const REDIS: &str = "x-defang-redis";
pub const POSTGRES: &str = "x-defang-postgres";
pub const MONGODB: &str = "x-defang-mongodb";
pub const AUTOSCALING: &str = "x-defang-autoscaling";
pub const LLM: &str = "x-defang-llm";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    ManagedRedis(ManagedStore),
    ManagedPostgres(ManagedStore),
    ManagedMongodb(ManagedStore),
    StaticFiles(StaticFiles),
    DnsRole(String),
    Autoscaling,
    Llm,
}

/// Parameters of a managed data store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedStore {
    pub enabled: bool,
    pub allow_downtime: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticFiles {
    pub folder: String,
    pub redirects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtensionError {
    #[error("x-defang-dns-role must be a string")]
    DnsRole,

    #[error(r#"x-defang-static-files must be a string or object {{"folder": string, "redirects": string[]}}"#)]
    StaticFiles,

    #[error("{key}: 'allow-downtime' must be a boolean")]
    AllowDowntime { key: &'static str },

    #[error("{key}: invalid boolean value {value:?}")]
    InvalidBool { key: &'static str, value: String },

    #[error("{key}: expected parameters in managed storage definition field")]
    ManagedStore { key: &'static str },
}

/// Result of decoding a service's extension bag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedExtensions {
    pub known: Vec<Extension>,
    pub unknown: Vec<String>,
}

impl DecodedExtensions {
    pub fn has_managed_store(&self) -> bool {
        self.known.iter().any(Extension::is_managed_store)
    }

    pub fn static_files(&self) -> Option<&StaticFiles> {
        self.known.iter().find_map(|e| match e {
            Extension::StaticFiles(sf) => Some(sf),
            _ => None,
        })
    }
}

impl Extension {
    /// Keys decoded by [`Extension::decode`]
    pub const KEYS: &'static [&'static str] =
        &[DNS_ROLE, STATIC_FILES, REDIS, POSTGRES, MONGODB, AUTOSCALING, LLM];

    pub fn is_known_key(key: &str) -> bool {
        Self::KEYS.contains(&key)
    }

    /// Decodes one extension value. `Ok(None)` means the key is not a
    /// recognized extension, or is one whose null value counts as unset.
    pub fn decode(key: &str, value: &Value) -> Result<Option<Self>, ExtensionError> {
        let extension = match key {
            DNS_ROLE | STATIC_FILES if value.is_null() => return Ok(None),
            DNS_ROLE => match value {
                Value::String(role) => Extension::DnsRole(role.clone()),
                _ => return Err(ExtensionError::DnsRole),
            },
            STATIC_FILES => Extension::StaticFiles(decode_static_files(value)?),
            REDIS => Extension::ManagedRedis(decode_managed_store(REDIS, value)?),
            POSTGRES => Extension::ManagedPostgres(decode_managed_store(POSTGRES, value)?),
            MONGODB => Extension::ManagedMongodb(decode_managed_store(MONGODB, value)?),
            AUTOSCALING => Extension::Autoscaling,
            LLM => Extension::Llm,
            _ => return Ok(None),
        };
        Ok(Some(extension))
    }

    pub fn key(&self) -> &'static str {
        match self {
            Extension::ManagedRedis(_) => REDIS,
            Extension::ManagedPostgres(_) => POSTGRES,
            Extension::ManagedMongodb(_) => MONGODB,
            Extension::StaticFiles(_) => STATIC_FILES,
            Extension::DnsRole(_) => DNS_ROLE,
            Extension::Autoscaling => AUTOSCALING,
            Extension::Llm => LLM,
        }
    }

    /// True for an enabled managed Redis/Postgres/MongoDB store
    pub fn is_managed_store(&self) -> bool {
        match self {
            Extension::ManagedRedis(store)
            | Extension::ManagedPostgres(store)
            | Extension::ManagedMongodb(store) => store.enabled,
            _ => false,
        }
    }
}

fn decode_static_files(value: &Value) -> Result<StaticFiles, ExtensionError> {
    match value {
        Value::String(folder) => Ok(StaticFiles {
            folder: folder.clone(),
            redirects: Vec::new(),
        }),
        Value::Object(obj) => {
            let folder = match obj.get("folder") {
                Some(Value::String(folder)) => folder.clone(),
                None => String::new(),
                Some(_) => return Err(ExtensionError::StaticFiles),
            };
            let redirects = match obj.get("redirects") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or(ExtensionError::StaticFiles)?,
                Some(_) => return Err(ExtensionError::StaticFiles),
            };
            Ok(StaticFiles { folder, redirects })
        }
        _ => Err(ExtensionError::StaticFiles),
    }
}

fn decode_managed_store(key: &'static str, value: &Value) -> Result<ManagedStore, ExtensionError> {
    match value {
        // A bare `x-defang-redis:` key enables the store
        Value::Null => Ok(ManagedStore {
            enabled: true,
            allow_downtime: None,
        }),
        Value::Bool(enabled) => Ok(ManagedStore {
            enabled: *enabled,
            allow_downtime: None,
        }),
        Value::String(s) => parse_bool(s)
            .map(|enabled| ManagedStore {
                enabled,
                allow_downtime: None,
            })
            .ok_or_else(|| ExtensionError::InvalidBool {
                key,
                value: s.clone(),
            }),
        Value::Object(obj) => {
            let allow_downtime = match obj.get("allow-downtime") {
                None => None,
                Some(Value::Bool(b)) => Some(*b),
                Some(_) => return Err(ExtensionError::AllowDowntime { key }),
            };
            Ok(ManagedStore {
                enabled: true,
                allow_downtime,
            })
        }
        _ => Err(ExtensionError::ManagedStore { key }),
    }
}

/// Accepts the same spellings as compose's boolean strings
fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
