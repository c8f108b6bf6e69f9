//! In-memory model of a compose-style project
//!
//! The textual descriptor is parsed elsewhere; this module only defines the
//! values the loader hands over (`Project`, `Service`, `Port`, ...) plus a few
//! helpers shared by validation and fixup (name normalization, image repo
//! parsing, typed `x-defang-*` extensions).

pub mod extension;
pub mod port;
pub mod project;
pub mod service;

pub use extension::{DecodedExtensions, Extension, ExtensionError, ManagedStore, StaticFiles};
pub use port::{Port, PortMode, Protocol};
pub use project::{LoadError, Project, SecretDefinition};
pub use service::{Build, Deploy, HealthCheck, Resource, Resources, SecretRef, Service};

use regex::Regex;
use std::sync::OnceLock;

/// Images whose data lives on local disk and is lost when an ephemeral task restarts
const STATEFUL_IMAGES: &[&str] = &[
    "cassandra",
    "couchdb",
    "elasticsearch",
    "influxdb",
    "mariadb",
    "mongo",
    "mongodb",
    "mysql",
    "neo4j",
    "opensearch",
    "postgres",
    "postgresql",
    "rabbitmq",
    "redis",
    "valkey",
];

fn non_alphanumeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9]+").expect("static regex"))
}

/// Lowercases a service name and collapses every run of non-alphanumeric
/// characters into a single `-`, producing a DNS-safe label.
pub fn normalize_service_name(name: &str) -> String {
    non_alphanumeric()
        .replace_all(&name.to_lowercase(), "-")
        .into_owned()
}

/// Returns the lowercase repository part of an image reference, without tag or digest.
///
/// `docker.io/library/Redis:7` becomes `docker.io/library/redis`; a registry port
/// (`localhost:5000/app`) is preserved.
pub fn image_repo(image: &str) -> String {
    let image = image.to_lowercase();
    let image = match image.split_once('@') {
        Some((repo, _digest)) => repo.to_string(),
        None => image,
    };
    let last_slash = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[last_slash..].find(':') {
        Some(colon) => image[..last_slash + colon].to_string(),
        None => image,
    }
}

fn image_name(image: &str) -> String {
    let repo = image_repo(image);
    match repo.rsplit_once('/') {
        Some((_, name)) => name.to_string(),
        None => repo,
    }
}

pub fn is_stateful_image(image: &str) -> bool {
    !image.is_empty() && STATEFUL_IMAGES.contains(&image_name(image).as_str())
}

pub fn is_redis_image(image: &str) -> bool {
    let name = image_name(image);
    name.starts_with("redis") || name.starts_with("valkey")
}

pub fn is_postgres_image(image: &str) -> bool {
    let name = image_name(image);
    name.contains("postgres") || name.starts_with("pgvector")
}

pub fn is_mongo_image(image: &str) -> bool {
    image_name(image).starts_with("mongo")
}
