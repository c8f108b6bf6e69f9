//! Per-service fixup: ports, build contexts, config classification and
//! cross-service name rewriting

pub mod config;
pub mod managed;
pub mod names;
pub mod pipeline;
pub mod port;
pub mod secrets;

pub use config::{
    interpolation_references, missing_configs, Classification, ConfigClassifier, ConfigLister,
    ConfigRegistry, ConfigSource, StaticConfigLister, MASKED_VALUE,
};
pub use managed::ProviderKind;
pub use names::{DnsNamer, InternalDnsNamer, RewriteTarget, ServiceNameResolver};
pub use pipeline::{ConfigRow, FixedService, FixupOptions, FixupOutput, ResolvedVariable, ServiceFixupPipeline};
pub use port::PortNormalizer;
pub use secrets::{scan_literal, SecretKind};
