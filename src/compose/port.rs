use serde::{Deserialize, Serialize};
use std::fmt;

/// How a port is exposed.
///
/// Unrecognized modes are kept verbatim so validation can report them instead of
/// the loader silently dropping them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PortMode {
    /// Externally routable, gets a managed public DNS name
    Ingress,
    /// Node-local, reachable through private DNS only
    Host,
    Other(String),
}

impl From<String> for PortMode {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ingress" => PortMode::Ingress,
            "host" => PortMode::Host,
            _ => PortMode::Other(s),
        }
    }
}

impl From<PortMode> for String {
    fn from(mode: PortMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for PortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortMode::Ingress => write!(f, "ingress"),
            PortMode::Host => write!(f, "host"),
            PortMode::Other(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
    Http2,
    Grpc,
    Other(String),
}

impl From<String> for Protocol {
    fn from(s: String) -> Self {
        match s.as_str() {
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            "http" => Protocol::Http,
            "http2" => Protocol::Http2,
            "grpc" => Protocol::Grpc,
            _ => Protocol::Other(s),
        }
    }
}

impl From<Protocol> for String {
    fn from(protocol: Protocol) -> Self {
        protocol.to_string()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Http => write!(f, "http"),
            Protocol::Http2 => write!(f, "http2"),
            Protocol::Grpc => write!(f, "grpc"),
            Protocol::Other(s) => write!(f, "{}", s),
        }
    }
}

/// A single `ports:` entry of a service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Port {
    pub target: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<PortMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    /// Published port or range (`"8080"` or `"8000-8010"`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
}

impl Port {
    pub fn host(target: u32, protocol: Protocol) -> Self {
        Self {
            target,
            mode: Some(PortMode::Host),
            protocol: Some(protocol),
            ..Default::default()
        }
    }

    pub fn ingress(target: u32) -> Self {
        Self {
            target,
            mode: Some(PortMode::Ingress),
            ..Default::default()
        }
    }

    pub fn is_host(&self) -> bool {
        self.mode == Some(PortMode::Host)
    }

    pub fn is_ingress(&self) -> bool {
        self.mode == Some(PortMode::Ingress)
    }

    pub fn is_udp(&self) -> bool {
        self.protocol == Some(Protocol::Udp)
    }

    /// Mode this port ends up with after normalization: unset means ingress,
    /// except for UDP which cannot be ingress.
    pub fn effective_mode(&self) -> PortMode {
        match &self.mode {
            Some(mode) => mode.clone(),
            None if self.is_udp() => PortMode::Host,
            None => PortMode::Ingress,
        }
    }
}
