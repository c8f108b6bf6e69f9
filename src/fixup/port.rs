use crate::compose::{Port, PortMode, Protocol, Service};
use crate::error::{Error, Result};
use crate::warnings::Warnings;
use tracing::debug;

/// Resolves port declarations the user left ambiguous
#[derive(Debug, Clone, Copy, Default)]
pub struct PortNormalizer;

impl PortNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalizes every port of `service` in place
    pub fn normalize_service(&self, service: &mut Service, warnings: &mut Warnings) -> Result<()> {
        let name = service.name.clone();
        for port in &mut service.ports {
            self.normalize(&name, port, warnings)?;
        }
        Ok(())
    }

    pub fn normalize(&self, service: &str, port: &mut Port, warnings: &mut Warnings) -> Result<()> {
        let mode = match &port.mode {
            None => {
                warnings.service(
                    service,
                    format!(
                        "port {}: no 'mode' was specified; defaulting to 'ingress' (add 'mode: ingress' to silence)",
                        port.target
                    ),
                );
                port.mode = Some(PortMode::Ingress);
                PortMode::Ingress
            }
            Some(mode) => mode.clone(),
        };

        match mode {
            PortMode::Ingress if port.is_udp() => {
                warnings.service(
                    service,
                    format!(
                        "port {}: UDP ports default to 'host' mode (add 'mode: host' to silence)",
                        port.target
                    ),
                );
                port.mode = Some(PortMode::Host);
            }
            PortMode::Ingress => {
                if let Some(published) = port.published.take() {
                    debug!(service, port = port.target, published = %published, "Ignoring published port in ingress mode");
                }
                match port.protocol {
                    None => {
                        warnings.service(
                            service,
                            format!(
                                "port {}: no 'protocol' was specified; assuming 'http' (add 'protocol: http' to silence)",
                                port.target
                            ),
                        );
                        port.protocol = Some(Protocol::Http);
                    }
                    Some(Protocol::Tcp) => port.protocol = Some(Protocol::Http),
                    Some(_) => {}
                }
            }
            PortMode::Host => {}
            PortMode::Other(other) => {
                return Err(Error::Invariant {
                    service: service.to_string(),
                    message: format!(
                        "port {}: 'mode' should have been validated to be one of [host ingress] but got: {}",
                        port.target, other
                    ),
                });
            }
        }
        Ok(())
    }
}
