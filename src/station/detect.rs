//! Serial auto-detection at startup.
//!
//! Before any acquisition loop starts, every serial station gets a chance to
//! claim a port: its configured port first, then the remaining free ports,
//! each answered by the station's own identification probe. The first port
//! that answers is claimed and removed from the free list.

use crate::registry::Registry;

pub fn assign_serial_ports(registry: &Registry) {
    let mut free: Vec<String> = match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|info| info.port_name).collect(),
        Err(err) => {
            tracing::warn!(error = %err, "could not enumerate serial ports");
            Vec::new()
        }
    };
    tracing::info!(ports = ?free, "serial ports available for detection");

    for station in registry.stations() {
        if !station.is_serial() {
            continue;
        }
        let configured = station.configured_serial_port();

        let mut candidates: Vec<String> = Vec::new();
        if let Some(port) = &configured {
            // The configured port may exist without being enumerable.
            if free.iter().any(|p| p == port) || free.is_empty() {
                candidates.push(port.clone());
            }
        }
        candidates.extend(
            free.iter()
                .filter(|port| configured.as_deref() != Some(port.as_str()))
                .cloned(),
        );

        let claimed = candidates
            .into_iter()
            .find(|port| station.probe_serial_port(port));
        match claimed {
            Some(port) => {
                tracing::info!(station = %station.name(), port = %port, "serial station detected");
                free.retain(|p| *p != port);
                station.assign_serial_port(port);
            }
            None => match &configured {
                Some(port) => tracing::warn!(
                    station = %station.name(),
                    port = %port,
                    "no port answered the probe; keeping the configured port"
                ),
                None => tracing::warn!(
                    station = %station.name(),
                    "no port answered the probe and none is configured; station will fail closed"
                ),
            },
        }
    }
}
