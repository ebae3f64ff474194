//! Port allocation for the managed backend.

use std::net::TcpListener;

use tracing::debug;

/// Check if a port is available by attempting to bind to it.
/// The listener is dropped immediately, releasing the port.
pub fn is_port_available(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok_and(|listener| listener.local_addr().is_ok())
}

/// First free port in the inclusive range `start..=end`, or `None`.
pub fn allocate_port(start: u16, end: u16) -> Option<u16> {
    let port = (start..=end).find(|&port| {
        let free = is_port_available(port);
        if !free {
            debug!(port, "Port unavailable on system, skipping");
        }
        free
    });
    if let Some(port) = port {
        debug!(port, "Allocated available port");
    }
    port
}
