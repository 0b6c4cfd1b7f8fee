use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Returns true if a TCP connection to `address` opens within `timeout`.
///
/// This only checks that the network is up. It says nothing about whether the
/// speech service itself will accept requests.
pub fn probe_reachability(address: &str, timeout: Duration) -> bool {
    let addrs = match address.to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            tracing::debug!(address, error = %e, "Could not resolve probe address");
            return false;
        }
    };

    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => {
                tracing::debug!(%addr, "Network probe succeeded");
                return true;
            }
            Err(e) => tracing::debug!(%addr, error = %e, "Network probe failed"),
        }
    }
    false
}
