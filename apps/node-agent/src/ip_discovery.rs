//! Physical-interface IP discovery for heartbeats (§4.6): "IP discovery
//! ignores loopback and virtual/bridge interfaces (detected by the absence
//! of a device symlink, with a fallback prefix allowlist)."

use std::path::Path;

/// Interface name prefixes treated as physical when `/sys/class/net` isn't
/// available (non-Linux, or a sandboxed container without sysfs mounted).
const PHYSICAL_PREFIXES: &[&str] = &["en", "eth", "wl", "wlan"];

/// Interface name prefixes that are never physical, regardless of sysfs.
const VIRTUAL_PREFIXES: &[&str] = &["lo", "docker", "br-", "veth", "virbr", "tun", "tap", "cni"];

fn is_virtual_name(name: &str) -> bool {
    VIRTUAL_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// A physical interface has `/sys/class/net/{name}/device` as a symlink to
/// real hardware; bridges/veths/loopback don't.
fn has_device_symlink(name: &str) -> bool {
    Path::new("/sys/class/net").join(name).join("device").exists()
}

fn is_physical(name: &str) -> bool {
    if is_virtual_name(name) {
        return false;
    }
    if Path::new("/sys/class/net").exists() {
        return has_device_symlink(name);
    }
    PHYSICAL_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// List this node's physical IPv4 addresses for the heartbeat payload.
/// Shells out to `ip -4 -o addr show` (present on every Linux node manager
/// deployment target) rather than linking a netlink crate the rest of the
/// workspace has no other use for.
pub async fn discover_physical_ips() -> Vec<String> {
    let output = tokio::process::Command::new("ip")
        .args(["-4", "-o", "addr", "show"])
        .output()
        .await;

    let Ok(output) = output else {
        return fallback_via_udp_connect();
    };
    if !output.status.success() {
        return fallback_via_udp_connect();
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let mut ips = Vec::new();
    for line in text.lines() {
        // Format: "2: eth0    inet 10.0.0.5/24 brd ... scope global eth0"
        let mut fields = line.split_whitespace();
        let Some(_idx) = fields.next() else { continue };
        let Some(name) = fields.next() else { continue };
        if !is_physical(name) {
            continue;
        }
        let Some(pos) = line.find("inet ") else {
            continue;
        };
        let rest = &line[pos + 5..];
        if let Some(addr) = rest.split('/').next() {
            ips.push(addr.trim().to_string());
        }
    }

    if ips.is_empty() {
        fallback_via_udp_connect()
    } else {
        ips
    }
}

/// Last-resort fallback when `ip` isn't available: ask the kernel which
/// local address it would use to reach a public address, without sending
/// any packets (UDP connect is a routing-table lookup only).
fn fallback_via_udp_connect() -> Vec<String> {
    use std::net::UdpSocket;
    let Ok(socket) = UdpSocket::bind("0.0.0.0:0") else {
        return Vec::new();
    };
    if socket.connect("8.8.8.8:80").is_err() {
        return Vec::new();
    }
    match socket.local_addr() {
        Ok(addr) => vec![addr.ip().to_string()],
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_and_bridges_are_never_physical() {
        assert!(!is_physical("lo"));
        assert!(!is_physical("docker0"));
        assert!(!is_physical("veth1234"));
        assert!(!is_physical("br-abcdef"));
    }

    #[test]
    fn prefix_allowlist_recognises_common_physical_names() {
        if !Path::new("/sys/class/net").exists() {
            assert!(is_physical("eth0"));
            assert!(is_physical("en0"));
            assert!(is_physical("wlan0"));
        }
    }
}
