//! Broadcast-capable network interfaces.

use std::net::Ipv4Addr;

use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub broadcast: Ipv4Addr,
}

/// Up, non-loopback interfaces with an IPv4 address, keyed by name.
pub fn interfaces() -> IndexMap<String, InterfaceInfo> {
    netdev::get_interfaces()
        .into_iter()
        .filter(|iface| iface.is_up() && !iface.is_loopback())
        .filter_map(|iface| {
            let net = iface.ipv4.first()?;
            let info = InterfaceInfo {
                name: iface.name.clone(),
                address: net.addr(),
                netmask: net.netmask(),
                broadcast: net.broadcast(),
            };
            Some((iface.name, info))
        })
        .collect()
}

/// Pick the interface named `name`, or the default-route interface, or the
/// first usable one.
pub fn select(name: Option<&str>) -> Option<InterfaceInfo> {
    let mut all = interfaces();
    if let Some(name) = name {
        return all.shift_remove(name);
    }
    if let Ok(default) = netdev::get_default_interface() {
        if let Some(info) = all.shift_remove(&default.name) {
            return Some(info);
        }
    }
    all.shift_remove_index(0).map(|(_, info)| info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listed_interfaces_are_consistent() {
        for (name, info) in interfaces() {
            assert_eq!(name, info.name);
            assert!(!info.address.is_loopback());
            let mask = u32::from(info.netmask);
            let expected = u32::from(info.address) | !mask;
            assert_eq!(u32::from(info.broadcast), expected);
        }
    }

    #[test]
    fn unknown_interface_not_selected() {
        assert!(select(Some("definitely-not-an-interface-0")).is_none());
    }
}
