//! Network interface address lookup

use std::net::IpAddr;

use crate::error::{Error, Result};
use crate::net::IpFamily;

/// Every address assigned to `name`
///
/// # Returns
///
/// - `Ok(addrs)`: The interface exists (the list may be empty)
/// - `Err(Error::Config)`: No interface with that name
pub fn addresses(name: &str) -> Result<Vec<IpAddr>> {
    let interfaces = if_addrs::get_if_addrs()
        .map_err(|e| Error::config(format!("failed to list network interfaces: {}", e)))?;

    let addrs: Vec<IpAddr> = interfaces
        .iter()
        .filter(|iface| iface.name == name)
        .map(|iface| iface.ip())
        .collect();

    if addrs.is_empty() {
        return Err(Error::config(format!("network interface {} not found or has no addresses", name)));
    }
    Ok(addrs)
}

/// First usable address of `family` on `name`
pub fn first_address(name: &str, family: IpFamily) -> Result<IpAddr> {
    addresses(name)?
        .into_iter()
        .find(|addr| is_usable(addr, family))
        .ok_or_else(|| {
            Error::config(format!(
                "no usable {} address found on interface {}",
                match family {
                    IpFamily::V4 => "IPv4",
                    IpFamily::V6 => "IPv6",
                },
                name
            ))
        })
}

fn is_usable(addr: &IpAddr, family: IpFamily) -> bool {
    match (addr, family) {
        (IpAddr::V4(v4), IpFamily::V4) => !v4.is_unspecified(),
        (IpAddr::V6(v6), IpFamily::V6) => !v6.is_unspecified(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn missing_interface_is_config_error() {
        assert!(matches!(
            addresses("srun-nonexistent0"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn unspecified_addresses_are_skipped() {
        assert!(!is_usable(&IpAddr::V4(Ipv4Addr::UNSPECIFIED), IpFamily::V4));
        assert!(is_usable(&IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), IpFamily::V4));
        assert!(!is_usable(&IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), IpFamily::V6));
    }

    #[test]
    fn loopback_has_an_ipv4_address() {
        let loopback = if_addrs::get_if_addrs()
            .unwrap()
            .into_iter()
            .find(|iface| iface.is_loopback() && iface.ip().is_ipv4());

        if let Some(iface) = loopback {
            let addr = first_address(&iface.name, IpFamily::V4).unwrap();
            assert!(addr.is_loopback());
        }
    }
}
