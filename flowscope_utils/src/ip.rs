use std::net::IpAddr;

/// Whether an address is private for WAN-detection purposes: RFC 1918 for
/// IPv4, ULA `fd00::/8` and link-local `fe80::/10` for IPv6.
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            o[0] == 10 || (o[0] == 172 && (16..=31).contains(&o[1])) || (o[0] == 192 && o[1] == 168)
        }
        IpAddr::V6(v6) => {
            let o = v6.octets();
            o[0] == 0xfd || (o[0] == 0xfe && (o[1] & 0xc0) == 0x80)
        }
    }
}

/// Collapse an address to its surrounding subnet: /24 for IPv4, /64 for
/// IPv6. Used to describe what an interface carries.
pub fn ip_subnet(ip: IpAddr) -> String {
    ip_subnet_with_v6_prefix(ip, 64)
}

/// Like [`ip_subnet`], with a configurable IPv6 prefix length for sites
/// that delegate /48, /56, or /60 blocks.
pub fn ip_subnet_with_v6_prefix(ip: IpAddr, v6_prefix_len: u8) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("{}.{}.{}.0/24", o[0], o[1], o[2])
        }
        IpAddr::V6(v6) => {
            let prefix_len = v6_prefix_len.clamp(1, 128);
            let mask = u128::MAX << (128 - prefix_len as u32);
            let net = std::net::Ipv6Addr::from(u128::from_be_bytes(v6.octets()) & mask);
            format!("{net}/{prefix_len}")
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_is_private_ip() {
        assert!(is_private_ip("10.1.2.3".parse().unwrap()));
        assert!(is_private_ip("172.16.0.1".parse().unwrap()));
        assert!(is_private_ip("172.31.255.1".parse().unwrap()));
        assert!(is_private_ip("192.168.0.1".parse().unwrap()));
        assert!(is_private_ip("fd00::1".parse().unwrap()));
        assert!(is_private_ip("fe80::1".parse().unwrap()));
        assert!(!is_private_ip("172.32.0.1".parse().unwrap()));
        assert!(!is_private_ip("8.8.8.8".parse().unwrap()));
        assert!(!is_private_ip("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_ip_subnet() {
        assert_eq!(ip_subnet("192.168.1.42".parse().unwrap()), "192.168.1.0/24");
        assert_eq!(
            ip_subnet("2001:db8:1:2:3::9".parse().unwrap()),
            "2001:db8:1:2::/64"
        );
    }

    #[test]
    fn test_ip_subnet_with_v6_prefix() {
        let ip = "2001:db8:1:211::9".parse().unwrap();
        assert_eq!(ip_subnet_with_v6_prefix(ip, 48), "2001:db8:1::/48");
        assert_eq!(ip_subnet_with_v6_prefix(ip, 56), "2001:db8:1:200::/56");
        assert_eq!(ip_subnet_with_v6_prefix(ip, 64), "2001:db8:1:211::/64");
        // The prefix does not change IPv4 grouping.
        assert_eq!(
            ip_subnet_with_v6_prefix("10.1.2.3".parse().unwrap(), 48),
            "10.1.2.0/24"
        );
    }
}
