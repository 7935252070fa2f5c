use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Returns the well-known service name for a port/protocol combination.
/// Protocol-specific tables win; ports unknown to every table yield `None`.
pub fn service_name(port: u16, protocol: u8) -> Option<&'static str> {
    if port == 0 {
        return None;
    }
    if protocol == 6 {
        if let Some(name) = TCP_SERVICES.get(&port) {
            return Some(name);
        }
    } else if protocol == 17 {
        if let Some(name) = UDP_SERVICES.get(&port) {
            return Some(name);
        }
    }
    COMMON_SERVICES.get(&port).copied()
}

/// Returns a service name for a port regardless of protocol.
pub fn service_by_port(port: u16) -> Option<&'static str> {
    COMMON_SERVICES
        .get(&port)
        .or_else(|| TCP_SERVICES.get(&port))
        .or_else(|| UDP_SERVICES.get(&port))
        .copied()
}

/// Whether a string names a service in any of the tables. Used to accept
/// bare service names in filter expressions.
pub fn is_known_service(name: &str) -> bool {
    COMMON_SERVICES.values().any(|s| *s == name)
        || TCP_SERVICES.values().any(|s| *s == name)
        || UDP_SERVICES.values().any(|s| *s == name)
}

/// Services that answer on the same port for TCP and UDP.
static COMMON_SERVICES: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (7, "echo"),
        (20, "ftp-data"),
        (21, "ftp"),
        (22, "ssh"),
        (23, "telnet"),
        (25, "smtp"),
        (53, "dns"),
        (67, "dhcp-s"),
        (68, "dhcp-c"),
        (69, "tftp"),
        (80, "http"),
        (88, "kerberos"),
        (110, "pop3"),
        (119, "nntp"),
        (123, "ntp"),
        (135, "msrpc"),
        (137, "netbios-ns"),
        (138, "netbios-dgm"),
        (139, "netbios-ssn"),
        (143, "imap"),
        (161, "snmp"),
        (162, "snmp-trap"),
        (179, "bgp"),
        (389, "ldap"),
        (443, "https"),
        (445, "smb"),
        (464, "kpasswd"),
        (465, "smtps"),
        (500, "isakmp"),
        (514, "syslog"),
        (515, "printer"),
        (520, "rip"),
        (546, "dhcpv6-c"),
        (547, "dhcpv6-s"),
        (587, "submission"),
        (636, "ldaps"),
        (853, "dns-tls"),
        (873, "rsync"),
        (902, "vmware"),
        (989, "ftps-data"),
        (990, "ftps"),
        (993, "imaps"),
        (995, "pop3s"),
        (1080, "socks"),
        (1194, "openvpn"),
        (1433, "mssql"),
        (1434, "mssql-m"),
        (1521, "oracle"),
        (1701, "l2tp"),
        (1723, "pptp"),
        (1812, "radius"),
        (1813, "radius-acct"),
        (1883, "mqtt"),
        (2049, "nfs"),
        (2082, "cpanel"),
        (2083, "cpanel-ssl"),
        (2086, "whm"),
        (2087, "whm-ssl"),
        (2181, "zookeeper"),
        (2222, "ssh-alt"),
        (2375, "docker"),
        (2376, "docker-ssl"),
        (3000, "grafana"),
        (3128, "squid"),
        (3268, "gc"),
        (3269, "gc-ssl"),
        (3306, "mysql"),
        (3389, "rdp"),
        (3690, "svn"),
        (4000, "remoteanything"),
        (4443, "https-alt"),
        (4500, "ipsec-nat"),
        (4567, "tram"),
        (5000, "upnp"),
        (5060, "sip"),
        (5061, "sips"),
        (5222, "xmpp-c"),
        (5269, "xmpp-s"),
        (5432, "postgres"),
        (5672, "amqp"),
        (5900, "vnc"),
        (5938, "teamviewer"),
        (5984, "couchdb"),
        (5985, "winrm"),
        (5986, "winrm-ssl"),
        (6379, "redis"),
        (6443, "k8s-api"),
        (6514, "syslog-tls"),
        (6667, "irc"),
        (6697, "irc-ssl"),
        (7001, "weblogic"),
        (7002, "weblogic-ssl"),
        (8000, "http-alt"),
        (8008, "http-alt"),
        (8080, "http-proxy"),
        (8081, "http-alt"),
        (8123, "polipo"),
        (8140, "puppet"),
        (8443, "https-alt"),
        (8444, "https-alt"),
        (8500, "consul"),
        (8888, "http-alt"),
        (9000, "php-fpm"),
        (9001, "tor-orport"),
        (9042, "cassandra"),
        (9090, "prometheus"),
        (9091, "transmission"),
        (9092, "kafka"),
        (9100, "jetdirect"),
        (9200, "elasticsearch"),
        (9300, "elasticsearch"),
        (9418, "git"),
        (9993, "zerotier"),
        (9999, "abyss"),
        (10000, "webmin"),
        (10050, "zabbix-agent"),
        (10051, "zabbix"),
        (10443, "https-alt"),
        (11211, "memcached"),
        (11371, "hkp"),
        (15672, "rabbitmq-mgmt"),
        (17500, "dropbox"),
        (25565, "minecraft"),
        (27017, "mongodb"),
        (27018, "mongodb"),
        (28015, "rethinkdb"),
        (32400, "plex"),
        (49000, "tr-064"),
        (50000, "sap"),
        (51413, "bittorrent"),
    ])
});

/// TCP-only services.
static TCP_SERVICES: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (1, "tcpmux"),
        (9, "discard"),
        (13, "daytime"),
        (37, "time"),
        (79, "finger"),
        (109, "pop2"),
        (111, "rpcbind"),
        (113, "ident"),
        (513, "rlogin"),
        (543, "klogin"),
        (544, "kshell"),
        (1099, "rmiregistry"),
        (2000, "cisco-sccp"),
        (2001, "dc"),
        (2010, "search"),
        (4444, "krb524"),
        (5631, "pcanywheredata"),
        (8009, "ajp13"),
        (8291, "mikrotik"),
    ])
});

/// UDP-only services.
static UDP_SERVICES: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (9, "discard"),
        (13, "daytime"),
        (37, "time"),
        (111, "rpcbind"),
        (177, "xdmcp"),
        (427, "svrloc"),
        (443, "quic"),
        (517, "talk"),
        (518, "ntalk"),
        (521, "ripng"),
        (623, "ipmi"),
        (1645, "radius-old"),
        (1646, "radacct-old"),
        (1900, "ssdp"),
        (3478, "stun"),
        (3544, "teredo"),
        (4380, "teredo-alt"),
        (4789, "vxlan"),
        (5004, "rtp"),
        (5005, "rtcp"),
        (5353, "mdns"),
        (5355, "llmnr"),
        (6081, "geneve"),
        (8472, "vxlan-otv"),
    ])
});

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_protocol_specific_wins() {
        assert_eq!(service_name(443, 6), Some("https"));
        assert_eq!(service_name(443, 17), Some("quic"));
    }

    #[test]
    fn test_common_fallback() {
        assert_eq!(service_name(53, 6), Some("dns"));
        assert_eq!(service_name(53, 17), Some("dns"));
        assert_eq!(service_name(53, 132), Some("dns"));
    }

    #[test]
    fn test_unknown_port() {
        assert_eq!(service_name(0, 6), None);
        assert_eq!(service_name(49151, 6), None);
        assert_eq!(service_by_port(49151), None);
    }

    #[test]
    fn test_is_known_service() {
        assert!(is_known_service("https"));
        assert!(is_known_service("mikrotik"));
        assert!(is_known_service("quic"));
        assert!(!is_known_service("frobnicator"));
    }
}
