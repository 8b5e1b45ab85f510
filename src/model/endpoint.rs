use std::fmt;
use std::net::{Ipv6Addr, SocketAddr};
use std::str::FromStr;

use ipnet::{IpNet, Ipv6Net};

use crate::model::error::ParseError;

/// An address range plus a port.
///
/// As a rule pattern it matches any address inside `range`; port `0` stands
/// for any port. As a request value it is built from a concrete socket
/// address by [`Endpoint::host`].
///
/// The text form is `<cidr>:<port|*>`, e.g. `10.0.0.0/16:*` or
/// `[2c08::f1]/64:443`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    range: IpNet,
    port: u16,
}

impl Endpoint {
    /// wildcard port
    pub const ANY_PORT: u16 = 0;

    /// Host bits of `range` are cleared.
    pub fn new(range: IpNet, port: u16) -> Self {
        Self {
            range: range.trunc(),
            port,
        }
    }

    /// Endpoint of exactly one address and port.
    ///
    /// IPv4-mapped IPv6 addresses are treated as the IPv4 address they carry,
    /// so clients accepted on a dual-stack socket match IPv4 rules.
    pub fn host(addr: SocketAddr) -> Self {
        Self {
            range: IpNet::from(addr.ip().to_canonical()),
            port: addr.port(),
        }
    }

    pub fn range(&self) -> IpNet {
        self.range
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_any_port(&self) -> bool {
        self.port == Self::ANY_PORT
    }

    /// Whether the concrete endpoint `other` falls into this pattern.
    pub fn matches(&self, other: &Endpoint) -> bool {
        let ok_addr = self.range.contains(&other.range.addr());
        let ok_port = self.is_any_port() || self.port == other.port;
        ok_addr && ok_port
    }
}

impl FromStr for Endpoint {
    type Err = ParseError;

    /// parse `1.2.3.4/24:80`
    ///
    /// The port separator is the last `:` and it has to come after the `/`
    /// of the cidr; colons before it belong to an IPv6 address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let isep = s.find('/').ok_or_else(|| ParseError::MissingPrefix {
            text: s.to_owned(),
        })?;
        let iport = match s.rfind(':') {
            Some(iport) if iport > isep => iport,
            _ => {
                return Err(ParseError::MissingPort { text: s.to_owned() });
            }
        };
        let (cidr, port) = (&s[..iport], &s[iport + 1..]);
        let range = parse_cidr(cidr).map_err(|reason| ParseError::InvalidCidr {
            text: s.to_owned(),
            reason,
        })?;
        let port = parse_port(port).ok_or_else(|| ParseError::InvalidPort {
            text: s.to_owned(),
            port: port.to_owned(),
        })?;
        Ok(Endpoint::new(range, port))
    }
}

/// Accepts `10.0.0.0/8`, `2c08::f1/64` and the bracketed `[2c08::f1]/64`.
fn parse_cidr(s: &str) -> Result<IpNet, String> {
    match s.strip_prefix('[') {
        Some(rest) => {
            let (addr, prefix) = rest
                .split_once("]/")
                .ok_or_else(|| format!("unmatched '[' in {}", s))?;
            let addr: Ipv6Addr = addr.parse().map_err(|err| format!("{}", err))?;
            let prefix: u8 = prefix.parse().map_err(|err| format!("{}", err))?;
            Ipv6Net::new(addr, prefix)
                .map(IpNet::V6)
                .map_err(|err| err.to_string())
        }
        None => s.parse::<IpNet>().map_err(|err| err.to_string()),
    }
}

fn parse_port(s: &str) -> Option<u16> {
    if s == "*" {
        Some(Endpoint::ANY_PORT)
    } else {
        s.parse().ok()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.range {
            IpNet::V4(net) => write!(f, "{}", net)?,
            IpNet::V6(net) => write!(f, "[{}]/{}", net.addr(), net.prefix_len())?,
        }
        if self.is_any_port() {
            write!(f, ":*")
        } else {
            write!(f, ":{}", self.port)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ep(s: &str) -> Endpoint {
        s.parse().unwrap()
    }

    #[test]
    fn parse_any_port() {
        let e = ep("10.0.0.0/16:*");
        assert_eq!(e.range(), "10.0.0.0/16".parse::<IpNet>().unwrap());
        assert_eq!(e.port(), 0);
        assert!(e.is_any_port());
        assert_eq!(e.to_string(), "10.0.0.0/16:*");
    }

    #[test]
    fn host_bits_are_cleared() {
        assert_eq!(ep("10.0.3.72/16:80"), ep("10.0.0.0/16:80"));
        assert_eq!(ep("10.0.3.72/16:80").to_string(), "10.0.0.0/16:80");
        // an explicit zero port is the wildcard
        assert_eq!(ep("1.2.3.4/32:0"), ep("1.2.3.4/32:*"));
    }

    #[test]
    fn ipv6_forms() {
        let bracketed = ep("[2c08::f1]/64:443");
        assert_eq!(bracketed, ep("2c08::f1/64:443"));
        assert_eq!(bracketed.port(), 443);
        assert_eq!(bracketed.to_string(), "[2c08::]/64:443");
        assert_eq!(ep("[::]/0:*").to_string(), "[::]/0:*");
    }

    #[test]
    fn canonical_round_trip() {
        for text in &[
            "10.0.0.0/16:*",
            "10.0.3.72/16:80",
            "1.2.3.4/32:443",
            "0.0.0.0/0:*",
            "[2c08::f1]/64:443",
            "2c08::f1/128:*",
            "192.168.1.1/24:65535",
        ] {
            let parsed = ep(text);
            let formatted = parsed.to_string();
            assert_eq!(ep(&formatted), parsed, "{} -> {}", text, formatted);
            assert_eq!(ep(&formatted).to_string(), formatted);
        }
    }

    #[test]
    fn parse_errors() {
        use ParseError::*;
        assert!(matches!(
            "10.0.0.0:80".parse::<Endpoint>(),
            Err(MissingPrefix { .. })
        ));
        assert!(matches!(
            "10.0.0.0/16".parse::<Endpoint>(),
            Err(MissingPort { .. })
        ));
        // every colon belongs to the address
        assert!(matches!(
            "2c08::f1/64".parse::<Endpoint>(),
            Err(MissingPort { .. })
        ));
        assert!(matches!(
            "10.0.0.0/33:80".parse::<Endpoint>(),
            Err(InvalidCidr { .. })
        ));
        assert!(matches!(
            "example.com/8:80".parse::<Endpoint>(),
            Err(InvalidCidr { .. })
        ));
        assert!(matches!(
            "[2c08::f1/64:443".parse::<Endpoint>(),
            Err(InvalidCidr { .. })
        ));
        for port in &["http", "", "-1", "65536", "**"] {
            let text = format!("10.0.0.0/8:{}", port);
            match text.parse::<Endpoint>() {
                Err(InvalidPort { port: p, .. }) => assert_eq!(&p, port),
                other => panic!("{}: {:?}", text, other),
            }
        }
    }

    #[test]
    fn error_message_names_input() {
        let err = "10.0.0.0/8:http".parse::<Endpoint>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'10.0.0.0/8:http'"), "{}", msg);
        assert!(msg.contains("Any port: '*'"), "{}", msg);
    }

    #[test]
    fn wildcard_port_matches() {
        let pat = ep("10.0.0.0/16:*");
        assert!(pat.matches(&ep("10.0.3.72/32:48291")));
        assert!(pat.matches(&ep("10.0.3.72/32:80")));
        assert!(!pat.matches(&ep("10.1.3.72/32:80")));
    }

    #[test]
    fn exact_port_matches() {
        let pat = ep("1.2.3.4/32:443");
        assert!(pat.matches(&ep("1.2.3.4/32:443")));
        assert!(!pat.matches(&ep("1.2.3.4/32:80")));
        assert!(!pat.matches(&ep("1.2.3.5/32:443")));
    }

    #[test]
    fn matching_is_asymmetric() {
        let wide = ep("10.0.0.0/8:*");
        let narrow = Endpoint::host("10.1.2.3:80".parse().unwrap());
        assert!(wide.matches(&narrow));
        assert!(!narrow.matches(&wide));
    }

    #[test]
    fn default_route() {
        let pat = ep("0.0.0.0/0:*");
        assert!(pat.matches(&Endpoint::host("1.2.3.4:1".parse().unwrap())));
        assert!(pat.matches(&Endpoint::host("255.255.255.255:65535".parse().unwrap())));
        assert!(!pat.matches(&Endpoint::host("[2c08::1]:443".parse().unwrap())));
        assert!(ep("[::]/0:*").matches(&Endpoint::host("[2c08::1]:443".parse().unwrap())));
    }

    #[test]
    fn ipv6_containment() {
        let pat = ep("[2c08::f1]/64:443");
        assert!(pat.matches(&Endpoint::host("[2c08::1234]:443".parse().unwrap())));
        assert!(!pat.matches(&Endpoint::host("[2c08:0:0:1::1]:443".parse().unwrap())));
        assert!(!pat.matches(&Endpoint::host("[2c08::1234]:80".parse().unwrap())));
    }

    #[test]
    fn host_endpoint() {
        let host = Endpoint::host("10.1.2.3:5555".parse().unwrap());
        assert_eq!(host.to_string(), "10.1.2.3/32:5555");
        let mapped = Endpoint::host("[::ffff:10.1.2.3]:5555".parse().unwrap());
        assert_eq!(mapped, host);
        assert!(ep("10.0.0.0/8:*").matches(&mapped));
    }
}
