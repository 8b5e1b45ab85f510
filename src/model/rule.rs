use std::fmt;
use std::str::FromStr;

use crate::model::endpoint::Endpoint;
use crate::model::error::{ParseError, Side};

/// separator between source and destination.
/// It can't appear inside of a cidr or a port.
pub const ARROW: &str = "->";

/// A permission entry: traffic from `source` to `destination`.
///
/// Two rules are the same rule iff their text forms are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rule {
    pub source: Endpoint,
    pub destination: Endpoint,
}

impl Rule {
    pub fn new(source: Endpoint, destination: Endpoint) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// `src`, `dst` are the concrete endpoints of a request
    pub fn matches(&self, src: &Endpoint, dst: &Endpoint) -> bool {
        self.source.matches(src) && self.destination.matches(dst)
    }
}

impl FromStr for Rule {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (src, dst) = s
            .split_once(ARROW)
            .ok_or_else(|| ParseError::MissingArrow { text: s.to_owned() })?;
        let source = src
            .parse()
            .map_err(|err| ParseError::invalid_endpoint(s, Side::Source, err))?;
        let destination = dst
            .parse()
            .map_err(|err| ParseError::invalid_endpoint(s, Side::Destination, err))?;
        Ok(Rule::new(source, destination))
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}{}", self.source, ARROW, self.destination)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ep(s: &str) -> Endpoint {
        s.parse().unwrap()
    }

    #[test]
    fn rule_match() {
        let rule: Rule = "10.0.0.0/16:*->1.2.3.4/32:443".parse().unwrap();
        assert_eq!(rule.source, ep("10.0.0.0/16:*"));
        assert_eq!(rule.destination, ep("1.2.3.4/32:443"));
        assert!(rule.matches(&ep("10.0.3.72/32:48291"), &ep("1.2.3.4/32:443")));
        assert!(!rule.matches(&ep("10.0.3.72/32:48291"), &ep("1.2.3.4/32:80")));
        // direction matters
        assert!(!rule.matches(&ep("1.2.3.4/32:443"), &ep("10.0.3.72/32:48291")));
    }

    #[test]
    fn display() {
        let rule: Rule = "10.0.3.72/16:*->[2c08::f1]/64:443".parse().unwrap();
        assert_eq!(rule.to_string(), "10.0.0.0/16:*->[2c08::]/64:443");
        assert_eq!(rule.to_string().parse::<Rule>().unwrap(), rule);
    }

    #[test]
    fn missing_arrow() {
        assert!(matches!(
            "10.0.0.0/16:* 1.2.3.4/32:443".parse::<Rule>(),
            Err(ParseError::MissingArrow { .. })
        ));
    }

    #[test]
    fn reports_failing_side() {
        match "10.0.0.0/16:x->1.2.3.4/32:443".parse::<Rule>() {
            Err(ParseError::InvalidEndpoint { side, source, .. }) => {
                assert_eq!(side, Side::Source);
                assert!(matches!(*source, ParseError::InvalidPort { .. }));
            }
            other => panic!("unexpected: {:?}", other),
        }
        match "10.0.0.0/16:*->1.2.3.4:443".parse::<Rule>() {
            Err(ParseError::InvalidEndpoint { side, source, .. }) => {
                assert_eq!(side, Side::Destination);
                assert!(matches!(*source, ParseError::MissingPrefix { .. }));
            }
            other => panic!("unexpected: {:?}", other),
        }
        // only the first arrow separates
        match "10.0.0.0/16:*->1.2.3.4/32:443->5.6.7.8/32:80".parse::<Rule>() {
            Err(ParseError::InvalidEndpoint { side, .. }) => assert_eq!(side, Side::Destination),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
