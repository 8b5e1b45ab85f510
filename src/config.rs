use std::fmt;
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::*;
use serde::Deserialize;

use crate::error::{ConfigError, ConfigErrors};
use crate::model::RuleSet;
use crate::policy::AccessPolicy;
use crate::server_command::Termination;

pub const DEFAULT_INTERRUPT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_GRACEFUL_TIMEOUT: Duration = Duration::from_secs(5);

/// Unvalidated settings, as read from the command line or a YAML file.
///
/// ```yaml
/// listen: 127.0.0.1:1080
/// allow:
///   - 10.0.0.0/8:*->0.0.0.0/0:443
/// deny:
///   - 10.0.0.0/8:*->10.0.0.0/8:*
/// graceful_timeout_ms: 10000
/// ```
///
/// Every `allow`/`deny` element may itself hold a comma separated list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub listen: Option<String>,
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub interrupt_timeout_ms: Option<u64>,
    pub graceful_timeout_ms: Option<u64>,
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::File {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Yaml {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Overlay `other` on `self`: scalars set in `other` win, rule lists are
    /// concatenated.
    pub fn merge(mut self, other: Settings) -> Settings {
        self.listen = other.listen.or(self.listen);
        self.allow.extend(other.allow);
        self.deny.extend(other.deny);
        self.interrupt_timeout_ms = other.interrupt_timeout_ms.or(self.interrupt_timeout_ms);
        self.graceful_timeout_ms = other.graceful_timeout_ms.or(self.graceful_timeout_ms);
        self
    }

    /// Validate everything and report every problem at once.
    ///
    /// Problems are listed in this order: broken `allow` entries, broken
    /// `deny` entries, the listen address, an empty allow list. A list with
    /// an empty entry is reported on its own.
    pub fn build(&self) -> Result<ServerConfig, ConfigErrors> {
        let mut errors: Vec<ConfigError> = vec![];
        let allow = parse_rules("allow", &self.allow, &mut errors)?;
        let deny = parse_rules("deny", &self.deny, &mut errors)?;

        let listen = match self.listen.as_deref() {
            None | Some("") => {
                errors.push(ConfigError::MissingListen);
                None
            }
            Some(addr) => match resolve_listen(addr) {
                Ok(listen) => Some(listen),
                Err(err) => {
                    errors.push(err);
                    None
                }
            },
        };

        let policy = AccessPolicy::new(allow, deny);
        if let Err(err) = policy.validate() {
            errors.push(err);
        }

        match listen {
            Some(listen) if errors.is_empty() => {
                let mut config = ServerConfig::new(listen, policy);
                if let Some(ms) = self.interrupt_timeout_ms {
                    config.interrupt_timeout = Duration::from_millis(ms);
                }
                if let Some(ms) = self.graceful_timeout_ms {
                    config.graceful_timeout = Duration::from_millis(ms);
                }
                Ok(config)
            }
            _ => Err(errors.into()),
        }
    }
}

fn parse_rules(
    label: &str,
    values: &[String],
    errors: &mut Vec<ConfigError>,
) -> Result<RuleSet, ConfigErrors> {
    let mut rules = RuleSet::new();
    for value in values {
        let entry_errors = rules
            .parse_all(label, value)
            .map_err(|err| ConfigErrors::from(ConfigError::from(err)))?;
        errors.extend(entry_errors.into_iter().map(ConfigError::from));
    }
    Ok(rules)
}

fn resolve_listen(addr: &str) -> Result<SocketAddr, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidListen {
        addr: addr.to_owned(),
        reason,
    };
    addr.to_socket_addrs()
        .map_err(|err| invalid(err.to_string()))?
        .next()
        .ok_or_else(|| invalid("no address".to_owned()))
}

/// Validated, immutable server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub policy: Arc<AccessPolicy>,
    /// read/write timeout on client connections
    pub client_rw_timeout: Option<Duration>,
    /// read/write timeout on connections to destinations
    pub server_rw_timeout: Option<Duration>,
    /// how often the acceptor looks for a stop request
    pub accept_timeout: Option<Duration>,
    /// grace period on SIGINT
    pub interrupt_timeout: Duration,
    /// grace period on SIGTERM
    pub graceful_timeout: Duration,
}

impl ServerConfig {
    pub fn new(listen: SocketAddr, policy: AccessPolicy) -> Self {
        Self {
            listen,
            policy: Arc::new(policy),
            client_rw_timeout: Some(Duration::from_millis(2000)),
            server_rw_timeout: Some(Duration::from_millis(5000)),
            accept_timeout: Some(Duration::from_millis(200)),
            interrupt_timeout: DEFAULT_INTERRUPT_TIMEOUT,
            graceful_timeout: DEFAULT_GRACEFUL_TIMEOUT,
        }
    }

    pub fn interrupt(&self) -> Termination {
        Termination::interrupt(self.interrupt_timeout)
    }

    pub fn graceful(&self) -> Termination {
        Termination::graceful(self.graceful_timeout)
    }

    pub fn set_client_rw_timeout(&mut self, dur: Option<Duration>) -> &mut Self {
        self.client_rw_timeout = dur;
        self
    }

    pub fn set_server_rw_timeout(&mut self, dur: Option<Duration>) -> &mut Self {
        self.server_rw_timeout = dur;
        self
    }

    pub fn set_accept_timeout(&mut self, dur: Option<Duration>) -> &mut Self {
        trace!("accept timeout: {:?}", dur);
        self.accept_timeout = dur;
        self
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "listen={} {}", self.listen, self.policy)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::ParseError;

    fn settings(listen: Option<&str>, allow: &[&str], deny: &[&str]) -> Settings {
        Settings {
            listen: listen.map(str::to_owned),
            allow: allow.iter().map(|s| s.to_string()).collect(),
            deny: deny.iter().map(|s| s.to_string()).collect(),
            ..Settings::default()
        }
    }

    #[test]
    fn build_config() {
        let config = settings(
            Some("127.0.0.1:1080"),
            &["10.0.0.0/8:*->0.0.0.0/0:443,10.0.0.0/8:*->0.0.0.0/0:80"],
            &["10.0.0.0/8:*->10.0.0.0/8:*"],
        )
        .build()
        .unwrap();
        assert_eq!(config.listen, "127.0.0.1:1080".parse().unwrap());
        assert_eq!(config.policy.allow().len(), 2);
        assert_eq!(config.policy.deny().len(), 1);
        assert_eq!(config.interrupt_timeout, DEFAULT_INTERRUPT_TIMEOUT);
        assert_eq!(config.graceful_timeout, DEFAULT_GRACEFUL_TIMEOUT);
        assert_eq!(
            config.to_string(),
            "listen=127.0.0.1:1080 \
             allow=10.0.0.0/8:*->0.0.0.0/0:443,10.0.0.0/8:*->0.0.0.0/0:80 \
             deny=10.0.0.0/8:*->10.0.0.0/8:*"
        );
    }

    #[test]
    fn report_every_problem() {
        let errors = settings(None, &["bogus", "10.0.0.0/8:*->1.2.3.4"], &["x->y"])
            .build()
            .unwrap_err()
            .into_inner();
        assert_eq!(errors.len(), 5);
        assert!(matches!(&errors[0], ConfigError::Entry(e) if e.label == "allow" && e.item == "bogus"));
        assert!(matches!(
            &errors[1],
            ConfigError::Entry(e) if matches!(e.source, ParseError::InvalidEndpoint { .. })
        ));
        assert!(matches!(&errors[2], ConfigError::Entry(e) if e.label == "deny"));
        assert!(matches!(errors[3], ConfigError::MissingListen));
        assert!(matches!(errors[4], ConfigError::NothingAllowed));
    }

    #[test]
    fn empty_entry_is_reported_alone() {
        let errors = settings(None, &["10.0.0.0/8:*->0.0.0.0/0:*,,bogus"], &[])
            .build()
            .unwrap_err()
            .into_inner();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ConfigError::EmptyEntry(_)));
    }

    #[test]
    fn invalid_listen() {
        let errors = settings(Some("not an address"), &["10.0.0.0/8:*->0.0.0.0/0:*"], &[])
            .build()
            .unwrap_err()
            .into_inner();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ConfigError::InvalidListen { .. }));
    }

    #[test]
    fn nothing_allowed() {
        let errors = settings(Some("127.0.0.1:1080"), &[], &["10.0.0.0/8:*->0.0.0.0/0:*"])
            .build()
            .unwrap_err();
        assert_eq!(errors.to_string(), "config parse: nothing is allowed by default");
    }

    #[test]
    fn yaml_settings() {
        let yaml = r#"
listen: "127.0.0.1:1080"
allow:
  - "10.0.0.0/8:*->0.0.0.0/0:443"
  - "[2c08::]/64:*->0.0.0.0/0:*"
graceful_timeout_ms: 10000
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.listen.as_deref(), Some("127.0.0.1:1080"));
        assert_eq!(settings.allow.len(), 2);
        assert!(settings.deny.is_empty());
        let config = settings.build().unwrap();
        assert_eq!(config.graceful_timeout, Duration::from_secs(10));
        assert_eq!(config.graceful().exit_code, 0);
        assert_eq!(config.interrupt().timeout, DEFAULT_INTERRUPT_TIMEOUT);
    }

    #[test]
    fn yaml_unknown_field() {
        assert!(Settings::from_yaml("listne: 127.0.0.1:1080").is_err());
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            Settings::from_file("/nonexistent/sockguard.yaml"),
            Err(ConfigError::File { .. })
        ));
    }

    #[test]
    fn command_line_overrides_file() {
        let file = Settings {
            listen: Some("0.0.0.0:1080".to_owned()),
            allow: vec!["10.0.0.0/8:*->0.0.0.0/0:*".to_owned()],
            interrupt_timeout_ms: Some(300),
            graceful_timeout_ms: Some(9000),
            ..Settings::default()
        };
        let cli = Settings {
            listen: Some("127.0.0.1:1081".to_owned()),
            allow: vec!["10.0.0.0/8:*->0.0.0.0/0:*,192.168.0.0/16:*->0.0.0.0/0:*".to_owned()],
            graceful_timeout_ms: Some(100),
            ..Settings::default()
        };
        let config = file.merge(cli).build().unwrap();
        assert_eq!(config.listen, "127.0.0.1:1081".parse().unwrap());
        // merged and deduplicated
        assert_eq!(config.policy.allow().len(), 2);
        assert_eq!(config.interrupt_timeout, Duration::from_millis(300));
        assert_eq!(config.graceful_timeout, Duration::from_millis(100));
    }
}
