use std::fmt;

use log::*;

use crate::error::ConfigError;
use crate::model::{Endpoint, RuleSet};

/// Allow/deny decision over two rule sets.
///
/// A request is permitted iff some `allow` rule matches it and no `deny`
/// rule does; deny always wins.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    allow: RuleSet,
    deny: RuleSet,
}

impl AccessPolicy {
    pub fn new(allow: RuleSet, deny: RuleSet) -> Self {
        Self { allow, deny }
    }

    pub fn allow(&self) -> &RuleSet {
        &self.allow
    }

    pub fn deny(&self) -> &RuleSet {
        &self.deny
    }

    /// An empty allow list would reject every request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allow.is_empty() {
            Err(ConfigError::NothingAllowed)
        } else {
            Ok(())
        }
    }

    pub fn decide(&self, src: &Endpoint, dst: &Endpoint) -> bool {
        let allowed = self.allow.matches_any(src, dst);
        let denied = self.deny.matches_any(src, dst);
        let ok = allowed && !denied;
        info!("access-check src={} dst={} ok={}", src, dst, ok);
        ok
    }
}

impl fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "allow={} deny={}", self.allow, self.deny)
    }
}
