use std::collections::HashSet;
use std::fmt;
use std::slice;

use log::*;

use crate::model::endpoint::Endpoint;
use crate::model::error::{EmptyEntry, EntryError};
use crate::model::rule::Rule;

/// Deduplicated rules in insertion order.
///
/// Filled once while the configuration is read (`&mut self`),
/// then only queried. No rule shadows another: a request matches the set if
/// it matches any of its rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    /// text forms of `rules`
    seen: HashSet<String>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `rule` unless a rule with the same text form is already present.
    ///
    /// Returns `true` if the rule has been appended.
    pub fn add(&mut self, rule: Rule) -> bool {
        if self.seen.insert(rule.to_string()) {
            self.rules.push(rule);
            true
        } else {
            trace!("duplicated rule: {}", rule);
            false
        }
    }

    /// Parse comma separated rules and add them.
    ///
    /// * `label`
    ///   The name of the list (e.g. `allow`), used in error reports.
    /// * `value`
    ///   `cidr:port->cidr:port,...`. The empty string is an empty list.
    ///
    /// Malformed rules are collected and returned while well formed siblings
    /// are still added. An empty item (`a->b,,c->d`) aborts with [`EmptyEntry`].
    pub fn parse_all(&mut self, label: &str, value: &str) -> Result<Vec<EntryError>, EmptyEntry> {
        if value.is_empty() {
            return Ok(vec![]);
        }
        let mut errors = vec![];
        for item in value.split(',') {
            if item.is_empty() {
                return Err(EmptyEntry {
                    label: label.to_owned(),
                    value: value.to_owned(),
                });
            }
            match item.parse() {
                Ok(rule) => {
                    self.add(rule);
                }
                Err(source) => errors.push(EntryError {
                    label: label.to_owned(),
                    item: item.to_owned(),
                    source,
                }),
            }
        }
        Ok(errors)
    }

    pub fn matches_any(&self, src: &Endpoint, dst: &Endpoint) -> bool {
        self.rules.iter().any(|rule| rule.matches(src, dst))
    }

    pub fn contains(&self, rule: &Rule) -> bool {
        self.seen.contains(&rule.to_string())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Rule> {
        self.rules.iter()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = slice::Iter<'a, Rule>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Extend<Rule> for RuleSet {
    fn extend<T: IntoIterator<Item = Rule>>(&mut self, iter: T) {
        iter.into_iter().for_each(|rule| {
            self.add(rule);
        });
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<T: IntoIterator<Item = Rule>>(iter: T) -> Self {
        let mut set = RuleSet::new();
        set.extend(iter);
        set
    }
}

/// comma separated rules, or the empty string
impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, rule) in self.rules.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", rule)?;
        }
        Ok(())
    }
}
