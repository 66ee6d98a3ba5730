//! Topic matchers and payloads for the notification channel.

use crate::auth::Session;
use crate::error::{Failure, Propagation};
use regex::Regex;

/// Split an emitted or registered topic string into its alternatives.
///
/// `"a|b,c"` yields `a`, `b`, `c`; empty alternatives are dropped.
pub fn split_alternatives(topic: &str) -> impl Iterator<Item = &str> {
    topic.split(['|', ',']).filter(|alt| !alt.is_empty())
}

/// A single matcher a subscription listens on.
#[derive(Clone, Debug)]
pub enum Topic {
    /// Matches an emitted alternative by equality.
    Name(String),
    /// Matches any emitted alternative the pattern finds a match in.
    Pattern(Regex),
}

impl Topic {
    pub fn matches(&self, alternatives: &[&str]) -> bool {
        match self {
            Topic::Name(name) => alternatives.iter().any(|alt| alt == name),
            Topic::Pattern(pattern) => alternatives.iter().any(|alt| pattern.is_match(alt)),
        }
    }
}

/// A flattened list of matchers.
///
/// Built from a topic string (split on `|` and `,`), a `Regex`, or any
/// nesting of `Vec`s of those.
#[derive(Clone, Debug, Default)]
pub struct Topics(Vec<Topic>);

impl Topics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append more matchers, flattening them into this list.
    pub fn with(mut self, more: impl Into<Topics>) -> Self {
        self.0.extend(more.into().0);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Topic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, alternatives: &[&str]) -> bool {
        self.0.iter().any(|topic| topic.matches(alternatives))
    }
}

impl From<&str> for Topics {
    fn from(topic: &str) -> Self {
        Topics(
            split_alternatives(topic)
                .map(|alt| Topic::Name(alt.to_string()))
                .collect(),
        )
    }
}

impl From<String> for Topics {
    fn from(topic: String) -> Self {
        Topics::from(topic.as_str())
    }
}

impl From<&String> for Topics {
    fn from(topic: &String) -> Self {
        Topics::from(topic.as_str())
    }
}

impl From<Regex> for Topics {
    fn from(pattern: Regex) -> Self {
        Topics(vec![Topic::Pattern(pattern)])
    }
}

impl From<Topic> for Topics {
    fn from(topic: Topic) -> Self {
        Topics(vec![topic])
    }
}

impl<T: Into<Topics>> From<Vec<T>> for Topics {
    fn from(nested: Vec<T>) -> Self {
        nested
            .into_iter()
            .fold(Topics::new(), |topics, item| topics.with(item))
    }
}

/// Anything that can travel over a channel.
pub trait Payload: Clone + Send + Sync + 'static {
    /// The propagation mark when this payload is an error, `None` otherwise.
    fn propagation(&self) -> Option<&Propagation> {
        None
    }
}

impl Payload for () {}
impl Payload for String {}
impl Payload for serde_json::Value {}

impl Payload for Failure {
    fn propagation(&self) -> Option<&Propagation> {
        Some(Failure::propagation(self))
    }
}

/// Events carried by the application channel.
#[derive(Clone, Debug)]
pub enum Event {
    /// The signed-in user changed (`None` when signed out).
    Session(Option<Session>),
    /// An error announced once on its way up to the caller.
    Error(Failure),
    /// Free-form application message.
    Json(serde_json::Value),
}

impl Payload for Event {
    fn propagation(&self) -> Option<&Propagation> {
        match self {
            Event::Error(failure) => Some(failure.propagation()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_alternatives() {
        let alts: Vec<&str> = split_alternatives("a|b,,c|").collect();
        assert_eq!(alts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_nested_topics_flatten() {
        let topics = Topics::from(vec![
            Topics::from("a|b"),
            Topics::from(Regex::new("^user:").unwrap()),
            Topics::from(vec!["c", "d,e"]),
        ]);
        assert_eq!(topics.len(), 6);
        assert!(topics.matches(&["e"]));
        assert!(topics.matches(&["user:42"]));
        assert!(!topics.matches(&["f"]));
    }

    #[test]
    fn test_pattern_tests_every_alternative() {
        let topic = Topic::Pattern(Regex::new("^err").unwrap());
        assert!(topic.matches(&["ok", "error"]));
        assert!(!topic.matches(&["ok", "fine"]));
    }
}
