//! A canned host for tests. Responses are matched by command prefix; every
//! issued command is recorded so tests can assert on ordering.

use std::collections::VecDeque;

use async_trait::async_trait;

use super::CommandExecutor;

/// Prefix match on a whole-token boundary, so a rule for workload `1`
/// doesn't swallow commands aimed at workload `12`.
fn matches(command: &str, prefix: &str) -> bool {
    match command.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(char::is_whitespace),
        None => false,
    }
}

#[derive(Debug)]
struct Rule {
    prefix: String,
    responses: VecDeque<String>,
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedHost {
    rules: Vec<Rule>,
    pub(crate) issued: Vec<String>,
}

impl ScriptedHost {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Respond to every command starting with `prefix` with `response`.
    pub(crate) fn respond(self, prefix: &str, response: &str) -> Self {
        self.respond_seq(prefix, &[response])
    }

    /// Respond to commands starting with `prefix` with the given responses
    /// in order. The last response is sticky, so polls past the end of the
    /// sequence keep observing the final state.
    pub(crate) fn respond_seq(mut self, prefix: &str, responses: &[&str]) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            responses: responses.iter().map(|r| r.to_string()).collect(),
        });
        self
    }

    pub(crate) fn issued_matching(&self, prefix: &str) -> Vec<&str> {
        self.issued
            .iter()
            .filter(|command| matches(command, prefix))
            .map(|command| command.as_str())
            .collect()
    }

    /// Index of the first issued command starting with `prefix`, if any.
    pub(crate) fn first_issued(&self, prefix: &str) -> Option<usize> {
        self.issued.iter().position(|command| matches(command, prefix))
    }
}

#[async_trait]
impl CommandExecutor for ScriptedHost {
    async fn execute(&mut self, command: &str) -> String {
        self.issued.push(command.to_string());
        for rule in self.rules.iter_mut() {
            if matches(command, &rule.prefix) {
                return if rule.responses.len() > 1 {
                    rule.responses.pop_front().unwrap_or_default()
                } else {
                    rule.responses.front().cloned().unwrap_or_default()
                };
            }
        }
        // Unscripted commands behave like an unreachable host.
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rules_do_not_match_across_token_boundaries() {
        let mut host = ScriptedHost::new()
            .respond("probe 1", "one")
            .respond("probe 12", "twelve");
        assert_eq!("twelve", host.execute("probe 12").await);
        assert_eq!("one", host.execute("probe 1").await);
        assert_eq!(1, host.issued_matching("probe 12").len());
    }

    #[tokio::test]
    async fn test_response_sequences_stick_on_the_last_entry() {
        let mut host = ScriptedHost::new().respond_seq("state", &["a", "b"]);
        assert_eq!("a", host.execute("state").await);
        assert_eq!("b", host.execute("state").await);
        assert_eq!("b", host.execute("state").await);
    }
}
