use regex::Regex;
use std::sync::Arc;
use url::Url;

use crate::network::{FetchError, FetchResult, HttpClient};

/// Parsed robots.txt rules, grouped by user-agent line.
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    groups: Vec<Group>,
}

#[derive(Debug, Clone)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

#[derive(Debug, Clone)]
struct Rule {
    allow: bool,
    prefix: String,
    pattern: Option<Regex>,
}

impl Rule {
    fn new(allow: bool, value: &str) -> Self {
        Self {
            allow,
            prefix: value.to_string(),
            pattern: compile_pattern(value),
        }
    }

    fn matches(&self, path: &str) -> bool {
        match &self.pattern {
            Some(re) => re.is_match(path),
            None => path.starts_with(&self.prefix),
        }
    }
}

/// Turn a robots.txt path value into an anchored regex when it uses `*` or `$`.
fn compile_pattern(value: &str) -> Option<Regex> {
    if !value.contains('*') && !value.ends_with('$') {
        return None;
    }
    let mut pattern = regex::escape(value);
    pattern = pattern.replace("\\*", ".*");
    pattern = pattern.replace("\\$", "$");
    Regex::new(&format!("^{}", pattern)).ok()
}

impl RobotsTxt {
    pub fn parse(content: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut agents: Vec<String> = Vec::new();
        let mut rules: Vec<Rule> = Vec::new();
        let mut in_rules = false;

        let mut flush = |agents: &mut Vec<String>, rules: &mut Vec<Rule>| {
            if !agents.is_empty() {
                groups.push(Group {
                    agents: std::mem::take(agents),
                    rules: std::mem::take(rules),
                });
            } else {
                rules.clear();
            }
        };

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if in_rules {
                        flush(&mut agents, &mut rules);
                        in_rules = false;
                    }
                    agents.push(value.to_ascii_lowercase());
                }
                "disallow" => {
                    in_rules = true;
                    // An empty Disallow means "everything allowed"
                    if !value.is_empty() {
                        rules.push(Rule::new(false, value));
                    }
                }
                "allow" => {
                    in_rules = true;
                    if !value.is_empty() {
                        rules.push(Rule::new(true, value));
                    }
                }
                _ => {}
            }
        }
        flush(&mut agents, &mut rules);

        Self { groups }
    }

    /// First-match-wins over the rules of the best matching agent group;
    /// no group or no matching rule means allowed.
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        match Url::parse(url) {
            // Rules can anchor on the query string; match path plus query
            Ok(parsed) => {
                let target = match parsed.query() {
                    Some(query) => format!("{}?{}", parsed.path(), query),
                    None => parsed.path().to_string(),
                };
                self.is_path_allowed(&target, user_agent)
            }
            Err(_) => true,
        }
    }

    pub fn is_path_allowed(&self, path: &str, user_agent: &str) -> bool {
        let agent = user_agent.to_ascii_lowercase();
        let group = self
            .groups
            .iter()
            .find(|g| g.agents.iter().any(|a| a != "*" && agent.starts_with(a.as_str())))
            .or_else(|| self.groups.iter().find(|g| g.agents.iter().any(|a| a == "*")));

        let Some(group) = group else { return true };
        for rule in &group.rules {
            if rule.matches(path) {
                return rule.allow;
            }
        }
        true
    }
}

/// Answers "may this URL be fetched?" from the site's robots.txt.
///
/// Fail-open: an unreachable or unparseable robots.txt never reports a URL
/// as blocked. Flagged as a product decision; a transient robots.txt outage
/// would otherwise show up as a spurious "blocked" signal change.
pub struct RobotsChecker {
    http: Arc<HttpClient>,
    user_agent: String,
}

impl RobotsChecker {
    pub fn new(http: Arc<HttpClient>, user_agent: String) -> Self {
        Self { http, user_agent }
    }

    pub async fn is_allowed(&self, url: &str) -> bool {
        let Some(robots_url) = robots_txt_url(url) else {
            return true;
        };
        let outcome = self.http.fetch(&robots_url).await;
        verdict(outcome, url, &self.user_agent)
    }
}

/// Derive `{scheme}://{host[:port]}/robots.txt` from any URL on the site.
pub fn robots_txt_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let port = parsed
        .port()
        .map(|p| format!(":{}", p))
        .unwrap_or_default();
    Some(format!("{}://{}{}/robots.txt", parsed.scheme(), host, port))
}

/// Pure verdict over a completed (or failed) robots.txt fetch.
pub fn verdict(outcome: Result<FetchResult, FetchError>, url: &str, user_agent: &str) -> bool {
    match outcome {
        Ok(result) if result.is_success() => {
            RobotsTxt::parse(&result.content).is_allowed(url, user_agent)
        }
        // Missing file, server error, timeout: all fail open
        _ => true,
    }
}
