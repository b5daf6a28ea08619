//! Regex-based scrubbing of captured lines
//!
//! A deterministic first pass that removes high-confidence secrets and
//! machine-identifying details before anything leaves the host: provider API
//! keys, credential assignments, signed tokens, email addresses, home
//! directory prefixes, and private network addresses.
//!
//! Rules run strictly in table order and each rule's output feeds the next,
//! so specific vendor formats must come before the generic fallbacks that
//! would otherwise swallow them. A replacement can expose a new match to an
//! earlier rule (a placeholder creates a word boundary, or splices two
//! fragments together), so the whole table is reapplied until a pass leaves
//! the line unchanged.
//!
//! A second pass ([`EnvSecrets`]) replaces literal values of declared
//! environment variables with `<ENV:NAME>`.

use std::collections::{BTreeMap, HashMap};

use regex::{Captures, Regex};

use crate::error::{RecallError, Result};

/// Values shorter than this are never treated as literal secrets
pub const MIN_SECRET_LEN: usize = 4;

/// Upper bound on full passes over the rule table for one line
const MAX_SCRUB_PASSES: usize = 16;

/// A pattern/replacement pair
///
/// `replacement` uses `regex` expansion syntax: `${name}` refers to a named
/// group and `$$` is a literal dollar sign.
#[derive(Debug, Clone)]
pub struct ScrubRule {
    pub name: String,
    pub pattern: String,
    pub replacement: String,
}

impl ScrubRule {
    fn new(name: &str, pattern: &str, replacement: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
        }
    }
}

/// The default rule table, most specific first
pub fn default_scrub_rules() -> Vec<ScrubRule> {
    vec![
        // Provider-specific keys
        ScrubRule::new(
            "anthropic_api_key",
            r"sk-ant-[a-zA-Z0-9\-_]{20,}",
            "<ANTHROPIC_API_KEY>",
        ),
        ScrubRule::new(
            "openai_project_key",
            r"sk-proj-[a-zA-Z0-9\-_]{20,}",
            "<OPENAI_PROJECT_KEY>",
        ),
        ScrubRule::new("openai_api_key", r"\bsk-[a-zA-Z0-9]{32,}\b", "<OPENAI_API_KEY>"),
        ScrubRule::new("google_api_key", r"AIza[0-9A-Za-z\-_]{35}", "<GOOGLE_API_KEY>"),
        ScrubRule::new("github_pat", r"ghp_[a-zA-Z0-9]{36}", "<GITHUB_PAT>"),
        ScrubRule::new("github_oauth_token", r"gho_[a-zA-Z0-9]{36}", "<GITHUB_OAUTH_TOKEN>"),
        ScrubRule::new("github_app_token", r"ghs_[a-zA-Z0-9]{36}", "<GITHUB_APP_TOKEN>"),
        ScrubRule::new(
            "aws_access_key_id",
            r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b",
            "<AWS_ACCESS_KEY_ID>",
        ),
        ScrubRule::new(
            "aws_secret_access_key",
            r#"(?i)aws[_\-]?secret[_\-]?(?:access[_\-]?)?key["'\s:=]+[A-Za-z0-9/+=]{40}"#,
            "<AWS_SECRET_ACCESS_KEY>",
        ),
        ScrubRule::new(
            "stripe_key",
            r"\b(?:sk|pk|rk)_(?:live|test)_[a-zA-Z0-9]{24,}\b",
            "<STRIPE_KEY>",
        ),
        ScrubRule::new("slack_token", r"xox[baprs]-[0-9A-Za-z\-]{10,}", "<SLACK_TOKEN>"),
        ScrubRule::new("npm_token", r"npm_[a-zA-Z0-9]{36}", "<NPM_TOKEN>"),
        ScrubRule::new("huggingface_token", r"hf_[a-zA-Z0-9]{34,}", "<HUGGINGFACE_TOKEN>"),
        // Generic `keyword = value` assignments. The keyword and delimiters are
        // kept; values starting with `<` are placeholders and never match.
        ScrubRule::new(
            "credential_assignment",
            r#"(?i)(?P<key>(?:password|passwd|secret|token|api[_\-]?key|auth[_\-]?key|access[_\-]?key|private[_\-]?key|client[_\-]?secret)["'\s]*[:=]["'\s]*)[^\s"',}\]<>]{8,}"#,
            "${key}<REDACTED_CREDENTIAL>",
        ),
        // Structured token formats
        ScrubRule::new(
            "jwt",
            r"eyJ[a-zA-Z0-9\-_]+\.eyJ[a-zA-Z0-9\-_]+\.[a-zA-Z0-9\-_]+",
            "<JWT_TOKEN>",
        ),
        ScrubRule::new(
            "bearer_token",
            r"(?i)bearer\s+[a-zA-Z0-9\-_\.=]+",
            "Bearer <REDACTED_TOKEN>",
        ),
        ScrubRule::new(
            "url_basic_auth",
            r#"[a-zA-Z][a-zA-Z0-9+\-.]*://[^:@\s/"'<>]+:[^@\s/"'<>]+@"#,
            "<REDACTED_AUTH_URL>@",
        ),
        // Contact identifiers
        ScrubRule::new(
            "email",
            r"\b[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}\b",
            "<EMAIL>",
        ),
        // Home directories: only the user segment goes, the rest of the path stays
        ScrubRule::new("posix_home", r"/(?:Users|home)/[a-zA-Z0-9._\-]+", "$$HOME"),
        ScrubRule::new(
            "windows_home",
            r"(?i)\b[a-z]:\\{1,2}Users\\{1,2}[a-zA-Z0-9._\-]+",
            "%USERPROFILE%",
        ),
        // RFC 1918 addresses; a trailing `:port` is left in place
        ScrubRule::new(
            "private_ipv4",
            r"\b(?:10\.\d{1,3}\.\d{1,3}\.\d{1,3}|172\.(?:1[6-9]|2\d|3[01])\.\d{1,3}\.\d{1,3}|192\.168\.\d{1,3}\.\d{1,3})\b",
            "<PRIVATE_IP>",
        ),
    ]
}

struct CompiledRule {
    regex: Regex,
    replacement: String,
}

/// Ordered, immutable rule engine
///
/// Holds no mutable state; share it freely behind an `Arc`.
pub struct Scrubber {
    rules: Vec<CompiledRule>,
}

impl Scrubber {
    /// Compile the given rules, preserving their order
    pub fn new(rules: &[ScrubRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let regex = Regex::new(&rule.pattern).map_err(|e| RecallError::Pattern {
                    name: rule.name.clone(),
                    reason: e.to_string(),
                })?;
                Ok(CompiledRule {
                    regex,
                    replacement: rule.replacement.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Compile [`default_scrub_rules`]
    pub fn with_default_rules() -> Result<Self> {
        Self::new(&default_scrub_rules())
    }

    /// Number of compiled rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply the rule table until the line stops changing
    ///
    /// The result is a fixed point: scrubbing it again returns it unchanged.
    pub fn scrub(&self, line: &str) -> String {
        let mut out = self.scrub_pass(line);
        for _ in 1..MAX_SCRUB_PASSES {
            let next = self.scrub_pass(&out);
            if next == out {
                break;
            }
            out = next;
        }
        out
    }

    /// One pass over every rule, in table order
    fn scrub_pass(&self, line: &str) -> String {
        let mut out = line.to_string();
        for rule in &self.rules {
            if rule.regex.is_match(&out) {
                out = rule
                    .regex
                    .replace_all(&out, rule.replacement.as_str())
                    .into_owned();
            }
        }
        out
    }

    /// Pattern rules, then the literal-secret pass
    pub fn scrub_all(&self, line: &str, secrets: &EnvSecrets) -> String {
        let scrubbed = self.scrub(line);
        if secrets.is_empty() {
            return scrubbed;
        }
        secrets.scrub(&scrubbed)
    }
}

/// Literal secret values keyed by the environment variable that held them
///
/// Values shorter than [`MIN_SECRET_LEN`] are dropped on construction. When
/// two names share a value the alphabetically first name wins.
#[derive(Clone, Default)]
pub struct EnvSecrets {
    names_by_value: HashMap<String, String>,
    matcher: Option<Regex>,
}

impl EnvSecrets {
    /// Build from `(name, value)` pairs
    pub fn new<I, K, V>(secrets: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let by_name: BTreeMap<String, String> = secrets
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| v.len() >= MIN_SECRET_LEN)
            .collect();

        let mut names_by_value = HashMap::new();
        for (name, value) in by_name {
            names_by_value.entry(value).or_insert(name);
        }

        if names_by_value.is_empty() {
            return Ok(Self::default());
        }

        // Longest first so a value that contains another wins the alternation
        let mut values: Vec<&String> = names_by_value.keys().collect();
        values.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let pattern = values
            .iter()
            .map(|v| regex::escape(v))
            .collect::<Vec<_>>()
            .join("|");

        let matcher = Regex::new(&pattern).map_err(|e| RecallError::Pattern {
            name: "env_secrets".to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            names_by_value,
            matcher: Some(matcher),
        })
    }

    /// Number of distinct secret values tracked
    pub fn len(&self) -> usize {
        self.names_by_value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names_by_value.is_empty()
    }

    /// Declared names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names_by_value.values().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Replace every literal occurrence of a tracked value with `<ENV:NAME>`
    pub fn scrub(&self, line: &str) -> String {
        let Some(matcher) = &self.matcher else {
            return line.to_string();
        };
        matcher
            .replace_all(line, |caps: &Captures| {
                let name = self
                    .names_by_value
                    .get(&caps[0])
                    .map(String::as_str)
                    .unwrap_or("SECRET");
                format!("<ENV:{}>", name)
            })
            .into_owned()
    }
}

// Never print the values themselves
impl std::fmt::Debug for EnvSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvSecrets")
            .field("names", &self.names())
            .finish()
    }
}
