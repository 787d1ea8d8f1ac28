/*!
# Rule model

A `Rule` names a target function (import path, function name, optional
receiver pattern) and the hooks that run around it. Rules arrive grouped into
`RuleSet`s, one per matched import path, keyed by source file and then by
`"<func>,<receiverPattern>"`.
*/

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{Result, WeaveError};

/// One function rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Rule {
    #[serde(default)]
    pub import_path: String,
    pub function: String,
    /// Receiver type pattern, empty for plain functions
    #[serde(default)]
    pub receiver_type: String,
    #[serde(default)]
    pub on_enter: String,
    #[serde(default)]
    pub on_exit: String,
    /// Hooks hold Go statements to inject instead of hook names
    #[serde(default)]
    pub use_raw: bool,
    #[serde(default)]
    pub order: i32,
    /// Directory holding the hook sources
    #[serde(default)]
    pub path: PathBuf,
}

impl Rule {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            import_path: String::new(),
            function: function.into(),
            receiver_type: String::new(),
            on_enter: String::new(),
            on_exit: String::new(),
            use_raw: false,
            order: 0,
            path: PathBuf::new(),
        }
    }

    pub fn with_import_path(mut self, import_path: impl Into<String>) -> Self {
        self.import_path = import_path.into();
        self
    }

    pub fn with_receiver(mut self, pattern: impl Into<String>) -> Self {
        self.receiver_type = pattern.into();
        self
    }

    pub fn with_on_enter(mut self, hook: impl Into<String>) -> Self {
        self.on_enter = hook.into();
        self
    }

    pub fn with_on_exit(mut self, hook: impl Into<String>) -> Self {
        self.on_exit = hook.into();
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = path.into();
        self
    }

    pub fn raw(mut self, use_raw: bool) -> Self {
        self.use_raw = use_raw;
        self
    }

    pub fn has_on_enter(&self) -> bool {
        !self.on_enter.is_empty()
    }

    pub fn has_on_exit(&self) -> bool {
        !self.on_exit.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.function.is_empty() {
            return Err(WeaveError::RuleSet(format!("rule {self} has no function name")));
        }
        if !self.has_on_enter() && !self.has_on_exit() {
            return Err(WeaveError::RuleSet(format!(
                "rule {self} has neither onEnter nor onExit hook"
            )));
        }
        Ok(())
    }

    /// Stable name suffix for this rule applied to `target` (`name,receiver`)
    pub fn suffix(&self, target: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(target.as_bytes());
        let digest = hasher.finalize();
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]).to_string()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.import_path, self.function)?;
        if !self.receiver_type.is_empty() {
            write!(f, "({})", self.receiver_type)?;
        }
        write!(f, " {}/{}", self.on_enter, self.on_exit)?;
        if self.use_raw {
            write!(f, " raw")?;
        }
        write!(f, " order={} path={}", self.order, self.path.display())
    }
}

/// Function key of a rule set entry, `"<func>,<receiverPattern>"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncKey {
    pub name: String,
    pub receiver: String,
}

impl FuncKey {
    pub fn parse(key: &str) -> Result<Self> {
        let (name, receiver) = key.split_once(',').unwrap_or((key, ""));
        if name.is_empty() {
            return Err(WeaveError::RuleSet(format!("malformed function key `{key}`")));
        }
        Ok(Self {
            name: name.to_string(),
            receiver: receiver.to_string(),
        })
    }
}

impl fmt::Display for FuncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.name, self.receiver)
    }
}

/// Rules matched against one package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuleSet {
    pub import_path: String,
    #[serde(default)]
    pub package_name: String,
    #[serde(rename = "File2FuncRules", default)]
    pub file_func_rules: IndexMap<PathBuf, IndexMap<String, Vec<Rule>>>,
}

impl RuleSet {
    pub fn new(import_path: impl Into<String>, package_name: impl Into<String>) -> Self {
        Self {
            import_path: import_path.into(),
            package_name: package_name.into(),
            file_func_rules: IndexMap::new(),
        }
    }

    /// Register a rule for a function in a file
    pub fn add_rule(&mut self, file: impl Into<PathBuf>, key: &FuncKey, rule: Rule) {
        self.file_func_rules
            .entry(file.into())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .push(rule);
    }

    pub fn is_empty(&self) -> bool {
        self.file_func_rules.values().all(|fns| fns.values().all(Vec::is_empty))
    }

    pub fn rule_count(&self) -> usize {
        self.file_func_rules
            .values()
            .flat_map(|fns| fns.values())
            .map(Vec::len)
            .sum()
    }

    pub fn validate(&self) -> Result<()> {
        if self.import_path.is_empty() {
            return Err(WeaveError::RuleSet("rule set without import path".into()));
        }
        for (file, fns) in &self.file_func_rules {
            if !file.is_absolute() {
                return Err(WeaveError::RuleSet(format!(
                    "file path must be absolute: {}",
                    file.display()
                )));
            }
            for (key, rules) in fns {
                FuncKey::parse(key)?;
                for rule in rules {
                    rule.validate()?;
                }
            }
        }
        Ok(())
    }
}

/// Parse and validate a serialized collection of rule sets
pub fn parse_rule_sets(text: &str) -> Result<Vec<RuleSet>> {
    let sets: Vec<RuleSet> = serde_json::from_str(text)
        .map_err(|e| WeaveError::RuleSet(format!("failed to unmarshal JSON: {e}")))?;
    for set in &sets {
        set.validate()?;
    }
    Ok(sets)
}

pub fn load_rule_sets(path: &Path) -> Result<Vec<RuleSet>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        WeaveError::RuleSet(format!("failed to read file {}: {e}", path.display()))
    })?;
    let sets = parse_rule_sets(&text)?;
    debug!(path = %path.display(), sets = sets.len(), "loaded rule sets");
    Ok(sets)
}

/// One package is matched by at most one rule set, so the first hit wins
pub fn match_rule_set<'a>(sets: &'a [RuleSet], import_path: &str) -> Option<&'a RuleSet> {
    sets.iter().find(|set| set.import_path == import_path)
}

/// Ascending `order`, discovery order kept on ties
pub fn sort_rules(rules: &mut [Rule]) {
    rules.sort_by_key(|rule| rule.order);
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
      {
        "ImportPath": "example.com/svc",
        "PackageName": "svc",
        "File2FuncRules": {
          "/src/svc/svc.go": {
            "Do,\\*Svc": [
              {"ImportPath": "example.com/svc", "Function": "Do", "ReceiverType": "\\*Svc",
               "OnEnter": "doOnEnter", "OnExit": "doOnExit", "Order": 1, "Path": "/rules/svc"}
            ]
          }
        }
      }
    ]"#;

    #[test]
    fn test_parse_rule_sets() {
        let sets = parse_rule_sets(SAMPLE).unwrap();
        assert_eq!(sets.len(), 1);
        let set = &sets[0];
        assert_eq!(set.package_name, "svc");
        assert_eq!(set.rule_count(), 1);
        let rules = &set.file_func_rules[&PathBuf::from("/src/svc/svc.go")]["Do,\\*Svc"];
        assert_eq!(rules[0].receiver_type, "\\*Svc");
        assert_eq!(rules[0].on_enter, "doOnEnter");
        assert_eq!(rules[0].order, 1);
        assert!(!rules[0].use_raw);
    }

    #[test]
    fn test_rule_without_hooks_rejected() {
        let text = r#"[{"ImportPath": "p", "File2FuncRules": {"/a.go": {"F,": [{"Function": "F"}]}}}]"#;
        let err = parse_rule_sets(text).unwrap_err();
        assert!(matches!(err, WeaveError::RuleSet(_)));
        assert!(err.to_string().contains("neither onEnter nor onExit"));
    }

    #[test]
    fn test_relative_file_rejected() {
        let text = r#"[{"ImportPath": "p", "File2FuncRules": {"a.go": {"F,": [{"Function": "F", "OnExit": "x"}]}}}]"#;
        assert!(parse_rule_sets(text).is_err());
    }

    #[test]
    fn test_sort_rules_is_stable() {
        let mut rules = vec![
            Rule::new("F").with_on_enter("b").with_order(1),
            Rule::new("F").with_on_enter("a1").with_order(0),
            Rule::new("F").with_on_enter("c").with_order(1),
            Rule::new("F").with_on_enter("a2").with_order(0),
        ];
        sort_rules(&mut rules);
        let names: Vec<&str> = rules.iter().map(|r| r.on_enter.as_str()).collect();
        assert_eq!(names, vec!["a1", "a2", "b", "c"]);
    }

    #[test]
    fn test_suffix_is_pure_and_distinct() {
        let a = Rule::new("Do").with_on_enter("x");
        let b = Rule::new("Do").with_on_enter("y");
        assert_eq!(a.suffix("Do,*Svc"), a.clone().suffix("Do,*Svc"));
        assert_ne!(a.suffix("Do,*Svc"), b.suffix("Do,*Svc"));
        assert_ne!(a.suffix("Do,*Svc"), a.suffix("Do,*Other"));
        assert!(a.suffix("Do,").chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_func_key() {
        let key = FuncKey::parse("Do,*Svc").unwrap();
        assert_eq!(key.name, "Do");
        assert_eq!(key.receiver, "*Svc");
        let plain = FuncKey::parse("Run,").unwrap();
        assert_eq!(plain.receiver, "");
        assert_eq!(plain.to_string(), "Run,");
        assert!(FuncKey::parse(",*Svc").is_err());
    }

    #[test]
    fn test_match_rule_set() {
        let sets = vec![RuleSet::new("a", "a"), RuleSet::new("b", "b")];
        assert_eq!(match_rule_set(&sets, "b").map(|s| s.package_name.as_str()), Some("b"));
        assert!(match_rule_set(&sets, "c").is_none());
    }
}
