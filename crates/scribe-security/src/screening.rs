//! Static artifact screening.
//!
//! One rule set, two call sites: the submission validator screens candidate
//! bundles before install, and the remote loader screens every fetched
//! bundle before it is handed to the local loader. An artifact is flagged
//! when its bytes reference a denylisted symbol or match one of the screen
//! patterns.

use regex_lite::Regex;

/// Literal symbol references that flag an artifact.
pub const DENYLIST_SYMBOLS: &[&str] = &[
    "std::process::Command",
    "libc::exec",
    "libloading",
    "dlopen",
    "std::mem::transmute",
];

/// Pattern screen applied to every artifact: (finding label, pattern).
pub const SCREEN_PATTERNS: &[(&str, &str)] = &[
    ("process spawn", r"Command\s*::\s*new"),
    ("process exit", r"process::exit\s*\("),
    ("dynamic symbol resolution", r"dl(?:open|sym)\s*\("),
    ("module loader hook", r"Library\s*::\s*new"),
    ("embedded scripting", r"(?:rhai|mlua|quickjs)::|\beval\s*\("),
];

/// Screens one artifact's bytes; returns one finding per matched rule.
///
/// Binary content is scanned through a lossy UTF-8 view, so symbol
/// references survive in compiled artifacts as well as source text.
pub fn screen_artifact(bytes: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(bytes);
    let mut findings = Vec::new();

    for symbol in DENYLIST_SYMBOLS {
        if text.contains(symbol) {
            findings.push(format!("references denylisted symbol '{symbol}'"));
        }
    }
    for (label, pattern) in SCREEN_PATTERNS {
        let re = Regex::new(pattern).unwrap();
        if re.is_match(&text) {
            findings.push(format!("matches screen: {label}"));
        }
    }
    findings
}
