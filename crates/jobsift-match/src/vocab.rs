//! Static title vocabulary: spelling variations, component taxonomy, synonyms.

use std::collections::HashSet;

/// Canonical term followed by its accepted spellings and abbreviations.
/// Table order matters: a variant listed under several terms canonicalizes
/// to the first one.
pub const VARIATIONS: &[(&str, &[&str])] = &[
    ("senior", &["sr", "senior", "lead"]),
    ("junior", &["jr", "junior", "entry"]),
    ("engineer", &["engineer", "developer", "programmer", "coder"]),
    ("architect", &["architect", "architecture"]),
    ("manager", &["manager", "mgr", "management", "head"]),
    ("developer", &["developer", "engineer", "programmer"]),
    ("lead", &["lead", "leader", "senior", "principal"]),
    ("principal", &["principal", "staff", "distinguished"]),
    ("frontend", &["frontend", "front-end", "ui", "client-side"]),
    ("backend", &["backend", "back-end", "server-side"]),
    ("fullstack", &["fullstack", "full-stack", "end-to-end"]),
    ("devops", &["devops", "dev-ops", "sre"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Level,
    Role,
    Specialty,
    Technology,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::Level,
        Component::Role,
        Component::Specialty,
        Component::Technology,
    ];

    pub fn weight(self) -> f64 {
        match self {
            Component::Level => 0.3,
            Component::Role => 0.4,
            Component::Specialty => 0.2,
            Component::Technology => 0.1,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Component::Level => 0,
            Component::Role => 1,
            Component::Specialty => 2,
            Component::Technology => 3,
        }
    }

    fn terms(self) -> &'static [&'static str] {
        match self {
            Component::Level => &[
                "junior", "senior", "lead", "principal", "director", "intern", "associate", "mid",
                "chief", "vp",
            ],
            Component::Role => &[
                "engineer",
                "developer",
                "architect",
                "manager",
                "analyst",
                "scientist",
                "designer",
                "administrator",
                "consultant",
                "specialist",
                "programmer",
            ],
            Component::Specialty => &[
                "frontend",
                "backend",
                "fullstack",
                "devops",
                "cloud",
                "data",
                "security",
                "mobile",
                "platform",
                "infrastructure",
                "qa",
                "ml",
            ],
            Component::Technology => &[
                "python",
                "java",
                "javascript",
                "typescript",
                "react",
                "node",
                "node.js",
                "rust",
                "go",
                "golang",
                "aws",
                "azure",
                "gcp",
                "kubernetes",
                "docker",
                "sql",
                "c++",
                "c#",
            ],
        }
    }
}

/// Broad single-word synonym dictionary for common title words.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("engineer", &["technologist", "developer", "programmer"]),
    ("developer", &["programmer", "coder", "engineer"]),
    ("programmer", &["coder", "developer", "engineer"]),
    ("manager", &["director", "supervisor", "administrator", "head", "boss"]),
    ("director", &["manager", "head", "chief"]),
    ("analyst", &["researcher", "examiner"]),
    ("senior", &["elder", "experienced", "veteran"]),
    ("junior", &["novice", "beginner", "associate"]),
    ("lead", &["head", "chief", "leader", "principal"]),
    ("head", &["chief", "lead", "director"]),
    ("chief", &["head", "principal", "director"]),
    ("principal", &["chief", "main", "lead"]),
    ("architect", &["designer", "planner"]),
    ("designer", &["architect", "creator", "stylist"]),
    ("specialist", &["expert", "consultant"]),
    ("consultant", &["adviser", "advisor", "specialist"]),
    ("administrator", &["admin", "executive", "manager"]),
    ("scientist", &["researcher"]),
    ("researcher", &["scientist", "investigator"]),
    ("assistant", &["helper", "aide", "associate"]),
    ("associate", &["colleague", "assistant", "junior"]),
    ("technician", &["technologist", "tech"]),
    ("support", &["help", "assistance", "helpdesk"]),
    ("coordinator", &["organizer", "organiser", "planner"]),
    ("marketing", &["selling", "merchandising"]),
    ("writer", &["author", "editor"]),
    ("intern", &["trainee", "apprentice", "student"]),
    ("executive", &["director", "officer", "administrator"]),
    ("officer", &["executive", "official"]),
];

fn lookup<'a>(table: &'a [(&str, &'a [&'a str])], word: &str) -> Option<&'a [&'a str]> {
    table
        .iter()
        .find(|(key, _)| *key == word)
        .map(|(_, values)| *values)
}

/// Canonical term for a token: itself if it is a canonical key, otherwise the
/// first canonical term listing it as a variant, otherwise the token.
pub fn canonicalize(token: &str) -> &str {
    if lookup(VARIATIONS, token).is_some() {
        return token;
    }
    VARIATIONS
        .iter()
        .find(|(_, variants)| variants.contains(&token))
        .map(|(key, _)| *key)
        .unwrap_or(token)
}

/// Variation group of a token; a token with no table entry is its own group.
pub fn variation_group(token: &str) -> HashSet<&str> {
    let mut group = HashSet::from([token]);
    if let Some(variants) = lookup(VARIATIONS, token) {
        group.extend(variants.iter().copied());
    }
    group
}

pub fn classify(token: &str) -> Option<Component> {
    let canonical = canonicalize(token);
    Component::ALL
        .into_iter()
        .find(|component| component.terms().contains(&canonical))
}

/// Token, dictionary synonyms and variation group, all lowercase.
pub fn synonyms_for(word: &str) -> HashSet<String> {
    let mut out = HashSet::from([word.to_string()]);
    if let Some(values) = lookup(SYNONYMS, word) {
        out.extend(values.iter().map(|v| v.to_string()));
    }
    if let Some(values) = lookup(VARIATIONS, word) {
        out.extend(values.iter().map(|v| v.to_string()));
    }
    out
}
