//! Name, location and label normalization.
//!
//! Each entity kind has two ordered pipelines of named steps: one that
//! produces the display form shown in reports, one that produces the key
//! used to decide whether two entries are the same.

use std::sync::LazyLock;

use regex::Regex;

/// Characters removed from the end of an entry.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '/'];

/// Honorific spellings folded to one form in person keys.
/// Matched against the lowercased start of the name.
const TITLE_PREFIXES: &[(&str, &str)] = &[
    ("brother ", "br "),
    ("br.", "br "),
    ("sister ", "sr "),
    ("sr.", "sr "),
    ("mrs.", "mrs "),
    ("mrs ", "mrs "),
    ("mr.", "mr "),
    ("mr ", "mr "),
    ("pastor ", "pastor "),
];

/// Team strings list several people: "Br Tadiwa, Sr Grace and Mr Moyo".
static RE_TEAM_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*,\s*|\s*\n\s*|\s+and\s+").unwrap());

// ── Steps ────────────────────────────────────────────────────────────

/// One named transformation in a normalization pipeline.
#[derive(Clone, Copy)]
pub struct Step {
    pub name: &'static str,
    pub apply: fn(&str) -> String,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

pub fn trim(s: &str) -> String {
    s.trim().to_string()
}

pub fn lowercase(s: &str) -> String {
    s.to_lowercase()
}

pub fn strip_trailing_punctuation(s: &str) -> String {
    s.trim_end_matches(|c: char| TRAILING_PUNCTUATION.contains(&c) || c.is_whitespace())
        .to_string()
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// "brother tadiwa" → "br tadiwa", "mrs.moyo" → "mrs moyo".
/// Expects lowercased input.
pub fn normalize_title_prefix(s: &str) -> String {
    for (from, to) in TITLE_PREFIXES {
        if let Some(rest) = s.strip_prefix(from) {
            return collapse_whitespace(&format!("{to}{rest}"));
        }
    }
    s.to_string()
}

/// "(sakubva)" → "sakubva". One layer only.
pub fn unwrap_parentheses(s: &str) -> String {
    match s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        Some(inner) => inner.trim().to_string(),
        None => s.to_string(),
    }
}

/// "dangamvura / chikanga" → "dangamvura/chikanga".
pub fn tighten_slashes(s: &str) -> String {
    s.split('/').map(str::trim).collect::<Vec<_>>().join("/")
}

const TRIM: Step = Step { name: "trim", apply: trim };
const LOWERCASE: Step = Step { name: "lowercase", apply: lowercase };
const STRIP_TRAILING_PUNCTUATION: Step = Step {
    name: "strip_trailing_punctuation",
    apply: strip_trailing_punctuation,
};
const COLLAPSE_WHITESPACE: Step = Step {
    name: "collapse_whitespace",
    apply: collapse_whitespace,
};
const NORMALIZE_TITLE_PREFIX: Step = Step {
    name: "normalize_title_prefix",
    apply: normalize_title_prefix,
};
const UNWRAP_PARENTHESES: Step = Step {
    name: "unwrap_parentheses",
    apply: unwrap_parentheses,
};
const TIGHTEN_SLASHES: Step = Step {
    name: "tighten_slashes",
    apply: tighten_slashes,
};

// ── Pipelines ────────────────────────────────────────────────────────

pub const PERSON_DISPLAY: &[Step] = &[TRIM, STRIP_TRAILING_PUNCTUATION, COLLAPSE_WHITESPACE];

pub const PERSON_KEY: &[Step] = &[
    LOWERCASE,
    TRIM,
    STRIP_TRAILING_PUNCTUATION,
    COLLAPSE_WHITESPACE,
    NORMALIZE_TITLE_PREFIX,
];

/// Locations keep their trailing punctuation in the display form; only
/// the key drops it.
pub const LOCATION_DISPLAY: &[Step] = &[TRIM, COLLAPSE_WHITESPACE];

pub const LOCATION_KEY: &[Step] = &[
    LOWERCASE,
    TRIM,
    STRIP_TRAILING_PUNCTUATION,
    UNWRAP_PARENTHESES,
    TIGHTEN_SLASHES,
    COLLAPSE_WHITESPACE,
];

pub const LABEL_DISPLAY: &[Step] = &[TRIM, COLLAPSE_WHITESPACE];

pub const LABEL_KEY: &[Step] = &[LOWERCASE, TRIM, COLLAPSE_WHITESPACE];

/// Run `s` through every step in order.
pub fn apply(steps: &[Step], s: &str) -> String {
    steps
        .iter()
        .fold(s.to_string(), |acc, step| (step.apply)(&acc))
}

/// What kind of entry a unique set holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Person,
    Location,
    Label,
}

impl EntityKind {
    pub fn display_steps(&self) -> &'static [Step] {
        match self {
            Self::Person => PERSON_DISPLAY,
            Self::Location => LOCATION_DISPLAY,
            Self::Label => LABEL_DISPLAY,
        }
    }

    pub fn key_steps(&self) -> &'static [Step] {
        match self {
            Self::Person => PERSON_KEY,
            Self::Location => LOCATION_KEY,
            Self::Label => LABEL_KEY,
        }
    }

    pub fn display(&self, raw: &str) -> String {
        apply(self.display_steps(), raw)
    }

    pub fn key(&self, raw: &str) -> String {
        apply(self.key_steps(), raw)
    }
}

// ── People ───────────────────────────────────────────────────────────

/// Split a preachers-team string into individual (uncleaned) names.
pub fn split_team(raw: &str) -> Vec<&str> {
    RE_TEAM_SEPARATOR
        .split(raw)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Case-insensitive match against the placeholder denylist.
pub fn is_placeholder<S: AsRef<str>>(s: &str, placeholders: &[S]) -> bool {
    let key = collapse_whitespace(&s.to_lowercase());
    placeholders
        .iter()
        .any(|p| collapse_whitespace(&p.as_ref().to_lowercase()) == key)
}

/// Minimum length of a cleaned person name.
pub const MIN_PERSON_CHARS: usize = 3;

/// True when a cleaned person name is too short or a placeholder.
pub fn is_degenerate_person<S: AsRef<str>>(display: &str, placeholders: &[S]) -> bool {
    display.chars().count() < MIN_PERSON_CHARS || is_placeholder(display, placeholders)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── steps ────────────────────────────────────────────────────────

    #[test]
    fn test_strip_trailing_punctuation_repeats() {
        assert_eq!(strip_trailing_punctuation("Tadiwa.,; "), "Tadiwa");
        assert_eq!(strip_trailing_punctuation("Sakubva / "), "Sakubva");
        assert_eq!(strip_trailing_punctuation("St. Mary's"), "St. Mary's");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Br   Tadiwa \t Moyo "), "Br Tadiwa Moyo");
    }

    #[test]
    fn test_normalize_title_prefix() {
        assert_eq!(normalize_title_prefix("brother tadiwa"), "br tadiwa");
        assert_eq!(normalize_title_prefix("sister grace"), "sr grace");
        assert_eq!(normalize_title_prefix("mrs. moyo"), "mrs moyo");
        assert_eq!(normalize_title_prefix("mrs.moyo"), "mrs moyo");
        assert_eq!(normalize_title_prefix("mr. banda"), "mr banda");
        assert_eq!(normalize_title_prefix("pastor chuma"), "pastor chuma");
        assert_eq!(normalize_title_prefix("brothers"), "brothers");
    }

    #[test]
    fn test_unwrap_parentheses_single_layer() {
        assert_eq!(unwrap_parentheses("(sakubva)"), "sakubva");
        assert_eq!(unwrap_parentheses("((sakubva))"), "(sakubva)");
        assert_eq!(unwrap_parentheses("sakubva (east)"), "sakubva (east)");
    }

    #[test]
    fn test_tighten_slashes() {
        assert_eq!(tighten_slashes("dangamvura / chikanga"), "dangamvura/chikanga");
    }

    // ── pipelines ────────────────────────────────────────────────────

    #[test]
    fn test_person_key_folds_honorifics_and_punctuation() {
        let a = EntityKind::Person.key("Br Tadiwa");
        let b = EntityKind::Person.key("Brother  Tadiwa.");
        let c = EntityKind::Person.key("BR TADIWA");
        assert_eq!(a, "br tadiwa");
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_person_display_keeps_case() {
        assert_eq!(EntityKind::Person.display("  Sister   Grace; "), "Sister Grace");
    }

    #[test]
    fn test_location_key_and_display() {
        assert_eq!(EntityKind::Location.key("(Sakubva)."), "sakubva");
        assert_eq!(
            EntityKind::Location.key("Dangamvura /  Chikanga"),
            "dangamvura/chikanga"
        );
        assert_eq!(EntityKind::Location.display(" Sakubva. "), "Sakubva.");
    }

    #[test]
    fn test_label_key_is_case_insensitive() {
        assert_eq!(
            EntityKind::Label.key(" Street Evangelism"),
            EntityKind::Label.key("street evangelism ")
        );
    }

    #[test]
    fn test_apply_runs_steps_in_order() {
        let steps = [LOWERCASE, NORMALIZE_TITLE_PREFIX];
        assert_eq!(apply(&steps, "Brother Tadiwa"), "br tadiwa");
        // prefix step sees mixed case first and does nothing
        let reversed = [NORMALIZE_TITLE_PREFIX, LOWERCASE];
        assert_eq!(apply(&reversed, "Brother Tadiwa"), "brother tadiwa");
    }

    // ── team splitting ───────────────────────────────────────────────

    #[test]
    fn test_split_team_on_commas_and_and() {
        assert_eq!(
            split_team("Br Tadiwa and Sister Grace, Mr Moyo AND Pastor Chuma"),
            vec!["Br Tadiwa", "Sister Grace", "Mr Moyo", "Pastor Chuma"]
        );
    }

    #[test]
    fn test_split_team_keeps_and_inside_names() {
        assert_eq!(split_team("Sr Andrea, Br Sandy"), vec!["Sr Andrea", "Br Sandy"]);
    }

    #[test]
    fn test_split_team_multiline() {
        assert_eq!(split_team("Br Tadiwa\nSr Grace"), vec!["Br Tadiwa", "Sr Grace"]);
    }

    #[test]
    fn test_degenerate_person() {
        let placeholders = ["not specified", "n/a", "-"];
        assert!(is_degenerate_person("Jo", &placeholders));
        assert!(is_degenerate_person("Not  Specified", &placeholders));
        assert!(is_degenerate_person("N/A", &placeholders));
        assert!(!is_degenerate_person("Br Tadiwa", &placeholders));
    }
}
