//! Text statistics, cleanup and heuristic structure.
//!
//! Decoders that can read layout (DOCX styles, numbering) report [`StructuralHints`]
//! themselves. For everything else, [`infer_structure`] guesses headings, paragraphs
//! and list items from the plain text, which is good enough to segment most résumés.

use crate::types::{Heading, StructuralHints, TextStatistics};
use once_cell::sync::Lazy;
use regex::Regex;

static MARKDOWN_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*$").expect("Markdown heading regex pattern is valid and should compile"));
static LIST_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*+•◦▪‣·–]|\(?\d{1,2}[.)]|[a-zA-Z][.)])\s+(.+)$")
        .expect("List item regex pattern is valid and should compile")
});
static CONTROL_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("Control chars regex pattern is valid and should compile")
});
static EXCESS_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("Blank line regex pattern is valid and should compile"));
static TRAILING_SPACES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)[ \t]+$").expect("Trailing space regex pattern is valid and should compile"));

/// Longest line, in words, still considered a heading candidate.
const MAX_HEADING_WORDS: usize = 6;

pub fn statistics(text: &str) -> TextStatistics {
    TextStatistics {
        characters: text.chars().count(),
        words: text.split_whitespace().count(),
        lines: text.lines().count(),
    }
}

/// Normalize line endings, strip control characters and collapse runs of blank lines.
pub fn normalize_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let cleaned = CONTROL_CHARS.replace_all(&unified, "");
    let trimmed = TRAILING_SPACES.replace_all(&cleaned, "");
    EXCESS_BLANK_LINES.replace_all(&trimmed, "\n\n").trim().to_string()
}

/// Guess structure from plain text.
pub fn infer_structure(text: &str) -> StructuralHints {
    let mut hints = StructuralHints::default();
    let mut in_paragraph = false;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            in_paragraph = false;
            continue;
        }

        if let Some(heading) = heading_of(line) {
            hints.headings.push(heading);
            in_paragraph = false;
            continue;
        }

        if let Some(caps) = LIST_ITEM.captures(line)
            && let Some(item) = caps.get(1)
        {
            hints.list_items.push(item.as_str().trim().to_string());
            in_paragraph = false;
            continue;
        }

        if !in_paragraph {
            hints.paragraphs += 1;
            in_paragraph = true;
        }
    }

    hints
}

fn heading_of(line: &str) -> Option<Heading> {
    if let Some(caps) = MARKDOWN_HEADING.captures(line) {
        let level = caps.get(1).map(|m| m.as_str().len()).unwrap_or(1) as u8;
        let text = caps.get(2)?.as_str().to_string();
        return Some(Heading { level, text });
    }

    let words = line.split_whitespace().count();
    if words == 0 || words > MAX_HEADING_WORDS {
        return None;
    }

    // "EXPERIENCE", "TECHNICAL SKILLS"
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() >= 3 && letters.iter().all(|c| c.is_uppercase()) {
        return Some(Heading {
            level: 1,
            text: line.trim_end_matches(':').trim().to_string(),
        });
    }

    // "Work history:"
    if let Some(stripped) = line.strip_suffix(':')
        && letters.len() >= 3
        && !stripped.contains(':')
    {
        return Some(Heading {
            level: 2,
            text: stripped.trim().to_string(),
        });
    }

    None
}
