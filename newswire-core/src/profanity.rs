//! Word-boundary profanity gate for item titles.

use std::sync::LazyLock;

use aho_corasick::AhoCorasick;

// Deliberately short: the goal is filtering obviously offensive headlines,
// not moderating arbitrary text.
const WORDS: &[&str] = &[
    "asshole",
    "bastard",
    "bitch",
    "bullshit",
    "cocksucker",
    "cunt",
    "dickhead",
    "fuck",
    "fucked",
    "fucker",
    "fucking",
    "motherfucker",
    "shit",
    "shitty",
    "slut",
    "twat",
    "wanker",
    "whore",
];

static MATCHER: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        // Longest match, so "fucking" is not shadowed by its "fuck" prefix
        // failing the boundary check.
        .match_kind(aho_corasick::MatchKind::LeftmostLongest)
        .build(WORDS)
        .expect("static word list")
});

/// True when the text contains a profane word at word boundaries.
pub fn contains_profanity(text: &str) -> bool {
    let bytes = text.as_bytes();
    MATCHER.find_iter(text).any(|m| {
        let before_ok = m.start() == 0
            || !bytes[m.start() - 1].is_ascii_alphanumeric();
        let after_ok =
            m.end() == bytes.len() || !bytes[m.end()].is_ascii_alphanumeric();
        before_ok && after_ok
    })
}
