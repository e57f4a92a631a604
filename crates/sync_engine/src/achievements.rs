//! Award counters parsed from a player's achievement list.
//!
//! Entries look like `3x Def. POY` or `2012-13 All-NBA`. Categories are tried
//! most specific first and the first containing match wins, so an entry such
//! as `All-Star Game MVP` is counted as MVP.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Achievement {
    FinalsMvp,
    Mvp,
    RookieOfTheYear,
    DefensivePlayerOfTheYear,
    AllNba,
    AllStar,
    Championship,
    AllDefensive,
}

/// Check order matters: `Finals MVP` must be tried before `MVP`.
const CATEGORIES: [(Achievement, &str); 8] = [
    (Achievement::FinalsMvp, r"Finals MVP"),
    (Achievement::Mvp, r"MVP"),
    (Achievement::RookieOfTheYear, r"ROY"),
    (Achievement::DefensivePlayerOfTheYear, r"Def\. POY"),
    (Achievement::AllNba, r"All-NBA"),
    (Achievement::AllStar, r"All[- ]Star"),
    (Achievement::Championship, r"NBA Champ"),
    (Achievement::AllDefensive, r"All-Defensive"),
];

struct Matcher {
    kind: Achievement,
    contains: Regex,
    counted: Regex,
}

fn matchers() -> &'static [Matcher] {
    static MATCHERS: OnceLock<Vec<Matcher>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        CATEGORIES
            .iter()
            .filter_map(|(kind, pattern)| {
                Some(Matcher {
                    kind: *kind,
                    contains: Regex::new(pattern).ok()?,
                    counted: Regex::new(&format!(r"(\d+)x {pattern}")).ok()?,
                })
            })
            .collect()
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Achievements {
    pub all_star: u32,
    pub all_nba: u32,
    pub all_defensive: u32,
    pub championships: u32,
    pub dpoy: u32,
    pub roy: u32,
    pub finals_mvp: u32,
    pub mvp: u32,
}

impl Achievements {
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut out = Self::default();
        for entry in entries {
            if let Some((kind, n)) = classify(entry.as_ref()) {
                out.add(kind, n);
            }
        }
        out
    }

    pub fn add(&mut self, kind: Achievement, n: u32) {
        let slot = match kind {
            Achievement::FinalsMvp => &mut self.finals_mvp,
            Achievement::Mvp => &mut self.mvp,
            Achievement::RookieOfTheYear => &mut self.roy,
            Achievement::DefensivePlayerOfTheYear => &mut self.dpoy,
            Achievement::AllNba => &mut self.all_nba,
            Achievement::AllStar => &mut self.all_star,
            Achievement::Championship => &mut self.championships,
            Achievement::AllDefensive => &mut self.all_defensive,
        };
        *slot += n;
    }
}

/// Category and count for one entry; `None` when nothing matches.
pub fn classify(entry: &str) -> Option<(Achievement, u32)> {
    let matcher = matchers().iter().find(|m| m.contains.is_match(entry))?;
    let count = matcher
        .counted
        .captures(entry)
        .and_then(|caps| caps.get(1))
        .and_then(|n| n.as_str().parse().ok())
        .unwrap_or(1);
    Some((matcher.kind, count))
}
