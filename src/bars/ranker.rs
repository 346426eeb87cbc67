//! Additive keyword scoring of place candidates. A candidate needs 40
//! points to be considered a real, open bar; everything below is dropped.

use crate::models::BarCandidate;

pub const ELIGIBILITY_THRESHOLD: i32 = 40;

/// Non-venue words (FR/EN) that disqualify a name.
const NAME_BLACKLIST: &[&str] = &[
    "office",
    "bureau",
    "pharmacie",
    "pharmacy",
    "hotel",
    "hôtel",
    "school",
    "école",
    "ecole",
    "bank",
    "banque",
    "church",
    "église",
    "eglise",
    "hospital",
    "hôpital",
    "hopital",
    "clinique",
    "clinic",
    "supermarché",
    "supermarche",
    "supermarket",
    "boulangerie",
    "station",
];

/// Bar-adjacent words that strengthen a name.
const NAME_WHITELIST: &[&str] = &[
    "bar",
    "pub",
    "tavern",
    "taverne",
    "bistro",
    "bistrot",
    "brasserie",
    "lounge",
    "cocktail",
    "brewery",
    "brasseur",
    "cave",
    "vins",
    "wine",
    "bière",
    "biere",
    "beer",
    "speakeasy",
];

const VALID_BAR_TYPES: &[&str] = &[
    "bar",
    "pub",
    "wine_bar",
    "night_club",
    "cocktail_lounge",
    "brewery",
];

const PROBLEMATIC_TYPES: &[&str] = &[
    "store",
    "doctor",
    "hospital",
    "school",
    "church",
    "pharmacy",
    "bank",
    "lodging",
];

/// Additive score; can go negative.
pub fn score(candidate: &BarCandidate) -> i32 {
    let mut total = 0;
    let name = candidate.name.to_lowercase();

    if candidate.primary_type.as_deref() == Some("bar") {
        total += 50;
    }
    if NAME_BLACKLIST.iter().any(|word| name.contains(word)) {
        total -= 30;
    }
    if NAME_WHITELIST.iter().any(|word| name.contains(word)) {
        total += 20;
    }
    if candidate
        .types
        .iter()
        .any(|t| VALID_BAR_TYPES.contains(&t.as_str()))
    {
        total += 15;
    }
    if candidate
        .types
        .iter()
        .any(|t| PROBLEMATIC_TYPES.contains(&t.as_str()))
    {
        total -= 25;
    }
    match candidate.business_status.as_deref() {
        Some("OPERATIONAL") => total += 10,
        Some("CLOSED_PERMANENTLY") => total -= 50,
        _ => {}
    }
    if candidate.rating.is_some_and(|r| r >= 3.5) {
        total += 5;
    }

    total
}

/// Eligible candidates sorted best-first. The sort is stable, so ties keep
/// the provider's original order.
pub fn rank(candidates: Vec<BarCandidate>) -> Vec<BarCandidate> {
    let mut scored: Vec<(i32, BarCandidate)> = candidates
        .into_iter()
        .map(|c| (score(&c), c))
        .filter(|(s, _)| *s >= ELIGIBILITY_THRESHOLD)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, c)| c).collect()
}

pub fn select_best(candidates: Vec<BarCandidate>) -> Option<BarCandidate> {
    rank(candidates).into_iter().next()
}

/// The provider sometimes returns an opaque id where the display name should
/// be. Fall back through the address, then a suffix of the place id.
pub fn extract_robust_bar_name(candidate: &BarCandidate) -> String {
    let name = candidate.name.trim();
    let looks_opaque =
        name.starts_with("places/") || name.starts_with("ChIJ") || name.len() <= 2;
    if !looks_opaque {
        return name.to_string();
    }

    if let Some(segment) = candidate.formatted_address.split(',').next() {
        let segment = segment.trim();
        if segment.len() > 2 && !segment.starts_with(|c: char| c.is_ascii_digit()) {
            return segment.to_string();
        }
    }

    // Last 8 characters, counted on char boundaries so a non-ASCII id
    // cannot split a codepoint.
    let id = &candidate.place_id;
    let start = id
        .char_indices()
        .rev()
        .nth(7)
        .map(|(i, _)| i)
        .unwrap_or(0);
    format!("Bar {}", &id[start..])
}
