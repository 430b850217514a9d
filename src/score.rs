//! Finale aggregation: match/clash counts, similarity and its band.
//!
//! Everything here is a pure function of the round results, so the finale can be
//! recomputed from `history` at any time.

use std::fmt;

use tracing::warn;

use crate::document::{GameDocument, RoundResult};
use crate::error_codes::ErrorCode;

/// Similarity band shown as the finale title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    /// 90% and above.
    Soulmates,
    /// 70% and above.
    TwoPeasInAPod,
    /// 50% and above.
    FriendlyRivals,
    /// 30% and above.
    PolarOpposites,
    /// Below 30%.
    ChaoticDuo,
}

impl Band {
    /// Bands with their lower bounds, highest first.
    const THRESHOLDS: [(u32, Band); 4] = [
        (90, Band::Soulmates),
        (70, Band::TwoPeasInAPod),
        (50, Band::FriendlyRivals),
        (30, Band::PolarOpposites),
    ];

    /// The band a similarity percentage falls in.
    pub fn for_similarity(percent: u32) -> Self {
        Self::THRESHOLDS
            .iter()
            .find(|(floor, _)| percent >= *floor)
            .map_or(Band::ChaoticDuo, |(_, band)| *band)
    }

    pub fn title(self) -> &'static str {
        match self {
            Band::Soulmates => "Soulmates",
            Band::TwoPeasInAPod => "Two Peas in a Pod",
            Band::FriendlyRivals => "Friendly Rivals",
            Band::PolarOpposites => "Polar Opposites",
            Band::ChaoticDuo => "Chaotic Duo",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Band::Soulmates => "💕",
            Band::TwoPeasInAPod => "🫛",
            Band::FriendlyRivals => "⚔️",
            Band::PolarOpposites => "🧲",
            Band::ChaoticDuo => "🌪️",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Aggregate stats for a finished game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Rounds that had a result available.
    pub rounds: usize,
    pub matches: usize,
    pub clashes: usize,
    /// `round(matches / max(1, rounds) * 100)`.
    pub similarity: u32,
    pub band: Band,
}

/// Aggregate a list of round results.
pub fn summarize(results: &[RoundResult]) -> Summary {
    let rounds = results.len();
    let matches = results.iter().filter(|result| result.matched).count();
    let clashes = rounds - matches;
    let similarity = ((matches as f64 / rounds.max(1) as f64) * 100.0).round() as u32;
    Summary {
        rounds,
        matches,
        clashes,
        similarity,
        band: Band::for_similarity(similarity),
    }
}

/// Collect each round's result, preferring the shared `history` and falling back
/// to this device's cached copy (indexed by round) when an entry is missing.
///
/// Rounds missing from both sources are skipped. Only rounds that exist in
/// `doc.rounds` are counted, whatever `totalRounds` claims.
pub fn collect_results(doc: &GameDocument, cached: &[Option<RoundResult>]) -> Vec<RoundResult> {
    (0..doc.total_rounds.min(doc.rounds.len()))
        .filter_map(|round| {
            if let Some(result) = doc.history.get(&round) {
                return Some(result.clone());
            }
            let fallback = cached.get(round).cloned().flatten();
            let code = ErrorCode::MissingHistoryEntry;
            if fallback.is_some() {
                warn!(round, ?code, "history entry missing; using local round result");
            } else {
                warn!(round, ?code, "history entry missing and no local copy; skipping round");
            }
            fallback
        })
        .collect()
}

/// Text for sharing the finale, e.g. in a chat message.
pub fn share_message(summary: &Summary, player1: &str, player2: &str, play_url: &str) -> String {
    format!(
        "🤔 Would You Rather?\n\n{player1} & {player2}\n📊 {}% similarity — \"{}\" {}\n✅ {} matches / ❌ {} clashes\n\nPlay: {play_url}",
        summary.similarity,
        summary.band.title(),
        summary.band.emoji(),
        summary.matches,
        summary.clashes,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::document::{Choice, PlayerSlot, Round};
    use uuid::Uuid;

    fn result(matched: bool) -> RoundResult {
        let round = Round::new("Coffee", "Tea");
        RoundResult::new(&round, Choice::A, if matched { Choice::A } else { Choice::B })
    }

    fn doc_with_rounds(n: usize) -> GameDocument {
        let rounds = (0..n).map(|i| Round::new(format!("a{i}"), format!("b{i}"))).collect();
        GameDocument::new("Lifestyle", rounds, PlayerSlot::new(Uuid::nil(), "Ana"), None)
    }

    #[test]
    fn oversized_round_count_is_bounded_by_rounds() {
        let mut doc = doc_with_rounds(2);
        doc.total_rounds = usize::MAX;
        doc.history.insert(0, result(true));
        let cached = vec![None, Some(result(false))];

        let results = collect_results(&doc, &cached);
        assert_eq!(results, vec![result(true), result(false)]);
    }

    #[test]
    fn three_of_four_is_two_peas() {
        let summary = summarize(&[result(true), result(true), result(false), result(true)]);
        assert_eq!(summary.matches, 3);
        assert_eq!(summary.clashes, 1);
        assert_eq!(summary.similarity, 75);
        assert_eq!(summary.band, Band::TwoPeasInAPod);
    }

    #[test]
    fn band_boundaries() {
        assert_eq!(Band::for_similarity(100), Band::Soulmates);
        assert_eq!(Band::for_similarity(90), Band::Soulmates);
        assert_eq!(Band::for_similarity(89), Band::TwoPeasInAPod);
        assert_eq!(Band::for_similarity(70), Band::TwoPeasInAPod);
        assert_eq!(Band::for_similarity(50), Band::FriendlyRivals);
        assert_eq!(Band::for_similarity(30), Band::PolarOpposites);
        assert_eq!(Band::for_similarity(29), Band::ChaoticDuo);
        assert_eq!(Band::for_similarity(0), Band::ChaoticDuo);
    }

    #[test]
    fn similarity_rounds_half_up() {
        // 2 of 3 = 66.67 → 67
        let summary = summarize(&[result(true), result(true), result(false)]);
        assert_eq!(summary.similarity, 67);
        // 1 of 8 = 12.5 → 13
        let mut results = vec![result(false); 7];
        results.push(result(true));
        assert_eq!(summarize(&results).similarity, 13);
    }

    #[test]
    fn empty_history_is_zero_percent() {
        let summary = summarize(&[]);
        assert_eq!(summary.rounds, 0);
        assert_eq!(summary.similarity, 0);
        assert_eq!(summary.band, Band::ChaoticDuo);
    }

    #[test]
    fn missing_history_falls_back_to_cache() {
        let mut doc = doc_with_rounds(3);
        doc.history.insert(0, result(true));
        doc.history.insert(2, result(true));
        let cached = vec![None, Some(result(false)), None];

        let results = collect_results(&doc, &cached);
        assert_eq!(results.len(), 3);
        assert!(!results[1].matched);
        assert_eq!(summarize(&results).similarity, 67);
    }

    #[test]
    fn shared_history_wins_over_cache() {
        let mut doc = doc_with_rounds(1);
        doc.history.insert(0, result(true));
        let results = collect_results(&doc, &[Some(result(false))]);
        assert!(results[0].matched);
    }

    #[test]
    fn rounds_missing_everywhere_are_skipped() {
        let doc = doc_with_rounds(2);
        let results = collect_results(&doc, &[Some(result(true))]);
        assert_eq!(results.len(), 1);
        assert_eq!(summarize(&results).similarity, 100);
    }

    #[test]
    fn share_message_mentions_everything() {
        let summary = summarize(&[result(true), result(false)]);
        let text = share_message(&summary, "Ana", "Ben", "https://example.com/");
        assert!(text.contains("Ana & Ben"));
        assert!(text.contains("50% similarity"));
        assert!(text.contains("Friendly Rivals"));
        assert!(text.contains("1 matches / ❌ 1 clashes"));
        assert!(text.ends_with("Play: https://example.com/"));
    }
}
