//! Reply classification
//!
//! Turns a raw inbound SMS body into a structured intent. Pure string
//! handling, no I/O.

use once_cell::sync::Lazy;
use regex::Regex;

/// Classified meaning of an inbound reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Punter is available for the current tip ("yes")
    Affirm,
    /// Punter is sitting this one out ("no")
    Decline,
    /// Punter reports the stake they placed and the price they got
    BetReport { stake: String, price: String },
    /// Free text that matched no reply pattern; carries the raw body
    Unrecognized(String),
}

/// Stake/price grammar: an integer stake, whitespace, then fractional odds
/// (4/1) or single-digit decimal odds (2.5). Unanchored so leading and
/// trailing commentary is tolerated. The stake group admits zero digits, so
/// an empty capture must be checked before use.
static BET_REPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]*)\s+([0-9]+/[0-9]+|[0-9]\.[0-9])").expect("Invalid bet regex"));

/// Classify an inbound SMS body.
///
/// "yes"/"no" are matched case-insensitively on the trimmed body. Everything
/// else is normalized (currency symbol stripped, `@` treated as a separator)
/// and run through the stake/price grammar, taking the first match anywhere
/// in the text.
pub fn classify(text: &str) -> Intent {
    let trimmed = text.trim();

    if trimmed.eq_ignore_ascii_case("yes") {
        return Intent::Affirm;
    }
    if trimmed.eq_ignore_ascii_case("no") {
        return Intent::Decline;
    }

    let normalized = normalize(trimmed);

    if let Some(caps) = BET_REPORT.captures(&normalized) {
        let stake = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let price = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");

        // A matched pattern with an empty required group is not a bet
        if !stake.is_empty() && !price.is_empty() {
            return Intent::BetReport {
                stake: stake.to_string(),
                price: price.to_string(),
            };
        }
    }

    Intent::Unrecognized(text.to_string())
}

/// Strip the literal currency symbol and treat `@` as a separator, so
/// "£90@4/1" and "90 4/1" classify alike.
fn normalize(text: &str) -> String {
    text.replace('£', "").replace('@', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bet(stake: &str, price: &str) -> Intent {
        Intent::BetReport {
            stake: stake.to_string(),
            price: price.to_string(),
        }
    }

    #[test]
    fn test_affirm_case_insensitive() {
        assert_eq!(classify("yes"), Intent::Affirm);
        assert_eq!(classify("YES"), Intent::Affirm);
        assert_eq!(classify("  Yes  "), Intent::Affirm);
    }

    #[test]
    fn test_decline_case_insensitive() {
        assert_eq!(classify("no"), Intent::Decline);
        assert_eq!(classify("NO"), Intent::Decline);
        assert_eq!(classify(" No "), Intent::Decline);
    }

    #[test]
    fn test_bet_report_currency_symbol() {
        assert_eq!(classify("£90 4/1"), bet("90", "4/1"));
    }

    #[test]
    fn test_bet_report_at_symbol() {
        assert_eq!(classify("90@4/1"), bet("90", "4/1"));
        assert_eq!(classify("£90@4/1"), bet("90", "4/1"));
    }

    #[test]
    fn test_bet_report_decimal_odds() {
        assert_eq!(classify("£10 2.5"), bet("10", "2.5"));
        assert_eq!(classify("10@9.5"), bet("10", "9.5"));
    }

    #[test]
    fn test_bet_report_embedded_in_commentary() {
        assert_eq!(classify("cheers mate got £20 5/2 in the end"), bet("20", "5/2"));
        assert_eq!(classify("50 2/1 thanks"), bet("50", "2/1"));
    }

    #[test]
    fn test_unrecognized_free_text() {
        assert_eq!(
            classify("maybe later"),
            Intent::Unrecognized("maybe later".to_string())
        );
        assert_eq!(classify(""), Intent::Unrecognized("".to_string()));
    }

    #[test]
    fn test_empty_stake_capture_is_unrecognized() {
        // "@4/1" normalizes to " 4/1": pattern matches with an empty stake
        assert!(matches!(classify("@4/1"), Intent::Unrecognized(_)));
        assert!(matches!(classify("£ 4/1"), Intent::Unrecognized(_)));
    }

    #[test]
    fn test_price_alone_is_unrecognized() {
        assert!(matches!(classify("4/1"), Intent::Unrecognized(_)));
    }

    #[test]
    fn test_yes_with_trailing_words_is_not_affirm() {
        // Exact-match policy: only a bare yes/no counts
        assert!(matches!(classify("yes please"), Intent::Unrecognized(_)));
    }

    proptest! {
        #[test]
        fn prop_fractional_grammar_roundtrip(stake in 1u32..10_000, num in 1u32..100, den in 1u32..100) {
            let text = format!("£{} {}/{}", stake, num, den);
            prop_assert_eq!(
                classify(&text),
                Intent::BetReport {
                    stake: stake.to_string(),
                    price: format!("{}/{}", num, den),
                }
            );
        }

        #[test]
        fn prop_decimal_grammar_roundtrip(stake in 1u32..10_000, whole in 1u32..10, frac in 0u32..10) {
            let text = format!("{}@{}.{}", stake, whole, frac);
            prop_assert_eq!(
                classify(&text),
                Intent::BetReport {
                    stake: stake.to_string(),
                    price: format!("{}.{}", whole, frac),
                }
            );
        }

        #[test]
        fn prop_alphabetic_text_never_parses_as_bet(text in "[a-zA-Z ]{0,40}") {
            let is_bet = matches!(classify(&text), Intent::BetReport { .. });
            prop_assert!(!is_bet, "parsed a bet out of {:?}", text);
        }
    }
}
