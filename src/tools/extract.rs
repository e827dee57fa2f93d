//! Utterance parsing for tool parameters
//!
//! Pulls transfer amounts, recipient and beneficiary names, history limits and
//! currency pairs out of free text. Nothing here touches the ledger.

use rust_decimal::Decimal;
use std::str::FromStr;

pub const DEFAULT_HISTORY_LIMIT: u32 = 5;
pub const MAX_HISTORY_LIMIT: u32 = 50;

/// Words that never name a person
const FILLER_WORDS: &[&str] = &[
    "a", "an", "the", "as", "new", "beneficiary", "payee", "him", "her", "them", "my", "me",
    "please", "to", "for", "account", "user", "person", "contact", "friend", "money", "dollars",
    "bucks", "usd", "now", "yes", "ok", "okay", "from", "it", "that", "this", "called", "named",
    "i", "want", "like", "send", "transfer", "pay", "wire", "move", "give",
];

/// "add my sister Zoe"
const RELATION_WORDS: &[&str] = &[
    "sister", "brother", "mother", "father", "mom", "mum", "dad", "wife", "husband", "son",
    "daughter", "cousin", "aunt", "uncle", "colleague", "partner", "boss", "neighbour",
    "neighbor",
];

#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub recipient: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferParse {
    Complete(TransferRequest),
    MissingAmount { recipient: Option<String> },
    MissingRecipient { amount: Decimal },
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c == '/')
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric() && c != '$' && c != '.' && c != '-')
                .trim_end_matches('.')
                .to_string()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

/// Capitalise a name the way enrolment stores it: `zoe` → `Zoe`
pub fn normalize_name(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn as_name(token: &str) -> Option<String> {
    let word = token.trim_matches(|c: char| !c.is_alphabetic());
    if word.len() < 2 || !word.chars().all(char::is_alphabetic) {
        return None;
    }
    let lower = word.to_lowercase();
    if FILLER_WORDS.contains(&lower.as_str()) || RELATION_WORDS.contains(&lower.as_str()) {
        return None;
    }
    Some(normalize_name(word))
}

fn as_amount(token: &str) -> Option<Decimal> {
    let cleaned: String = token
        .trim_start_matches('$')
        .trim_end_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

/// First name-like token after any of `markers`
fn name_after(tokens: &[String], markers: &[&str]) -> Option<String> {
    tokens.iter().enumerate().find_map(|(i, t)| {
        if markers.contains(&t.to_lowercase().as_str()) {
            tokens[i + 1..].iter().find_map(|next| {
                if as_amount(next).is_some() {
                    None
                } else {
                    as_name(next)
                }
            })
        } else {
            None
        }
    })
}

/// Parse "send $50 to Zoe" / "transfer 20.5 to bob" / "pay Zoe 10".
pub fn parse_transfer(message: &str) -> TransferParse {
    let tokens = tokens(message);

    let amount_at = tokens.iter().position(|t| as_amount(t).is_some());
    let amount = amount_at.and_then(|i| as_amount(&tokens[i]));

    // "I want to send $50 to Zoe": the "to" after the amount names the recipient
    let recipient = amount_at
        .and_then(|i| name_after(&tokens[i..], &["to"]))
        .or_else(|| name_after(&tokens, &["to"]))
        .or_else(|| name_after(&tokens, &["pay", "send", "transfer", "wire", "give"]));

    match (amount, recipient) {
        (Some(amount), Some(recipient)) => TransferParse::Complete(TransferRequest { recipient, amount }),
        (None, recipient) => TransferParse::MissingAmount { recipient },
        (Some(amount), None) => TransferParse::MissingRecipient { amount },
    }
}

/// Name following the literal word "add" ("yes, add Zoe", "add zoe as a beneficiary").
pub fn parse_beneficiary_name(message: &str) -> Option<String> {
    let tokens = tokens(message);
    name_after(&tokens, &["add", "enroll", "enrol"])
}

/// "last 3 transactions", "show 10 transactions"; clamped to 1..=50, default 5.
pub fn parse_history_limit(message: &str) -> u32 {
    let tokens = tokens(message);
    tokens
        .iter()
        .find_map(|t| t.parse::<u32>().ok())
        .map(|n| n.clamp(1, MAX_HISTORY_LIMIT))
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
}

const CURRENCY_CODES: &[&str] = &[
    "USD", "EUR", "GBP", "INR", "JPY", "CNY", "AUD", "CAD", "CHF", "SGD", "AED", "NZD", "HKD",
    "SEK", "NOK", "DKK", "ZAR", "MXN", "BRL", "KRW",
];

const CURRENCY_NAMES: &[(&str, &str)] = &[
    ("dollar", "USD"),
    ("euro", "EUR"),
    ("pound", "GBP"),
    ("sterling", "GBP"),
    ("rupee", "INR"),
    ("yen", "JPY"),
    ("yuan", "CNY"),
    ("renminbi", "CNY"),
    ("franc", "CHF"),
    ("dirham", "AED"),
    ("peso", "MXN"),
];

/// Ordinary English words on their own; only a currency after the qualifier
const QUALIFIED_CURRENCY_NAMES: &[(&str, &str, &str)] = &[
    ("brazilian", "real", "BRL"),
    ("korean", "won", "KRW"),
    ("african", "rand", "ZAR"),
];

fn bare_word(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphabetic())
        .to_lowercase()
}

fn as_currency(token: &str, previous: Option<&str>) -> Option<&'static str> {
    let lower = bare_word(token);
    let upper = lower.to_uppercase();
    if let Some(code) = CURRENCY_CODES.iter().find(|c| **c == upper) {
        return Some(*code);
    }

    let singular = lower.strip_suffix('s').unwrap_or(&lower);
    let named = CURRENCY_NAMES
        .iter()
        .find(|(name, _)| *name == lower || *name == singular)
        .map(|(_, code)| *code);
    if named.is_some() {
        return named;
    }

    let qualifier = previous.map(bare_word)?;
    QUALIFIED_CURRENCY_NAMES
        .iter()
        .find(|(q, name, _)| *q == qualifier && (*name == lower || *name == singular))
        .map(|(_, _, code)| *code)
}

/// Currencies in order of mention, without repeats.
pub fn parse_currencies(message: &str) -> Vec<&'static str> {
    let tokens = tokens(message);
    let mut found: Vec<&'static str> = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        let previous = i.checked_sub(1).map(|p| tokens[p].as_str());
        if let Some(code) = as_currency(token, previous) {
            if !found.contains(&code) {
                found.push(code);
            }
        }
    }
    found
}

/// First mentioned currency is the base, second the target.
pub fn parse_currency_pair(message: &str) -> Option<(&'static str, &'static str)> {
    match parse_currencies(message).as_slice() {
        [base, target, ..] => Some((*base, *target)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_transfer_variants() {
        assert_eq!(
            parse_transfer("Send $50 to Zoe"),
            TransferParse::Complete(TransferRequest {
                recipient: "Zoe".to_string(),
                amount: dec!(50),
            })
        );
        assert_eq!(
            parse_transfer("please transfer 1,250.75 dollars to bob."),
            TransferParse::Complete(TransferRequest {
                recipient: "Bob".to_string(),
                amount: dec!(1250.75),
            })
        );
        assert_eq!(
            parse_transfer("pay Charlie 10"),
            TransferParse::Complete(TransferRequest {
                recipient: "Charlie".to_string(),
                amount: dec!(10),
            })
        );
    }

    #[test]
    fn test_recipient_skips_leading_infinitive() {
        assert_eq!(
            parse_transfer("I want to send $50 to Zoe"),
            TransferParse::Complete(TransferRequest {
                recipient: "Zoe".to_string(),
                amount: dec!(50),
            })
        );
        assert_eq!(
            parse_transfer("I'd like to transfer 20 to Bob"),
            TransferParse::Complete(TransferRequest {
                recipient: "Bob".to_string(),
                amount: dec!(20),
            })
        );
        assert_eq!(
            parse_transfer("I need to know if I can send 5 to my sister Zoe"),
            TransferParse::Complete(TransferRequest {
                recipient: "Zoe".to_string(),
                amount: dec!(5),
            })
        );
        assert_eq!(
            parse_transfer("I want to send $50"),
            TransferParse::MissingRecipient { amount: dec!(50) }
        );
    }

    #[test]
    fn test_parse_transfer_missing_parts() {
        assert_eq!(
            parse_transfer("send money to Zoe"),
            TransferParse::MissingAmount {
                recipient: Some("Zoe".to_string())
            }
        );
        assert_eq!(
            parse_transfer("transfer $30"),
            TransferParse::MissingRecipient { amount: dec!(30) }
        );
    }

    #[test]
    fn test_negative_amount_is_parsed_for_validation() {
        assert_eq!(
            parse_transfer("send -5 to Bob"),
            TransferParse::Complete(TransferRequest {
                recipient: "Bob".to_string(),
                amount: dec!(-5),
            })
        );
    }

    #[test]
    fn test_parse_beneficiary_name() {
        assert_eq!(parse_beneficiary_name("yes, add Zoe"), Some("Zoe".to_string()));
        assert_eq!(
            parse_beneficiary_name("Add zoe as a new beneficiary"),
            Some("Zoe".to_string())
        );
        assert_eq!(
            parse_beneficiary_name("add beneficiary charlie"),
            Some("Charlie".to_string())
        );
        assert_eq!(
            parse_beneficiary_name("please add a payee called Zoe"),
            Some("Zoe".to_string())
        );
        assert_eq!(
            parse_beneficiary_name("add my brother named charlie"),
            Some("Charlie".to_string())
        );
        assert_eq!(parse_beneficiary_name("yes please add"), None);
        assert_eq!(parse_beneficiary_name("yes"), None);
    }

    #[test]
    fn test_parse_history_limit() {
        assert_eq!(parse_history_limit("show my transactions"), 5);
        assert_eq!(parse_history_limit("last 3 transactions"), 3);
        assert_eq!(parse_history_limit("last 500 transactions"), MAX_HISTORY_LIMIT);
        assert_eq!(parse_history_limit("last 0 transactions"), 1);
    }

    #[test]
    fn test_parse_currency_pair() {
        assert_eq!(parse_currency_pair("USD to EUR rate?"), Some(("USD", "EUR")));
        assert_eq!(
            parse_currency_pair("how many rupees for one euro"),
            Some(("INR", "EUR"))
        );
        assert_eq!(parse_currency_pair("gbp/jpy exchange rate"), Some(("GBP", "JPY")));
        assert_eq!(parse_currency_pair("what's the exchange rate"), None);
        assert_eq!(parse_currency_pair("dollar to dollars"), None);
    }

    #[test]
    fn test_common_words_are_not_currencies() {
        assert_eq!(
            parse_currency_pair("what is the real rate from dollars to euros"),
            Some(("USD", "EUR"))
        );
        assert_eq!(
            parse_currency_pair("we won, now convert rand pounds to yen"),
            Some(("GBP", "JPY"))
        );
        assert_eq!(
            parse_currency_pair("brazilian real to south african rand"),
            Some(("BRL", "ZAR"))
        );
        assert_eq!(parse_currency_pair("usd to korean won"), Some(("USD", "KRW")));
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("zOE"), "Zoe");
        assert_eq!(normalize_name(""), "");
    }
}
