//! Connection string tokenizer using nom.
//!
//! Splits a `key=value;key=value` string into ordered pairs.
//!
//! ```text
//! Server=localhost;Database=Sales;Password=a=b
//! ───┬── ────┬──── ───┬─── ──┬── ───┬──── ─┬─
//!    │       │        │      │      │      └── value (everything after the first '=')
//!    │       │        │      │      └── key
//!    │       │        │      └── value
//!    │       │        └── key
//!    │       └── value
//!    └── key
//! ```
//!
//! The tokenizer is permissive: tokens without `=` and empty tokens are
//! dropped, duplicate keys are kept in order and the last one wins on lookup.

use nom::{
    bytes::complete::{take_till, take_while},
    character::complete::char,
    combinator::{opt, rest},
    multi::separated_list0,
    sequence::{pair, preceded},
    IResult,
};

/// Keys whose values are replaced by `***` in masked output.
const SECRET_KEYS: &[&str] = &["Password", "PWD", "Application Key", "AppKey"];

/// An ordered list of key/value pairs from a connection string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionString {
    pairs: Vec<(String, String)>,
}

impl ConnectionString {
    /// Look up the first alias that is present; for that key the last
    /// occurrence wins.
    pub fn get(&self, aliases: &[&str]) -> Option<&str> {
        aliases.iter().find_map(|alias| {
            self.pairs
                .iter()
                .rev()
                .find(|(k, _)| k == alias)
                .map(|(_, v)| v.as_str())
        })
    }

    /// True if any of the aliases is present.
    pub fn contains(&self, aliases: &[&str]) -> bool {
        self.get(aliases).is_some()
    }

    /// All pairs in input order, duplicates included.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Rebuild the string with credential values masked.
    pub fn masked(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| {
                if SECRET_KEYS.contains(&k.as_str()) {
                    format!("{}=***", k)
                } else {
                    format!("{}={}", k, v)
                }
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Parse a connection string. Never fails; malformed tokens are skipped.
pub fn parse(input: &str) -> ConnectionString {
    let tokens = match parse_tokens(input) {
        Ok((_, tokens)) => tokens,
        Err(_) => Vec::new(),
    };

    let pairs = tokens
        .into_iter()
        .filter_map(|token| match parse_pair(token) {
            Ok((_, (key, Some(value)))) => {
                let key = key.trim();
                if key.is_empty() {
                    None
                } else {
                    Some((key.to_string(), value.to_string()))
                }
            }
            _ => None,
        })
        .collect();

    ConnectionString { pairs }
}

/// Split on `;`. Empty tokens are allowed here and dropped later.
fn parse_tokens(input: &str) -> IResult<&str, Vec<&str>> {
    separated_list0(char(';'), take_while(|c| c != ';'))(input)
}

/// Split a token on its first `=`.
fn parse_pair(token: &str) -> IResult<&str, (&str, Option<&str>)> {
    pair(take_till(|c| c == '='), opt(preceded(char('='), rest)))(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_pairs() {
        let cs = parse("Server=localhost;Database=Sales");
        assert_eq!(cs.len(), 2);
        assert_eq!(cs.get(&["Server"]), Some("localhost"));
        assert_eq!(cs.get(&["Database"]), Some("Sales"));
    }

    #[test]
    fn test_value_keeps_later_equals() {
        let cs = parse("Password=a=b=c;");
        assert_eq!(cs.get(&["Password"]), Some("a=b=c"));
    }

    #[test]
    fn test_malformed_tokens_skipped() {
        let cs = parse(";;garbage;Server=x;=orphan;");
        assert_eq!(cs.pairs(), &[("Server".to_string(), "x".to_string())]);
    }

    #[test]
    fn test_last_duplicate_wins() {
        let cs = parse("Server=a;Server=b");
        assert_eq!(cs.get(&["Server"]), Some("b"));
        assert_eq!(cs.len(), 2);
    }

    #[test]
    fn test_alias_priority() {
        let cs = parse("Data Source=ds;Server=srv");
        assert_eq!(cs.get(&["Server", "Data Source"]), Some("srv"));
        let cs = parse("Data Source=ds");
        assert_eq!(cs.get(&["Server", "Data Source"]), Some("ds"));
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let cs = parse("server=x");
        assert_eq!(cs.get(&["Server"]), None);
    }

    #[test]
    fn test_empty_value_is_present() {
        let cs = parse("Database=");
        assert_eq!(cs.get(&["Database"]), Some(""));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_masked() {
        let cs = parse("Server=x;User ID=bob;Password=hunter2;AppKey=k");
        assert_eq!(cs.masked(), "Server=x;User ID=bob;Password=***;AppKey=***");
    }
}
