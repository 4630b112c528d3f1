//! Queries and query options.

use serde::{Deserialize, Serialize};

use crate::object::ObjectTag;
use crate::token::Token;

/// Per-query behavior switches.
///
/// The numeric values are the wire-level option codes. Only
/// `CachedAnswersOnly`, `ExpiredAssertionsOk` and `TokenTracing` change
/// core semantics; the rest are routing policy hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryOption {
    MinE2eLatency = 1,
    MinLastHopAnswerSize = 2,
    MinInfoLeakage = 3,
    /// Answer from cache or not at all; never forward upstream.
    CachedAnswersOnly = 4,
    /// Accept cache entries whose validity window has passed.
    ExpiredAssertionsOk = 5,
    /// Reuse the client's token on the forwarded upstream query.
    TokenTracing = 6,
    NoVerificationDelegation = 7,
    NoProactiveCaching = 8,
}

/// A question about one name and object tag within a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub context: String,
    /// Fully qualified name, e.g. `ethz.ch`.
    pub name: String,
    pub tag: ObjectTag,
    /// Unix seconds after which the querier no longer cares.
    pub expires: i64,
    pub token: Token,
    pub options: Vec<QueryOption>,
}

impl Query {
    /// Whether the query carries the given option.
    pub fn contains_option(&self, option: QueryOption) -> bool {
        self.options.contains(&option)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_option() {
        let query = Query {
            context: ".".into(),
            name: "ethz.ch".into(),
            tag: ObjectTag::Ip4,
            expires: 159_159,
            token: Token::fresh(),
            options: vec![QueryOption::MinE2eLatency, QueryOption::MinInfoLeakage],
        };
        assert!(query.contains_option(QueryOption::MinE2eLatency));
        assert!(!query.contains_option(QueryOption::CachedAnswersOnly));
    }
}
