//! Lexer, parser and encoder for the header extension.

mod common;

use common::*;
use mqlink::headers::{self, Lexer, Token};
use mqlink::message::content_types;
use mqlink::{HeaderValue, Headers};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::time::Duration;

// ============================================================================
// Lexer
// ============================================================================

#[test]
fn lexes_empty_text_to_nothing() {
    assert_eq!(Lexer::new("").count(), 0);
}

#[test]
fn lexes_single_tokens() {
    let cases = [
        ("1", Token::Number("1".to_string())),
        ("-12.50", Token::Number("-12.50".to_string())),
        ("=", Token::Equals),
        (",", Token::Comma),
        ("true", Token::True),
        ("false", Token::False),
        ("null", Token::Null),
    ];
    for (input, expected) in cases {
        let (pos, token) = Lexer::new(input).next().unwrap().unwrap();
        assert_eq!(pos, 0);
        assert_eq!(token, expected, "{input}");
    }
}

#[test]
fn lexes_strings_with_escapes() {
    let cases = [(r#""abc""#, "abc"), (r#""a\"bc""#, "a\"bc"), (r#""""#, ""), (r#""a\\b""#, r"a\b")];
    for (input, expected) in cases {
        let (_, token) = Lexer::new(input).next().unwrap().unwrap();
        assert_eq!(token, Token::String(expected.to_string()), "{input}");
    }
}

#[test]
fn lexes_a_sequence_of_tokens() {
    let tokens: Vec<Token> = Lexer::new(r#""first"=123,"second"=true"#)
        .map(|t| t.unwrap().1)
        .collect();
    assert_eq!(
        tokens,
        vec![
            Token::String("first".to_string()),
            Token::Equals,
            Token::Number("123".to_string()),
            Token::Comma,
            Token::String("second".to_string()),
            Token::Equals,
            Token::True,
        ]
    );
}

#[test]
fn lexer_is_restartable() {
    let text = r#""a"=1"#;
    let first: Vec<_> = Lexer::new(text).collect();
    let second: Vec<_> = Lexer::new(text).collect();
    assert_eq!(first, second);
}

#[test]
fn lexer_errors_end_the_stream() {
    let cases = [
        (r#""abc"#, "Unterminated string", 0),
        ("tru", "Unexpected literal 'tru'", 0),
        ("1.", "Expected digit after decimal point", 1),
        ("-", "Expected digit after '-'", 0),
        (" ", "Unexpected character ' '", 0),
    ];
    for (input, message, position) in cases {
        let mut lexer = Lexer::new(input);
        let err = lexer.next().unwrap().unwrap_err();
        assert_eq!(err.message, message, "{input}");
        assert_eq!(err.position, position, "{input}");
        assert!(lexer.next().is_none(), "{input}");
    }
}

// ============================================================================
// Parser
// ============================================================================

#[test]
fn parses_zero_pairs() {
    assert!(headers::parse("").unwrap().is_empty());
    assert!(headers::decode(b"").unwrap().is_empty());
}

#[test]
fn parses_a_single_pair() {
    let pairs = headers::parse(r#""first"=123"#).unwrap();
    assert_eq!(pairs, vec![("first".to_string(), HeaderValue::Int(123))]);
}

#[test]
fn parses_multiple_pairs_in_order() {
    let pairs = headers::parse(r#""first"=123,"second"=true"#).unwrap();
    assert_eq!(
        pairs,
        vec![
            ("first".to_string(), HeaderValue::Int(123)),
            ("second".to_string(), HeaderValue::Bool(true)),
        ]
    );
}

#[test]
fn parses_escaped_keys() {
    let pairs = headers::parse(r#""a\"b"="c""#).unwrap();
    assert_eq!(pairs, vec![("a\"b".to_string(), HeaderValue::from("c"))]);
}

#[test]
fn parses_numbers_without_floats() {
    let pairs = headers::parse(r#""a"=-7,"b"=0.1,"c"=99999999999999999999"#).unwrap();
    assert_eq!(pairs[0].1, HeaderValue::Int(-7));
    assert_eq!(pairs[1].1, HeaderValue::Decimal(Decimal::new(1, 1)));
    assert!(matches!(pairs[2].1, HeaderValue::Decimal(_)));
}

#[test]
fn keeps_duplicate_keys() {
    let pairs = headers::parse(r#""a"=1,"a"=2"#).unwrap();
    assert_eq!(pairs.len(), 2);
}

#[test]
fn reports_what_was_expected() {
    let cases = [
        (r#""x"="#, "Expected value after \"x\"= but was end of input"),
        (r#""x""#, "Expected equals after \"x\" but was end of input"),
        (r#""x",1"#, "Expected equals after \"x\" but was ','"),
        ("1=2", "Expected a string for key but was number 1"),
        (r#""x"=1"y"=2"#, "Expected comma but was string \"y\""),
        (r#""x"=1,"#, "Expected a string for key but was end of input"),
        (r#""x"=="#, "Expected value after \"x\"= but was '='"),
    ];
    for (input, message) in cases {
        let err = headers::parse(input).unwrap_err();
        assert_eq!(err.message, message, "{input}");
    }
}

#[test]
fn decode_ignores_byte_order_mark() {
    let pairs = headers::decode(b"\xEF\xBB\xBF\"first\"=true").unwrap();
    assert_eq!(pairs, vec![("first".to_string(), HeaderValue::Bool(true))]);
}

#[test]
fn decode_rejects_invalid_utf8() {
    assert!(headers::decode(b"\"a\"=\"\xFF\"").is_err());
}

// ============================================================================
// Encoder
// ============================================================================

#[test]
fn encodes_content_type() {
    let mut h = Headers::new();
    h.set_content_type(Some(content_types::JSON));
    assert_eq!(headers::encode(&h), r#""ContentType"="application/json""#);
}

#[test]
fn never_encodes_priority_or_time_to_live() {
    let mut h = Headers::new();
    h.set_priority(Some(3)).unwrap();
    h.set_time_to_live(Some(Duration::from_secs(300)));
    assert_eq!(headers::encode(&h), "");

    h.insert("hello", "world");
    assert_eq!(headers::encode(&h), r#""hello"="world""#);
}

#[test]
fn encodes_each_value_type() {
    let h: Headers = [
        ("s", HeaderValue::from("a\"b\\c")),
        ("i", HeaderValue::from(-42)),
        ("d", HeaderValue::from(Decimal::new(1250, 2))),
        ("t", HeaderValue::from(true)),
        ("f", HeaderValue::from(false)),
        ("n", HeaderValue::Null),
        ("u", HeaderValue::from(url("msmq://host/queue"))),
        ("ttl", HeaderValue::from(Duration::from_secs(90))),
    ]
    .into_iter()
    .collect();

    assert_eq!(
        headers::encode(&h),
        r#""s"="a\"b\\c","i"=-42,"d"=12.50,"t"=true,"f"=false,"n"=null,"u"="msmq://host/queue","ttl"="00:01:30""#
    );
}

#[test]
fn headers_equality_ignores_order() {
    let a: Headers = [("x", 1), ("y", 2)].into_iter().collect();
    let b: Headers = [("y", 2), ("x", 1)].into_iter().collect();
    assert_eq!(a, b);
}

// ============================================================================
// Round Trip
// ============================================================================

fn value_strategy() -> impl Strategy<Value = HeaderValue> {
    prop_oneof![
        ".*".prop_map(HeaderValue::String),
        any::<i64>().prop_map(HeaderValue::Int),
        (any::<i64>(), 1u32..=8).prop_map(|(m, scale)| HeaderValue::Decimal(Decimal::new(m, scale))),
        any::<bool>().prop_map(HeaderValue::Bool),
        Just(HeaderValue::Null),
    ]
}

fn key_strategy() -> impl Strategy<Value = String> {
    ".*".prop_filter("reserved key", |k| k != headers::PRIORITY && k != headers::TIME_TO_LIVE)
}

proptest! {
    #[test]
    fn decode_inverts_encode(pairs in prop::collection::vec((key_strategy(), value_strategy()), 0..12)) {
        let original = Headers::from_pairs(pairs);
        let encoded = headers::encode_to_vec(&original);
        let decoded = Headers::from_pairs(headers::decode(&encoded).unwrap());
        prop_assert_eq!(decoded, original);
    }
}
