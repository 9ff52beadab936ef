use super::*;
use crate::event::Tag;

struct VecTokenizer {
    tokens: std::vec::IntoIter<Token>,
}

impl VecTokenizer {
    fn new(tokens: Vec<Token>) -> VecTokenizer {
        VecTokenizer { tokens: tokens.into_iter() }
    }
}

impl Tokenizer for VecTokenizer {
    fn next_token(&mut self) -> Result<Option<Token>> {
        Ok(self.tokens.next())
    }
}

fn decode_all(tokens: Vec<Token>) -> Vec<Event> {
    let mut dec = Decoder::new(VecTokenizer::new(tokens));
    let mut out = vec![];
    while let Some(e) = dec.next_event().unwrap() {
        out.push(e);
    }
    out
}

#[test]
fn test_object_with_string_key_and_value() {
    let events = decode_all(vec![
        Token::LBrace,
        Token::Ident("name".to_string()),
        Token::Colon,
        Token::Str("alice".to_string()),
        Token::Comma,
        Token::RBrace,
    ]);
    assert_eq!(
        events,
        vec![
            Event::BeginObject(None),
            Event::Key("name".to_string()),
            Event::String("alice".to_string(), None),
            Event::EndObject,
        ]
    );
}

#[test]
fn test_int_key_vs_int_value_disambiguation() {
    let events = decode_all(vec![
        Token::LBrace,
        Token::Int(0),
        Token::Colon,
        Token::Int(42),
        Token::RBrace,
    ]);
    assert_eq!(
        events,
        vec![Event::BeginObject(None), Event::IntKey(0), Event::Int(42, None), Event::EndObject]
    );
}

#[test]
fn test_bare_int_array_value_not_mistaken_for_key() {
    let events = decode_all(vec![
        Token::LBracket,
        Token::Int(1),
        Token::Comma,
        Token::Int(2),
        Token::RBracket,
    ]);
    assert_eq!(
        events,
        vec![Event::BeginArray(None), Event::Int(1, None), Event::Int(2, None), Event::EndArray]
    );
}

#[test]
fn test_tag_folds_onto_following_value() {
    let events = decode_all(vec![
        Token::Tag("point".to_string(), vec!["3".to_string()]),
        Token::LBrace,
        Token::RBrace,
    ]);
    assert_eq!(
        events,
        vec![Event::BeginObject(Some(Tag::with_args("point", vec!["3".to_string()]))), Event::EndObject]
    );
}

#[test]
fn test_double_tag_is_an_error() {
    let mut dec = Decoder::new(VecTokenizer::new(vec![
        Token::Tag("a".to_string(), vec![]),
        Token::Tag("b".to_string(), vec![]),
        Token::Null,
    ]));
    assert!(dec.next_event().is_err());
}

#[test]
fn test_ambiguous_eof_after_peek_is_end_of_document() {
    // a bare string token with nothing after it: the colon-peek hits EOF,
    // which resolves to end-of-document rather than emitting a value.
    let mut dec = Decoder::new(VecTokenizer::new(vec![Token::Ident("dangling".to_string())]));
    assert_eq!(dec.next_event().unwrap(), None);
}

#[test]
fn test_comments_pass_through() {
    let events = decode_all(vec![Token::HeadComment(vec!["hi".to_string()]), Token::Int(1)]);
    assert_eq!(events[0], Event::HeadComment(vec!["hi".to_string()]));
    assert_eq!(events[1], Event::Int(1, None));
}
