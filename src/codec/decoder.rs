use crate::{
    codec::token::{Token, Tokenizer},
    event::{Event, Tag},
    Result,
};

/// Folds a [Tokenizer]'s output into an [Event] stream.
///
/// Structural tokens (commas, colons, indentation) are elided. A string or
/// bare-identifier token may be either a key or a string value — it is
/// reclassified by peeking at the next token: followed by a colon, it is a
/// key; otherwise a value. The same rule reclassifies an integer token as
/// an int-key or an int value. Peeked tokens are pushed back onto a
/// one-deep lookahead buffer.
pub struct Decoder<T> {
    tok: T,
    pushback: Option<Token>,
    pending_tag: Option<Tag>,
}

impl<T: Tokenizer> Decoder<T> {
    pub fn new(tok: T) -> Decoder<T> {
        Decoder { tok, pushback: None, pending_tag: None }
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        match self.pushback.take() {
            Some(t) => Ok(Some(t)),
            None => self.tok.next_token(),
        }
    }

    fn push_back(&mut self, t: Token) {
        self.pushback = Some(t);
    }

    fn take_tag(&mut self) -> Option<Tag> {
        self.pending_tag.take()
    }

    /// Peek one token ahead to decide whether `raw` is a key (colon
    /// follows) or a value. On EOF mid-peek, the ambiguity resolves to
    /// end-of-document rather than an error: the caller sees a clean
    /// `Ok(None)` and the pending scalar is dropped, uncommitted.
    fn classify(&mut self) -> Result<Classify> {
        match self.next_token()? {
            Some(Token::Colon) => Ok(Classify::Key),
            Some(other) => {
                self.push_back(other);
                Ok(Classify::Value)
            }
            None => Ok(Classify::EndOfDocument),
        }
    }

    /// Return the next [Event], or `None` once the tokenizer is exhausted.
    pub fn next_event(&mut self) -> Result<Option<Event>> {
        loop {
            let tok = match self.next_token()? {
                Some(t) => t,
                None => return Ok(None),
            };

            return Ok(Some(match tok {
                Token::Comma => continue,
                Token::Colon => {
                    return err_at!(AmbiguousStream, msg: "unexpected standalone colon")
                }
                Token::HeadComment(lines) => Event::HeadComment(lines),
                Token::LineComment(lines) => Event::LineComment(lines),
                Token::Tag(name, args) => {
                    if self.pending_tag.is_some() {
                        return err_at!(InvariantViolation, msg: "tag already pending");
                    }
                    self.pending_tag = Some(Tag::with_args(name, args));
                    continue;
                }
                Token::LBrace => Event::BeginObject(self.take_tag()),
                Token::RBrace => Event::EndObject,
                Token::LBracket => Event::BeginArray(self.take_tag()),
                Token::RBracket => Event::EndArray,
                Token::Bool(b) => Event::Bool(b, self.take_tag()),
                Token::Null => Event::Null(self.take_tag()),
                Token::Float(f) => Event::Float(f, self.take_tag()),
                Token::Int(n) => match self.classify()? {
                    Classify::Key => Event::IntKey(n),
                    Classify::Value => Event::Int(n, self.take_tag()),
                    Classify::EndOfDocument => return Ok(None),
                },
                Token::Ident(s) | Token::Str(s) => match self.classify()? {
                    Classify::Key => Event::Key(s),
                    Classify::Value => Event::String(s, self.take_tag()),
                    Classify::EndOfDocument => return Ok(None),
                },
            }));
        }
    }
}

impl<T: Tokenizer> Iterator for Decoder<T> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

enum Classify {
    Key,
    Value,
    EndOfDocument,
}

#[cfg(test)]
#[path = "decoder_test.rs"]
mod decoder_test;
