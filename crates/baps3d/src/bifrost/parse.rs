//! Tokenizer and parser for Bifrost lines.
//!
//! Word splitting follows POSIX shell single-quote rules: whitespace separates
//! words, `'...'` quotes everything up to the next `'`, and a backslash outside
//! quotes escapes the following character. Adjacent segments concatenate.

use super::message::Message;

/// Errors produced when turning a line into a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("dangling escape at end of line")]
    DanglingEscape,
    #[error("message too short: expected origin and verb, got {0} word(s)")]
    TooShort(usize),
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    Quoted,
    Escaped,
}

/// Accumulates one word; `started` distinguishes `''` from no word at all.
#[derive(Default)]
struct Word {
    text: String,
    started: bool,
}

impl Word {
    fn push(&mut self, c: char) {
        self.text.push(c);
        self.started = true;
    }

    fn finish(&mut self, words: &mut Vec<String>) {
        if self.started {
            words.push(std::mem::take(&mut self.text));
            self.started = false;
        }
    }
}

/// Splits a single line into words.
pub fn tokenize(line: &str) -> Result<Vec<String>, ParseError> {
    let mut words = Vec::new();
    let mut word = Word::default();
    let mut state = State::Normal;

    for c in line.chars() {
        state = match state {
            State::Normal => match c {
                '\'' => {
                    word.started = true;
                    State::Quoted
                }
                '\\' => State::Escaped,
                c if c.is_whitespace() => {
                    word.finish(&mut words);
                    State::Normal
                }
                c => {
                    word.push(c);
                    State::Normal
                }
            },
            State::Quoted => {
                if c == '\'' {
                    State::Normal
                } else {
                    word.push(c);
                    State::Quoted
                }
            }
            State::Escaped => {
                word.push(c);
                State::Normal
            }
        };
    }

    match state {
        State::Normal => {
            word.finish(&mut words);
            Ok(words)
        }
        State::Quoted => Err(ParseError::UnterminatedQuote),
        State::Escaped => Err(ParseError::DanglingEscape),
    }
}

/// Builds a message from already-split words.
pub fn parse<I>(words: I) -> Result<Message, ParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut words = words.into_iter();
    match (words.next(), words.next()) {
        (Some(origin), Some(verb)) => Ok(Message::new(origin, verb).with_args(words)),
        (Some(_), None) => Err(ParseError::TooShort(1)),
        _ => Err(ParseError::TooShort(0)),
    }
}

pub fn line_to_message(line: &str) -> Result<Message, ParseError> {
    parse(tokenize(line)?)
}
