//! Bifrost message value type and serializer.

use std::fmt;

/// A single Bifrost message: origin, verb, and zero or more arguments.
///
/// Origin and verb are emitted verbatim by [`Message::pack`], so they must not
/// contain whitespace or quote characters. Arguments may hold anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    origin: String,
    verb: String,
    args: Vec<String>,
}

impl Message {
    pub fn new(origin: impl Into<String>, verb: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            verb: verb.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument, returning the extended message.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Packs the message into a newline-terminated wire line.
    pub fn pack(&self) -> Vec<u8> {
        let mut line = self.to_string();
        line.push('\n');
        line.into_bytes()
    }
}

/// Renders the wire form of the message without the trailing newline.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.origin, self.verb)?;
        for arg in &self.args {
            f.write_str(" ")?;
            write_arg(f, arg)?;
        }
        Ok(())
    }
}

/// Characters the tokenizer treats specially outside whitespace.
///
/// Backslash is included so that a bare argument never contains an escape.
const QUOTE_CHARS: [char; 3] = ['\'', '"', '\\'];

pub(crate) fn needs_quoting(arg: &str) -> bool {
    arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || QUOTE_CHARS.contains(&c))
}

fn write_arg(f: &mut fmt::Formatter<'_>, arg: &str) -> fmt::Result {
    if !needs_quoting(arg) {
        return f.write_str(arg);
    }

    f.write_str("'")?;
    for c in arg.chars() {
        if c == '\'' {
            // Close, escaped literal quote, reopen.
            f.write_str(r"'\''")?;
        } else {
            write!(f, "{c}")?;
        }
    }
    f.write_str("'")
}
