use lazy_static::lazy_static;
use regex::{Matches, Regex};

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"[\p{L}\p{N}_]+").expect("valid regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Separator,
}

/// A slice of the source text with its starting offset counted in characters.
/// Word tokens carry lowercased text; separators carry the original slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub offset: usize,
}

impl Token {
    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Word
    }
}

/// Lazy token stream over a borrowed text. Call [`tokenize`] again to restart.
#[derive(Debug)]
pub struct Tokens<'t> {
    text: &'t str,
    matches: Matches<'static, 't>,
    // byte and char position of the end of the last emitted token
    byte_pos: usize,
    char_pos: usize,
    pending: Option<(usize, usize)>,
}

/// Split text into alternating word and separator tokens. Never fails; empty
/// input yields nothing.
pub fn tokenize(text: &str) -> Tokens<'_> {
    Tokens {
        text,
        matches: WORD_RE.find_iter(text),
        byte_pos: 0,
        char_pos: 0,
        pending: None,
    }
}

/// Only the word tokens, as `(lowercased word, char offset)` pairs.
pub fn words(text: &str) -> impl Iterator<Item = (String, usize)> + '_ {
    tokenize(text).filter(Token::is_word).map(|t| (t.text, t.offset))
}

impl<'t> Tokens<'t> {
    fn emit(&mut self, kind: TokenKind, start: usize, end: usize) -> Token {
        let text = self.text;
        let slice = &text[start..end];
        let offset = self.char_pos;
        self.char_pos += slice.chars().count();
        self.byte_pos = end;
        let text = match kind {
            TokenKind::Word => slice.to_lowercase(),
            TokenKind::Separator => slice.to_string(),
        };
        Token { kind, text, offset }
    }
}

impl<'t> Iterator for Tokens<'t> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if let Some((start, end)) = self.pending.take() {
            return Some(self.emit(TokenKind::Word, start, end));
        }
        match self.matches.next() {
            Some(m) if m.start() > self.byte_pos => {
                self.pending = Some((m.start(), m.end()));
                let from = self.byte_pos;
                Some(self.emit(TokenKind::Separator, from, m.start()))
            }
            Some(m) => Some(self.emit(TokenKind::Word, m.start(), m.end())),
            None if self.byte_pos < self.text.len() => {
                let (from, to) = (self.byte_pos, self.text.len());
                Some(self.emit(TokenKind::Separator, from, to))
            }
            None => None,
        }
    }
}
