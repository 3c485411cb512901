//! Scanner for the twine language
//!
//! A deterministic finite-state machine over the raw character stream.
//! Keywords are recognized by dedicated per-prefix states; a branch that
//! sees a non-matching letter or digit falls back to the identifier state,
//! so `strings` is one identifier rather than a keyword and a tail. The
//! machine keeps at most one character of pushback; the end of input is
//! modeled as a NUL sentinel, which makes the end-of-file token idempotent.

use crate::token::{Token, TokenKind};
use twine_error::{ErrorCode, LexicalError};

/// Scanner states. `Begin` dispatches on the first character of a token;
/// the prefix states spell out the reserved words `string`, `start`,
/// `else`, `end`, `while`, `if` and `do`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Begin,
    // operators with a two-character continuation
    Less,
    Greater,
    Assign,
    // `s` -> `st` -> { `str`..`string`, `sta`..`start` }
    S,
    St,
    Str,
    Stri,
    Strin,
    KwString,
    Sta,
    Star,
    KwStart,
    // `e` -> { `el`..`else`, `en`..`end` }
    E,
    El,
    Els,
    KwElse,
    En,
    KwEnd,
    // `w` -> `wh` -> `whi` -> `whil` -> `while`
    W,
    Wh,
    Whi,
    Whil,
    KwWhile,
    // `i` -> `if`
    I,
    KwIf,
    // `d` -> `do`
    D,
    KwDo,
    Ident,
    Number,
    StrBody,
}

/// End-of-input sentinel. The accepted character set excludes NUL, so the
/// sentinel can never collide with real input.
const EOF_CH: char = '\0';

const fn is_digit(ch: char) -> bool {
    ch.is_ascii_digit()
}

const fn is_letter(ch: char) -> bool {
    ch.is_ascii_lowercase()
}

/// The twine language scanner
pub struct Lexer {
    /// Source characters
    chars: Vec<char>,
    /// Offset of the next character to read
    offset: usize,
    /// Character most recently read
    current: char,
    /// Single pushback slot
    pushback: Option<char>,
    /// Text of the token being accumulated
    buf: String,
    /// Current machine state
    state: State,
}

impl Lexer {
    /// Creates a new scanner for the given source text
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            offset: 0,
            current: EOF_CH,
            pushback: None,
            buf: String::new(),
            state: State::Begin,
        }
    }

    /// Reads the next character, taking the pushback slot first
    fn read(&mut self) -> char {
        let ch = match self.pushback.take() {
            Some(ch) => ch,
            None => self.chars.get(self.offset).copied().unwrap_or(EOF_CH),
        };
        self.current = ch;
        self.offset += 1;
        self.buf.push(ch);
        ch
    }

    /// Pushes the current character back. The machine never needs more
    /// than one character of lookahead; a second pushback before the
    /// first is consumed is an internal invariant violation.
    fn back(&mut self) {
        assert!(
            self.pushback.is_none(),
            "going back more than 1 character is unsupported"
        );
        assert!(self.offset > 0, "no character has been read yet");
        assert!(!self.buf.is_empty(), "token buffer is empty, can't go back");
        self.offset -= 1;
        self.pushback = Some(self.current);
        self.buf.pop();
    }

    /// Finishes the accumulated token and resets the machine
    fn emit(&mut self, kind: TokenKind) -> Token {
        let text = std::mem::take(&mut self.buf);
        let position = self.offset - text.chars().count();
        self.state = State::Begin;
        Token::new(kind, text, position)
    }

    /// Error anchored at the character most recently read
    fn error(&self, code: ErrorCode, message: &str) -> LexicalError {
        LexicalError::new(self.offset.saturating_sub(1), message).with_code(code)
    }

    /// Scans the next token. After the end of input has been reached,
    /// every further call returns the end-of-file token again.
    pub fn next_token(&mut self) -> Result<Token, LexicalError> {
        loop {
            let ch = self.read();
            match self.state {
                State::Begin => match ch {
                    EOF_CH => {
                        self.back();
                        return Ok(self.emit(TokenKind::EndOfFile));
                    }
                    ' ' | '\t' | '\n' | '\r' => {
                        self.buf.pop();
                    }
                    '(' => return Ok(self.emit(TokenKind::LeftBracket)),
                    ')' => return Ok(self.emit(TokenKind::RightBracket)),
                    ';' => return Ok(self.emit(TokenKind::Semicolon)),
                    ',' => return Ok(self.emit(TokenKind::Comma)),
                    '+' => return Ok(self.emit(TokenKind::OpConcat)),
                    '*' => return Ok(self.emit(TokenKind::OpRepeat)),
                    '<' => self.state = State::Less,
                    '>' => self.state = State::Greater,
                    '=' => self.state = State::Assign,
                    's' => self.state = State::S,
                    'e' => self.state = State::E,
                    'w' => self.state = State::W,
                    'i' => self.state = State::I,
                    'd' => self.state = State::D,
                    '"' => self.state = State::StrBody,
                    c if is_digit(c) => self.state = State::Number,
                    c if is_letter(c) => self.state = State::Ident,
                    _ => {
                        return Err(
                            self.error(ErrorCode::UNRECOGNIZED_CHAR, "Unrecognized character")
                        )
                    }
                },

                State::Less => match ch {
                    '>' => return Ok(self.emit(TokenKind::OpNotEqual)),
                    '=' => return Ok(self.emit(TokenKind::OpLessEqual)),
                    _ => {
                        self.back();
                        return Ok(self.emit(TokenKind::OpLess));
                    }
                },

                State::Greater => match ch {
                    '=' => return Ok(self.emit(TokenKind::OpGreaterEqual)),
                    _ => {
                        self.back();
                        return Ok(self.emit(TokenKind::OpGreater));
                    }
                },

                State::Assign => match ch {
                    '=' => return Ok(self.emit(TokenKind::OpEqual)),
                    _ => {
                        self.back();
                        return Ok(self.emit(TokenKind::OpAssignment));
                    }
                },

                State::S => self.keyword_step(ch, &[('t', State::St)]),
                State::St => self.keyword_step(ch, &[('r', State::Str), ('a', State::Sta)]),
                State::Str => self.keyword_step(ch, &[('i', State::Stri)]),
                State::Stri => self.keyword_step(ch, &[('n', State::Strin)]),
                State::Strin => self.keyword_step(ch, &[('g', State::KwString)]),
                State::KwString => {
                    if let Some(token) = self.keyword_accept(ch, TokenKind::KeywordString) {
                        return Ok(token);
                    }
                }

                State::Sta => self.keyword_step(ch, &[('r', State::Star)]),
                State::Star => self.keyword_step(ch, &[('t', State::KwStart)]),
                State::KwStart => {
                    if let Some(token) = self.keyword_accept(ch, TokenKind::KeywordStart) {
                        return Ok(token);
                    }
                }

                State::E => self.keyword_step(ch, &[('l', State::El), ('n', State::En)]),
                State::El => self.keyword_step(ch, &[('s', State::Els)]),
                State::Els => self.keyword_step(ch, &[('e', State::KwElse)]),
                State::KwElse => {
                    if let Some(token) = self.keyword_accept(ch, TokenKind::KeywordElse) {
                        return Ok(token);
                    }
                }

                State::En => self.keyword_step(ch, &[('d', State::KwEnd)]),
                State::KwEnd => {
                    if let Some(token) = self.keyword_accept(ch, TokenKind::KeywordEnd) {
                        return Ok(token);
                    }
                }

                State::W => self.keyword_step(ch, &[('h', State::Wh)]),
                State::Wh => self.keyword_step(ch, &[('i', State::Whi)]),
                State::Whi => self.keyword_step(ch, &[('l', State::Whil)]),
                State::Whil => self.keyword_step(ch, &[('e', State::KwWhile)]),
                State::KwWhile => {
                    if let Some(token) = self.keyword_accept(ch, TokenKind::KeywordWhile) {
                        return Ok(token);
                    }
                }

                State::I => self.keyword_step(ch, &[('f', State::KwIf)]),
                State::KwIf => {
                    if let Some(token) = self.keyword_accept(ch, TokenKind::KeywordIf) {
                        return Ok(token);
                    }
                }

                State::D => self.keyword_step(ch, &[('o', State::KwDo)]),
                State::KwDo => {
                    if let Some(token) = self.keyword_accept(ch, TokenKind::KeywordDo) {
                        return Ok(token);
                    }
                }

                State::Ident => {
                    if !is_letter(ch) && !is_digit(ch) {
                        self.back();
                        return Ok(self.emit(TokenKind::Identifier));
                    }
                }

                State::Number => {
                    if !is_digit(ch) {
                        self.back();
                        return Ok(self.emit(TokenKind::Number));
                    }
                }

                State::StrBody => match ch {
                    '"' => return Ok(self.emit(TokenKind::Str)),
                    c if is_letter(c) => {}
                    _ => {
                        return Err(self.error(
                            ErrorCode::BAD_STRING_CHAR,
                            "Unexpected character in string",
                        ))
                    }
                },
            }
        }
    }

    /// One transition inside a keyword prefix: follow a matching
    /// continuation, degrade to an identifier on any other letter or
    /// digit, otherwise the identifier ends here.
    fn keyword_step(&mut self, ch: char, next: &[(char, State)]) {
        if let Some((_, state)) = next.iter().find(|(c, _)| *c == ch) {
            self.state = *state;
        } else if is_letter(ch) || is_digit(ch) {
            self.state = State::Ident;
        } else {
            self.back();
            self.state = State::Ident;
        }
    }

    /// Transition out of a keyword accept state: a further letter or
    /// digit turns the whole lexeme into an identifier (maximal munch),
    /// anything else finishes the keyword.
    fn keyword_accept(&mut self, ch: char, kind: TokenKind) -> Option<Token> {
        if is_letter(ch) || is_digit(ch) {
            self.state = State::Ident;
            None
        } else {
            self.back();
            Some(self.emit(kind))
        }
    }
}

/// Scans the entire source, returning all tokens up to and including the
/// end-of-file token
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexicalError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();

    loop {
        let token = lexer.next_token()?;
        let is_eof = token.is_eof();
        tokens.push(token);

        if is_eof {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lex(source: &str) -> Vec<(TokenKind, String)> {
        tokenize(source)
            .expect("source should scan")
            .into_iter()
            .filter(|t| !t.is_eof())
            .map(|t| (t.kind, t.text))
            .collect()
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).into_iter().map(|(kind, _)| kind).collect()
    }

    #[test]
    fn test_punctuation_and_operators() {
        assert_eq!(
            kinds("( ) ; , + * < <> <= > >= = =="),
            vec![
                TokenKind::LeftBracket,
                TokenKind::RightBracket,
                TokenKind::Semicolon,
                TokenKind::Comma,
                TokenKind::OpConcat,
                TokenKind::OpRepeat,
                TokenKind::OpLess,
                TokenKind::OpNotEqual,
                TokenKind::OpLessEqual,
                TokenKind::OpGreater,
                TokenKind::OpGreaterEqual,
                TokenKind::OpAssignment,
                TokenKind::OpEqual,
            ]
        );
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            kinds("string start else end while if do"),
            vec![
                TokenKind::KeywordString,
                TokenKind::KeywordStart,
                TokenKind::KeywordElse,
                TokenKind::KeywordEnd,
                TokenKind::KeywordWhile,
                TokenKind::KeywordIf,
                TokenKind::KeywordDo,
            ]
        );
    }

    #[test]
    fn test_keyword_prefixes_degrade_to_identifiers() {
        // every proper prefix and extension of a keyword is an identifier
        assert_eq!(
            lex("str sta star whil ifx strings do1"),
            vec![
                (TokenKind::Identifier, "str".to_string()),
                (TokenKind::Identifier, "sta".to_string()),
                (TokenKind::Identifier, "star".to_string()),
                (TokenKind::Identifier, "whil".to_string()),
                (TokenKind::Identifier, "ifx".to_string()),
                (TokenKind::Identifier, "strings".to_string()),
                (TokenKind::Identifier, "do1".to_string()),
            ]
        );
    }

    #[test]
    fn test_adjacent_operators() {
        // `<` followed by something that is not `>` or `=` stays plain less
        assert_eq!(
            kinds("a<b"),
            vec![
                TokenKind::Identifier,
                TokenKind::OpLess,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn test_numbers_are_maximal_digit_runs() {
        assert_eq!(
            lex("0 42 007"),
            vec![
                (TokenKind::Number, "0".to_string()),
                (TokenKind::Number, "42".to_string()),
                (TokenKind::Number, "007".to_string()),
            ]
        );
    }

    #[test]
    fn test_string_literal_keeps_quotes() {
        assert_eq!(
            lex(r#""abc" """#),
            vec![
                (TokenKind::Str, "\"abc\"".to_string()),
                (TokenKind::Str, "\"\"".to_string()),
            ]
        );
    }

    #[test]
    fn test_unterminated_string_is_an_error() {
        let err = tokenize("\"abc").unwrap_err();
        assert_eq!(err.position, 4);
        assert_eq!(err.message, "Unexpected character in string");
    }

    #[test]
    fn test_digit_inside_string_is_an_error() {
        let err = tokenize("\"ab1\"").unwrap_err();
        assert_eq!(err.position, 3);
    }

    #[test]
    fn test_unrecognized_character() {
        let err = tokenize("a = #").unwrap_err();
        assert_eq!(err.position, 4);
        assert_eq!(err.message, "Unrecognized character");
    }

    #[test]
    fn test_token_positions() {
        let tokens = tokenize("ab = \"cd\";").expect("source should scan");
        let positions: Vec<(TokenKind, usize)> =
            tokens.iter().map(|t| (t.kind, t.position)).collect();
        assert_eq!(
            positions,
            vec![
                (TokenKind::Identifier, 0),
                (TokenKind::OpAssignment, 3),
                (TokenKind::Str, 5),
                (TokenKind::Semicolon, 9),
                (TokenKind::EndOfFile, 10),
            ]
        );
    }

    #[test]
    fn test_eof_is_idempotent() {
        let mut lexer = Lexer::new("a");
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Identifier);
        for _ in 0..3 {
            let token = lexer.next_token().unwrap();
            assert_eq!(token.kind, TokenKind::EndOfFile);
            assert_eq!(token.position, 1);
        }
    }
}
