//! Tokenizer for Quartz source text.
//!
//! Strict: the first error aborts the scan and becomes the result. Handles a
//! leading shebang, line and block comments, longest-match punctuators,
//! binary/hex numerics with grouping underscores and e/p exponents, escaped
//! double-quoted strings, raw single-quoted strings, and lex-time
//! concatenation of adjacent string literals.

use crate::compiler::errors::{ParseError, ParseErrorCode};
use crate::compiler::reader::{decode_source, Sch};
use crate::compiler::tokens::{Keyword, Punct, Span, Token, TokenKind};
use once_cell::sync::Lazy;
use std::str::FromStr;

/// Longest-match table, ordered by spelling length descending.
static PUNCTUATORS: Lazy<Vec<(&'static str, Punct)>> = Lazy::new(|| {
    vec![
        ("<<<=", Punct::SllEq),
        (">>>=", Punct::SrlEq),
        ("<<<", Punct::Sll),
        (">>>", Punct::Srl),
        ("<<=", Punct::SlaEq),
        (">>=", Punct::SraEq),
        ("<=>", Punct::Cmp3Way),
        ("&&=", Punct::AndLEq),
        ("||=", Punct::OrLEq),
        ("??=", Punct::CoalesEq),
        ("+=", Punct::AddEq),
        ("-=", Punct::SubEq),
        ("*=", Punct::MulEq),
        ("/=", Punct::DivEq),
        ("%=", Punct::ModEq),
        ("++", Punct::Inc),
        ("--", Punct::Dec),
        ("<<", Punct::Sla),
        (">>", Punct::Sra),
        ("&&", Punct::AndL),
        ("||", Punct::OrL),
        ("&=", Punct::AndBEq),
        ("|=", Punct::OrBEq),
        ("^=", Punct::XorBEq),
        ("==", Punct::CmpEq),
        ("!=", Punct::CmpNe),
        ("<=", Punct::CmpLte),
        (">=", Punct::CmpGte),
        ("?=", Punct::QuestEq),
        ("??", Punct::Coales),
        ("+", Punct::Add),
        ("-", Punct::Sub),
        ("*", Punct::Mul),
        ("/", Punct::Div),
        ("%", Punct::Mod),
        ("&", Punct::AndB),
        ("|", Punct::OrB),
        ("^", Punct::XorB),
        ("~", Punct::NotB),
        ("!", Punct::NotL),
        ("=", Punct::Assign),
        ("<", Punct::CmpLt),
        (">", Punct::CmpGt),
        ("?", Punct::Quest),
        (".", Punct::Dot),
        (",", Punct::Comma),
        (":", Punct::Colon),
        (";", Punct::Semicolon),
        ("(", Punct::ParenOp),
        (")", Punct::ParenCl),
        ("[", Punct::BracketOp),
        ("]", Punct::BracketCl),
        ("{", Punct::BraceOp),
        ("}", Punct::BraceCl),
    ]
});

pub struct Lexer {
    chars: Vec<Sch>,
    pos: usize,
}

impl Lexer {
    pub fn new(source: &[u8]) -> Result<Self, ParseError> {
        let mut chars = decode_source(source)?;
        // A leading `#!` line belongs to the host, not the language.
        if chars.len() >= 2 && chars[0].ch == '#' && chars[1].ch == '!' {
            let end = chars
                .iter()
                .position(|sch| sch.ch == '\n')
                .map(|i| i + 1)
                .unwrap_or(chars.len());
            chars.drain(..end);
        }
        Ok(Lexer { chars, pos: 0 })
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens: Vec<Token> = Vec::new();
        while let Some(sch) = self.current() {
            let ch = sch.ch;
            if ch.is_whitespace() {
                self.pos += 1;
                continue;
            }
            if ch == '/' && self.peek_ch(1) == Some('/') {
                while let Some(sch) = self.current() {
                    if sch.ch == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
                continue;
            }
            if ch == '/' && self.peek_ch(1) == Some('*') {
                self.skip_block_comment()?;
                continue;
            }
            if ch.is_ascii_alphabetic() || ch == '_' {
                tokens.push(self.scan_word());
                continue;
            }
            if ch.is_ascii_digit() {
                tokens.push(self.scan_number()?);
                continue;
            }
            if ch == '"' || ch == '\'' {
                let token = self.scan_string(ch)?;
                // Adjacent string literals concatenate at lex time.
                if let (Some(Token { kind: TokenKind::StrLit(prev), .. }), TokenKind::StrLit(next)) =
                    (tokens.last_mut(), &token.kind)
                {
                    prev.push_str(next);
                    continue;
                }
                tokens.push(token);
                continue;
            }
            if let Some(token) = self.scan_punctuator() {
                tokens.push(token);
                continue;
            }
            return Err(self.error_here(ch.len_utf8(), ParseErrorCode::CharacterUnrecognized));
        }
        Ok(tokens)
    }

    fn current(&self) -> Option<Sch> {
        self.chars.get(self.pos).copied()
    }

    fn peek_ch(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|sch| sch.ch)
    }

    fn error_here(&self, length: usize, code: ParseErrorCode) -> ParseError {
        match self.current().or_else(|| self.chars.last().copied()) {
            Some(sch) => ParseError::new(sch.line, sch.offset, length.max(1), code),
            None => ParseError::new(1, 0, length.max(1), code),
        }
    }

    fn error_at(&self, start: Sch, length: usize, code: ParseErrorCode) -> ParseError {
        ParseError::new(start.line, start.offset, length.max(1), code)
    }

    fn skip_block_comment(&mut self) -> Result<(), ParseError> {
        let open = self.current().unwrap();
        self.pos += 2;
        while let Some(sch) = self.current() {
            if sch.ch == '*' && self.peek_ch(1) == Some('/') {
                self.pos += 2;
                return Ok(());
            }
            self.pos += 1;
        }
        Err(self.error_at(open, 2, ParseErrorCode::BlockCommentUnclosed))
    }

    fn scan_word(&mut self) -> Token {
        let start = self.current().unwrap();
        let mut name = String::new();
        while let Some(sch) = self.current() {
            if sch.ch.is_ascii_alphanumeric() || sch.ch == '_' {
                name.push(sch.ch);
                self.pos += 1;
            } else {
                break;
            }
        }
        let span = Span::new(start.line, start.offset, name.len());
        match Keyword::from_str(&name) {
            Ok(keyword) => Token::new(TokenKind::Keyword(keyword), span),
            Err(_) => Token::new(TokenKind::Ident(name), span),
        }
    }

    fn scan_punctuator(&mut self) -> Option<Token> {
        let start = self.current()?;
        for (spelling, punct) in PUNCTUATORS.iter() {
            let len = spelling.len();
            let matches = spelling
                .chars()
                .enumerate()
                .all(|(i, expect)| self.peek_ch(i) == Some(expect));
            if matches {
                self.pos += spelling.chars().count();
                return Some(Token::new(
                    TokenKind::Punct(*punct),
                    Span::new(start.line, start.offset, len),
                ));
            }
        }
        None
    }

    fn scan_number(&mut self) -> Result<Token, ParseError> {
        let start = self.current().unwrap();
        let mut length = 0usize;

        let radix: u32 = if self.current().map(|s| s.ch) == Some('0')
            && matches!(self.peek_ch(1), Some('b') | Some('B'))
        {
            self.pos += 2;
            length += 2;
            2
        } else if self.current().map(|s| s.ch) == Some('0')
            && matches!(self.peek_ch(1), Some('x') | Some('X'))
        {
            self.pos += 2;
            length += 2;
            16
        } else {
            10
        };

        let mut int_digits: Vec<u32> = Vec::new();
        length += self.scan_digits(radix, &mut int_digits);
        if int_digits.is_empty() {
            return Err(self.error_at(start, length, ParseErrorCode::NumericLiteralIncomplete));
        }

        let mut frac_digits: Vec<u32> = Vec::new();
        let mut has_frac = false;
        if self.current().map(|s| s.ch) == Some('.')
            && self
                .peek_ch(1)
                .map(|c| c.is_digit(radix))
                .unwrap_or(false)
        {
            has_frac = true;
            self.pos += 1;
            length += 1;
            length += self.scan_digits(radix, &mut frac_digits);
        }

        // e/E scales by powers of ten, p/P by powers of two. In hexadecimal
        // literals `e` is a digit, so only `p` introduces an exponent there.
        let mut exponent: i64 = 0;
        let mut has_exp = false;
        let mut exp_base: i64 = 10;
        match self.current().map(|s| s.ch) {
            Some('e') | Some('E') if radix == 10 => {
                has_exp = true;
            }
            Some('p') | Some('P') => {
                has_exp = true;
                exp_base = 2;
            }
            _ => {}
        }
        if has_exp {
            self.pos += 1;
            length += 1;
            let mut negative = false;
            match self.current().map(|s| s.ch) {
                Some('+') => {
                    self.pos += 1;
                    length += 1;
                }
                Some('-') => {
                    negative = true;
                    self.pos += 1;
                    length += 1;
                }
                _ => {}
            }
            let mut exp_digits: Vec<u32> = Vec::new();
            length += self.scan_digits(10, &mut exp_digits);
            if exp_digits.is_empty() {
                return Err(self.error_at(start, length, ParseErrorCode::NumericLiteralIncomplete));
            }
            for d in exp_digits {
                exponent = exponent.saturating_mul(10).saturating_add(i64::from(d));
            }
            if negative {
                exponent = -exponent;
            }
        }

        // A trailing identifier character would be a suffix, which the
        // language does not have.
        if let Some(sch) = self.current() {
            if sch.ch.is_ascii_alphanumeric() || sch.ch == '_' {
                return Err(self.error_at(
                    start,
                    length + 1,
                    ParseErrorCode::NumericLiteralSuffixDisallowed,
                ));
            }
        }

        let span = Span::new(start.line, start.offset, length);
        if !has_frac && !has_exp {
            let mut value: i64 = 0;
            for d in &int_digits {
                value = value
                    .checked_mul(i64::from(radix))
                    .and_then(|v| v.checked_add(i64::from(*d)))
                    .ok_or_else(|| {
                        self.error_at(start, length, ParseErrorCode::IntegerLiteralOverflow)
                    })?;
            }
            return Ok(Token::new(TokenKind::IntLit(value), span));
        }

        let mut mantissa = 0.0f64;
        let mut significant = false;
        for d in &int_digits {
            mantissa = mantissa * f64::from(radix) + f64::from(*d);
            significant |= *d != 0;
        }
        let mut scale = 1.0f64;
        for d in &frac_digits {
            scale /= f64::from(radix);
            mantissa += f64::from(*d) * scale;
            significant |= *d != 0;
        }
        let clamped = exponent.clamp(-8192, 8192) as i32;
        let value = mantissa * (exp_base as f64).powi(clamped);
        if value.is_infinite() {
            return Err(self.error_at(start, length, ParseErrorCode::RealLiteralOverflow));
        }
        if value == 0.0 && significant {
            return Err(self.error_at(start, length, ParseErrorCode::RealLiteralUnderflow));
        }
        Ok(Token::new(TokenKind::RealLit(value), span))
    }

    /// Consume digits of `radix`, skipping grouping underscores. Returns the
    /// number of bytes consumed.
    fn scan_digits(&mut self, radix: u32, out: &mut Vec<u32>) -> usize {
        let mut length = 0;
        while let Some(sch) = self.current() {
            if sch.ch == '_' {
                self.pos += 1;
                length += 1;
                continue;
            }
            match sch.ch.to_digit(radix) {
                Some(d) => {
                    out.push(d);
                    self.pos += 1;
                    length += 1;
                }
                None => break,
            }
        }
        length
    }

    fn scan_string(&mut self, quote: char) -> Result<Token, ParseError> {
        let start = self.current().unwrap();
        self.pos += 1;
        let mut length = 1usize;
        let mut text = String::new();
        loop {
            let Some(sch) = self.current() else {
                return Err(self.error_at(start, length, ParseErrorCode::StringLiteralUnclosed));
            };
            self.pos += 1;
            length += sch.ch.len_utf8();
            if sch.ch == quote {
                break;
            }
            if quote == '\'' || sch.ch != '\\' {
                // Raw strings take every character verbatim.
                text.push(sch.ch);
                continue;
            }
            self.scan_escape(start, &mut length, &mut text)?;
        }
        Ok(Token::new(
            TokenKind::StrLit(text),
            Span::new(start.line, start.offset, length),
        ))
    }

    fn scan_escape(
        &mut self,
        start: Sch,
        length: &mut usize,
        out: &mut String,
    ) -> Result<(), ParseError> {
        let Some(sch) = self.current() else {
            return Err(self.error_at(start, *length, ParseErrorCode::EscapeSequenceIncomplete));
        };
        self.pos += 1;
        *length += sch.ch.len_utf8();
        match sch.ch {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            '?' => out.push('?'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0C'),
            'v' => out.push('\x0B'),
            '0' => out.push('\0'),
            'e' => out.push('\x1B'),
            'Z' => out.push('\x1A'),
            'x' => self.scan_hex_escape(start, length, 2, out)?,
            'u' => self.scan_hex_escape(start, length, 4, out)?,
            'U' => self.scan_hex_escape(start, length, 8, out)?,
            _ => {
                return Err(self.error_at(start, *length, ParseErrorCode::EscapeSequenceUnknown));
            }
        }
        Ok(())
    }

    fn scan_hex_escape(
        &mut self,
        start: Sch,
        length: &mut usize,
        digits: usize,
        out: &mut String,
    ) -> Result<(), ParseError> {
        let mut cp: u32 = 0;
        for _ in 0..digits {
            let Some(sch) = self.current() else {
                return Err(self.error_at(start, *length, ParseErrorCode::EscapeSequenceIncomplete));
            };
            self.pos += 1;
            *length += 1;
            let Some(d) = sch.ch.to_digit(16) else {
                return Err(self.error_at(start, *length, ParseErrorCode::EscapeSequenceInvalidHex));
            };
            cp = (cp << 4) | d;
        }
        if digits == 2 {
            // \xHH denotes a raw byte value in the 0..=0xFF range.
            out.push(char::from(cp as u8));
            return Ok(());
        }
        match char::from_u32(cp) {
            // from_u32 rejects surrogates and anything past U+10FFFF.
            Some(ch) => {
                out.push(ch);
                Ok(())
            }
            None => Err(self.error_at(start, *length, ParseErrorCode::EscapeCodePointInvalid)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<TokenKind> {
        Lexer::new(src.as_bytes())
            .unwrap()
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn lex_err(src: &str) -> ParseErrorCode {
        Lexer::new(src.as_bytes()).unwrap().tokenize().unwrap_err().code
    }

    #[test]
    fn keywords_and_identifiers() {
        let kinds = lex("var x = null;");
        assert_eq!(kinds[0], TokenKind::Keyword(Keyword::Var));
        assert_eq!(kinds[1], TokenKind::Ident("x".to_string()));
        assert_eq!(kinds[2], TokenKind::Punct(Punct::Assign));
        assert_eq!(kinds[3], TokenKind::Keyword(Keyword::Null));
        assert_eq!(kinds[4], TokenKind::Punct(Punct::Semicolon));
    }

    #[test]
    fn longest_match_punctuators() {
        assert_eq!(
            lex("<<<= <<< <<= << <=> <= <"),
            vec![
                TokenKind::Punct(Punct::SllEq),
                TokenKind::Punct(Punct::Sll),
                TokenKind::Punct(Punct::SlaEq),
                TokenKind::Punct(Punct::Sla),
                TokenKind::Punct(Punct::Cmp3Way),
                TokenKind::Punct(Punct::CmpLte),
                TokenKind::Punct(Punct::CmpLt),
            ]
        );
    }

    #[test]
    fn coalescence_punctuators() {
        assert_eq!(
            lex("?? ??= ? ?="),
            vec![
                TokenKind::Punct(Punct::Coales),
                TokenKind::Punct(Punct::CoalesEq),
                TokenKind::Punct(Punct::Quest),
                TokenKind::Punct(Punct::QuestEq),
            ]
        );
    }

    #[test]
    fn integer_literals_with_radix_and_grouping() {
        assert_eq!(lex("42"), vec![TokenKind::IntLit(42)]);
        assert_eq!(lex("0x2A"), vec![TokenKind::IntLit(42)]);
        assert_eq!(lex("0b101010"), vec![TokenKind::IntLit(42)]);
        assert_eq!(lex("1_000_000"), vec![TokenKind::IntLit(1_000_000)]);
    }

    #[test]
    fn real_literals() {
        assert_eq!(lex("1.5"), vec![TokenKind::RealLit(1.5)]);
        assert_eq!(lex("1e3"), vec![TokenKind::RealLit(1000.0)]);
        assert_eq!(lex("2.5e-1"), vec![TokenKind::RealLit(0.25)]);
        assert_eq!(lex("0x1.8p1"), vec![TokenKind::RealLit(3.0)]);
        assert_eq!(lex("1p4"), vec![TokenKind::RealLit(16.0)]);
    }

    #[test]
    fn integer_overflow_is_reported() {
        assert_eq!(lex("9223372036854775807"), vec![TokenKind::IntLit(i64::MAX)]);
        assert_eq!(
            lex_err("9223372036854775808"),
            ParseErrorCode::IntegerLiteralOverflow
        );
    }

    #[test]
    fn real_overflow_and_underflow() {
        assert_eq!(lex_err("1e999"), ParseErrorCode::RealLiteralOverflow);
        assert_eq!(lex_err("1e-999"), ParseErrorCode::RealLiteralUnderflow);
    }

    #[test]
    fn numeric_suffixes_are_rejected() {
        assert_eq!(lex_err("12abc"), ParseErrorCode::NumericLiteralSuffixDisallowed);
        assert_eq!(lex_err("0x"), ParseErrorCode::NumericLiteralIncomplete);
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            lex(r#""a\tb\x41é\e""#),
            vec![TokenKind::StrLit("a\tbA\u{e9}\x1B".to_string())]
        );
    }

    #[test]
    fn raw_strings_take_backslashes_verbatim() {
        assert_eq!(
            lex(r"'a\tb'"),
            vec![TokenKind::StrLit("a\\tb".to_string())]
        );
    }

    #[test]
    fn adjacent_literals_concatenate() {
        assert_eq!(
            lex(r#""foo" 'bar' "baz""#),
            vec![TokenKind::StrLit("foobarbaz".to_string())]
        );
    }

    #[test]
    fn surrogate_escape_is_rejected() {
        assert_eq!(lex_err(r#""\ud800""#), ParseErrorCode::EscapeCodePointInvalid);
        assert_eq!(lex_err(r#""\U00110000""#), ParseErrorCode::EscapeCodePointInvalid);
    }

    #[test]
    fn unknown_escape_is_rejected() {
        assert_eq!(lex_err(r#""\q""#), ParseErrorCode::EscapeSequenceUnknown);
    }

    #[test]
    fn unclosed_string_is_rejected() {
        assert_eq!(lex_err("\"abc"), ParseErrorCode::StringLiteralUnclosed);
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(lex("1 // two\n3"), vec![TokenKind::IntLit(1), TokenKind::IntLit(3)]);
        assert_eq!(lex("1 /* two\nstill */ 3"), vec![TokenKind::IntLit(1), TokenKind::IntLit(3)]);
        assert_eq!(lex_err("/* open"), ParseErrorCode::BlockCommentUnclosed);
    }

    #[test]
    fn shebang_line_is_skipped() {
        assert_eq!(lex("#!/usr/bin/env quartz\n7"), vec![TokenKind::IntLit(7)]);
    }

    #[test]
    fn spans_track_line_and_offset() {
        let tokens = Lexer::new(b"ab\n  cd").unwrap().tokenize().unwrap();
        assert_eq!(tokens[0].span, Span::new(1, 0, 2));
        assert_eq!(tokens[1].span, Span::new(2, 2, 2));
    }

    #[test]
    fn unrecognized_character() {
        assert_eq!(lex_err("`"), ParseErrorCode::CharacterUnrecognized);
    }
}
