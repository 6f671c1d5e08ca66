//! Candidate identifier tokens from a function's source lines.
//!
//! The scanner carries two pieces of state across lines: an open block
//! comment, and an open string together with the delimiter that closes it.
//! Stripped regions are blanked rather than removed so the columns of what
//! remains are unchanged.
//!
//! At each position outside an open region the first matching construct
//! wins, in this order:
//!
//! 1. inline comment marker (rest of line dropped)
//! 2. block comment opener
//! 3. string delimiters, longest opener first
//!
//! Everything left is split on the profile's separators. Words that are
//! reserved or start with a digit are not emitted.

use std::collections::VecDeque;

use deeprepo_core::symbol::CodeBlock;
use deeprepo_core::text::expand_tabs;
use deeprepo_core::types::{Location, Position};

use crate::lsp::LanguageProfile;

/// One candidate identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    /// File position of the first character.
    pub position: Position,
}

impl Token {
    pub fn location(&self, uri: &str) -> Location {
        Location::new(uri, self.position)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LexState {
    Code,
    BlockComment,
    /// Inside a string closed by `string_delimiters[idx].1`.
    Str(usize),
}

/// Lazy token stream over a [`CodeBlock`].
///
/// Cloning the iterator snapshots its position, and [`tokens`] can be called
/// again to start over.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    block: &'a CodeBlock,
    profile: &'a LanguageProfile,
    /// String delimiter pairs, longest opener first.
    delimiters: Vec<(Vec<char>, Vec<char>)>,
    inline: Option<Vec<char>>,
    block_comment: Option<(Vec<char>, Vec<char>)>,
    state: LexState,
    next_line: usize,
    pending: VecDeque<Token>,
}

/// Tokenize `block` with `profile`'s rules.
pub fn tokens<'a>(block: &'a CodeBlock, profile: &'a LanguageProfile) -> Tokens<'a> {
    let chars = |s: &str| s.chars().collect::<Vec<char>>();

    let mut delimiters: Vec<(Vec<char>, Vec<char>)> = profile
        .string_delimiters
        .iter()
        .filter(|(open, close)| !open.is_empty() && !close.is_empty())
        .map(|(open, close)| (chars(open), chars(close)))
        .collect();
    delimiters.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    Tokens {
        block,
        profile,
        delimiters,
        inline: profile
            .inline_comment
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(chars),
        block_comment: profile
            .block_comment
            .as_ref()
            .filter(|(open, close)| !open.is_empty() && !close.is_empty())
            .map(|(open, close)| (chars(open), chars(close))),
        state: LexState::Code,
        next_line: 0,
        pending: VecDeque::new(),
    }
}

fn starts_with_at(chars: &[char], at: usize, pat: &[char]) -> bool {
    chars.len() >= at + pat.len() && chars[at..at + pat.len()] == *pat
}

fn find_at(chars: &[char], from: usize, pat: &[char]) -> Option<usize> {
    (from..=chars.len().saturating_sub(pat.len())).find(|&i| starts_with_at(chars, i, pat))
}

impl<'a> Tokens<'a> {
    /// Whether the scanner is inside a comment or string that has not closed.
    pub fn in_open_region(&self) -> bool {
        self.state != LexState::Code
    }

    /// Mark every character that belongs to a comment or string.
    fn strip(&mut self, chars: &[char]) -> Vec<bool> {
        let mut blank = vec![false; chars.len()];
        let mut i = 0;

        while i < chars.len() {
            match self.state {
                LexState::BlockComment => {
                    let Some((_, close)) = &self.block_comment else {
                        self.state = LexState::Code;
                        continue;
                    };
                    match find_at(chars, i, close) {
                        Some(j) => {
                            let end = j + close.len();
                            blank[i..end].iter_mut().for_each(|b| *b = true);
                            i = end;
                            self.state = LexState::Code;
                        }
                        None => {
                            blank[i..].iter_mut().for_each(|b| *b = true);
                            i = chars.len();
                        }
                    }
                }
                LexState::Str(idx) => {
                    let close = &self.delimiters[idx].1;
                    while i < chars.len() {
                        if Some(chars[i]) == self.profile.escape {
                            let end = (i + 2).min(chars.len());
                            blank[i..end].iter_mut().for_each(|b| *b = true);
                            i = end;
                        } else if starts_with_at(chars, i, close) {
                            let end = i + close.len();
                            blank[i..end].iter_mut().for_each(|b| *b = true);
                            i = end;
                            self.state = LexState::Code;
                            break;
                        } else {
                            blank[i] = true;
                            i += 1;
                        }
                    }
                }
                LexState::Code => {
                    if let Some(marker) = &self.inline {
                        if starts_with_at(chars, i, marker) {
                            blank[i..].iter_mut().for_each(|b| *b = true);
                            break;
                        }
                    }
                    if let Some((open, _)) = &self.block_comment {
                        if starts_with_at(chars, i, open) {
                            let end = i + open.len();
                            blank[i..end].iter_mut().for_each(|b| *b = true);
                            i = end;
                            self.state = LexState::BlockComment;
                            continue;
                        }
                    }
                    let opened = self
                        .delimiters
                        .iter()
                        .position(|(open, _)| starts_with_at(chars, i, open));
                    match opened {
                        Some(idx) => {
                            let end = i + self.delimiters[idx].0.len();
                            blank[i..end].iter_mut().for_each(|b| *b = true);
                            i = end;
                            self.state = LexState::Str(idx);
                        }
                        None => i += 1,
                    }
                }
            }
        }
        blank
    }

    fn emit(&mut self, line_no: u32, chars: &[char], blank: &[bool]) {
        let base_character = self.block.base_character;
        let mut col = 0u32;
        let mut word = String::new();
        let mut word_col = 0u32;

        for (k, &ch) in chars.iter().enumerate() {
            let is_break = blank[k] || ch.is_whitespace() || self.profile.is_separator(ch);
            if is_break {
                self.push_word(&mut word, line_no, base_character + word_col);
            } else {
                if word.is_empty() {
                    word_col = col;
                }
                word.push(ch);
            }
            col += ch.len_utf16() as u32;
        }
        self.push_word(&mut word, line_no, base_character + word_col);
    }

    fn push_word(&mut self, word: &mut String, line: u32, character: u32) {
        if word.is_empty() {
            return;
        }
        let text = std::mem::take(word);
        let literal = text.chars().next().is_some_and(|c| c.is_ascii_digit());
        if literal || self.profile.is_reserved(&text) {
            return;
        }
        self.pending.push_back(Token {
            text,
            position: Position::new(line, character),
        });
    }
}

impl Iterator for Tokens<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(token);
            }
            let raw = self.block.lines.get(self.next_line)?;
            let line_no = self.block.base_line + self.next_line as u32;
            self.next_line += 1;

            let chars: Vec<char> = expand_tabs(raw, self.profile.tab_width).chars().collect();
            let blank = self.strip(&chars);
            self.emit(line_no, &chars, &blank);
        }
    }
}
