//! Delimiter-depth scanning for block boundaries.
//!
//! The scanner walks a buffer with a four-state machine (code, string literal,
//! line comment, block comment) so that delimiters inside literals and comments
//! are never counted. It knows nothing about the host language beyond C-family
//! comment and quote conventions.

use serde::Deserialize;
use std::fmt;
use std::ops::ControlFlow;
use thiserror::Error;

/// A pair of opening/closing delimiters that bound a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Delimiter {
    /// `{ ... }`
    #[default]
    Brace,
    /// `( ... )`
    Paren,
    /// `[ ... ]`
    Bracket,
}

impl Delimiter {
    pub fn open(self) -> char {
        match self {
            Delimiter::Brace => '{',
            Delimiter::Paren => '(',
            Delimiter::Bracket => '[',
        }
    }

    pub fn close(self) -> char {
        match self {
            Delimiter::Brace => '}',
            Delimiter::Paren => ')',
            Delimiter::Bracket => ']',
        }
    }
}

/// Lexical state of the scanner at a given point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Code,
    String,
    LineComment,
    BlockComment,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanState::Code => write!(f, "code"),
            ScanState::String => write!(f, "an unterminated string literal"),
            ScanState::LineComment => write!(f, "a line comment"),
            ScanState::BlockComment => write!(f, "an unterminated block comment"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("unbalanced '{open}' at byte {open_offset}: end of buffer reached at depth {depth} inside {state}")]
    Unbalanced {
        open: char,
        open_offset: usize,
        depth: usize,
        state: ScanState,
    },

    #[error("expected '{expected}' at byte {offset}")]
    NotAnOpener { expected: char, offset: usize },

    #[error("no '{open}' found in code after byte {from}")]
    NoOpener { open: char, from: usize },
}

/// Net delimiter balance of a whole buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    /// Openers minus closers.
    pub depth: isize,
    /// Lowest depth reached; negative means a closer appeared before its opener.
    pub min_depth: isize,
    /// State the scanner ended in.
    pub state: ScanState,
}

impl Balance {
    pub fn is_balanced(&self) -> bool {
        self.depth == 0
            && self.min_depth >= 0
            && matches!(self.state, ScanState::Code | ScanState::LineComment)
    }
}

/// Brace-matching scanner for one delimiter pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeScanner {
    delimiter: Delimiter,
}

impl ScopeScanner {
    pub fn new(delimiter: Delimiter) -> Self {
        Self { delimiter }
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    /// Find the closing delimiter matching the opener at `open_offset`.
    ///
    /// Returns the byte offset of the closer. Reaching the end of the buffer
    /// with depth above zero is an error; the scanner never guesses a nearby
    /// line.
    pub fn find_scope_end(&self, buffer: &str, open_offset: usize) -> Result<usize, ScopeError> {
        let open = self.delimiter.open();
        let close = self.delimiter.close();

        let at_offset = buffer.get(open_offset..).and_then(|rest| rest.chars().next());
        if at_offset != Some(open) {
            return Err(ScopeError::NotAnOpener {
                expected: open,
                offset: open_offset,
            });
        }

        let mut depth = 1usize;
        let mut end = None;
        let state = walk_code(buffer, open_offset + open.len_utf8(), |offset, c| {
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    end = Some(offset);
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        });

        match end {
            Some(offset) => Ok(offset),
            None => Err(ScopeError::Unbalanced {
                open,
                open_offset,
                depth,
                state,
            }),
        }
    }

    /// Find the first opening delimiter in code in `[from, limit)`.
    ///
    /// An opener at or past `limit` is not reported; callers bound the search
    /// so an unrelated block further down is never picked up.
    pub fn find_opener(&self, buffer: &str, from: usize, limit: usize) -> Result<usize, ScopeError> {
        let open = self.delimiter.open();
        let mut found = None;
        walk_code(buffer, from, |offset, c| {
            if offset >= limit {
                return ControlFlow::Break(());
            }
            if c == open {
                found = Some(offset);
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        });
        found.ok_or(ScopeError::NoOpener { open, from })
    }

    /// Check whether a declaration ending at `from` opens a block.
    ///
    /// Skips whitespace and at most one balanced parameter list, then looks at
    /// the next structural character in code. Returns the opener offset when
    /// that character is this scanner's opening delimiter; `;`, `=` or a
    /// closing delimiter first means the declaration has no block.
    ///
    /// The declaration may only continue onto a new line when that line
    /// starts with the opener or a type tail (`:`, `->`, `where`, `throws`),
    /// or when the previous line ends mid-type (`:`, `,`, `<`). Any other new
    /// line is the next statement, so the declaration has no block.
    pub fn opens_block_after(&self, buffer: &str, from: usize) -> Option<usize> {
        let rest = buffer.get(from..)?;
        let skipped = rest.len() - rest.trim_start_matches([' ', '\t']).len();
        let mut cursor = from + skipped;

        if self.delimiter != Delimiter::Paren && buffer[cursor..].starts_with('(') {
            let params_end = ScopeScanner::new(Delimiter::Paren)
                .find_scope_end(buffer, cursor)
                .ok()?;
            cursor = params_end + 1;
        }

        let open = self.delimiter.open();
        let close = self.delimiter.close();
        let mut found = None;
        let mut last_end = cursor;
        let mut last_char = None;
        walk_code(buffer, cursor, |offset, c| {
            if c.is_whitespace() {
                return ControlFlow::Continue(());
            }
            let new_line = buffer[last_end..offset].contains('\n');
            if new_line
                && c != open
                && !matches!(last_char, Some(':' | ',' | '<'))
                && !continues_declaration(&buffer[offset..])
            {
                return ControlFlow::Break(());
            }
            if c == open {
                found = Some(offset);
                return ControlFlow::Break(());
            }
            if c == ';' || c == '=' || c == close || c == '}' {
                return ControlFlow::Break(());
            }
            last_end = offset + c.len_utf8();
            last_char = Some(c);
            ControlFlow::Continue(())
        });
        found
    }

    /// Net balance of this delimiter pair over the whole buffer.
    pub fn balance(&self, buffer: &str) -> Balance {
        let open = self.delimiter.open();
        let close = self.delimiter.close();
        let mut depth = 0isize;
        let mut min_depth = 0isize;
        let state = walk_code(buffer, 0, |_, c| {
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                min_depth = min_depth.min(depth);
            }
            ControlFlow::Continue(())
        });
        Balance {
            depth,
            min_depth,
            state,
        }
    }
}

/// Line heads that carry a declaration's signature onto a new line.
const CONTINUATION_HEADS: [&str; 4] = [":", "->", "where", "throws"];

fn continues_declaration(line: &str) -> bool {
    CONTINUATION_HEADS.iter().any(|head| {
        line.strip_prefix(head).is_some_and(|after| {
            !head.starts_with(char::is_alphabetic)
                || after.chars().next().map_or(true, |c| !c.is_alphanumeric() && c != '_')
        })
    })
}

/// Walk `buffer` from `from`, calling `visit` for every character in code.
///
/// The walk assumes `from` sits in code. Returns the state the walk ended in;
/// an early break from `visit` reports [`ScanState::Code`].
fn walk_code<F>(buffer: &str, from: usize, mut visit: F) -> ScanState
where
    F: FnMut(usize, char) -> ControlFlow<()>,
{
    let Some(rest) = buffer.get(from..) else {
        return ScanState::Code;
    };

    let mut state = ScanState::Code;
    let mut quote = '"';
    let mut chars = rest.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        match state {
            ScanState::Code => match c {
                '/' if matches!(chars.peek(), Some((_, '/'))) => {
                    chars.next();
                    state = ScanState::LineComment;
                }
                '/' if matches!(chars.peek(), Some((_, '*'))) => {
                    chars.next();
                    state = ScanState::BlockComment;
                }
                '"' | '\'' => {
                    quote = c;
                    state = ScanState::String;
                }
                _ => {
                    if visit(from + idx, c).is_break() {
                        return ScanState::Code;
                    }
                }
            },
            ScanState::String => {
                if c == '\\' {
                    chars.next();
                } else if c == quote {
                    state = ScanState::Code;
                }
            }
            ScanState::LineComment => {
                if c == '\n' {
                    state = ScanState::Code;
                }
            }
            ScanState::BlockComment => {
                if c == '*' && matches!(chars.peek(), Some((_, '/'))) {
                    chars.next();
                    state = ScanState::Code;
                }
            }
        }
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brace() -> ScopeScanner {
        ScopeScanner::new(Delimiter::Brace)
    }

    #[test]
    fn test_find_scope_end_simple() {
        let src = "fun a() { x() }";
        let open = src.find('{').unwrap();
        assert_eq!(brace().find_scope_end(src, open).unwrap(), src.len() - 1);
    }

    #[test]
    fn test_find_scope_end_nested() {
        let src = "fun a() {\n    if (x) {\n        y()\n    }\n}\nfun b() {}\n";
        let open = src.find('{').unwrap();
        let close = brace().find_scope_end(src, open).unwrap();
        assert_eq!(&src[close..close + 2], "}\n");
        assert!(src[..close].ends_with("    }\n"));
    }

    #[test]
    fn test_delimiters_in_strings_and_comments_ignored() {
        let src = r#"fun a() {
    val s = "}"
    val c = '{'
    // closing } in a comment
    /* { block } */
    val t = "escaped \" }"
}
tail"#;
        let open = src.find('{').unwrap();
        let close = brace().find_scope_end(src, open).unwrap();
        assert_eq!(&src[close..], "}\ntail");
    }

    #[test]
    fn test_unterminated_string_is_unbalanced() {
        let src = "fun a() {\n    val s = \"}\n";
        let open = src.find('{').unwrap();
        let err = brace().find_scope_end(src, open).unwrap_err();
        assert!(matches!(
            err,
            ScopeError::Unbalanced {
                depth: 1,
                state: ScanState::String,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_closer_is_unbalanced() {
        let src = "fun a() {\n    if (x) {\n    }\n";
        let open = src.find('{').unwrap();
        let err = brace().find_scope_end(src, open).unwrap_err();
        assert!(matches!(
            err,
            ScopeError::Unbalanced {
                depth: 1,
                state: ScanState::Code,
                ..
            }
        ));
    }

    #[test]
    fn test_not_an_opener() {
        let err = brace().find_scope_end("abc", 1).unwrap_err();
        assert!(matches!(err, ScopeError::NotAnOpener { offset: 1, .. }));
    }

    #[test]
    fn test_find_opener_skips_comments() {
        let src = "fun a() // {\n{ }";
        assert_eq!(brace().find_opener(src, 0, src.len()).unwrap(), 13);
        assert!(matches!(
            brace().find_opener("no block", 0, 8),
            Err(ScopeError::NoOpener { .. })
        ));
    }

    #[test]
    fn test_find_opener_respects_limit() {
        let src = "val x = 1
fun unrelated() {
}
";
        assert!(matches!(
            brace().find_opener(src, 0, 9),
            Err(ScopeError::NoOpener { from: 0, .. })
        ));
    }

    #[test]
    fn test_opens_block_after_multiline_params() {
        let src = "private fun getRouting(\n    config: Config,\n    flag: Boolean = false\n): Boolean {\n}\n";
        let token_end = src.find('(').unwrap();
        let opener = brace().opens_block_after(src, token_end).unwrap();
        assert_eq!(opener, src.find('{').unwrap());
    }

    #[test]
    fn test_opens_block_after_rejects_expression_body() {
        let src = "fun size() = items.size\nfun other() {}\n";
        assert_eq!(brace().opens_block_after(src, 8), None);
    }

    #[test]
    fn test_opens_block_after_rejects_declaration() {
        let src = "void run(int a);\nvoid stop() {}\n";
        assert_eq!(brace().opens_block_after(src, 8), None);
    }

    #[test]
    fn test_opens_block_after_stops_at_next_statement() {
        let src = "fun main() {\n    val r = getRouting(config)\n    if (r) {\n    }\n}\n";
        let token_end = src.find("getRouting").unwrap() + "getRouting".len();
        assert_eq!(brace().opens_block_after(src, token_end), None);
    }

    #[test]
    fn test_opens_block_after_rejects_abstract_member() {
        let src = "interface Repo {\n    fun getRouting(): Int\n    fun other() {\n    }\n}\n";
        let token_end = src.find("getRouting").unwrap() + "getRouting".len();
        assert_eq!(brace().opens_block_after(src, token_end), None);
    }

    #[test]
    fn test_opens_block_after_allows_signature_continuation() {
        let brace_next_line = "fun a(x: Int)\n{\n}\n";
        assert_eq!(brace().opens_block_after(brace_next_line, 5), Some(14));

        let wrapped_type = "fun <T> a(x: T):\n    Map<String, T>\n        where T : Any {\n}\n";
        let opener = wrapped_type.find('{').unwrap();
        assert_eq!(brace().opens_block_after(wrapped_type, 9), Some(opener));
    }

    #[test]
    fn test_paren_scanner() {
        let src = "call(a, (b), \")\")";
        let close = ScopeScanner::new(Delimiter::Paren)
            .find_scope_end(src, 4)
            .unwrap();
        assert_eq!(close, src.len() - 1);
    }

    #[test]
    fn test_balance() {
        assert!(brace().balance("a { b { } }").is_balanced());
        assert!(brace().balance("a { b } // trailing }").is_balanced());
        assert!(!brace().balance("a { b ").is_balanced());
        assert!(!brace().balance("} {").is_balanced());
        assert!(!brace().balance("a { \"b }").is_balanced());
    }
}
