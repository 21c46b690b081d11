//! Comment stripping.
//!
//! A single forward pass over the source that removes `//` and `/* */`
//! comments while leaving string and template literal contents untouched.
//! The pass is purely lexical: nothing is evaluated.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    LineComment,
    BlockComment,
    Str(char),
    Template,
}

/// Return `source` with every comment removed.
///
/// Line comments are dropped up to (not including) the newline. Block
/// comments are replaced by a single space, keeping any newlines they
/// contained so line structure is preserved. An unterminated block comment
/// swallows the rest of the input.
pub fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut state = State::Code;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push(' ');
                    state = State::BlockComment;
                }
                '"' | '\'' => {
                    out.push(c);
                    state = State::Str(c);
                }
                '`' => {
                    out.push(c);
                    state = State::Template;
                }
                _ => out.push(c),
            },
            State::LineComment => {
                if c == '\n' {
                    out.push('\n');
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Code;
                } else if c == '\n' {
                    out.push('\n');
                }
            }
            State::Str(quote) => {
                out.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if c == quote || c == '\n' {
                    // Unterminated string literals end at the line break.
                    state = State::Code;
                }
            }
            State::Template => {
                out.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if c == '`' {
                    state = State::Code;
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_line_and_block_comments() {
        let src = "a = 1; // eval(x)\nb = /* fetch( */ 2;";
        let out = strip_comments(src);
        assert_eq!(out, "a = 1; \nb =   2;");
    }

    #[test]
    fn test_block_comment_keeps_newlines() {
        let out = strip_comments("x/*\n\n*/y");
        assert_eq!(out, "x \n\ny");
    }

    #[test]
    fn test_comment_markers_inside_strings_survive() {
        let src = r#"var url = "http://example"; var s = '/* not */';"#;
        assert_eq!(strip_comments(src), src);
    }

    #[test]
    fn test_escaped_quote_does_not_end_string() {
        let src = r#"s = "a\"// still string"; // gone"#;
        assert_eq!(strip_comments(src), r#"s = "a\"// still string"; "#);
    }

    #[test]
    fn test_template_literal_is_preserved() {
        let src = "t = `line // one\n/* two */`;";
        assert_eq!(strip_comments(src), src);
    }

    #[test]
    fn test_unterminated_block_comment() {
        assert_eq!(strip_comments("keep /* eval("), "keep  ");
    }
}
