#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    AndIf,
    OrIf,
    Pipe,
    Semi,
    LeftParen,
    RightParen,
    RedirOut,
    RedirOutAppend,
    RedirIn,
    RedirErr,
    RedirErrToOut,
    Assign,
    Background,
    Eof,
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, pos: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            pos,
        }
    }
}

/// Ordered token sequence, always terminated by exactly one `Eof` token.
pub type TokenStream = Vec<Token>;

pub struct LexerOptions {
    /// Reclassify NAME=VALUE words as `Assign` tokens.
    pub assign_detection: bool,
}

impl Default for LexerOptions {
    fn default() -> Self {
        Self {
            assign_detection: true,
        }
    }
}

/// Single forward scan over the input line. The only backtracking is the
/// lookahead needed to tell `2>` / `2>&1` apart from a word starting
/// with the digit `2`.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    opts: LexerOptions,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self::with_options(input, LexerOptions::default())
    }

    pub fn with_options(input: &str, opts: LexerOptions) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            opts,
        }
    }

    pub fn run(mut self) -> TokenStream {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    fn next_token(&mut self) -> Token {
        self.skip_space();
        match self.peek() {
            None => Token::new(TokenKind::Eof, "", self.pos),
            Some(c) if "|&;><()".contains(c) || c == '2' => self.lex_operator(),
            Some(_) => self.lex_word(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_space(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn lex_operator(&mut self) -> Token {
        let start = self.pos;
        match self.advance() {
            Some('|') => {
                if self.peek() == Some('|') {
                    self.pos += 1;
                    Token::new(TokenKind::OrIf, "||", start)
                } else {
                    Token::new(TokenKind::Pipe, "|", start)
                }
            }
            Some('&') => {
                if self.peek() == Some('&') {
                    self.pos += 1;
                    Token::new(TokenKind::AndIf, "&&", start)
                } else {
                    Token::new(TokenKind::Background, "&", start)
                }
            }
            Some(';') => Token::new(TokenKind::Semi, ";", start),
            Some('(') => Token::new(TokenKind::LeftParen, "(", start),
            Some(')') => Token::new(TokenKind::RightParen, ")", start),
            Some('>') => {
                if self.peek() == Some('>') {
                    self.pos += 1;
                    Token::new(TokenKind::RedirOutAppend, ">>", start)
                } else {
                    Token::new(TokenKind::RedirOut, ">", start)
                }
            }
            Some('<') => Token::new(TokenKind::RedirIn, "<", start),
            Some('2') => {
                if self.peek() == Some('>') {
                    self.pos += 1;
                    if self.peek() == Some('&') && self.peek_at(1) == Some('1') {
                        self.pos += 2;
                        Token::new(TokenKind::RedirErrToOut, "2>&1", start)
                    } else {
                        Token::new(TokenKind::RedirErr, "2>", start)
                    }
                } else {
                    // Not a redirection after all; rewind and lex a word.
                    self.pos = start;
                    self.lex_word()
                }
            }
            Some(c) => Token::new(TokenKind::Invalid, c.to_string(), start),
            None => Token::new(TokenKind::Eof, "", start),
        }
    }

    fn lex_word(&mut self) -> Token {
        let start = self.pos;
        let mut out = String::new();
        let mut in_single = false;
        let mut in_double = false;

        while let Some(c) = self.peek() {
            if !in_single && !in_double {
                if c.is_whitespace() {
                    break;
                }
                if "|&;><()".contains(c) || (c == '2' && self.peek_at(1) == Some('>')) {
                    break;
                }
                if c == '$' && self.peek_at(1) == Some('(') {
                    // `$( body )` is one expansion unit: take it verbatim,
                    // spaces and all, up to the closing paren.
                    out.push(c);
                    self.pos += 1;
                    while let Some(sub) = self.advance() {
                        out.push(sub);
                        if sub == ')' {
                            break;
                        }
                    }
                    continue;
                }
                match c {
                    '\'' => {
                        in_single = true;
                        self.pos += 1;
                    }
                    '"' => {
                        in_double = true;
                        self.pos += 1;
                    }
                    '\\' => {
                        self.pos += 1;
                        if let Some(escaped) = self.advance() {
                            out.push(escaped);
                        }
                    }
                    _ => {
                        out.push(c);
                        self.pos += 1;
                    }
                }
            } else if in_single {
                self.pos += 1;
                if c == '\'' {
                    in_single = false;
                } else {
                    out.push(c);
                }
            } else {
                // in_double
                self.pos += 1;
                if c == '"' {
                    in_double = false;
                } else if c == '\\' && matches!(self.peek(), Some('"') | Some('\\') | Some('$')) {
                    if let Some(escaped) = self.advance() {
                        out.push(escaped);
                    }
                } else {
                    out.push(c);
                }
            }
        }

        let token = Token::new(TokenKind::Word, out, start);
        if self.opts.assign_detection {
            try_assign(token)
        } else {
            token
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A word matching NAME=VALUE (NAME a valid identifier) becomes an Assign.
fn try_assign(word: Token) -> Token {
    let Some(eq) = word.text.find('=') else {
        return word;
    };
    if eq == 0 {
        return word;
    }
    for (i, c) in word.text[..eq].char_indices() {
        if !is_name_char(c) || (i == 0 && !is_name_start(c)) {
            return word;
        }
    }
    Token {
        kind: TokenKind::Assign,
        ..word
    }
}

pub fn tokenize(line: &str) -> TokenStream {
    Lexer::new(line).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(line: &str) -> Vec<TokenKind> {
        tokenize(line).iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_command() {
        let tokens = tokenize("ls -l");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind, TokenKind::Word);
        assert_eq!(tokens[0].text, "ls");
        assert_eq!(tokens[1].text, "-l");
        assert_eq!(tokens[2].kind, TokenKind::Eof);
    }

    #[test]
    fn test_single_trailing_eof() {
        for line in ["", "   ", "echo hi", "a && b || c; (d) & 2>&1"] {
            let tokens = tokenize(line);
            let eofs = tokens.iter().filter(|t| t.kind == TokenKind::Eof).count();
            assert_eq!(eofs, 1, "line {:?}", line);
            assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
        }
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a | b || c && d ; (e) &"),
            vec![
                TokenKind::Word,
                TokenKind::Pipe,
                TokenKind::Word,
                TokenKind::OrIf,
                TokenKind::Word,
                TokenKind::AndIf,
                TokenKind::Word,
                TokenKind::Semi,
                TokenKind::LeftParen,
                TokenKind::Word,
                TokenKind::RightParen,
                TokenKind::Background,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_redirections() {
        assert_eq!(
            kinds("cmd > out >> log < in 2> err 2>&1"),
            vec![
                TokenKind::Word,
                TokenKind::RedirOut,
                TokenKind::Word,
                TokenKind::RedirOutAppend,
                TokenKind::Word,
                TokenKind::RedirIn,
                TokenKind::Word,
                TokenKind::RedirErr,
                TokenKind::Word,
                TokenKind::RedirErrToOut,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_digit_two_word_is_not_redirection() {
        let tokens = tokenize("echo 2048");
        assert_eq!(tokens[1].kind, TokenKind::Word);
        assert_eq!(tokens[1].text, "2048");

        // `2>` after a word boundary is a redirection, `2` followed by
        // anything else is a plain word.
        let tokens = tokenize("cmd 2>file");
        assert_eq!(tokens[1].kind, TokenKind::RedirErr);
        assert_eq!(tokens[2].text, "file");
    }

    #[test]
    fn test_quoting() {
        let tokens = tokenize(r#"echo "hello world" 'a $b' esc\ aped"#);
        assert_eq!(tokens[1].text, "hello world");
        assert_eq!(tokens[2].text, "a $b");
        assert_eq!(tokens[3].text, "esc aped");
    }

    #[test]
    fn test_double_quote_escapes() {
        // Inside double quotes backslash only escapes `"`, `\` and `$`.
        let tokens = tokenize(r#"echo "a\"b" "c\$d" "e\nf""#);
        assert_eq!(tokens[1].text, "a\"b");
        assert_eq!(tokens[2].text, "c$d");
        assert_eq!(tokens[3].text, "e\\nf");
    }

    #[test]
    fn test_parens_break_words() {
        assert_eq!(
            kinds("(echo hi)"),
            vec![
                TokenKind::LeftParen,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::RightParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_command_substitution_is_one_word() {
        let tokens = tokenize("echo X$(echo hi)Y");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].kind, TokenKind::Word);
        assert_eq!(tokens[1].text, "X$(echo hi)Y");
    }

    #[test]
    fn test_assign_detection() {
        let tokens = tokenize("VAR=123 echo test");
        assert_eq!(tokens[0].kind, TokenKind::Assign);
        assert_eq!(tokens[0].text, "VAR=123");
        assert_eq!(tokens[1].kind, TokenKind::Word);
        assert_eq!(tokens[2].kind, TokenKind::Word);

        // `=` at position 0 or a non-identifier name stays a word.
        assert_eq!(tokenize("=x")[0].kind, TokenKind::Word);
        assert_eq!(tokenize("1a=x")[0].kind, TokenKind::Word);
        assert_eq!(tokenize("_a1=x")[0].kind, TokenKind::Assign);
    }

    #[test]
    fn test_assign_detection_disabled() {
        let tokens =
            Lexer::with_options("VAR=1", LexerOptions { assign_detection: false }).run();
        assert_eq!(tokens[0].kind, TokenKind::Word);
    }

    #[test]
    fn test_token_positions() {
        let tokens = tokenize("ls | wc");
        assert_eq!(tokens[0].pos, 0);
        assert_eq!(tokens[1].pos, 3);
        assert_eq!(tokens[2].pos, 5);
    }
}
