use std::collections::VecDeque;

use cranedb_core::QueryError;

/// The closed keyword set of the dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Select,
    From,
    Where,
    And,
    Insert,
    Into,
    Values,
    Delete,
    Update,
    Set,
    Create,
    Table,
    Varchar,
    Int,
    View,
    As,
    Index,
    On,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Self> {
        let keyword = match word {
            "select" => Keyword::Select,
            "from" => Keyword::From,
            "where" => Keyword::Where,
            "and" => Keyword::And,
            "insert" => Keyword::Insert,
            "into" => Keyword::Into,
            "values" => Keyword::Values,
            "delete" => Keyword::Delete,
            "update" => Keyword::Update,
            "set" => Keyword::Set,
            "create" => Keyword::Create,
            "table" => Keyword::Table,
            "varchar" => Keyword::Varchar,
            "int" => Keyword::Int,
            "view" => Keyword::View,
            "as" => Keyword::As,
            "index" => Keyword::Index,
            "on" => Keyword::On,
            _ => return None,
        };

        Some(keyword)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Select => "select",
            Keyword::From => "from",
            Keyword::Where => "where",
            Keyword::And => "and",
            Keyword::Insert => "insert",
            Keyword::Into => "into",
            Keyword::Values => "values",
            Keyword::Delete => "delete",
            Keyword::Update => "update",
            Keyword::Set => "set",
            Keyword::Create => "create",
            Keyword::Table => "table",
            Keyword::Varchar => "varchar",
            Keyword::Int => "int",
            Keyword::View => "view",
            Keyword::As => "as",
            Keyword::Index => "index",
            Keyword::On => "on",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Keyword(Keyword),
    Id(String),
    IntConst(i32),
    StrConst(String),
    Delim(char),
}

/// Tokenizer over one SQL statement. Keywords are matched
/// case-insensitively and identifiers are lower-cased; string literal
/// payloads keep their case. A double-quoted token is a string constant,
/// not an identifier.
///
/// The parser drives it through the `match_*` predicates (peek) and the
/// `eat_*` consumers, which reject with `BadSyntax` on a wrong token kind.
#[derive(Debug)]
pub struct Lexer {
    tokens: VecDeque<Token>,
}

impl Lexer {
    pub fn new(input: &str) -> Result<Self, QueryError> {
        Ok(Self {
            tokens: tokenize(input)?,
        })
    }

    pub fn match_delim(&self, delim: char) -> bool {
        matches!(self.tokens.front(), Some(Token::Delim(d)) if *d == delim)
    }

    pub fn match_int(&self) -> bool {
        matches!(self.tokens.front(), Some(Token::IntConst(_)))
    }

    pub fn match_string(&self) -> bool {
        matches!(self.tokens.front(), Some(Token::StrConst(_)))
    }

    pub fn match_id(&self) -> bool {
        matches!(self.tokens.front(), Some(Token::Id(_)))
    }

    pub fn match_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.tokens.front(), Some(Token::Keyword(k)) if *k == keyword)
    }

    pub fn eat_delim(&mut self, delim: char) -> Result<(), QueryError> {
        if !self.match_delim(delim) {
            return Err(self.unexpected(&format!("'{delim}'")));
        }

        self.tokens.pop_front();
        Ok(())
    }

    pub fn eat_int(&mut self) -> Result<i32, QueryError> {
        match self.tokens.front() {
            Some(Token::IntConst(n)) => {
                let n = *n;
                self.tokens.pop_front();
                Ok(n)
            }
            _ => Err(self.unexpected("an integer constant")),
        }
    }

    pub fn eat_string(&mut self) -> Result<String, QueryError> {
        if let Some(Token::StrConst(s)) = self.tokens.front() {
            let s = s.clone();
            self.tokens.pop_front();
            return Ok(s);
        }

        Err(self.unexpected("a string constant"))
    }

    pub fn eat_id(&mut self) -> Result<String, QueryError> {
        if let Some(Token::Id(id)) = self.tokens.front() {
            let id = id.clone();
            self.tokens.pop_front();
            return Ok(id);
        }

        Err(self.unexpected("an identifier"))
    }

    pub fn eat_keyword(&mut self, keyword: Keyword) -> Result<(), QueryError> {
        if !self.match_keyword(keyword) {
            return Err(self.unexpected(keyword.as_str()));
        }

        self.tokens.pop_front();
        Ok(())
    }

    /// Reject any trailing tokens once a statement is fully parsed.
    pub fn expect_end(&self) -> Result<(), QueryError> {
        if self.tokens.is_empty() {
            return Ok(());
        }

        Err(self.unexpected("end of statement"))
    }

    fn unexpected(&self, expected: &str) -> QueryError {
        let found = match self.tokens.front() {
            Some(Token::Keyword(k)) => format!("keyword '{}'", k.as_str()),
            Some(Token::Id(id)) => format!("identifier '{id}'"),
            Some(Token::IntConst(n)) => format!("integer {n}"),
            Some(Token::StrConst(s)) => format!("string '{s}'"),
            Some(Token::Delim(d)) => format!("'{d}'"),
            None => "end of statement".to_string(),
        };

        QueryError::bad_syntax(format!("expected {expected}, found {found}"))
    }
}

fn tokenize(input: &str) -> Result<VecDeque<Token>, QueryError> {
    let mut tokens = VecDeque::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_alphabetic() || c == '_' {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    word.push(c);
                    chars.next();
                } else {
                    break;
                }
            }

            let lowered = word.to_lowercase();
            match Keyword::from_word(&lowered) {
                Some(keyword) => tokens.push_back(Token::Keyword(keyword)),
                None => tokens.push_back(Token::Id(lowered)),
            }
        } else if c.is_ascii_digit() {
            tokens.push_back(Token::IntConst(read_int(&mut chars, false)?));
        } else if c == '-' {
            chars.next();
            match chars.peek() {
                Some(d) if d.is_ascii_digit() => {
                    tokens.push_back(Token::IntConst(read_int(&mut chars, true)?));
                }
                _ => tokens.push_back(Token::Delim('-')),
            }
        } else if c == '\'' {
            chars.next();
            tokens.push_back(Token::StrConst(read_quoted(&mut chars, '\'')?));
        } else if c == '"' {
            chars.next();
            tokens.push_back(Token::StrConst(read_quoted(&mut chars, '"')?));
        } else {
            chars.next();
            tokens.push_back(Token::Delim(c));
        }
    }

    Ok(tokens)
}

fn read_int(
    chars: &mut std::iter::Peekable<std::str::Chars>,
    negative: bool,
) -> Result<i32, QueryError> {
    let mut digits = String::new();
    if negative {
        digits.push('-');
    }

    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            digits.push(c);
            chars.next();
        } else {
            break;
        }
    }

    digits
        .parse()
        .map_err(|_| QueryError::bad_syntax(format!("integer '{digits}' out of range")))
}

/// Read a quoted payload, with a doubled quote as the escape for the quote
/// character itself. The payload's case is kept verbatim.
fn read_quoted(
    chars: &mut std::iter::Peekable<std::str::Chars>,
    quote: char,
) -> Result<String, QueryError> {
    let mut payload = String::new();

    loop {
        match chars.next() {
            Some(c) if c == quote => {
                if chars.peek() == Some(&quote) {
                    payload.push(quote);
                    chars.next();
                } else {
                    return Ok(payload);
                }
            }
            Some(c) => payload.push(c),
            None => {
                return Err(QueryError::bad_syntax("unterminated string literal"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_case_insensitive() {
        let mut lexer = Lexer::new("SeLeCt name FROM t").unwrap();

        lexer.eat_keyword(Keyword::Select).unwrap();
        assert_eq!(lexer.eat_id().unwrap(), "name");
        lexer.eat_keyword(Keyword::From).unwrap();
        assert_eq!(lexer.eat_id().unwrap(), "t");
        lexer.expect_end().unwrap();
    }

    #[test]
    fn identifiers_are_lowercased_but_strings_keep_case() {
        let mut lexer = Lexer::new("Name = 'John'").unwrap();

        assert_eq!(lexer.eat_id().unwrap(), "name");
        lexer.eat_delim('=').unwrap();
        assert_eq!(lexer.eat_string().unwrap(), "John");
    }

    #[test]
    fn doubled_quote_escapes() {
        let mut lexer = Lexer::new("'O''Brien'").unwrap();
        assert_eq!(lexer.eat_string().unwrap(), "O'Brien");
    }

    #[test]
    fn double_quoted_tokens_are_string_constants() {
        let mut lexer = Lexer::new("\"Name\"").unwrap();

        assert!(lexer.match_string());
        assert!(!lexer.match_id());
        assert!(lexer.eat_id().is_err());
    }

    #[test]
    fn negative_integers_lex_as_one_token() {
        let mut lexer = Lexer::new("-42").unwrap();
        assert_eq!(lexer.eat_int().unwrap(), -42);
    }

    #[test]
    fn unterminated_strings_are_rejected() {
        assert!(Lexer::new("'oops").is_err());
    }

    #[test]
    fn wrong_token_kind_reports_bad_syntax() {
        let mut lexer = Lexer::new("select").unwrap();

        let err = lexer.eat_int().unwrap_err();
        assert!(matches!(err, QueryError::BadSyntax(_)));
    }
}
