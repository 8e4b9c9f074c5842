//! Lightweight SQL text inspection. This is keyword matching, not parsing:
//! the text is scanned once, statements are cut on `;` outside quotes and
//! comments, and the bare words of each statement are kept upper-cased so
//! callers can classify it.

const DDL_KEYWORDS: [&str; 3] = ["CREATE", "DROP", "ALTER"];

/// One statement of a SQL batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    /// Statement text with comments blanked out and surrounding space trimmed.
    pub text: String,
    words: Vec<String>,
}

impl SqlStatement {
    /// Upper-cased first bare word, so `(select 1)` classifies as `SELECT`.
    #[must_use]
    pub fn first_keyword(&self) -> Option<&str> {
        self.words.first().map(String::as_str)
    }

    /// Upper-cased bare words in order. Quoted strings, quoted identifiers
    /// and comments contribute nothing.
    #[must_use]
    pub fn words(&self) -> &[String] {
        &self.words
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

#[derive(Default)]
struct Batch {
    statements: Vec<SqlStatement>,
    text: String,
    words: Vec<String>,
    word: String,
}

impl Batch {
    fn end_word(&mut self) {
        if !self.word.is_empty() {
            self.words.push(self.word.to_ascii_uppercase());
            self.word.clear();
        }
    }

    fn end_statement(&mut self) {
        self.end_word();
        let text = self.text.trim();
        if !text.is_empty() {
            self.statements.push(SqlStatement {
                text: text.to_string(),
                words: std::mem::take(&mut self.words),
            });
        }
        self.text.clear();
        self.words.clear();
    }
}

/// Scans a batch into statements. Recognises `'...'`, `"..."` and `` `...` ``
/// quoting, and `--`, `#` and `/* */` comments. `#` is always a comment, as
/// in MySQL.
#[must_use]
pub fn parse_statements(sql: &str) -> Vec<SqlStatement> {
    let mut batch = Batch::default();
    let mut lexeme = Lexeme::Code;
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        match lexeme {
            Lexeme::LineComment => {
                if ch == '\n' {
                    lexeme = Lexeme::Code;
                    batch.text.push('\n');
                }
            }
            Lexeme::BlockComment => {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    lexeme = Lexeme::Code;
                    batch.text.push(' ');
                }
            }
            Lexeme::Quoted(quote) => {
                batch.text.push(ch);
                if ch == quote {
                    lexeme = Lexeme::Code;
                }
            }
            Lexeme::Code => {
                if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                    batch.word.push(ch);
                    batch.text.push(ch);
                    continue;
                }
                batch.end_word();
                match ch {
                    '-' if chars.peek() == Some(&'-') => {
                        chars.next();
                        lexeme = Lexeme::LineComment;
                    }
                    '#' => lexeme = Lexeme::LineComment,
                    '/' if chars.peek() == Some(&'*') => {
                        chars.next();
                        lexeme = Lexeme::BlockComment;
                    }
                    '\'' | '"' | '`' => {
                        lexeme = Lexeme::Quoted(ch);
                        batch.text.push(ch);
                    }
                    ';' => batch.end_statement(),
                    _ => batch.text.push(ch),
                }
            }
        }
    }

    batch.end_statement();
    batch.statements
}

/// First of `keywords` that appears as a bare word anywhere in the batch.
#[must_use]
pub fn find_keyword<'k>(sql: &str, keywords: &[&'k str]) -> Option<&'k str> {
    let statements = parse_statements(sql);
    statements.iter().find_map(|statement| {
        statement
            .words()
            .iter()
            .find_map(|word| keywords.iter().copied().find(|keyword| word == keyword))
    })
}

/// Schema-invalidation heuristic: true when any statement starts with
/// `CREATE`, `DROP` or `ALTER`. Dialect DDL such as `RENAME TABLE` or
/// `TRUNCATE` is not recognised.
#[must_use]
pub fn looks_like_ddl(sql: &str) -> bool {
    parse_statements(sql).iter().any(|statement| {
        statement
            .first_keyword()
            .is_some_and(|keyword| DDL_KEYWORDS.contains(&keyword))
    })
}
