use regex::Regex;
use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};

use crate::api::middleware::AppError;
use crate::models::DbType;

/// SQL validation service for ensuring generated queries are safe to run
pub struct SqlValidator;

impl SqlValidator {
    fn tokenize(sql: &str) -> Result<Vec<Token>, AppError> {
        let dialect = GenericDialect {};
        Tokenizer::new(&dialect, sql)
            .tokenize()
            .map_err(|e| AppError::InvalidSql(format!("SQL parsing error: {}", e)))
    }

    fn is_trivia(token: &Token) -> bool {
        matches!(token, Token::Whitespace(_) | Token::EOF)
    }

    fn is_keyword(token: &Token, keyword: Keyword) -> bool {
        matches!(token, Token::Word(w) if w.keyword == keyword && w.quote_style.is_none())
    }

    /// Strip markdown code fences the model tends to wrap SQL in
    pub fn clean_sql_output(text: &str) -> String {
        let mut cleaned = text.trim().to_string();
        for fence in ["```sql", "```SQL", "```"] {
            cleaned = cleaned.replace(fence, "");
        }
        cleaned.trim().to_string()
    }

    /// Reject empty output and output made only of comments
    pub fn ensure_sql_present(sql: &str) -> Result<(), AppError> {
        if sql.trim().is_empty() {
            return Err(AppError::InvalidSql("Generated SQL is empty".to_string()));
        }
        let tokens = Self::tokenize(sql)?;
        if tokens.iter().all(Self::is_trivia) {
            return Err(AppError::InvalidSql(
                "Generated SQL contains only comments".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate SQL query and ensure it's a single SELECT statement.
    ///
    /// The first token that is neither whitespace nor a comment must be the
    /// `SELECT` keyword, and nothing but whitespace or comments may follow a `;`.
    pub fn validate_select_only(sql: &str) -> Result<String, AppError> {
        let tokens = Self::tokenize(sql)?;
        let mut significant = tokens.iter().filter(|t| !Self::is_trivia(t));

        match significant.next() {
            None => return Err(AppError::InvalidSql("Empty SQL query".to_string())),
            Some(first) if Self::is_keyword(first, Keyword::SELECT) => {}
            Some(first) => {
                return Err(AppError::InvalidSql(format!(
                    "Only SELECT queries are permitted. Found: {}",
                    first
                )))
            }
        }

        let mut after_semicolon = false;
        for token in significant {
            if after_semicolon && !matches!(token, Token::SemiColon) {
                return Err(AppError::InvalidSql(
                    "Multiple statements are not allowed".to_string(),
                ));
            }
            if matches!(token, Token::SemiColon) {
                after_semicolon = true;
            }
        }

        Ok(sql.to_string())
    }

    /// Check if query has LIMIT clause and append if missing
    /// Uses tokens so identifiers, strings and comments containing "limit" are not matched
    pub fn ensure_limit(sql: &str, default_limit: u64) -> Result<String, AppError> {
        let dialect = GenericDialect {};
        let spanned = Tokenizer::new(&dialect, sql)
            .tokenize_with_location()
            .map_err(|e| AppError::InvalidSql(format!("SQL parsing error: {}", e)))?;
        let tokens: Vec<Token> = spanned.iter().map(|t| t.token.clone()).collect();

        if Self::has_top_level_limit(&tokens) {
            return Ok(sql.to_string());
        }

        // Everything from the first `;` on is terminator or trivia
        let end = tokens
            .iter()
            .position(|t| matches!(t, Token::SemiColon))
            .unwrap_or(tokens.len());
        let body = spanned
            .get(end)
            .map(|semi| &sql[..Self::byte_offset(sql, semi.span.start.line, semi.span.start.column)])
            .unwrap_or(sql);

        // A trailing line comment would swallow the appended clause
        let ends_with_line_comment = tokens[..end]
            .iter()
            .rev()
            .find(|t| !matches!(t, Token::EOF) && !Self::is_blank(t))
            .is_some_and(|t| matches!(t, Token::Whitespace(Whitespace::SingleLineComment { .. })));

        let separator = if ends_with_line_comment { "\n" } else { " " };
        Ok(format!("{}{}LIMIT {}", body.trim(), separator, default_limit))
    }

    /// Byte index of a 1-based tokenizer line/column
    fn byte_offset(sql: &str, line: u64, column: u64) -> usize {
        let (mut cur_line, mut cur_col) = (1u64, 1u64);
        for (idx, ch) in sql.char_indices() {
            if cur_line == line && cur_col == column {
                return idx;
            }
            if ch == '\n' {
                cur_line += 1;
                cur_col = 1;
            } else {
                cur_col += 1;
            }
        }
        sql.len()
    }

    fn is_blank(token: &Token) -> bool {
        matches!(
            token,
            Token::Whitespace(Whitespace::Space | Whitespace::Newline | Whitespace::Tab)
        )
    }

    /// LIMIT keyword outside any parenthesised subquery
    fn has_top_level_limit(tokens: &[Token]) -> bool {
        let mut depth = 0usize;
        for token in tokens {
            match token {
                Token::LParen => depth += 1,
                Token::RParen => depth = depth.saturating_sub(1),
                t if depth == 0 && Self::is_keyword(t, Keyword::LIMIT) => return true,
                _ => {}
            }
        }
        false
    }

    /// Validate and prepare SQL query (validate SELECT-only and ensure LIMIT)
    pub fn validate_and_prepare(sql: &str, default_limit: u64) -> Result<(String, bool), AppError> {
        let validated_sql = Self::validate_select_only(sql)?;

        let original_has_limit = Self::has_limit(&validated_sql);
        let final_sql = Self::ensure_limit(&validated_sql, default_limit)?;

        Ok((final_sql, !original_has_limit))
    }

    fn has_limit(sql: &str) -> bool {
        match Self::tokenize(sql) {
            Ok(tokens) => Self::has_top_level_limit(&tokens),
            Err(_) => false,
        }
    }

    /// Rewrite year-month formatting calls into the target dialect
    pub fn fix_date_funcs_for_dialect(db_type: DbType, sql: &str) -> Result<String, AppError> {
        let (pattern, replacement) = match db_type {
            DbType::Postgres => (
                r"(?i)STRFTIME\(\s*'%Y-?%m'\s*,\s*([^)]+)\)",
                "TO_CHAR($1, 'YYYY-MM')",
            ),
            DbType::Mysql => (
                r"(?i)STRFTIME\(\s*'%Y-?%m'\s*,\s*([^)]+)\)",
                "DATE_FORMAT($1, '%Y-%m')",
            ),
            DbType::Sqlite => (
                r"(?i)TO_CHAR\(\s*([^),]+?)\s*,\s*'YYYY-?MM'\s*\)",
                "STRFTIME('%Y-%m', $1)",
            ),
        };
        let re = Regex::new(pattern).map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(re.replace_all(sql, replacement).into_owned())
    }
}
