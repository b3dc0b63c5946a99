//! Query utilities for the Prism Central API
//!
//! Builds OData `$filter` expressions and list URLs.

/// Quote a string literal for an OData filter, doubling embedded single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Builder for conjunctive `field eq 'value'` filters
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    clauses: Vec<String>,
}

impl FilterBuilder {
    /// Create an empty filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality clause
    pub fn eq(mut self, field: &str, value: &str) -> Self {
        self.clauses.push(format!("{} eq {}", field, quote_literal(value)));
        self
    }

    /// Render the filter, or `None` when no clause was added
    pub fn build(&self) -> Option<String> {
        if self.clauses.is_empty() {
            None
        } else {
            Some(self.clauses.join(" and "))
        }
    }
}

/// Largest `$limit` the v4 list endpoints accept
pub const MAX_PAGE_SIZE: u32 = 100;

/// Build a list URL with optional `$filter`, `$page` and `$limit` parameters
pub fn list_path(base: &str, filter: Option<&str>, page: Option<u32>, limit: Option<u32>) -> String {
    let mut params = Vec::new();
    if let Some(filter) = filter {
        params.push(format!("$filter={}", urlencoding::encode(filter)));
    }
    if let Some(page) = page {
        params.push(format!("$page={}", page));
    }
    if let Some(limit) = limit {
        params.push(format!("$limit={}", limit));
    }

    if params.is_empty() {
        base.to_string()
    } else {
        format!("{}?{}", base, params.join("&"))
    }
}

/// Whether another page should be requested after one that returned `page_len` items.
///
/// `fetched` counts items across all pages so far, `total` is the server's
/// `totalAvailableResults` when it reported one.
pub fn has_more_pages(fetched: usize, page_len: usize, limit: u32, total: Option<u64>) -> bool {
    if page_len == 0 || page_len < limit as usize {
        return false;
    }
    match total {
        Some(total) => (fetched as u64) < total,
        None => true,
    }
}

/// Split a filter produced by [`FilterBuilder`] back into `(field, value)` pairs.
///
/// Returns `None` for anything that is not a conjunction of string equalities.
pub fn parse_eq_filter(filter: &str) -> Option<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut rest = filter.trim();

    while !rest.is_empty() {
        let (field, after_field) = rest.split_once(" eq '")?;
        let mut value = String::new();
        let mut chars = after_field.char_indices().peekable();
        let mut end = None;
        while let Some((idx, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    value.push('\'');
                    chars.next();
                } else {
                    end = Some(idx + 1);
                    break;
                }
            } else {
                value.push(c);
            }
        }
        pairs.push((field.trim().to_string(), value));
        rest = after_field[end?..].trim_start();
        if let Some(stripped) = rest.strip_prefix("and ") {
            rest = stripped.trim_start();
        } else if !rest.is_empty() {
            return None;
        }
    }

    Some(pairs)
}
