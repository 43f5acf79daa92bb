use crate::literal::Literal;

/// Accumulates SQL text and its positional parameters together so that
/// placeholder numbers always line up with the bound values.
#[derive(Debug, Default)]
pub(crate) struct SqlWriter {
    sql: String,
    params: Vec<Literal>,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    /// Append a `$n` placeholder and record `value` as parameter `n`.
    pub fn push_bind(&mut self, value: Literal) -> &mut Self {
        self.params.push(value);
        self.sql.push('$');
        self.sql.push_str(&self.params.len().to_string());
        self
    }

    pub fn push_list<T>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        separator: &str,
        mut each: impl FnMut(&mut Self, T),
    ) -> &mut Self {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            each(self, item);
        }
        self
    }

    pub fn finish(self) -> (String, Vec<Literal>) {
        (self.sql, self.params)
    }
}

/// Double-quote an output alias.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Escape `LIKE` metacharacters so the value matches literally.
pub(crate) fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_follow_bind_order() {
        let mut w = SqlWriter::new();
        w.push("a = ")
            .push_bind(Literal::Integer(1))
            .push(" AND b = ")
            .push_bind(Literal::from("x"));
        let (sql, params) = w.finish();
        assert_eq!(sql, "a = $1 AND b = $2");
        assert_eq!(params, vec![Literal::Integer(1), Literal::from("x")]);
    }

    #[test]
    fn test_push_list_separates_items() {
        let mut w = SqlWriter::new();
        w.push_list(["a", "b", "c"], ", ", |w, item| {
            w.push(item);
        });
        assert_eq!(w.finish().0, "a, b, c");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("snake_case"), "snake\\_case");
        assert_eq!(escape_like("C:\\dir"), "C:\\\\dir");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("total_views"), "\"total_views\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
