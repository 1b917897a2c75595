//! Builder for the web service's SQL-like query language.
//!
//! Rendering follows the server's expectations exactly: `ORDER BY` is
//! followed by two spaces, and `LIMIT` puts the offset first
//! (`LIMIT <offset>, <limit>`). Empty filters, empty orderings, a zero
//! limit and a zero offset are all treated as absent.

use std::fmt;

/// A `SELECT ... FROM ...` statement with optional clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    select: String,
    from: String,
    filter: Option<String>,
    order: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

impl Query {
    /// Start a query selecting `select` (e.g. `"*"` or `"id, lastname"`)
    /// from the module `from`.
    pub fn new(select: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            select: select.into(),
            from: from.into(),
            ..Self::default()
        }
    }

    /// The `WHERE` clause body, without the keyword.
    pub fn filter(mut self, clause: impl Into<String>) -> Self {
        self.filter = Some(clause.into());
        self
    }

    /// The `ORDER BY` clause body, without the keyword.
    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order = Some(clause.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Only rendered together with a non-zero limit.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Positional form of the builder: `select`, `from`, then the optional
    /// where/order/limit/offset clauses.
    pub fn from_parts(
        select: &str,
        from: &str,
        filter: Option<&str>,
        order: Option<&str>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Self {
        Self {
            select: select.to_string(),
            from: from.to_string(),
            filter: filter.map(str::to_string),
            order: order.map(str::to_string),
            limit,
            offset,
        }
    }

    /// The module named in `FROM`.
    pub fn module(&self) -> &str {
        &self.from
    }

    /// The rendered statement, percent-encoded for a query string.
    pub fn encoded(&self) -> String {
        urlencoding::encode(&self.to_string()).into_owned()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT {} FROM {}", self.select, self.from)?;

        if let Some(filter) = self.filter.as_deref().filter(|s| !s.is_empty()) {
            write!(f, " WHERE {filter}")?;
        }

        if let Some(order) = self.order.as_deref().filter(|s| !s.is_empty()) {
            write!(f, " ORDER BY  {order}")?;
        }

        if let Some(limit) = self.limit.filter(|&n| n != 0) {
            f.write_str(" LIMIT ")?;
            if let Some(offset) = self.offset.filter(|&n| n != 0) {
                write!(f, "{offset}, ")?;
            }
            write!(f, "{limit}")?;
        }

        f.write_str(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_query() {
        assert_eq!(Query::new("a", "b").to_string(), "SELECT a FROM b;");
    }

    #[test]
    fn module_is_the_from_target() {
        let q = Query::new("*", "Contacts").filter("email='a@b.c'");
        assert_eq!(q.module(), "Contacts");
    }

    #[test]
    fn every_clause() {
        let q = Query::new("a", "b").filter("x=1").order_by("y").limit(5).offset(10);
        assert_eq!(q.to_string(), "SELECT a FROM b WHERE x=1 ORDER BY  y LIMIT 10, 5;");
    }

    #[test]
    fn limit_without_offset() {
        let q = Query::new("*", "Contacts").limit(20);
        assert_eq!(q.to_string(), "SELECT * FROM Contacts LIMIT 20;");
    }

    #[test]
    fn offset_without_limit_is_ignored() {
        let q = Query::new("*", "Contacts").offset(40);
        assert_eq!(q.to_string(), "SELECT * FROM Contacts;");
    }

    #[test]
    fn falsy_clauses_are_skipped() {
        let q = Query::from_parts("*", "Leads", Some(""), Some(""), Some(0), Some(3));
        assert_eq!(q.to_string(), "SELECT * FROM Leads;");

        let q = Query::new("*", "Leads").limit(5).offset(0);
        assert_eq!(q.to_string(), "SELECT * FROM Leads LIMIT 5;");
    }

    #[test]
    fn encoded_escapes_spaces_and_quotes() {
        let q = Query::new("id", "Accounts").filter("accountname='Acme'");
        assert_eq!(
            q.encoded(),
            "SELECT%20id%20FROM%20Accounts%20WHERE%20accountname%3D%27Acme%27%3B"
        );
    }
}
