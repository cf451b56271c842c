/// Represents a SQL join on a column pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    table: String,
    alias: Option<String>,
    left: String,
    right: String,
    kind: JoinKind,
}

/// Join types supported by the ORM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `INNER JOIN`
    Inner,
    /// `LEFT JOIN`
    Left,
    /// `RIGHT JOIN`
    Right,
    /// `FULL OUTER JOIN`
    Full,
}

impl Join {
    /// Creates a JOIN (defaults to INNER JOIN) on `left = right`.
    #[must_use]
    pub fn new(table: impl Into<String>, left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: None,
            left: left.into(),
            right: right.into(),
            kind: JoinKind::Inner,
        }
    }

    /// Creates a LEFT JOIN.
    #[must_use]
    pub fn left(table: impl Into<String>, left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::new(table, left, right).kind(JoinKind::Left)
    }

    /// Creates a RIGHT JOIN.
    #[must_use]
    pub fn right(table: impl Into<String>, left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::new(table, left, right).kind(JoinKind::Right)
    }

    /// Creates a FULL OUTER JOIN.
    #[must_use]
    pub fn full(table: impl Into<String>, left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::new(table, left, right).kind(JoinKind::Full)
    }

    /// Creates an INNER JOIN (alias for `new`).
    #[must_use]
    pub fn inner(table: impl Into<String>, left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::new(table, left, right)
    }

    /// Sets an alias for the joined table.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    const fn kind(mut self, kind: JoinKind) -> Self {
        self.kind = kind;
        self
    }

    pub(crate) fn render(&self) -> String {
        let keyword = match self.kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL OUTER JOIN",
        };
        let target = self.alias.as_ref().map_or_else(
            || self.table.clone(),
            |alias| format!("{} AS {alias}", self.table),
        );
        format!("{keyword} {target} ON {} = {}", self.left, self.right)
    }
}
