/// One page of query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub data: Vec<T>,
    /// 1-based page number.
    pub current_page: u64,
    /// Page size.
    pub per_page: u64,
    /// Matching rows across all pages.
    pub total: u64,
    /// Number of the last page; 0 when there are no rows.
    pub last_page: u64,
    /// 1-based position of the first item, or 0 for an empty page.
    pub from: u64,
    /// 1-based position of the last item, or 0 for an empty page.
    pub to: u64,
}

impl<T> Page<T> {
    /// Assembles a page from its items and the overall total.
    #[must_use]
    pub fn new(data: Vec<T>, total: u64, current_page: u64, per_page: u64) -> Self {
        let current_page = current_page.max(1);
        let per_page = per_page.max(1);
        let offset = (current_page - 1).saturating_mul(per_page);
        let (from, to) = if data.is_empty() {
            (0, 0)
        } else {
            (offset.saturating_add(1), offset.saturating_add(data.len() as u64))
        };

        Self {
            data,
            current_page,
            per_page,
            total,
            last_page: total.div_ceil(per_page),
            from,
            to,
        }
    }

    /// Whether pages follow this one.
    #[must_use]
    pub const fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page
    }

    /// Whether pages precede this one.
    #[must_use]
    pub const fn has_previous_pages(&self) -> bool {
        self.current_page > 1
    }

    /// Maps the items, keeping the totals.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            current_page: self.current_page,
            per_page: self.per_page,
            total: self.total,
            last_page: self.last_page,
            from: self.from,
            to: self.to,
        }
    }
}
