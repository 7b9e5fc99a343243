//! OData system query options.

use crate::descriptor::ReadOptions;

/// Query options for one GET.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ODataQuery {
    pub expand: Option<String>,
    pub filter: Option<String>,
    pub select: Vec<String>,
    pub order_by: Option<String>,
    pub top: Option<u32>,
}

impl ODataQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query options configured on a resource.
    pub fn from_read_options(options: &ReadOptions) -> Self {
        Self {
            expand: options.odata_expand.clone(),
            filter: options.odata_filter.clone(),
            select: options.odata_select.clone(),
            order_by: None,
            top: None,
        }
    }

    /// Adds a filter clause, combining with any existing one using `and`.
    #[must_use]
    pub fn and_filter(mut self, clause: impl Into<String>) -> Self {
        let clause = clause.into();
        self.filter = Some(match self.filter.take() {
            Some(existing) if !existing.trim().is_empty() => format!("({existing}) and {clause}"),
            _ => clause,
        });
        self
    }

    #[must_use]
    pub fn with_order_by(mut self, order_by: Option<String>) -> Self {
        self.order_by = order_by;
        self
    }

    #[must_use]
    pub fn with_top(mut self, top: Option<u32>) -> Self {
        self.top = top;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.to_pairs().is_empty()
    }

    /// Query pairs in a stable order, ready for the transport.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(expand) = self.expand.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("$expand".to_string(), expand.to_string()));
        }
        if let Some(filter) = self.filter.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("$filter".to_string(), filter.to_string()));
        }
        if !self.select.is_empty() {
            pairs.push(("$select".to_string(), self.select.join(",")));
        }
        if let Some(order_by) = self.order_by.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("$orderby".to_string(), order_by.to_string()));
        }
        if let Some(top) = self.top {
            pairs.push(("$top".to_string(), top.to_string()));
        }
        pairs
    }
}

/// `$filter` clause matching one item id.
pub fn id_filter(id: &str) -> String {
    format!("id eq '{}'", quote_literal(id))
}

/// Escapes a string literal for an OData expression.
pub fn quote_literal(value: &str) -> String {
    value.replace('\'', "''")
}
