//! Logical table query and its URL query-string encoding.
//!
//! # Design
//! `Query` is plain accumulated state; it never performs I/O. Single-valued
//! settings (projection, sort, limit, offset) are replaced by later calls,
//! while predicates are appended and always combined with AND.
//!
//! Encoding, in parameter order:
//! - `select=a,b` (omitted when every column is selected)
//! - one `filter=<column>.<op>.<value>` per predicate, in append order
//! - `order=<column>.<asc|desc>`
//! - `limit=<n>`, `offset=<n>`

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    IsNull,
}

impl FilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Like => "like",
            FilterOp::IsNull => "is",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "eq" => FilterOp::Eq,
            "neq" => FilterOp::Neq,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "like" => FilterOp::Like,
            "is" => FilterOp::IsNull,
            _ => return None,
        })
    }
}

/// One `{column, operator, value}` predicate. `IsNull` carries `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::new(column, FilterOp::IsNull, Value::Null)
    }

    /// `<column>.<op>.<value>`.
    pub fn encode(&self) -> String {
        let value = match (&self.op, &self.value) {
            (FilterOp::IsNull, _) => "null".to_string(),
            (_, Value::String(s)) => s.clone(),
            (_, other) => other.to_string(),
        };
        format!("{}.{}.{}", self.column, self.op.as_str(), value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

/// Accumulated state of one table query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Query {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            filters: Vec::new(),
            order: None,
            limit: None,
            offset: None,
        }
    }

    pub fn set_columns<I, S>(&mut self, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
    }

    pub fn push_filter(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    pub fn set_order(&mut self, column: impl Into<String>, direction: SortDirection) {
        self.order = Some(OrderBy {
            column: column.into(),
            direction,
        });
    }

    /// Only the predicate parameters; used as the condition of filtered
    /// updates and deletes.
    pub fn filter_params(&self) -> Vec<(String, String)> {
        self.filters
            .iter()
            .map(|f| ("filter".to_string(), f.encode()))
            .collect()
    }

    /// Every parameter of a read.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if !self.columns.is_empty() {
            params.push(("select".to_string(), self.columns.join(",")));
        }
        params.extend(self.filter_params());
        if let Some(order) = &self.order {
            params.push((
                "order".to_string(),
                format!("{}.{}", order.column, order.direction.as_str()),
            ));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn pairs(params: &[(String, String)]) -> Vec<(&str, &str)> {
        params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    #[test]
    fn empty_query_has_no_params() {
        assert!(Query::new("users").to_params().is_empty());
    }

    #[test]
    fn full_query_encoding() {
        let mut q = Query::new("users");
        q.set_columns(["id", "name"]);
        q.push_filter(Filter::new("age", FilterOp::Gte, 18));
        q.push_filter(Filter::new("email", FilterOp::Like, "%@z.com"));
        q.push_filter(Filter::is_null("deleted_at"));
        q.set_order("created_at", SortDirection::Desc);
        q.limit = Some(10);
        q.offset = Some(20);
        assert_eq!(
            pairs(&q.to_params()),
            vec![
                ("select", "id,name"),
                ("filter", "age.gte.18"),
                ("filter", "email.like.%@z.com"),
                ("filter", "deleted_at.is.null"),
                ("order", "created_at.desc"),
                ("limit", "10"),
                ("offset", "20"),
            ]
        );
    }

    #[test]
    fn value_encoding() {
        assert_eq!(Filter::new("a", FilterOp::Eq, "y@z.com").encode(), "a.eq.y@z.com");
        assert_eq!(Filter::new("a", FilterOp::Neq, true).encode(), "a.neq.true");
        assert_eq!(Filter::new("a", FilterOp::Lt, 1.5).encode(), "a.lt.1.5");
        assert_eq!(Filter::new("a", FilterOp::Eq, json!(null)).encode(), "a.eq.null");
    }

    #[test]
    fn op_names_round_trip() {
        for op in [
            FilterOp::Eq,
            FilterOp::Neq,
            FilterOp::Gt,
            FilterOp::Gte,
            FilterOp::Lt,
            FilterOp::Lte,
            FilterOp::Like,
            FilterOp::IsNull,
        ] {
            assert_eq!(FilterOp::parse(op.as_str()), Some(op));
        }
        assert_eq!(FilterOp::parse("in"), None);
    }

    #[derive(Debug, Clone)]
    enum Step {
        Select(Vec<String>),
        Order(String, bool),
        Limit(u64),
        Offset(u64),
    }

    fn apply(q: &mut Query, step: &Step) {
        match step {
            Step::Select(cols) => q.set_columns(cols.clone()),
            Step::Order(col, desc) => q.set_order(
                col.clone(),
                if *desc { SortDirection::Desc } else { SortDirection::Asc },
            ),
            Step::Limit(n) => q.limit = Some(*n),
            Step::Offset(n) => q.offset = Some(*n),
        }
    }

    fn arb_step() -> impl Strategy<Value = Step> {
        prop_oneof![
            prop::collection::vec("[a-z]{1,6}", 0..3).prop_map(Step::Select),
            ("[a-z]{1,6}", any::<bool>()).prop_map(|(c, d)| Step::Order(c, d)),
            (0u64..1000).prop_map(Step::Limit),
            (0u64..1000).prop_map(Step::Offset),
        ]
    }

    fn same_kind(a: &Step, b: &Step) -> bool {
        std::mem::discriminant(a) == std::mem::discriminant(b)
    }

    proptest! {
        #[test]
        fn last_call_of_each_kind_wins(steps in prop::collection::vec(arb_step(), 0..12), seed in any::<u64>()) {
            let mut forward = Query::new("t");
            for step in &steps {
                apply(&mut forward, step);
            }

            // Keep only the last step of each kind, then apply those in a
            // rotated order; the result must match.
            let mut last: Vec<Step> = Vec::new();
            for step in steps.iter().rev() {
                if !last.iter().any(|s| same_kind(s, step)) {
                    last.push(step.clone());
                }
            }
            if !last.is_empty() {
                let shift = (seed % last.len() as u64) as usize;
                last.rotate_left(shift);
            }
            let mut reordered = Query::new("t");
            for step in &last {
                apply(&mut reordered, step);
            }

            prop_assert_eq!(forward, reordered);
        }

        #[test]
        fn predicates_keep_append_order(values in prop::collection::vec(any::<i64>(), 0..8)) {
            let mut q = Query::new("t");
            for v in &values {
                q.push_filter(Filter::new("n", FilterOp::Eq, *v));
            }
            let encoded: Vec<String> = q.filter_params().into_iter().map(|(_, v)| v).collect();
            let expected: Vec<String> = values.iter().map(|v| format!("n.eq.{v}")).collect();
            prop_assert_eq!(encoded, expected);
        }
    }
}
