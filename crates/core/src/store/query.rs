//! Query description and in-process evaluation.

use super::{CollectionPath, Document, FieldValue};
use clinic_uuid::DocumentId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: FieldValue,
}

impl Filter {
    fn matches(&self, value: &FieldValue) -> bool {
        let ord = value.total_cmp(&self.value);
        match self.op {
            FilterOp::Eq => ord == Ordering::Equal,
            // Range filters only match values of the same type.
            _ if std::mem::discriminant(value) != std::mem::discriminant(&self.value)
                && !matches!(
                    (value, &self.value),
                    (FieldValue::Integer(_), FieldValue::Double(_))
                        | (FieldValue::Double(_), FieldValue::Integer(_))
                ) =>
            {
                false
            }
            FilterOp::Lt => ord == Ordering::Less,
            FilterOp::Lte => ord != Ordering::Greater,
            FilterOp::Gt => ord == Ordering::Greater,
            FilterOp::Gte => ord != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Position of a document within an ordered result, used to continue a query
/// strictly after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    value: FieldValue,
    id: DocumentId,
}

impl Cursor {
    pub fn id(&self) -> &DocumentId {
        &self.id
    }
}

/// Composite index a query needs before the store will run it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpec {
    pub collection_group: String,
    pub fields: BTreeSet<String>,
}

impl IndexSpec {
    pub fn new<I, F>(collection_group: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        Self {
            collection_group: collection_group.to_owned(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: CollectionPath,
    filters: Vec<Filter>,
    order_by: Option<OrderBy>,
    limit: Option<usize>,
    start_after: Option<Cursor>,
}

impl Query {
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            limit: None,
            start_after: None,
        }
    }

    pub fn filter(mut self, field: &str, op: FilterOp, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter {
            field: field.to_owned(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn where_eq(self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_owned(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, cursor: Cursor) -> Self {
        self.start_after = Some(cursor);
        self
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    /// Cursor positioned at `doc` under this query's ordering.
    pub fn cursor_at(&self, doc: &Document) -> Cursor {
        let value = self
            .order_by
            .as_ref()
            .and_then(|o| doc.get(&o.field).cloned())
            .unwrap_or(FieldValue::Null);
        Cursor {
            value,
            id: doc.id().clone(),
        }
    }

    /// The composite index this query requires, if any.
    ///
    /// A query touching a single field (through filters and ordering together)
    /// runs on the automatic single-field index; anything wider needs a declared
    /// composite index.
    pub fn required_index(&self) -> Option<IndexSpec> {
        let mut fields: BTreeSet<String> = self.filters.iter().map(|f| f.field.clone()).collect();
        if let Some(order) = &self.order_by {
            fields.insert(order.field.clone());
        }
        if fields.len() > 1 {
            Some(IndexSpec {
                collection_group: self.collection.group().to_owned(),
                fields,
            })
        } else {
            None
        }
    }

    fn matches(&self, doc: &Document) -> bool {
        if doc.path().parent() != &self.collection {
            return false;
        }
        let filters_ok = self.filters.iter().all(|f| {
            doc.get(&f.field)
                .map(|value| f.matches(value))
                .unwrap_or(false)
        });
        // Documents without the ordering field are not part of an ordered result.
        let has_order_field = self
            .order_by
            .as_ref()
            .map(|o| doc.get(&o.field).is_some())
            .unwrap_or(true);
        filters_ok && has_order_field
    }

    fn compare_position(&self, value: &FieldValue, id: &DocumentId, other: &Cursor) -> Ordering {
        let ord = value.total_cmp(&other.value).then_with(|| id.cmp(&other.id));
        match self.order_by.as_ref().map(|o| o.direction) {
            Some(Direction::Descending) => ord.reverse(),
            _ => ord,
        }
    }

    fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let cursor_b = self.cursor_at(b);
        let value_a = self.cursor_at(a).value;
        self.compare_position(&value_a, a.id(), &cursor_b)
    }

    /// Runs the query over `docs`, applying filters, ordering, cursor and limit.
    ///
    /// Ties on the ordering field are broken by document id in the same direction.
    pub fn evaluate<'a>(&self, docs: impl IntoIterator<Item = &'a Document>) -> Vec<Document> {
        let mut matched: Vec<&Document> = docs.into_iter().filter(|d| self.matches(d)).collect();
        matched.sort_by(|a, b| self.compare(a, b));

        let after_cursor = matched.into_iter().filter(|doc| match &self.start_after {
            Some(cursor) => {
                let position = self.cursor_at(doc);
                self.compare_position(&position.value, doc.id(), cursor) == Ordering::Greater
            }
            None => true,
        });

        match self.limit {
            Some(limit) => after_cursor.take(limit).cloned().collect(),
            None => after_cursor.cloned().collect(),
        }
    }
}
