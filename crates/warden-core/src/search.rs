//! Abstract event search queries.
//!
//! A [`SearchQuery`] describes which events to read without naming any table
//! or column. Backends compile it into their own statement language.

use crate::error::DomainError;
use crate::event::{AggregateType, EventType};

/// Which projection of the event table a query reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Columns {
    /// Full event rows.
    #[default]
    Event,
    /// Only the maximum sequence of the matching events.
    MaxSequence,
}

/// Abstract event field a filter applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Aggregate identifier.
    AggregateId,
    /// Aggregate type.
    AggregateType,
    /// Owning tenant.
    ResourceOwner,
    /// Acting user.
    EditorUser,
    /// Acting service.
    EditorService,
    /// Event type name.
    EventType,
    /// Position within the aggregate stream.
    Sequence,
}

/// Comparison applied by a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Field equals the value.
    Equals,
    /// Field is greater than the value.
    Greater,
    /// Field is less than the value.
    Less,
    /// Field is one of the listed values.
    In,
}

/// Value a filter compares against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// A single text value.
    Text(String),
    /// A list of text values, bound as one array parameter.
    TextList(Vec<String>),
    /// A sequence number.
    Sequence(u64),
}

/// A single `(field, operation, value)` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Field to compare.
    pub field: Field,
    /// Comparison.
    pub operation: Operation,
    /// Value to compare against.
    pub value: FilterValue,
}

impl Filter {
    /// Creates a new filter.
    #[must_use]
    pub fn new(field: Field, value: FilterValue, operation: Operation) -> Self {
        Self {
            field,
            operation,
            value,
        }
    }

    /// Returns `true` if the value fits the field and operation: `In` needs a
    /// non-empty list, ordering comparisons need a sequence, and the sequence
    /// field only takes sequence values.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        match (self.field, self.operation, &self.value) {
            (Field::Sequence, Operation::In, _) => false,
            (Field::Sequence, _, FilterValue::Sequence(_)) => true,
            (Field::Sequence, _, _) => false,
            (_, Operation::In, FilterValue::TextList(values)) => !values.is_empty(),
            (_, Operation::Equals, FilterValue::Text(_)) => true,
            _ => false,
        }
    }
}

/// Compiled-independent description of an event search.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchQuery {
    /// Projection to read.
    pub columns: Columns,
    /// Disjunction of filter groups. An event matches if it satisfies every
    /// filter of at least one group.
    pub filters: Vec<Vec<Filter>>,
    /// Maximum number of rows, `0` for no limit.
    pub limit: u64,
    /// Descending sequence order when `true`.
    pub desc: bool,
}

/// Conditions of one filter group.
#[derive(Debug, Clone, Default)]
struct Criteria {
    aggregate_types: Vec<AggregateType>,
    aggregate_ids: Vec<String>,
    event_types: Vec<EventType>,
    editor_user: Option<String>,
    editor_service: Option<String>,
    sequence_greater: Option<u64>,
    sequence_less: Option<u64>,
}

impl Criteria {
    fn into_filters(self, resource_owner: Option<&str>) -> Result<Vec<Filter>, DomainError> {
        if self.aggregate_types.is_empty() {
            return Err(DomainError::InvalidArgument(
                "search query needs at least one aggregate type".to_owned(),
            ));
        }

        let mut filters = vec![text_filter(
            Field::AggregateType,
            self.aggregate_types.into_iter().map(|t| t.0).collect(),
        )];
        if !self.aggregate_ids.is_empty() {
            filters.push(text_filter(Field::AggregateId, self.aggregate_ids));
        }
        if let Some(sequence) = self.sequence_greater {
            filters.push(Filter::new(
                Field::Sequence,
                FilterValue::Sequence(sequence),
                Operation::Greater,
            ));
        }
        if let Some(sequence) = self.sequence_less {
            filters.push(Filter::new(
                Field::Sequence,
                FilterValue::Sequence(sequence),
                Operation::Less,
            ));
        }
        if !self.event_types.is_empty() {
            filters.push(text_filter(
                Field::EventType,
                self.event_types.into_iter().map(|t| t.0).collect(),
            ));
        }
        for (field, value) in [
            (Field::ResourceOwner, resource_owner.map(str::to_owned)),
            (Field::EditorUser, self.editor_user),
            (Field::EditorService, self.editor_service),
        ] {
            if let Some(value) = value {
                filters.push(Filter::new(field, FilterValue::Text(value), Operation::Equals));
            }
        }
        Ok(filters)
    }
}

/// Fluent builder for [`SearchQuery`]. One value for a field compiles to an
/// equality filter, several values to an `In` filter.
///
/// Conditions go into the current filter group; [`SearchQueryBuilder::or`]
/// starts a new one. Projection, ordering, limit, and resource owner apply
/// to the whole query.
///
/// ```
/// # use warden_core::search::{Columns, SearchQueryBuilder};
/// let query = SearchQueryBuilder::new(Columns::Event)
///     .aggregate_types(["user"])
///     .aggregate_ids(["1234"])
///     .or()
///     .aggregate_types(["org"])
///     .aggregate_ids(["izu"])
///     .build()
///     .unwrap();
/// assert_eq!(query.filters.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SearchQueryBuilder {
    columns: Columns,
    limit: u64,
    desc: bool,
    resource_owner: Option<String>,
    groups: Vec<Criteria>,
    current: Criteria,
}

impl SearchQueryBuilder {
    /// Creates a builder reading `columns`.
    #[must_use]
    pub fn new(columns: Columns) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    /// Scopes the builder to a single aggregate stream.
    #[must_use]
    pub fn stream(aggregate_type: impl Into<AggregateType>, aggregate_id: impl Into<String>) -> Self {
        let aggregate_type: AggregateType = aggregate_type.into();
        let aggregate_id: String = aggregate_id.into();
        Self::new(Columns::Event)
            .aggregate_types([aggregate_type])
            .aggregate_ids([aggregate_id])
    }

    /// Closes the current filter group and starts a new, empty one. Events
    /// matching any group are returned.
    #[must_use]
    pub fn or(mut self) -> Self {
        self.groups.push(std::mem::take(&mut self.current));
        self
    }

    /// Sets the projection.
    #[must_use]
    pub fn columns(mut self, columns: Columns) -> Self {
        self.columns = columns;
        self
    }

    /// Sets the maximum number of rows.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Orders by descending sequence.
    #[must_use]
    pub fn order_desc(mut self) -> Self {
        self.desc = true;
        self
    }

    /// Orders by ascending sequence (the default).
    #[must_use]
    pub fn order_asc(mut self) -> Self {
        self.desc = false;
        self
    }

    /// Adds aggregate types to match.
    #[must_use]
    pub fn aggregate_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<AggregateType>,
    {
        self.current
            .aggregate_types
            .extend(types.into_iter().map(Into::into));
        self
    }

    /// Adds aggregate ids to match.
    #[must_use]
    pub fn aggregate_ids<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.current
            .aggregate_ids
            .extend(ids.into_iter().map(Into::into));
        self
    }

    /// Adds event types to match.
    #[must_use]
    pub fn event_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EventType>,
    {
        self.current
            .event_types
            .extend(types.into_iter().map(Into::into));
        self
    }

    /// Restricts every filter group to one resource owner.
    #[must_use]
    pub fn resource_owner(mut self, resource_owner: impl Into<String>) -> Self {
        self.resource_owner = Some(resource_owner.into());
        self
    }

    /// Restricts to one acting user.
    #[must_use]
    pub fn editor_user(mut self, editor_user: impl Into<String>) -> Self {
        self.current.editor_user = Some(editor_user.into());
        self
    }

    /// Restricts to one acting service.
    #[must_use]
    pub fn editor_service(mut self, editor_service: impl Into<String>) -> Self {
        self.current.editor_service = Some(editor_service.into());
        self
    }

    /// Only events with a sequence greater than `sequence`.
    #[must_use]
    pub fn sequence_greater(mut self, sequence: u64) -> Self {
        self.current.sequence_greater = Some(sequence);
        self
    }

    /// Only events with a sequence less than `sequence`.
    #[must_use]
    pub fn sequence_less(mut self, sequence: u64) -> Self {
        self.current.sequence_less = Some(sequence);
        self
    }

    /// Builds the query.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` if a filter group has no
    /// aggregate type.
    pub fn build(mut self) -> Result<SearchQuery, DomainError> {
        self.groups.push(self.current);
        let resource_owner = self.resource_owner.as_deref();
        let filters = self
            .groups
            .into_iter()
            .map(|criteria| criteria.into_filters(resource_owner))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SearchQuery {
            columns: self.columns,
            filters,
            limit: self.limit,
            desc: self.desc,
        })
    }
}

fn text_filter(field: Field, mut values: Vec<String>) -> Filter {
    if values.len() == 1 {
        let value = values.remove(0);
        Filter::new(field, FilterValue::Text(value), Operation::Equals)
    } else {
        Filter::new(field, FilterValue::TextList(values), Operation::In)
    }
}
