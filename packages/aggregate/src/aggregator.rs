//! Grouping of attributed records by group-key tuples.

use std::collections::BTreeMap;

use geo_coverage_models::{
    AggregateTable, AttributedRecord, GroupField, QuantileValue, RunConfig, Weighting,
    fields_name,
};

use crate::AggregateError;
use crate::accumulator::WeightedAccumulator;

/// One aggregation granularity.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregator {
    fields: Vec<GroupField>,
    quantiles: Vec<f64>,
    weighting: Weighting,
}

impl Aggregator {
    /// Creates an aggregator grouping by `fields`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::EmptyGroupKeys`] for no fields and
    /// [`AggregateError::InvalidQuantile`] for a level outside [0, 1] or
    /// finer than 0.001.
    pub fn new(
        fields: Vec<GroupField>,
        quantiles: Vec<f64>,
        weighting: Weighting,
    ) -> Result<Self, AggregateError> {
        if fields.is_empty() {
            return Err(AggregateError::EmptyGroupKeys);
        }
        if let Some(&q) = quantiles.iter().find(|q| !QuantileValue::is_valid_level(**q)) {
            return Err(AggregateError::InvalidQuantile { q });
        }
        Ok(Self {
            fields,
            quantiles,
            weighting,
        })
    }

    /// One aggregator per configured granularity, in configuration order.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError`] if any granularity is invalid.
    pub fn from_config(config: &RunConfig) -> Result<Vec<Self>, AggregateError> {
        config
            .group_keys
            .iter()
            .map(|fields| Self::new(fields.clone(), config.quantiles.clone(), config.weighting))
            .collect()
    }

    /// Group-key fields of this granularity.
    #[must_use]
    pub fn fields(&self) -> &[GroupField] {
        &self.fields
    }

    /// Name of this granularity, e.g. `day-unit_id`.
    #[must_use]
    pub fn name(&self) -> String {
        fields_name(&self.fields)
    }

    /// An empty partial for this granularity.
    #[must_use]
    pub fn partial(&self) -> PartialAggregate {
        PartialAggregate {
            fields: self.fields.clone(),
            weighting: self.weighting,
            groups: BTreeMap::new(),
        }
    }

    /// Aggregates `records` in one pass.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::NonFiniteValue`] if a record value is not
    /// finite.
    pub fn aggregate(&self, records: &[AttributedRecord]) -> Result<AggregateTable, AggregateError> {
        let mut partial = self.partial();
        partial.extend(records)?;
        Ok(self.finish(partial))
    }

    /// Turns a (possibly merged) partial into the final table, buckets
    /// ordered by key.
    #[must_use]
    pub fn finish(&self, partial: PartialAggregate) -> AggregateTable {
        let buckets = partial
            .groups
            .into_iter()
            .filter_map(|(key, acc)| acc.finish(key, &self.quantiles))
            .collect::<Vec<_>>();

        log::debug!("Aggregated {} buckets over {}", buckets.len(), self.name());

        AggregateTable {
            fields: self.fields.clone(),
            quantiles: self.quantiles.clone(),
            buckets,
        }
    }
}

/// Per-partition grouping state of one granularity.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialAggregate {
    fields: Vec<GroupField>,
    weighting: Weighting,
    groups: BTreeMap<Vec<String>, WeightedAccumulator>,
}

impl PartialAggregate {
    /// Adds one record to its bucket.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::NonFiniteValue`] if the value is not finite.
    pub fn push(&mut self, record: &AttributedRecord) -> Result<(), AggregateError> {
        if !record.value.is_finite() {
            return Err(AggregateError::NonFiniteValue {
                point_id: record.point_id.clone(),
            });
        }
        let key: Vec<String> = self.fields.iter().map(|f| f.extract(record)).collect();
        let weight = match self.weighting {
            Weighting::Confidence => record.confidence.get(),
            Weighting::Unweighted => 1.0,
        };
        self.groups.entry(key).or_default().push(
            record.value,
            weight,
            record.user_id.as_deref(),
        );
        Ok(())
    }

    /// Adds every record.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::NonFiniteValue`] on the first non-finite
    /// value.
    pub fn extend(&mut self, records: &[AttributedRecord]) -> Result<(), AggregateError> {
        records.iter().try_for_each(|r| self.push(r))
    }

    /// Folds another partial of the same granularity into this one.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::MismatchedFields`] if the granularities
    /// differ.
    pub fn merge(&mut self, other: Self) -> Result<(), AggregateError> {
        if self.fields != other.fields {
            return Err(AggregateError::MismatchedFields {
                left: fields_name(&self.fields),
                right: fields_name(&other.fields),
            });
        }
        for (key, acc) in other.groups {
            self.groups.entry(key).or_default().merge(acc);
        }
        Ok(())
    }

    /// Number of distinct keys seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no record has been pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Weighted activity `T_i` per unit: the sum of attribution weights.
#[must_use]
pub fn activity_by_unit(records: &[AttributedRecord], weighting: Weighting) -> BTreeMap<String, f64> {
    let mut activity = BTreeMap::new();
    for record in records {
        let weight = match weighting {
            Weighting::Confidence => record.confidence.get(),
            Weighting::Unweighted => 1.0,
        };
        *activity.entry(record.unit_id.clone()).or_insert(0.0) += weight;
    }
    activity
}
