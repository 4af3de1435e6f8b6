// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! The aggregation contract (spec.md §4.4 "Aggregation contract") and the
//! built-in aggregation set: sum, count, min, max, avg.
//!
//! Partials are required to be `Copy + Send + Sync + 'static` — spec.md's
//! Open Question on variable-sized aggregation inputs is resolved in
//! SPEC_FULL.md §4.3 by scoping this trait to fixed-size-keyed
//! aggregations only.

pub trait Aggregation: Send + Sync {
    type Input: Copy + Send + Sync;
    type Partial: Copy + Send + Sync + 'static;
    type Final;

    /// Identity element for `combine` — an empty slice's partial.
    fn identity(&self) -> Self::Partial;
    fn lift(&self, input: Self::Input) -> Self::Partial;
    /// Associative, commutative.
    fn combine(&self, a: Self::Partial, b: Self::Partial) -> Self::Partial;
    fn lower(&self, partial: Self::Partial) -> Self::Final;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SumAggregation;

impl Aggregation for SumAggregation {
    type Input = i64;
    type Partial = i64;
    type Final = i64;

    fn identity(&self) -> i64 {
        0
    }

    fn lift(&self, input: i64) -> i64 {
        input
    }

    fn combine(&self, a: i64, b: i64) -> i64 {
        a + b
    }

    fn lower(&self, partial: i64) -> i64 {
        partial
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CountAggregation;

impl Aggregation for CountAggregation {
    type Input = ();
    type Partial = u64;
    type Final = u64;

    fn identity(&self) -> u64 {
        0
    }

    fn lift(&self, _input: ()) -> u64 {
        1
    }

    fn combine(&self, a: u64, b: u64) -> u64 {
        a + b
    }

    fn lower(&self, partial: u64) -> u64 {
        partial
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MinAggregation;

impl Aggregation for MinAggregation {
    type Input = i64;
    type Partial = i64;
    type Final = i64;

    fn identity(&self) -> i64 {
        i64::MAX
    }

    fn lift(&self, input: i64) -> i64 {
        input
    }

    fn combine(&self, a: i64, b: i64) -> i64 {
        a.min(b)
    }

    fn lower(&self, partial: i64) -> i64 {
        partial
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MaxAggregation;

impl Aggregation for MaxAggregation {
    type Input = i64;
    type Partial = i64;
    type Final = i64;

    fn identity(&self) -> i64 {
        i64::MIN
    }

    fn lift(&self, input: i64) -> i64 {
        input
    }

    fn combine(&self, a: i64, b: i64) -> i64 {
        a.max(b)
    }

    fn lower(&self, partial: i64) -> i64 {
        partial
    }
}

/// Carries sum and count so the final average can be computed once at
/// `lower` time (spec.md §4.4: "avg (partial carries sum and count)").
#[derive(Debug, Clone, Copy, Default)]
pub struct AvgPartial {
    pub sum: i64,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AvgAggregation;

impl Aggregation for AvgAggregation {
    type Input = i64;
    type Partial = AvgPartial;
    type Final = f64;

    fn identity(&self) -> AvgPartial {
        AvgPartial::default()
    }

    fn lift(&self, input: i64) -> AvgPartial {
        AvgPartial { sum: input, count: 1 }
    }

    fn combine(&self, a: AvgPartial, b: AvgPartial) -> AvgPartial {
        AvgPartial {
            sum: a.sum + b.sum,
            count: a.count + b.count,
        }
    }

    fn lower(&self, partial: AvgPartial) -> f64 {
        if partial.count == 0 {
            0.0
        } else {
            partial.sum as f64 / partial.count as f64
        }
    }
}

/// Runtime-selected aggregation kind (spec.md §4.4 "Built-in aggregations").
///
/// `OperatorHandler` variants must be concrete, non-generic types for
/// `enum_dispatch` to cover them, so `WindowOperatorHandler` cannot carry an
/// `Aggregation` type parameter per window operator instance. `AggregateValue`
/// plus `DynamicAggregation` erase that type parameter into a single tagged
/// value the generic `SliceStore` can still combine through the same
/// `Aggregation` contract the built-ins above implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationKind {
    Sum,
    Count,
    Min,
    Max,
    Avg,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregateValue {
    I64(i64),
    U64(u64),
    F64(f64),
    Avg { sum: i64, count: u64 },
}

impl AggregateValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AggregateValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AggregateValue::F64(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DynamicAggregation(pub AggregationKind);

impl Aggregation for DynamicAggregation {
    type Input = AggregateValue;
    type Partial = AggregateValue;
    type Final = AggregateValue;

    fn identity(&self) -> AggregateValue {
        match self.0 {
            AggregationKind::Sum => AggregateValue::I64(0),
            AggregationKind::Count => AggregateValue::U64(0),
            AggregationKind::Min => AggregateValue::I64(i64::MAX),
            AggregationKind::Max => AggregateValue::I64(i64::MIN),
            AggregationKind::Avg => AggregateValue::Avg { sum: 0, count: 0 },
        }
    }

    fn lift(&self, input: AggregateValue) -> AggregateValue {
        match (self.0, input) {
            (AggregationKind::Sum, AggregateValue::I64(v)) => AggregateValue::I64(v),
            (AggregationKind::Count, _) => AggregateValue::U64(1),
            (AggregationKind::Min, AggregateValue::I64(v)) => AggregateValue::I64(v),
            (AggregationKind::Max, AggregateValue::I64(v)) => AggregateValue::I64(v),
            (AggregationKind::Avg, AggregateValue::I64(v)) => AggregateValue::Avg { sum: v, count: 1 },
            (kind, value) => panic!("{kind:?} cannot lift {value:?}"),
        }
    }

    fn combine(&self, a: AggregateValue, b: AggregateValue) -> AggregateValue {
        match (self.0, a, b) {
            (AggregationKind::Sum, AggregateValue::I64(a), AggregateValue::I64(b)) => AggregateValue::I64(a + b),
            (AggregationKind::Count, AggregateValue::U64(a), AggregateValue::U64(b)) => AggregateValue::U64(a + b),
            (AggregationKind::Min, AggregateValue::I64(a), AggregateValue::I64(b)) => AggregateValue::I64(a.min(b)),
            (AggregationKind::Max, AggregateValue::I64(a), AggregateValue::I64(b)) => AggregateValue::I64(a.max(b)),
            (
                AggregationKind::Avg,
                AggregateValue::Avg { sum: sa, count: ca },
                AggregateValue::Avg { sum: sb, count: cb },
            ) => AggregateValue::Avg {
                sum: sa + sb,
                count: ca + cb,
            },
            (kind, a, b) => panic!("{kind:?} cannot combine {a:?} and {b:?}"),
        }
    }

    fn lower(&self, partial: AggregateValue) -> AggregateValue {
        match (self.0, partial) {
            (AggregationKind::Avg, AggregateValue::Avg { sum, count }) => {
                if count == 0 {
                    AggregateValue::F64(0.0)
                } else {
                    AggregateValue::F64(sum as f64 / count as f64)
                }
            }
            (_, value) => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_combine_is_associative_and_commutative() {
        let agg = SumAggregation;
        let a = agg.lift(3);
        let b = agg.lift(4);
        let c = agg.lift(5);
        assert_eq!(agg.combine(agg.combine(a, b), c), agg.combine(a, agg.combine(b, c)));
        assert_eq!(agg.combine(a, b), agg.combine(b, a));
        assert_eq!(agg.lower(agg.combine(a, agg.identity())), 3);
    }

    #[test]
    fn avg_carries_sum_and_count() {
        let agg = AvgAggregation;
        let partial = agg.combine(agg.lift(2), agg.combine(agg.lift(4), agg.lift(6)));
        assert_eq!(partial.sum, 12);
        assert_eq!(partial.count, 3);
        assert_eq!(agg.lower(partial), 4.0);
    }

    #[test]
    fn dynamic_sum_matches_builtin_sum() {
        let dynamic = DynamicAggregation(AggregationKind::Sum);
        let partial = dynamic.combine(
            dynamic.lift(AggregateValue::I64(3)),
            dynamic.lift(AggregateValue::I64(4)),
        );
        assert_eq!(dynamic.lower(partial), AggregateValue::I64(7));
    }

    #[test]
    fn dynamic_avg_lowers_to_f64() {
        let dynamic = DynamicAggregation(AggregationKind::Avg);
        let partial = dynamic.combine(
            dynamic.lift(AggregateValue::I64(2)),
            dynamic.lift(AggregateValue::I64(4)),
        );
        assert_eq!(dynamic.lower(partial), AggregateValue::F64(3.0));
    }
}
