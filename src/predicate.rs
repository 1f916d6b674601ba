//! Predicate scan interface.
//!
//! A predicate scan filters the ordered entry stream with a conjunction
//! of per-column comparisons: `(values, column_ids, ops)` triples where
//! entry `i` asserts `key.column(column_ids[i]) <op[i]> values[i]`. The
//! engine stays agnostic of key encoding; it only asks the key to
//! project a column through [`KeyAttributes`].

/// Direction of a predicate scan over the leaf chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanDirection {
    /// Head leaf to tail, ascending key order.
    Forward,

    /// Tail leaf to head, descending key order.
    Backward,
}

/// Comparison operator applied to one projected column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PredicateOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl PredicateOp {
    /// Evaluate `lhs <op> rhs`.
    ///
    /// Columns that cannot be ordered against the bound value (a
    /// `partial_cmp` of `None`) fail every operator, including
    /// `NotEqual`; mixed-type comparisons are a caller bug, not a match.
    #[inline]
    #[must_use]
    pub fn evaluate<T: PartialOrd>(self, lhs: &T, rhs: &T) -> bool {
        let Some(ord) = lhs.partial_cmp(rhs) else {
            return false;
        };

        match self {
            Self::Equal => ord.is_eq(),
            Self::NotEqual => ord.is_ne(),
            Self::LessThan => ord.is_lt(),
            Self::LessThanOrEqual => ord.is_le(),
            Self::GreaterThan => ord.is_gt(),
            Self::GreaterThanOrEqual => ord.is_ge(),
        }
    }
}

/// Key types that can project a column for predicate evaluation.
///
/// This is the only demand the scan interface places on keys; the
/// encoding behind `column_id` is owned by the enclosing storage engine.
pub trait KeyAttributes {
    /// Projected column value.
    type Column: PartialOrd;

    /// Project the column named by `column_id`.
    fn column(&self, column_id: usize) -> Self::Column;
}

/// A conjunction of column predicates.
pub(crate) struct Predicate<'a, T> {
    values: &'a [T],
    column_ids: &'a [usize],
    ops: &'a [PredicateOp],
}

impl<'a, T: PartialOrd> Predicate<'a, T> {
    /// Bundle the three parallel slices.
    ///
    /// # Panics
    ///
    /// Panics if the slices disagree on length; mismatched predicate
    /// arrays are a programming error at the call site.
    pub(crate) fn new(values: &'a [T], column_ids: &'a [usize], ops: &'a [PredicateOp]) -> Self {
        assert_eq!(
            values.len(),
            column_ids.len(),
            "predicate values and column_ids must be parallel"
        );
        assert_eq!(
            values.len(),
            ops.len(),
            "predicate values and ops must be parallel"
        );

        Self {
            values,
            column_ids,
            ops,
        }
    }

    /// Evaluate the conjunction against one key.
    pub(crate) fn matches<K>(&self, key: &K) -> bool
    where
        K: KeyAttributes<Column = T>,
    {
        self.column_ids
            .iter()
            .zip(self.values)
            .zip(self.ops)
            .all(|((&column_id, value), op)| op.evaluate(&key.column(column_id), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PairKey(i32, i32);

    impl KeyAttributes for PairKey {
        type Column = i32;

        fn column(&self, column_id: usize) -> i32 {
            match column_id {
                0 => self.0,
                1 => self.1,
                _ => panic!("unknown column {column_id}"),
            }
        }
    }

    #[test]
    fn test_operator_evaluation() {
        assert!(PredicateOp::Equal.evaluate(&3, &3));
        assert!(PredicateOp::NotEqual.evaluate(&3, &4));
        assert!(PredicateOp::LessThan.evaluate(&3, &4));
        assert!(PredicateOp::LessThanOrEqual.evaluate(&4, &4));
        assert!(PredicateOp::GreaterThan.evaluate(&5, &4));
        assert!(PredicateOp::GreaterThanOrEqual.evaluate(&4, &4));
        assert!(!PredicateOp::GreaterThan.evaluate(&4, &4));
    }

    #[test]
    fn test_unordered_columns_never_match() {
        assert!(!PredicateOp::NotEqual.evaluate(&f64::NAN, &1.0));
        assert!(!PredicateOp::LessThan.evaluate(&f64::NAN, &1.0));
    }

    #[test]
    fn test_conjunction() {
        let values = [3, 7];
        let column_ids = [0, 1];
        let ops = [PredicateOp::GreaterThan, PredicateOp::LessThanOrEqual];
        let pred = Predicate::new(&values, &column_ids, &ops);

        assert!(pred.matches(&PairKey(4, 7)));
        assert!(!pred.matches(&PairKey(3, 7)));
        assert!(!pred.matches(&PairKey(4, 8)));
    }

    #[test]
    #[should_panic(expected = "parallel")]
    fn test_mismatched_arrays_panic() {
        let _ = Predicate::new(&[1], &[0, 1], &[PredicateOp::Equal]);
    }
}
