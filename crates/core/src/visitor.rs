//! Visitor dispatch over counts entries
//!
//! The key space is closed, so dispatch is a single exhaustive `match` in
//! [`CountsKey::accept`].

use crate::counter::CounterPair;
use crate::key::CountsKey;

/// Receives one call per counts entry
///
/// All methods default to doing nothing so visitors only implement what they
/// care about.
pub trait CountsVisitor {
    /// Node count for a label
    fn visit_node_count(&mut self, _label_id: i32, _count: i64) {}

    /// Relationship count for a pattern
    fn visit_relationship_count(
        &mut self,
        _start_label_id: i32,
        _type_id: i32,
        _end_label_id: i32,
        _count: i64,
    ) {
    }

    /// Index update statistics
    fn visit_index_statistics(&mut self, _index_id: i64, _updates: i64, _size: i64) {}

    /// Index sample
    fn visit_index_sample(&mut self, _index_id: i64, _unique: i64, _size: i64) {}
}

impl CountsKey {
    /// Call the visitor method matching this key's type
    pub fn accept(&self, visitor: &mut dyn CountsVisitor, pair: CounterPair) {
        match *self {
            CountsKey::Node { label_id } => visitor.visit_node_count(label_id, pair.second),
            CountsKey::Relationship {
                start_label_id,
                type_id,
                end_label_id,
            } => visitor.visit_relationship_count(start_label_id, type_id, end_label_id, pair.second),
            CountsKey::IndexStatistics { index_id } => {
                visitor.visit_index_statistics(index_id, pair.first, pair.second)
            }
            CountsKey::IndexSample { index_id } => {
                visitor.visit_index_sample(index_id, pair.first, pair.second)
            }
        }
    }
}

/// Visitor that records every entry it is shown, in visit order
///
/// Handy for exports and for comparing store contents in tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectingVisitor {
    /// Entries seen so far
    pub entries: Vec<(CountsKey, CounterPair)>,
}

impl CountsVisitor for CollectingVisitor {
    fn visit_node_count(&mut self, label_id: i32, count: i64) {
        self.entries
            .push((CountsKey::node(label_id), CounterPair::count(count)));
    }

    fn visit_relationship_count(
        &mut self,
        start_label_id: i32,
        type_id: i32,
        end_label_id: i32,
        count: i64,
    ) {
        self.entries.push((
            CountsKey::relationship(start_label_id, type_id, end_label_id),
            CounterPair::count(count),
        ));
    }

    fn visit_index_statistics(&mut self, index_id: i64, updates: i64, size: i64) {
        self.entries.push((
            CountsKey::index_statistics(index_id),
            CounterPair::new(updates, size),
        ));
    }

    fn visit_index_sample(&mut self, index_id: i64, unique: i64, size: i64) {
        self.entries.push((
            CountsKey::index_sample(index_id),
            CounterPair::new(unique, size),
        ));
    }
}
