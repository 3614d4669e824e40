use crate::metadata::MethodId;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Work list of methods to analyze, along with call-site counts
///
/// Methods are handed out breadth-first, each at most once. Only call sites count as calls:
/// methods scheduled some other way (eg. static constructors) may be visited with a count of
/// zero.
#[derive(Clone, Debug, Default)]
pub struct CallGraph {
    call_counts: BTreeMap<MethodId, usize>,
    inlined_methods: BTreeSet<MethodId>,
    to_visit: VecDeque<MethodId>,
    enqueued: BTreeSet<MethodId>,
    visit_order: Vec<MethodId>,
}

impl CallGraph {
    /// Start a walk from the entry method (which counts as called once)
    pub fn new(entry: MethodId) -> CallGraph {
        let mut call_graph = CallGraph::default();
        call_graph.call_counts.insert(entry, 1);
        call_graph.enqueue(entry);
        call_graph
    }

    /// Schedule a method for analysis without counting a call
    ///
    /// Returns `false` if the method was already scheduled.
    pub fn enqueue(&mut self, method: MethodId) -> bool {
        if !self.enqueued.insert(method) {
            return false;
        }
        log::trace!("enqueued {}", method);
        self.to_visit.push_back(method);
        true
    }

    /// Count a call site and schedule the callee
    pub fn record_call(&mut self, callee: MethodId) {
        *self.call_counts.entry(callee).or_insert(0) += 1;
        self.enqueue(callee);
    }

    /// Mark a method as inlined at every call site
    pub fn mark_inline(&mut self, method: MethodId) {
        self.inlined_methods.insert(method);
    }

    /// Next method to analyze
    pub fn next_method(&mut self) -> Option<MethodId> {
        let method = self.to_visit.pop_front()?;
        self.visit_order.push(method);
        Some(method)
    }

    pub fn call_counts(&self) -> &BTreeMap<MethodId, usize> {
        &self.call_counts
    }

    pub fn inlined_methods(&self) -> &BTreeSet<MethodId> {
        &self.inlined_methods
    }

    pub fn visit_order(&self) -> &[MethodId] {
        &self.visit_order
    }

    /// Methods that must be emitted standalone: called from several sites and not inlined
    ///
    /// Methods called from a single site are left out, but that doesn't mean they should be
    /// inlined (the emitter decides).
    pub fn non_inlined_methods(&self) -> BTreeSet<MethodId> {
        self.call_counts
            .iter()
            .filter(|(method, count)| **count > 1 && !self.inlined_methods.contains(*method))
            .map(|(method, _)| *method)
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn breadth_first_once() {
        let [main, a, b, cctor] = [MethodId(0), MethodId(1), MethodId(2), MethodId(3)];
        let mut calls = CallGraph::new(main);

        assert_eq!(calls.next_method(), Some(main));
        calls.record_call(a);
        calls.record_call(b);
        calls.record_call(a);
        assert!(calls.enqueue(cctor));
        assert_eq!(calls.next_method(), Some(a));
        calls.record_call(cctor);
        calls.record_call(main);

        assert_eq!(calls.next_method(), Some(b));
        assert_eq!(calls.next_method(), Some(cctor));
        assert_eq!(calls.next_method(), None);
        assert_eq!(calls.visit_order(), &[main, a, b, cctor]);

        let counts = calls.call_counts();
        assert_eq!(counts[&main], 2);
        assert_eq!(counts[&a], 2);
        assert_eq!(counts[&b], 1);
        assert_eq!(counts[&cctor], 1, "scheduling is not a call");
    }

    #[test]
    fn inline_methods_are_not_standalone() {
        let [main, shared, inline, single] = [MethodId(0), MethodId(1), MethodId(2), MethodId(3)];
        let mut calls = CallGraph::new(main);
        for callee in [shared, shared, inline, inline, single] {
            calls.record_call(callee);
        }
        calls.mark_inline(inline);

        let expected: BTreeSet<MethodId> = [shared].into_iter().collect();
        assert_eq!(calls.non_inlined_methods(), expected);
    }
}
