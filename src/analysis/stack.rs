use crate::util::Offset;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Candidate producers of one stack slot
///
/// An empty set stands for a value with no known producer (eg. the exception pushed on entry to
/// a catch handler).
pub type StackValueSet = BTreeSet<Offset>;

struct StackNode {
    value: StackValueSet,
    depth: usize,
    below: Option<Arc<StackNode>>,
}

/// Immutable abstract operand stack with structural sharing
///
/// Pushing and popping produce new stacks sharing their tails with the original, so snapshots
/// at every instruction are cheap to keep around. Nodes are reference counted atomically, so a
/// finished analysis can be read from several threads.
#[derive(Clone, Default)]
pub struct PersistentStack {
    top: Option<Arc<StackNode>>,
}

impl PersistentStack {
    pub fn new() -> PersistentStack {
        PersistentStack { top: None }
    }

    pub fn depth(&self) -> usize {
        self.top.as_ref().map_or(0, |node| node.depth)
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_none()
    }

    pub fn push(&self, value: StackValueSet) -> PersistentStack {
        let node = StackNode {
            depth: self.depth() + 1,
            value,
            below: self.top.clone(),
        };
        PersistentStack {
            top: Some(Arc::new(node)),
        }
    }

    /// Top value and the stack below it (`None` if the stack is empty)
    pub fn pop(&self) -> Option<(&StackValueSet, PersistentStack)> {
        self.top.as_ref().map(|node| {
            let below = PersistentStack {
                top: node.below.clone(),
            };
            (&node.value, below)
        })
    }

    pub fn peek(&self) -> Option<&StackValueSet> {
        self.top.as_ref().map(|node| &node.value)
    }

    /// Iterate from the top of the stack down
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.top.as_deref(),
        }
    }

    /// Do both stacks share the very same nodes?
    pub fn ptr_eq(&self, other: &PersistentStack) -> bool {
        match (&self.top, &other.top) {
            (Some(node1), Some(node2)) => Arc::ptr_eq(node1, node2),
            (None, None) => true,
            _ => false,
        }
    }

    /// Merge two stacks of the same depth slot by slot, unioning producers
    ///
    /// Only the divergent prefix gets rebuilt: the walk stops as soon as both stacks reach a
    /// shared node. Returns `None` if the depths differ.
    pub fn merge(&self, other: &PersistentStack) -> Option<PersistentStack> {
        if self.depth() != other.depth() {
            return None;
        }

        let mut merged_slots = vec![];
        let mut stack1 = self.clone();
        let mut stack2 = other.clone();
        while !stack1.ptr_eq(&stack2) {
            let (value1, below1) = stack1.pop()?;
            let (value2, below2) = stack2.pop()?;
            merged_slots.push(value1.union(value2).copied().collect::<StackValueSet>());
            stack1 = below1;
            stack2 = below2;
        }

        Some(
            merged_slots
                .into_iter()
                .rev()
                .fold(stack1, |stack, value| stack.push(value)),
        )
    }
}

impl PartialEq for PersistentStack {
    fn eq(&self, other: &PersistentStack) -> bool {
        self.ptr_eq(other) || (self.depth() == other.depth() && self.iter().eq(other.iter()))
    }
}

impl Eq for PersistentStack {}

impl fmt::Debug for PersistentStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

pub struct Iter<'a> {
    next: Option<&'a StackNode>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a StackValueSet;

    fn next(&mut self) -> Option<&'a StackValueSet> {
        self.next.map(|node| {
            self.next = node.below.as_deref();
            &node.value
        })
    }
}
