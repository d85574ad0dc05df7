//! Equivalence classes over graph nodes: a parent-pointer union-find with path
//! compression, plus per-class payload. The payload is the class's accumulated
//! conformance set and its resolved concrete type, if any member was constrained to
//! one. Classes are owned and mutated by the equivalence resolver exclusively; every
//! other component only queries them.

use std::collections::HashSet;

use symbol::Symbol;
use types::TypeExpr;

use crate::NodeIdx;

#[derive(Debug, Default, Clone)]
pub struct ClassData {
    pub concrete: Option<TypeExpr>,
    pub conformances: HashSet<Symbol>,
}

/// Result of a [`EquivalenceClasses::union`]. When both classes carried a concrete
/// type, the caller has to reconcile the two expressions - recursively matching them
/// can derive further equalities or expose a conflict, neither of which this
/// structure knows how to handle.
#[derive(Debug)]
pub struct MergeOutcome {
    pub merged: bool,
    pub reconcile: Option<(TypeExpr, TypeExpr)>,
}

/// Result of assigning a concrete type to a class
#[derive(Debug)]
pub enum SetConcrete {
    /// The class had no concrete type; it does now
    Installed,
    /// The class already carried this exact expression
    AlreadySet,
    /// The class carried a different expression; the caller must reconcile
    Reconcile(TypeExpr, TypeExpr),
}

#[derive(Debug)]
pub struct EquivalenceClasses {
    parent: Vec<usize>,
    // payload is only meaningful at class roots
    data: Vec<ClassData>,
}

impl EquivalenceClasses {
    pub fn new(count: usize) -> EquivalenceClasses {
        EquivalenceClasses {
            parent: (0..count).collect(),
            data: vec![ClassData::default(); count],
        }
    }

    /// Grow to cover nodes added to the graph since the last sync. New nodes start
    /// as their own singleton classes.
    pub fn sync(&mut self, count: usize) {
        while self.parent.len() < count {
            self.parent.push(self.parent.len());
            self.data.push(ClassData::default());
        }
    }

    pub fn node_count(&self) -> usize {
        self.parent.len()
    }

    /// Root of `node`'s class, without path compression - usable through a shared
    /// reference
    pub fn find(&self, node: NodeIdx) -> NodeIdx {
        let mut current = node.0;
        while self.parent[current] != current {
            current = self.parent[current];
        }

        NodeIdx(current)
    }

    /// Root of `node`'s class, compressing the walked path
    pub fn find_compress(&mut self, node: NodeIdx) -> NodeIdx {
        let root = self.find(node);

        let mut current = node.0;
        while self.parent[current] != root.0 {
            let next = self.parent[current];
            self.parent[current] = root.0;
            current = next;
        }

        root
    }

    pub fn same_class(&self, lhs: NodeIdx, rhs: NodeIdx) -> bool {
        self.find(lhs) == self.find(rhs)
    }

    /// Merge the classes of `lhs` and `rhs`. The smaller root index wins, so a class
    /// containing a parameter is always rooted at its earliest-declared parameter.
    /// Conformance sets are unioned; concrete types are kept on the surviving root,
    /// with a reconcile pair returned when both sides had one.
    pub fn union(&mut self, lhs: NodeIdx, rhs: NodeIdx) -> MergeOutcome {
        let lroot = self.find_compress(lhs);
        let rroot = self.find_compress(rhs);

        if lroot == rroot {
            return MergeOutcome {
                merged: false,
                reconcile: None,
            };
        }

        let (winner, loser) = if lroot.0 < rroot.0 {
            (lroot, rroot)
        } else {
            (rroot, lroot)
        };

        self.parent[loser.0] = winner.0;

        let loser_data = std::mem::take(&mut self.data[loser.0]);
        let winner_data = &mut self.data[winner.0];
        winner_data.conformances.extend(loser_data.conformances);

        let reconcile = match (winner_data.concrete.as_ref(), loser_data.concrete) {
            (Some(kept), Some(other)) => {
                if *kept == other {
                    None
                } else {
                    Some((kept.clone(), other))
                }
            }
            (None, Some(other)) => {
                winner_data.concrete = Some(other);
                None
            }
            (_, None) => None,
        };

        MergeOutcome {
            merged: true,
            reconcile,
        }
    }

    pub fn concrete(&self, node: NodeIdx) -> Option<&TypeExpr> {
        self.data[self.find(node).0].concrete.as_ref()
    }

    /// Assign a concrete type to `node`'s class
    pub fn set_concrete(&mut self, node: NodeIdx, expr: TypeExpr) -> SetConcrete {
        let root = self.find_compress(node);
        let data = &mut self.data[root.0];

        match &data.concrete {
            None => {
                data.concrete = Some(expr);
                SetConcrete::Installed
            }
            Some(existing) if *existing == expr => SetConcrete::AlreadySet,
            Some(existing) => SetConcrete::Reconcile(existing.clone(), expr),
        }
    }

    /// Record a conformance on `node`'s class. Returns whether the set grew.
    pub fn add_conformance(&mut self, node: NodeIdx, protocol: Symbol) -> bool {
        let root = self.find_compress(node);

        self.data[root.0].conformances.insert(protocol)
    }

    pub fn conformances(&self, node: NodeIdx) -> &HashSet<Symbol> {
        &self.data[self.find(node).0].conformances
    }

    /// All class roots, in index order
    pub fn roots(&self) -> Vec<NodeIdx> {
        (0..self.parent.len())
            .filter(|idx| self.parent[*idx] == *idx)
            .map(NodeIdx)
            .collect()
    }

    pub fn class_count(&self) -> usize {
        self.roots().len()
    }
}
