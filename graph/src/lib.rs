//! The requirement graph is a flat arena of nodes, one per distinct parameter-rooted
//! dependent type mentioned anywhere in the declaration: the parameters themselves
//! and every projection applied to them (`A`, `A.T`, `A.T.T`, ...). Building the
//! graph records edges - same-type, concrete bindings, conformances - but *never*
//! merges anything: all destructive resolution is deferred to the equivalence
//! resolver, which is what makes the result independent of requirement order.
//!
//! Nodes are addressed by [`NodeIdx`] into a `Vec`, and equivalence classes are a
//! parent-pointer array over those same indices, so the whole structure is flat and
//! cycle-free by construction.

use std::collections::HashMap;

use debug_log::log;
use error::{ErrKind, Error};
use registry::Registry;
use symbol::Symbol;
use types::{GenericParam, ParamIdx, Requirement, TypeExpr};

mod classes;

pub use classes::{ClassData, EquivalenceClasses, MergeOutcome, SetConcrete};

/// Index of a node in the requirement graph's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A declared generic parameter. The first `params.len()` nodes of the arena are
    /// the roots, in declaration order, so `NodeIdx(i)` is `ParamIdx(i)` for them.
    Root(ParamIdx),
    /// A projection applied to another node: `<base>.<member>`
    Member { base: NodeIdx, member: Symbol },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub idx: NodeIdx,
    pub kind: NodeKind,
}

/// What a [`TypeExpr`] lowers to: a node when it is rooted at a parameter, or a
/// normalized concrete type when it is not
#[derive(Debug, Clone, PartialEq)]
pub enum Lowered {
    Node(NodeIdx),
    Concrete(TypeExpr),
}

#[derive(Debug)]
pub struct RequirementGraph {
    params: Vec<GenericParam>,
    nodes: Vec<Node>,
    members: HashMap<(NodeIdx, Symbol), NodeIdx>,
    /// Undirected same-type edges between nodes
    pub same_type: Vec<(NodeIdx, NodeIdx)>,
    /// A node constrained to a concrete type
    pub concrete: Vec<(NodeIdx, TypeExpr)>,
    /// Same-type requirements where both sides lowered to concrete types; they still
    /// constrain each other's arguments and are reconciled during resolution
    pub concrete_pairs: Vec<(TypeExpr, TypeExpr)>,
    /// A node required to conform to a protocol
    pub conformance: Vec<(NodeIdx, Symbol)>,
}

impl RequirementGraph {
    fn new(params: Vec<GenericParam>) -> RequirementGraph {
        let nodes = params
            .iter()
            .enumerate()
            .map(|(idx, _)| Node {
                idx: NodeIdx(idx),
                kind: NodeKind::Root(ParamIdx(idx)),
            })
            .collect();

        RequirementGraph {
            params,
            nodes,
            members: HashMap::new(),
            same_type: vec![],
            concrete: vec![],
            concrete_pairs: vec![],
            conformance: vec![],
        }
    }

    pub fn params(&self) -> &[GenericParam] {
        &self.params
    }

    pub fn param_names(&self) -> Vec<Symbol> {
        self.params.iter().map(|param| param.name).collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// All projection nodes, as `(node, base, member)` triples
    pub fn member_nodes(&self) -> Vec<(NodeIdx, NodeIdx, Symbol)> {
        self.nodes
            .iter()
            .filter_map(|node| match node.kind {
                NodeKind::Member { base, member } => Some((node.idx, base, member)),
                NodeKind::Root(_) => None,
            })
            .collect()
    }

    /// Get or create the node for `<base>.<member>`
    pub fn member_node(&mut self, base: NodeIdx, member: Symbol) -> NodeIdx {
        if let Some(existing) = self.members.get(&(base, member)) {
            return *existing;
        }

        let idx = NodeIdx(self.nodes.len());
        self.nodes.push(Node {
            idx,
            kind: NodeKind::Member { base, member },
        });
        self.members.insert((base, member), idx);

        log!(graph, "new node {}: {}", idx.0, self.node_expr(idx).render(&self.param_names()));

        idx
    }

    pub fn lookup_member(&self, base: NodeIdx, member: Symbol) -> Option<NodeIdx> {
        self.members.get(&(base, member)).copied()
    }

    /// Read-only lookup of an already-lowered dependent type expression
    pub fn lookup(&self, expr: &TypeExpr) -> Option<NodeIdx> {
        match expr {
            TypeExpr::Param(ParamIdx(idx)) => {
                (*idx < self.params.len()).then_some(NodeIdx(*idx))
            }
            TypeExpr::Member { base, member } => {
                let base = self.lookup(base)?;
                self.lookup_member(base, *member)
            }
            TypeExpr::Concrete { .. } => None,
        }
    }

    /// Lower a type expression into the graph, creating projection nodes on the way.
    /// A projection whose base turns out concrete *at lowering time* (it was written
    /// literally, e.g. `S2<D>.T`) is resolved through the registry immediately - that
    /// is a pure query, so doing it here cannot break requirement-order independence.
    pub fn lower(&mut self, expr: &TypeExpr, registry: &Registry) -> Result<Lowered, Error> {
        match expr {
            TypeExpr::Param(ParamIdx(idx)) => {
                if *idx >= self.params.len() {
                    return Err(Error::new(ErrKind::MalformedRequirement)
                        .with_msg(format!("reference to undeclared generic parameter ${idx}")));
                }

                Ok(Lowered::Node(NodeIdx(*idx)))
            }
            TypeExpr::Concrete { .. } => {
                registry.validate_concrete(expr)?;
                let normalized = registry.normalize(expr.clone())?;

                // dependent arguments buried in the concrete type get their nodes
                // now, so structural matching during resolution can refer to them
                self.lower_dependent_args(&normalized, registry)?;

                Ok(Lowered::Concrete(normalized))
            }
            TypeExpr::Member { base, member } => match self.lower(base, registry)? {
                Lowered::Node(base) => Ok(Lowered::Node(self.member_node(base, *member))),
                Lowered::Concrete(concrete) => {
                    let resolved = registry.member_of(&concrete, *member)?;
                    self.lower(&resolved, registry)
                }
            },
        }
    }

    fn lower_dependent_args(&mut self, expr: &TypeExpr, registry: &Registry) -> Result<(), Error> {
        if let TypeExpr::Concrete { args, .. } = expr {
            for arg in args {
                match arg {
                    TypeExpr::Concrete { .. } => self.lower_dependent_args(arg, registry)?,
                    dependent => {
                        self.lower(dependent, registry)?;
                    }
                }
            }
        }

        Ok(())
    }

    /// The raw (non-canonicalized) type expression a node stands for
    pub fn node_expr(&self, idx: NodeIdx) -> TypeExpr {
        match self.node(idx).kind {
            NodeKind::Root(param) => TypeExpr::Param(param),
            NodeKind::Member { base, member } => TypeExpr::member(self.node_expr(base), member),
        }
    }

    /// Ordering key for canonicalization: projection depth first, then root
    /// parameter, then the member name chain. Parameters sort before any projection,
    /// and `B.T` before `C.T`.
    pub fn node_key(&self, idx: NodeIdx) -> (usize, usize, Vec<Symbol>) {
        let mut path = vec![];
        let mut current = idx;

        let root = loop {
            match self.node(current).kind {
                NodeKind::Root(ParamIdx(param)) => break param,
                NodeKind::Member { base, member } => {
                    path.push(member);
                    current = base;
                }
            }
        };
        path.reverse();

        (path.len(), root, path)
    }
}

/// The canonical representative expression of the class `of` belongs to: the
/// earliest-declared parameter in the class, or failing that the member with the
/// smallest (depth, root, path) key, its base itself canonicalized.
pub fn representative(
    graph: &RequirementGraph,
    classes: &EquivalenceClasses,
    of: NodeIdx,
) -> TypeExpr {
    let root = classes.find(of);

    let best = graph
        .nodes()
        .filter(|node| classes.find(node.idx) == root)
        .min_by_key(|node| graph.node_key(node.idx))
        .map(|node| node.idx)
        // a node is always at least in a class with itself
        .unwrap_or(of);

    match graph.node(best).kind {
        NodeKind::Root(param) => TypeExpr::Param(param),
        NodeKind::Member { base, member } => {
            TypeExpr::member(representative(graph, classes, base), member)
        }
    }
}

/// Builds a [`RequirementGraph`] from raw requirements. Addition only collects; all
/// lowering and edge recording happens in [`RequirementGraphBuilder::build`], against
/// the full requirement set, so no call order can influence the outcome.
pub struct RequirementGraphBuilder {
    params: Vec<GenericParam>,
    requirements: Vec<Requirement>,
}

impl RequirementGraphBuilder {
    pub fn new(params: Vec<GenericParam>) -> RequirementGraphBuilder {
        RequirementGraphBuilder {
            params,
            requirements: vec![],
        }
    }

    pub fn add_requirement(&mut self, requirement: Requirement) {
        self.requirements.push(requirement);
    }

    pub fn build(self, registry: &Registry) -> Result<RequirementGraph, Error> {
        let mut graph = RequirementGraph::new(self.params);
        let names = graph.param_names();

        // explicit bounds from the parameter list are just conformance edges on the
        // root nodes
        for (idx, param) in graph.params.iter().enumerate() {
            if let Some(bound) = param.bound {
                registry.protocol(bound)?;
                graph.conformance.push((NodeIdx(idx), bound));
            }
        }

        for requirement in &self.requirements {
            match requirement {
                Requirement::Conformance { subject, protocol } => {
                    registry.protocol(*protocol)?;

                    match graph.lower(subject, registry)? {
                        Lowered::Node(node) => graph.conformance.push((node, *protocol)),
                        // a conformance whose subject is concrete carries no
                        // information beyond what the nominal already declares;
                        // check it and drop it
                        Lowered::Concrete(TypeExpr::Concrete { name, .. }) => {
                            if !registry.conforms(name, *protocol)? {
                                return Err(Error::new(ErrKind::MalformedRequirement).with_msg(
                                    format!(
                                        "`{}` does not conform to `{protocol}`",
                                        requirement.render(&names)
                                    ),
                                ));
                            }

                            log!(graph, "dropping satisfied concrete conformance `{}`", requirement.render(&names));
                        }
                        Lowered::Concrete(_) => unreachable!(
                            "lowering produced a dependent concrete. this is an engine error"
                        ),
                    }
                }
                Requirement::SameType { lhs, rhs } => {
                    let lhs = graph.lower(lhs, registry)?;
                    let rhs = graph.lower(rhs, registry)?;

                    match (lhs, rhs) {
                        (Lowered::Node(l), Lowered::Node(r)) => graph.same_type.push((l, r)),
                        (Lowered::Node(node), Lowered::Concrete(concrete))
                        | (Lowered::Concrete(concrete), Lowered::Node(node)) => {
                            graph.concrete.push((node, concrete))
                        }
                        (Lowered::Concrete(l), Lowered::Concrete(r)) => {
                            graph.concrete_pairs.push((l, r))
                        }
                    }
                }
            }
        }

        log!(
            graph,
            "built graph: {} nodes, {} same-type edges, {} concrete bindings, {} conformances",
            graph.node_count(),
            graph.same_type.len(),
            graph.concrete.len(),
            graph.conformance.len()
        );

        Ok(graph)
    }
}
