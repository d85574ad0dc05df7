//! Turns a stabilized [`Resolution`] back into a declaration: the minimal canonical
//! requirement list that denotes the same equivalence classes. Minimal means no
//! requirement in the output is derivable from the others - duplicate and transitive
//! same-type edges collapse into chains, and conformances already implied by an
//! associated type's declared bound or by protocol refinement are dropped.
//!
//! Canonical means the output is a pure function of the classes: every dependent
//! type is printed through its class representative, members reachable only through
//! a concretely bound base are never printed, and the requirement list is sorted.

use std::collections::HashSet;
use std::fmt;

use debug_log::log;
use graph::{NodeIdx, NodeKind};
use registry::Registry;
use symbol::Symbol;
use types::{Requirement, TypeExpr};
use unify::Resolution;

/// The canonical minimized form of a resolved signature
#[derive(Debug, Clone)]
pub struct ResolvedSignature {
    pub params: Vec<Symbol>,
    pub requirements: Vec<Requirement>,
}

impl fmt::Display for ResolvedSignature {
    /// `<A, B, C where B : P2, A == S1<C, C, S2<B>>>`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<")?;

        for (idx, param) in self.params.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }

        for (idx, requirement) in self.requirements.iter().enumerate() {
            let separator = if idx == 0 { " where " } else { ", " };
            write!(f, "{separator}{}", requirement.render(&self.params))?;
        }

        write!(f, ">")
    }
}

/// Minimization entry point for a stabilized [`Resolution`]
pub trait Minimize {
    fn minimize(&self, registry: &Registry) -> ResolvedSignature;
}

impl Minimize for Resolution {
    fn minimize(&self, registry: &Registry) -> ResolvedSignature {
        let minimizer = Minimizer {
            resolution: self,
            registry,
        };

        minimizer.run()
    }
}

struct Minimizer<'run> {
    resolution: &'run Resolution,
    registry: &'run Registry,
}

impl Minimizer<'_> {
    fn run(&self) -> ResolvedSignature {
        let params = self.resolution.graph.param_names();
        let mut conformances = vec![];
        let mut same_type = vec![];

        for root in self.resolution.classes.roots() {
            let printable = self.printable_members(root);

            let subject = match printable.first() {
                Some(subject) => subject.clone(),
                // reachable only through concrete bases, nothing to print
                None => continue,
            };

            if let Some(concrete) = self.resolution.classes.concrete(root) {
                same_type.push(Requirement::same_type(
                    subject.clone(),
                    self.canonicalize(concrete),
                ));
            } else {
                for protocol in self.retained_conformances(root) {
                    conformances.push(Requirement::conformance(subject.clone(), protocol));
                }
            }

            // a chain of n members needs exactly n - 1 edges
            for pair in printable.windows(2) {
                same_type.push(Requirement::same_type(pair[0].clone(), pair[1].clone()));
            }
        }

        conformances.sort_by_key(|requirement| requirement.render(&params));
        same_type.sort_by_key(|requirement| requirement.render(&params));

        let mut requirements = conformances;
        requirements.append(&mut same_type);

        log!(
            minimize,
            "minimized to {} requirements over {} classes",
            requirements.len(),
            self.resolution.classes.class_count()
        );

        ResolvedSignature {
            params,
            requirements,
        }
    }

    /// The class's printable members in canonical order: shallowest first, ties
    /// broken by root parameter then member path
    fn printable_members(&self, root: NodeIdx) -> Vec<TypeExpr> {
        self.printable_members_within(root, &mut HashSet::new())
    }

    fn printable_members_within(
        &self,
        root: NodeIdx,
        printing: &mut HashSet<NodeIdx>,
    ) -> Vec<TypeExpr> {
        // a projection chain looping back into a class currently being spelled out
        // has no spelling through this path (`A == B.T, B == A.T` is legal, and
        // both classes still have their parameter to print)
        if !printing.insert(root) {
            return vec![];
        }

        let mut members: Vec<NodeIdx> = self
            .resolution
            .graph
            .nodes()
            .filter(|node| self.resolution.classes.find(node.idx) == root)
            .map(|node| node.idx)
            .collect();
        members.sort_by_key(|idx| self.resolution.graph.node_key(*idx));

        let mut exprs = vec![];
        for member in members {
            if let Some(expr) = self.printable_expr_within(member, printing) {
                if !exprs.contains(&expr) {
                    exprs.push(expr);
                }
            }
        }

        printing.remove(&root);

        exprs
    }

    /// The canonical spelling of one node, if it has one. A projection off a
    /// concretely bound base has none: its type is reachable through the concrete
    /// binding and printing it would be redundant (and non-canonical).
    fn printable_expr_within(
        &self,
        node: NodeIdx,
        printing: &mut HashSet<NodeIdx>,
    ) -> Option<TypeExpr> {
        match self.resolution.graph.node(node).kind {
            NodeKind::Root(param) => Some(TypeExpr::Param(param)),
            NodeKind::Member { base, member } => {
                let base_root = self.resolution.classes.find(base);
                if self.resolution.classes.concrete(base_root).is_some() {
                    return None;
                }

                let base_expr = self
                    .printable_members_within(base_root, printing)
                    .into_iter()
                    .next()?;

                Some(TypeExpr::member(base_expr, member))
            }
        }
    }

    /// Rewrite a concrete type so its dependent arguments are spelled through their
    /// class representatives
    fn canonicalize(&self, expr: &TypeExpr) -> TypeExpr {
        match expr {
            TypeExpr::Concrete { name, args } => TypeExpr::Concrete {
                name: *name,
                args: args.iter().map(|arg| self.canonicalize(arg)).collect(),
            },
            dependent => match self.resolution.graph.lookup(dependent) {
                Some(node) => self
                    .printable_members(self.resolution.classes.find(node))
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| dependent.clone()),
                None => dependent.clone(),
            },
        }
    }

    /// The class's conformances minus everything derivable: a protocol refined by
    /// another retained conformance, or implied by the declared bound of an
    /// associated type through which the class is reached
    fn retained_conformances(&self, root: NodeIdx) -> Vec<Symbol> {
        let conformances = self.resolution.classes.conformances(root);

        let mut retained: Vec<Symbol> = conformances
            .iter()
            .filter(|protocol| {
                // refined by another conformance that is itself kept; two protocols
                // refining each other keep only the first-named one
                let refined = conformances.iter().any(|other| {
                    other != *protocol
                        && self.registry.extends(*other, **protocol)
                        && (!self.registry.extends(**protocol, *other) || *other < **protocol)
                });

                !refined && !self.implied_by_bound(root, **protocol)
            })
            .copied()
            .collect();
        retained.sort();

        retained
    }

    /// Is `protocol` already guaranteed for this class because some member node in
    /// it projects an associated type whose declared bound refines `protocol`?
    fn implied_by_bound(&self, root: NodeIdx, protocol: Symbol) -> bool {
        let mut bases = HashSet::new();

        for node in self.resolution.graph.nodes() {
            if self.resolution.classes.find(node.idx) != root {
                continue;
            }

            let (base, member) = match node.kind {
                NodeKind::Member { base, member } => (base, member),
                NodeKind::Root(_) => continue,
            };

            let base_root = self.resolution.classes.find(base);
            if !bases.insert((base_root, member)) {
                continue;
            }

            for through in self.resolution.classes.conformances(base_root) {
                if !self.registry.declares_member(*through, member) {
                    continue;
                }

                if let Ok(Some(bound)) = self.registry.associated_bound(*through, member) {
                    if self.registry.extends(bound, protocol) {
                        return true;
                    }
                }
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph::RequirementGraphBuilder;
    use registry::{AssociatedType, Nominal, Protocol};
    use types::GenericParam;
    use unify::{Resolve, ResolverConfig};

    fn scenario_registry() -> Registry {
        let mut registry = Registry::new();

        registry
            .register_protocol(Protocol::new("P1").with_associated(AssociatedType::new("T")))
            .unwrap();
        registry
            .register_protocol(
                Protocol::new("P2").with_associated(AssociatedType::bounded("T", "P1")),
            )
            .unwrap();
        registry
            .register_nominal(
                Nominal::new("S1")
                    .with_param("A")
                    .with_param("B")
                    .with_param("C")
                    .conforming_to("P2")
                    .with_binding("T", TypeExpr::member(TypeExpr::param(2), "T")),
            )
            .unwrap();
        registry
            .register_nominal(
                Nominal::new("S2")
                    .with_param("D")
                    .conforming_to("P2")
                    .with_binding("T", TypeExpr::param(0)),
            )
            .unwrap();
        registry.register_nominal(Nominal::new("Int")).unwrap();

        registry
    }

    fn minimized(
        params: &[&str],
        requirements: Vec<Requirement>,
        registry: &Registry,
    ) -> ResolvedSignature {
        let params = params
            .iter()
            .map(|name| GenericParam::new(*name))
            .collect();

        let mut builder = RequirementGraphBuilder::new(params);
        requirements
            .into_iter()
            .for_each(|requirement| builder.add_requirement(requirement));

        builder
            .build(registry)
            .unwrap()
            .resolve(registry, &ResolverConfig::new())
            .unwrap()
            .minimize(registry)
    }

    #[test]
    fn empty_signature() {
        let registry = scenario_registry();
        let signature = minimized(&["A", "B"], vec![], &registry);

        assert_eq!(signature.to_string(), "<A, B>");
    }

    #[test]
    fn duplicate_same_type_collapses() {
        let registry = scenario_registry();

        let signature = minimized(
            &["A", "B"],
            vec![
                Requirement::same_type(TypeExpr::param(0), TypeExpr::param(1)),
                Requirement::same_type(TypeExpr::param(1), TypeExpr::param(0)),
                Requirement::same_type(TypeExpr::param(0), TypeExpr::param(1)),
            ],
            &registry,
        );

        assert_eq!(signature.to_string(), "<A, B where A == B>");
    }

    #[test]
    fn transitive_chain_emits_consecutive_pairs() {
        let registry = scenario_registry();

        let signature = minimized(
            &["A", "B", "C"],
            vec![
                Requirement::same_type(TypeExpr::param(0), TypeExpr::param(2)),
                Requirement::same_type(TypeExpr::param(2), TypeExpr::param(1)),
            ],
            &registry,
        );

        assert_eq!(signature.to_string(), "<A, B, C where A == B, B == C>");
    }

    #[test]
    fn refined_conformance_is_dropped() {
        let mut registry = scenario_registry();
        registry
            .register_protocol(Protocol::new("P3").inheriting("P2"))
            .unwrap();

        let signature = minimized(
            &["X"],
            vec![
                Requirement::conformance(TypeExpr::param(0), "P2"),
                Requirement::conformance(TypeExpr::param(0), "P3"),
            ],
            &registry,
        );

        assert_eq!(signature.to_string(), "<X where X : P3>");
    }

    #[test]
    fn bound_implied_conformance_is_dropped() {
        let registry = scenario_registry();

        // B.T : P1 is implied by B : P2 and P2's `T : P1`
        let signature = minimized(
            &["B"],
            vec![
                Requirement::conformance(TypeExpr::param(0), "P2"),
                Requirement::conformance(TypeExpr::member(TypeExpr::param(0), "T"), "P1"),
            ],
            &registry,
        );

        assert_eq!(signature.to_string(), "<B where B : P2>");
    }

    #[test]
    fn concrete_binding_prints_once() {
        let registry = scenario_registry();

        let signature = minimized(
            &["X", "Y"],
            vec![
                Requirement::same_type(TypeExpr::param(0), TypeExpr::concrete("Int", vec![])),
                Requirement::same_type(TypeExpr::param(1), TypeExpr::param(0)),
            ],
            &registry,
        );

        assert_eq!(signature.to_string(), "<X, Y where X == Int, X == Y>");
    }

    #[test]
    fn explicit_param_bounds_reach_the_where_clause() {
        let registry = scenario_registry();

        let mut builder = RequirementGraphBuilder::new(vec![
            GenericParam::new("A"),
            GenericParam::bounded("B", "P2"),
        ]);
        builder.add_requirement(Requirement::same_type(
            TypeExpr::param(0),
            TypeExpr::member(TypeExpr::param(1), "T"),
        ));

        let signature = builder
            .build(&registry)
            .unwrap()
            .resolve(&registry, &ResolverConfig::new())
            .unwrap()
            .minimize(&registry);

        assert_eq!(signature.to_string(), "<A, B where B : P2, A == B.T>");
    }

    #[test]
    fn mutually_dependent_members_print_finitely() {
        let registry = scenario_registry();

        // A and B are each the other's member; neither class can spell its member
        // through the other, but both still have their parameter
        let signature = minimized(
            &["A", "B"],
            vec![
                Requirement::conformance(TypeExpr::param(0), "P2"),
                Requirement::conformance(TypeExpr::param(1), "P2"),
                Requirement::same_type(
                    TypeExpr::param(0),
                    TypeExpr::member(TypeExpr::param(1), "T"),
                ),
                Requirement::same_type(
                    TypeExpr::param(1),
                    TypeExpr::member(TypeExpr::param(0), "T"),
                ),
            ],
            &registry,
        );

        assert_eq!(
            signature.to_string(),
            "<A, B where A : P2, B : P2, A == B.T, B == A.T>"
        );
    }

    #[test]
    fn concrete_base_scenario_prints_canonically() {
        let registry = scenario_registry();

        let signature = minimized(
            &["A", "B", "C", "D", "E"],
            vec![
                Requirement::same_type(
                    TypeExpr::param(0),
                    TypeExpr::concrete(
                        "S1",
                        vec![
                            TypeExpr::param(2),
                            TypeExpr::param(4),
                            TypeExpr::concrete("S2", vec![TypeExpr::param(3)]),
                        ],
                    ),
                ),
                Requirement::conformance(TypeExpr::param(1), "P2"),
                Requirement::same_type(
                    TypeExpr::member(TypeExpr::param(0), "T"),
                    TypeExpr::member(TypeExpr::param(1), "T"),
                ),
                Requirement::conformance(TypeExpr::param(2), "P1"),
                Requirement::same_type(
                    TypeExpr::param(3),
                    TypeExpr::member(TypeExpr::param(2), "T"),
                ),
                Requirement::same_type(
                    TypeExpr::param(4),
                    TypeExpr::member(TypeExpr::param(3), "T"),
                ),
            ],
            &registry,
        );

        assert_eq!(
            signature.to_string(),
            "<A, B, C, D, E where B : P2, C : P1, A == S1<C, E, S2<D>>, \
             B.T == C.T, D == B.T, E == D.T>"
        );
    }
}
