//! `gensig` resolves generic signatures: given the declarations the surrounding
//! compiler knows about (protocols with associated types, concrete nominal types
//! with conformances and member bindings) and one generic declaration's parameter
//! list and raw requirements, it computes the equivalence classes the requirements
//! induce and prints them back as a minimal canonical signature.
//!
//! The pipeline is requirement graph construction ([`RequirementGraphBuilder`]),
//! equivalence resolution to a fixpoint ([`Resolve`]), and minimization
//! ([`Minimize`]). Each stage is its own crate; [`resolve_signature`] runs all
//! three. The outcome is a pure function of the requirement *set* - neither the
//! declaration order of requirements nor the resolver's traversal order can change
//! the printed signature.

pub use debug_log;
pub use error::{ErrKind, Error};
pub use graph::{
    EquivalenceClasses, NodeIdx, RequirementGraph, RequirementGraphBuilder, representative,
};
pub use minimize::{Minimize, ResolvedSignature};
pub use nested::resolve_projection;
pub use registry::{AssociatedType, Nominal, Protocol, Registry};
pub use symbol::Symbol;
pub use types::{GenericParam, ParamIdx, Requirement, SignatureDecl, TypeExpr};
pub use unify::{Resolution, Resolve, ResolverConfig};

/// Resolve one signature declaration end to end: build the requirement graph, run
/// equivalence resolution to a fixpoint, and minimize the result
pub fn resolve_signature(
    decl: SignatureDecl,
    registry: &Registry,
    config: &ResolverConfig,
) -> Result<ResolvedSignature, Error> {
    let mut builder = RequirementGraphBuilder::new(decl.params);
    decl.requirements
        .into_iter()
        .for_each(|requirement| builder.add_requirement(requirement));

    let resolution = builder.build(registry)?.resolve(registry, config)?;

    Ok(resolution.minimize(registry))
}
