//! Resolution of nested (dependent member) types: given a base expression and a
//! member name, produce the canonical type the projection denotes under the current
//! equivalence classes. The interesting case is a base that turns out to be a
//! concrete generic instantiation - the projection then has to be pushed through the
//! concrete type's own member bindings rather than staying a dependent type.
//!
//! This resolver holds a read-only view of the classes. It is called twice per run:
//! while the equivalence resolver's fixpoint loop is still merging (a projection that
//! was dependent on the previous pass may have gained a concrete base), and once more
//! after stabilization to validate every projection that stayed dependent.

use debug_log::log;
use error::{ErrKind, Error};
use graph::{representative, EquivalenceClasses, RequirementGraph};
use registry::Registry;
use symbol::Symbol;
use types::TypeExpr;

/// Resolve `<base>.<member>` to a canonical type expression.
///
/// Cases, in priority order:
/// 1. `base` belongs to a class with a resolved concrete type `K`: resolve `member`
///    through `K`'s own bindings (`S2<D>.T` becomes `D`).
/// 2. `base`'s class conforms to a protocol declaring `member`: the projection stays
///    dependent, expressed on the class representative.
/// 3. Nobody declares `member`: the requirement that mentioned the projection was
///    malformed.
pub fn resolve_projection(
    base: &TypeExpr,
    member: Symbol,
    graph: &RequirementGraph,
    classes: &EquivalenceClasses,
    registry: &Registry,
) -> Result<TypeExpr, Error> {
    // fold any literal concrete base first: `S2<D>.T` needs no class information
    let base = registry.normalize(base.clone())?;

    if let TypeExpr::Concrete { .. } = base {
        return registry.member_of(&base, member);
    }

    let node = graph.lookup(&base).ok_or_else(|| {
        Error::new(ErrKind::MalformedRequirement).with_msg(format!(
            "projection base `{}` is not part of this signature",
            base.render(&graph.param_names())
        ))
    })?;

    if let Some(concrete) = classes.concrete(node) {
        log!(
            nested,
            "projection base `{}` is concretely bound, substituting",
            base.render(&graph.param_names())
        );

        return registry.member_of(concrete, member);
    }

    let conformances = classes.conformances(node);
    let declared = conformances
        .iter()
        .any(|protocol| registry.declares_member(*protocol, member));

    if declared {
        Ok(TypeExpr::member(
            representative(graph, classes, node),
            member,
        ))
    } else {
        let names = graph.param_names();

        Err(Error::new(ErrKind::MalformedRequirement)
            .with_msg(format!(
                "no protocol conformed to by `{}` declares a member `{member}`",
                base.render(&names)
            ))
            .with_hint(Error::hint().with_msg(format!(
                "while resolving the dependent type `{}.{member}`",
                base.render(&names)
            ))))
    }
}
