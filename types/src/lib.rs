//! Shared data model of the resolution engine: type expressions, generic parameter
//! declarations and raw requirements. Everything here is plain immutable data handed
//! to the engine by an outer parser or AST layer - this crate never resolves anything.

use std::fmt::Write as _;

use symbol::Symbol;

/// Declaration-order index of a generic parameter. The parameter list of a signature
/// declaration is the single source of truth for which index names which parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamIdx(pub usize);

/// A declared generic parameter, with an optional explicit protocol bound
/// (`<A, B: P2>` declares two parameters, the second carrying a bound)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericParam {
    pub name: Symbol,
    pub bound: Option<Symbol>,
}

impl GenericParam {
    pub fn new(name: impl Into<Symbol>) -> GenericParam {
        GenericParam {
            name: name.into(),
            bound: None,
        }
    }

    pub fn bounded(name: impl Into<Symbol>, bound: impl Into<Symbol>) -> GenericParam {
        GenericParam {
            name: name.into(),
            bound: Some(bound.into()),
        }
    }
}

/// A structural type expression. Recursive through nesting only - a [`TypeExpr`]'s
/// size is bounded by its projection depth, there are no cycles to guard against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeExpr {
    /// A raw reference to a declared generic parameter
    Param(ParamIdx),
    /// A dependent member type: `<base>.<member>`, e.g. `A.T`
    Member { base: Box<TypeExpr>, member: Symbol },
    /// A concrete nominal type, possibly generic over other type expressions,
    /// e.g. `Int` or `S1<C, E, S2<D>>`
    Concrete { name: Symbol, args: Vec<TypeExpr> },
}

impl TypeExpr {
    pub fn param(idx: usize) -> TypeExpr {
        TypeExpr::Param(ParamIdx(idx))
    }

    pub fn member(base: TypeExpr, member: impl Into<Symbol>) -> TypeExpr {
        TypeExpr::Member {
            base: Box::new(base),
            member: member.into(),
        }
    }

    pub fn concrete(name: impl Into<Symbol>, args: Vec<TypeExpr>) -> TypeExpr {
        TypeExpr::Concrete {
            name: name.into(),
            args,
        }
    }

    /// The parameter a projection chain is rooted at, if any. `A.T.T` is rooted
    /// at `A`; a concrete type has no root.
    pub fn root_param(&self) -> Option<ParamIdx> {
        match self {
            TypeExpr::Param(idx) => Some(*idx),
            TypeExpr::Member { base, .. } => base.root_param(),
            TypeExpr::Concrete { .. } => None,
        }
    }

    pub fn is_dependent(&self) -> bool {
        !matches!(self, TypeExpr::Concrete { .. })
    }

    /// Replace every [`TypeExpr::Param`] by the corresponding argument. This is how a
    /// nominal type's member binding, written over the nominal's *own* parameters,
    /// gets re-expressed in the caller's context: `S2`'s binding `T = D` over the
    /// argument list `[C.T]` becomes `C.T`.
    ///
    /// Callers must have checked the instantiation's arity beforehand.
    pub fn substitute(&self, args: &[TypeExpr]) -> TypeExpr {
        match self {
            TypeExpr::Param(ParamIdx(idx)) => match args.get(*idx) {
                Some(arg) => arg.clone(),
                None => unreachable!(
                    "substitution with mismatched arity. this is an engine error"
                ),
            },
            TypeExpr::Member { base, member } => TypeExpr::member(base.substitute(args), *member),
            TypeExpr::Concrete { name, args: inner } => TypeExpr::Concrete {
                name: *name,
                args: inner.iter().map(|arg| arg.substitute(args)).collect(),
            },
        }
    }

    /// Recursive structural equality of two type expressions, deferring every pair
    /// involving a dependent type to the given oracle. The equivalence resolver
    /// passes an oracle answering "are these two dependent types in the same class",
    /// which makes this comparison equality-up-to-the-current-classes.
    pub fn structurally_equal<F>(lhs: &TypeExpr, rhs: &TypeExpr, same_dependent: &F) -> bool
    where
        F: Fn(&TypeExpr, &TypeExpr) -> bool,
    {
        match (lhs, rhs) {
            (
                TypeExpr::Concrete { name: ln, args: la },
                TypeExpr::Concrete { name: rn, args: ra },
            ) => {
                ln == rn
                    && la.len() == ra.len()
                    && la
                        .iter()
                        .zip(ra)
                        .all(|(l, r)| TypeExpr::structurally_equal(l, r, same_dependent))
            }
            _ => same_dependent(lhs, rhs),
        }
    }

    /// Canonical dotted-projection rendering, given the declaration's parameter name
    /// table
    pub fn render(&self, names: &[Symbol]) -> String {
        match self {
            TypeExpr::Param(ParamIdx(idx)) => match names.get(*idx) {
                Some(name) => name.access().to_string(),
                // only reachable when rendering an expression from a foreign
                // declaration, e.g. in an error message built mid-substitution
                None => format!("${idx}"),
            },
            TypeExpr::Member { base, member } => format!("{}.{member}", base.render(names)),
            TypeExpr::Concrete { name, args } => {
                if args.is_empty() {
                    return name.access().to_string();
                }

                let mut out = format!("{name}<");
                args.iter().enumerate().for_each(|(i, arg)| {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{}", arg.render(names));
                });
                out.push('>');

                out
            }
        }
    }
}

/// A raw requirement, as declared. Requirements are inputs to the engine: consumed,
/// never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// `subject : protocol`
    Conformance { subject: TypeExpr, protocol: Symbol },
    /// `lhs == rhs`
    SameType { lhs: TypeExpr, rhs: TypeExpr },
}

impl Requirement {
    pub fn conformance(subject: TypeExpr, protocol: impl Into<Symbol>) -> Requirement {
        Requirement::Conformance {
            subject,
            protocol: protocol.into(),
        }
    }

    pub fn same_type(lhs: TypeExpr, rhs: TypeExpr) -> Requirement {
        Requirement::SameType { lhs, rhs }
    }

    pub fn render(&self, names: &[Symbol]) -> String {
        match self {
            Requirement::Conformance { subject, protocol } => {
                format!("{} : {protocol}", subject.render(names))
            }
            Requirement::SameType { lhs, rhs } => {
                format!("{} == {}", lhs.render(names), rhs.render(names))
            }
        }
    }
}

/// The input of one resolution run: the declared parameters, in declaration order,
/// and the raw requirement list
#[derive(Debug, Clone)]
pub struct SignatureDecl {
    pub params: Vec<GenericParam>,
    pub requirements: Vec<Requirement>,
}

impl SignatureDecl {
    pub fn param_names(&self) -> Vec<Symbol> {
        self.params.iter().map(|param| param.name).collect()
    }
}
