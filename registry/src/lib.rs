//! The capability registry stores what the surrounding compiler knows before a
//! resolution run starts: protocol declarations (associated types and their bounds)
//! and concrete nominal type declarations (their own parameters, conformances, and
//! member bindings - the `typealias` equivalents). The registry is populated once and
//! read-only afterwards, which is what makes independent resolution runs shareable.

use std::collections::{HashMap, HashSet};

use error::{ErrKind, Error};
use symbol::Symbol;
use types::TypeExpr;

/// An associated type declared by a protocol, with an optional conformance bound:
/// `associatedtype T : P1` declares `T` bounded by `P1`
#[derive(Debug, Clone)]
pub struct AssociatedType {
    pub name: Symbol,
    pub bound: Option<Symbol>,
}

impl AssociatedType {
    pub fn new(name: impl Into<Symbol>) -> AssociatedType {
        AssociatedType {
            name: name.into(),
            bound: None,
        }
    }

    pub fn bounded(name: impl Into<Symbol>, bound: impl Into<Symbol>) -> AssociatedType {
        AssociatedType {
            name: name.into(),
            bound: Some(bound.into()),
        }
    }
}

/// A protocol declaration. Immutable once registered.
#[derive(Debug, Clone)]
pub struct Protocol {
    pub name: Symbol,
    pub inherits: Vec<Symbol>,
    pub associated: Vec<AssociatedType>,
}

impl Protocol {
    pub fn new(name: impl Into<Symbol>) -> Protocol {
        Protocol {
            name: name.into(),
            inherits: vec![],
            associated: vec![],
        }
    }

    pub fn inheriting(self, parent: impl Into<Symbol>) -> Protocol {
        let mut inherits = self.inherits;
        inherits.push(parent.into());

        Protocol { inherits, ..self }
    }

    pub fn with_associated(self, associated: AssociatedType) -> Protocol {
        let mut list = self.associated;
        list.push(associated);

        Protocol {
            associated: list,
            ..self
        }
    }

    fn associated_type(&self, member: Symbol) -> Option<&AssociatedType> {
        self.associated.iter().find(|assoc| assoc.name == member)
    }
}

/// A concrete nominal type declaration: its own generic parameters, the protocols it
/// conforms to, and its member bindings. A binding's expression is written over the
/// nominal's *own* parameters: `struct S2<D> { typealias T = D }` binds `T` to
/// `Param(0)`.
#[derive(Debug, Clone)]
pub struct Nominal {
    pub name: Symbol,
    pub params: Vec<Symbol>,
    pub conformances: Vec<Symbol>,
    pub bindings: Vec<(Symbol, TypeExpr)>,
}

impl Nominal {
    pub fn new(name: impl Into<Symbol>) -> Nominal {
        Nominal {
            name: name.into(),
            params: vec![],
            conformances: vec![],
            bindings: vec![],
        }
    }

    pub fn with_param(self, name: impl Into<Symbol>) -> Nominal {
        let mut params = self.params;
        params.push(name.into());

        Nominal { params, ..self }
    }

    pub fn conforming_to(self, protocol: impl Into<Symbol>) -> Nominal {
        let mut conformances = self.conformances;
        conformances.push(protocol.into());

        Nominal {
            conformances,
            ..self
        }
    }

    pub fn with_binding(self, member: impl Into<Symbol>, expr: TypeExpr) -> Nominal {
        let mut bindings = self.bindings;
        bindings.push((member.into(), expr));

        Nominal { bindings, ..self }
    }

    pub fn binding(&self, member: Symbol) -> Option<&TypeExpr> {
        self.bindings
            .iter()
            .find(|(name, _)| *name == member)
            .map(|(_, expr)| expr)
    }
}

#[derive(Default)]
pub struct Registry {
    protocols: HashMap<Symbol, Protocol>,
    nominals: HashMap<Symbol, Nominal>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn register_protocol(&mut self, protocol: Protocol) -> Result<(), Error> {
        if self.protocols.contains_key(&protocol.name) {
            return Err(Error::new(ErrKind::DuplicateProtocol)
                .with_msg(format!("protocol `{}` is already registered", protocol.name)));
        }

        // inherited protocols and associated bounds must already be registered; a
        // typo caught here would otherwise surface as a silently missing member
        for parent in &protocol.inherits {
            self.protocol(*parent)?;
        }
        for associated in &protocol.associated {
            if let Some(bound) = associated.bound {
                self.protocol(bound)?;
            }
        }

        self.protocols.insert(protocol.name, protocol);

        Ok(())
    }

    pub fn register_nominal(&mut self, nominal: Nominal) -> Result<(), Error> {
        if self.nominals.contains_key(&nominal.name) {
            return Err(Error::new(ErrKind::DuplicateType)
                .with_msg(format!("type `{}` is already registered", nominal.name)));
        }

        for conformance in &nominal.conformances {
            self.protocol(*conformance)?;
        }

        self.nominals.insert(nominal.name, nominal);

        Ok(())
    }

    pub fn protocol(&self, name: Symbol) -> Result<&Protocol, Error> {
        self.protocols.get(&name).ok_or_else(|| {
            Error::new(ErrKind::UnknownProtocol).with_msg(format!("no protocol named `{name}`"))
        })
    }

    pub fn nominal(&self, name: Symbol) -> Result<&Nominal, Error> {
        self.nominals.get(&name).ok_or_else(|| {
            Error::new(ErrKind::UnknownType).with_msg(format!("no type named `{name}`"))
        })
    }

    /// Does `protocol` refine `target`, directly or through its inheritance chain?
    /// A protocol always refines itself.
    pub fn extends(&self, protocol: Symbol, target: Symbol) -> bool {
        if protocol == target {
            return true;
        }

        let mut seen = HashSet::new();
        let mut worklist = vec![protocol];

        while let Some(current) = worklist.pop() {
            if !seen.insert(current) {
                continue;
            }
            if current == target {
                return true;
            }
            if let Ok(proto) = self.protocol(current) {
                worklist.extend(proto.inherits.iter().copied());
            }
        }

        false
    }

    /// Does `protocol` (or a protocol it inherits) declare `member` as an associated
    /// type?
    pub fn declares_member(&self, protocol: Symbol, member: Symbol) -> bool {
        self.find_declaring(protocol, member).is_some()
    }

    /// The declared bound of `member` when reached through `protocol`, searching the
    /// inheritance chain. `Ok(None)` means the associated type exists but is
    /// unconstrained.
    pub fn associated_bound(&self, protocol: Symbol, member: Symbol) -> Result<Option<Symbol>, Error> {
        match self.find_declaring(protocol, member) {
            Some(assoc) => Ok(assoc.bound),
            None => Err(Error::new(ErrKind::MalformedRequirement).with_msg(format!(
                "protocol `{protocol}` declares no associated type `{member}`"
            ))),
        }
    }

    fn find_declaring(&self, protocol: Symbol, member: Symbol) -> Option<&AssociatedType> {
        let mut seen = HashSet::new();
        let mut worklist = vec![protocol];

        while let Some(current) = worklist.pop() {
            if !seen.insert(current) {
                continue;
            }

            if let Ok(proto) = self.protocol(current) {
                if let Some(assoc) = proto.associated_type(member) {
                    return Some(assoc);
                }
                worklist.extend(proto.inherits.iter().copied());
            }
        }

        None
    }

    /// Does the nominal type `name` conform to `protocol`, counting protocol
    /// refinement?
    pub fn conforms(&self, name: Symbol, protocol: Symbol) -> Result<bool, Error> {
        let nominal = self.nominal(name)?;

        Ok(nominal
            .conformances
            .iter()
            .any(|conf| self.extends(*conf, protocol)))
    }

    /// Check that a concrete type expression only mentions registered nominals,
    /// instantiated at the right arity. Dependent subexpressions are fine - they are
    /// someone else's problem.
    pub fn validate_concrete(&self, expr: &TypeExpr) -> Result<(), Error> {
        match expr {
            TypeExpr::Concrete { name, args } => {
                let nominal = self.nominal(*name)?;

                if nominal.params.len() != args.len() {
                    return Err(Error::new(ErrKind::MalformedRequirement).with_msg(format!(
                        "wrong number of generic arguments for `{name}`: expected {}, got {}",
                        nominal.params.len(),
                        args.len()
                    )));
                }

                args.iter().try_for_each(|arg| self.validate_concrete(arg))
            }
            TypeExpr::Member { base, .. } => self.validate_concrete(base),
            TypeExpr::Param(_) => Ok(()),
        }
    }

    /// Resolve `member` against a concrete instantiation: look up the nominal's
    /// binding for `member`, substitute the instantiation's arguments for the
    /// nominal's own parameters, and fold away any concrete-based projection the
    /// substitution may have produced. This is the heart of the "unresolved member
    /// type with a concrete base" case: `S2<D>.T` goes through `S2`'s binding
    /// `T = Param(0)` and comes out as `D`.
    pub fn member_of(&self, concrete: &TypeExpr, member: Symbol) -> Result<TypeExpr, Error> {
        let (name, args) = match concrete {
            TypeExpr::Concrete { name, args } => (*name, args),
            _ => unreachable!("member_of called on a dependent type. this is an engine error"),
        };

        let nominal = self.nominal(name)?;

        let binding = nominal.binding(member).ok_or_else(|| {
            Error::new(ErrKind::MalformedRequirement)
                .with_msg(format!("type `{name}` has no member binding for `{member}`"))
        })?;

        self.normalize(binding.substitute(args))
    }

    /// Fold every projection whose base is (or normalizes to) a concrete type. The
    /// result is either fully concrete or a dependent type rooted at a parameter.
    pub fn normalize(&self, expr: TypeExpr) -> Result<TypeExpr, Error> {
        match expr {
            TypeExpr::Member { base, member } => {
                let base = self.normalize(*base)?;

                match base {
                    concrete @ TypeExpr::Concrete { .. } => self.member_of(&concrete, member),
                    dependent => Ok(TypeExpr::member(dependent, member)),
                }
            }
            TypeExpr::Concrete { name, args } => {
                let args = args
                    .into_iter()
                    .map(|arg| self.normalize(arg))
                    .collect::<Result<Vec<TypeExpr>, Error>>()?;

                Ok(TypeExpr::Concrete { name, args })
            }
            param => Ok(param),
        }
    }
}
