use crate::graph::class::ProgramClass;
use crate::graph::factory::{ItemFactory, TypeRef};

/// The instance field types of a class, with multiplicity and without
/// order. Classes are only merged when these are equal, so every source
/// field can share a target field of the same type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldMultiset {
    counts: Vec<(TypeRef, usize)>,
}

impl FieldMultiset {
    pub fn new(factory: &ItemFactory, class: &ProgramClass) -> Self {
        Self::from_types(
            class
                .instance_fields()
                .iter()
                .map(|f| factory.field(f.reference).ty)
                .collect(),
        )
    }

    pub fn from_types(mut types: Vec<TypeRef>) -> Self {
        types.sort_unstable();
        let mut counts: Vec<(TypeRef, usize)> = Vec::new();
        for ty in types {
            match counts.last_mut() {
                Some((last, count)) if *last == ty => *count += 1,
                _ => counts.push((ty, 1)),
            }
        }
        Self { counts }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn count(&self, ty: TypeRef) -> usize {
        self.counts
            .iter()
            .find(|(t, _)| *t == ty)
            .map_or(0, |&(_, count)| count)
    }
}
