use crate::graph::factory::{ItemFactory, TypeRef};

/// An ordered set of classes that will become one. The first class is the
/// merge target, every other class is a source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergeGroup {
    classes: Vec<TypeRef>,
}

impl MergeGroup {
    pub fn new(classes: Vec<TypeRef>) -> Self {
        Self { classes }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Fewer than two classes: nothing to merge
    pub fn is_trivial(&self) -> bool {
        self.classes.len() < 2
    }

    pub fn target(&self) -> Option<TypeRef> {
        self.classes.first().copied()
    }

    pub fn sources(&self) -> &[TypeRef] {
        self.classes.get(1..).unwrap_or_default()
    }

    pub fn classes(&self) -> &[TypeRef] {
        &self.classes
    }

    pub fn contains(&self, ty: TypeRef) -> bool {
        self.classes.contains(&ty)
    }

    pub fn push(&mut self, ty: TypeRef) {
        self.classes.push(ty);
    }

    pub fn retain(&mut self, keep: impl FnMut(&TypeRef) -> bool) {
        self.classes.retain(keep);
    }

    pub fn iter(&self) -> impl Iterator<Item = TypeRef> + '_ {
        self.classes.iter().copied()
    }

    /// `A <- B, C` in source notation, for logs and test messages
    pub fn to_source_string(&self, factory: &ItemFactory) -> String {
        let mut names = self.classes.iter().map(|&ty| factory.java_type_name(ty));
        let target = names.next().unwrap_or_default();
        let sources: Vec<String> = names.collect();
        format!("{target} <- {}", sources.join(", "))
    }
}

impl FromIterator<TypeRef> for MergeGroup {
    fn from_iter<I: IntoIterator<Item = TypeRef>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
