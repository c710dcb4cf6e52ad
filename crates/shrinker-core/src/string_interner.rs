use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Deduplicating string table backing member names and type descriptors.
///
/// Strings are stored once as `Arc<str>` and shared between the lookup map and
/// the id table, so interning a name that already exists never allocates.
#[derive(Debug, Default, Clone)]
pub struct StringInterner {
    ids: FxHashMap<Arc<str>, StringId>,
    strings: Vec<Arc<str>>,
}

/// Index of an interned string. Two ids are equal iff their strings are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StringId(u32);

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string and return its id, reusing the existing id if present
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.ids.get(s) {
            return id;
        }

        let id = StringId(self.strings.len() as u32);
        let shared: Arc<str> = Arc::from(s);
        self.strings.push(shared.clone());
        self.ids.insert(shared, id);
        id
    }

    /// Look up a string without interning it
    pub fn get(&self, s: &str) -> Option<StringId> {
        self.ids.get(s).copied()
    }

    /// Get the string for a given id
    /// Panics if the id was produced by a different interner
    pub fn resolve(&self, id: StringId) -> &str {
        &self.strings[id.0 as usize]
    }

    pub fn try_resolve(&self, id: StringId) -> Option<&str> {
        self.strings.get(id.0 as usize).map(|s| &**s)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl StringId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_deduplicates() {
        let mut interner = StringInterner::new();

        let a = interner.intern("<init>");
        let b = interner.intern("ordinal");
        let c = interner.intern("<init>");

        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(interner.len(), 2);
        assert_eq!(interner.resolve(b), "ordinal");
    }

    #[test]
    fn test_get_does_not_intern() {
        let mut interner = StringInterner::new();
        assert_eq!(interner.get("f"), None);

        let id = interner.intern("f");
        assert_eq!(interner.get("f"), Some(id));
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn test_try_resolve_foreign_id() {
        let mut small = StringInterner::new();
        let mut large = StringInterner::new();
        large.intern("a");
        let foreign = large.intern("b");

        assert_eq!(small.try_resolve(foreign), None);
        small.intern("x");
        assert_eq!(small.try_resolve(foreign), None);
    }
}
