use crate::graph::factory::TypeRef;

/// One argument (or the return value) whose type changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewrittenTypeInfo {
    pub old_type: TypeRef,
    pub new_type: TypeRef,
}

impl RewrittenTypeInfo {
    fn then(self, next: RewrittenTypeInfo) -> RewrittenTypeInfo {
        RewrittenTypeInfo {
            old_type: self.old_type,
            new_type: next.new_type,
        }
    }
}

/// How a method's prototype changed between two program versions.
///
/// Argument indices count the receiver for instance methods. Extra parameters
/// are appended after the original ones and are always passed `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewrittenPrototypeDescription {
    arguments: Vec<(usize, RewrittenTypeInfo)>,
    return_info: Option<RewrittenTypeInfo>,
    extra_null_parameters: Vec<TypeRef>,
}

impl RewrittenPrototypeDescription {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty() && self.return_info.is_none() && self.extra_null_parameters.is_empty()
    }

    pub fn with_argument(mut self, index: usize, info: RewrittenTypeInfo) -> Self {
        match self.arguments.binary_search_by_key(&index, |(i, _)| *i) {
            Ok(position) => {
                let existing = self.arguments[position].1;
                self.arguments[position].1 = existing.then(info);
            }
            Err(position) => self.arguments.insert(position, (index, info)),
        }
        self
    }

    pub fn with_return(mut self, info: RewrittenTypeInfo) -> Self {
        self.return_info = Some(match self.return_info {
            Some(existing) => existing.then(info),
            None => info,
        });
        self
    }

    pub fn with_extra_null_parameters(mut self, types: impl IntoIterator<Item = TypeRef>) -> Self {
        self.extra_null_parameters.extend(types);
        self
    }

    pub fn arguments(&self) -> &[(usize, RewrittenTypeInfo)] {
        &self.arguments
    }

    pub fn argument(&self, index: usize) -> Option<RewrittenTypeInfo> {
        self.arguments
            .binary_search_by_key(&index, |(i, _)| *i)
            .ok()
            .map(|position| self.arguments[position].1)
    }

    pub fn return_info(&self) -> Option<RewrittenTypeInfo> {
        self.return_info
    }

    pub fn extra_null_parameters(&self) -> &[TypeRef] {
        &self.extra_null_parameters
    }

    /// Only the part of the description that call sites must act on
    pub fn only_extra_parameters(&self) -> Self {
        Self {
            extra_null_parameters: self.extra_null_parameters.clone(),
            ..Self::default()
        }
    }

    /// `self` followed by `next`
    pub fn combine(&self, next: &RewrittenPrototypeDescription) -> Self {
        if next.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return next.clone();
        }
        let mut combined = self.clone();
        for &(index, info) in &next.arguments {
            combined = combined.with_argument(index, info);
        }
        if let Some(info) = next.return_info {
            combined = combined.with_return(info);
        }
        combined
            .extra_null_parameters
            .extend(next.extra_null_parameters.iter().copied());
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::factory::ItemFactory;

    #[test]
    fn test_combine_composes_argument_rewrites() {
        let mut factory = ItemFactory::new();
        let a = factory.create_type("Lcom/example/A;");
        let b = factory.create_type("Lcom/example/B;");
        let int_type = factory.known().int_type;
        let object = factory.known().object_type;

        let first = RewrittenPrototypeDescription::none().with_argument(
            1,
            RewrittenTypeInfo {
                old_type: b,
                new_type: a,
            },
        );
        let second = RewrittenPrototypeDescription::none()
            .with_argument(
                1,
                RewrittenTypeInfo {
                    old_type: a,
                    new_type: int_type,
                },
            )
            .with_extra_null_parameters([object]);

        let combined = first.combine(&second);
        assert_eq!(
            combined.argument(1),
            Some(RewrittenTypeInfo {
                old_type: b,
                new_type: int_type
            })
        );
        assert_eq!(combined.extra_null_parameters(), &[object]);
        assert!(combined.only_extra_parameters().arguments().is_empty());
    }

    #[test]
    fn test_combine_with_empty_is_identity() {
        let factory = ItemFactory::new();
        let object = factory.known().object_type;
        let description = RewrittenPrototypeDescription::none().with_extra_null_parameters([object]);

        assert_eq!(description.combine(&RewrittenPrototypeDescription::none()), description);
        assert_eq!(RewrittenPrototypeDescription::none().combine(&description), description);
    }
}
