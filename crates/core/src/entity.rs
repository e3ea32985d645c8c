//! Entity trait: identity + continuity across state changes.

use std::collections::HashMap;

/// Entity marker + minimal interface.
///
/// Accounts are identified by their code, periods and journal entries by the
/// serial identifier the store assigns on insert.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Index borrowed entities by identifier. On duplicate ids the last one wins.
pub fn index_by_id<'a, E>(items: impl IntoIterator<Item = &'a E>) -> HashMap<E::Id, &'a E>
where
    E: Entity + 'a,
{
    items.into_iter().map(|e| (e.id().clone(), e)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Bed {
        id: u32,
        ward: &'static str,
    }

    impl Entity for Bed {
        type Id = u32;

        fn id(&self) -> &u32 {
            &self.id
        }
    }

    #[test]
    fn index_keys_entities_by_id() {
        let beds = [
            Bed { id: 1, ward: "UCI" },
            Bed { id: 2, ward: "Pediatría" },
            Bed { id: 1, ward: "Urgencias" },
        ];
        let index = index_by_id(&beds);
        assert_eq!(index.len(), 2);
        assert_eq!(index[&2].ward, "Pediatría");
        assert_eq!(index[&1].ward, "Urgencias");
    }
}
