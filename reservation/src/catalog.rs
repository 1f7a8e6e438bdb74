//! Family/variant capacity catalog (§4.F step 3). Game content registers
//! its team-size shape here; the reservation service only ever reads it.

use std::collections::HashMap;

/// Placeholder used when neither an exact nor a family-wide match exists.
const FALLBACK_TEAM_COUNT: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyVariantInfo {
    pub min_team_size: u32,
    pub max_team_size: u32,
    pub team_count: u32,
}

impl FamilyVariantInfo {
    pub fn fallback(hard_size_cap: u32) -> Self {
        FamilyVariantInfo {
            min_team_size: hard_size_cap,
            max_team_size: hard_size_cap,
            team_count: FALLBACK_TEAM_COUNT,
        }
    }
}

/// Keyed by `(familyId, variantId)`. Looks up exact, then any variant of
/// the family, then falls back to `(HARD_SIZE_CAP, HARD_SIZE_CAP, 1)`.
#[derive(Debug, Clone, Default)]
pub struct FamilyVariantCatalog {
    entries: HashMap<(String, String), FamilyVariantInfo>,
}

impl FamilyVariantCatalog {
    pub fn new() -> Self {
        FamilyVariantCatalog {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, family_id: impl Into<String>, variant_id: impl Into<String>, info: FamilyVariantInfo) {
        self.entries.insert((family_id.into(), variant_id.into()), info);
    }

    pub fn lookup(&self, family_id: &str, variant_id: &str, hard_size_cap: u32) -> FamilyVariantInfo {
        if let Some(info) = self.entries.get(&(family_id.to_string(), variant_id.to_string())) {
            return *info;
        }
        if let Some((_, info)) = self
            .entries
            .iter()
            .find(|((family, _), _)| family == family_id)
        {
            return *info;
        }
        FamilyVariantInfo::fallback(hard_size_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins() {
        let mut catalog = FamilyVariantCatalog::new();
        catalog.register(
            "duels",
            "1v1",
            FamilyVariantInfo {
                min_team_size: 2,
                max_team_size: 2,
                team_count: 2,
            },
        );
        let info = catalog.lookup("duels", "1v1", 8);
        assert_eq!(info.max_team_size, 2);
    }

    #[test]
    fn falls_back_to_any_variant_of_the_family() {
        let mut catalog = FamilyVariantCatalog::new();
        catalog.register(
            "duels",
            "2v2",
            FamilyVariantInfo {
                min_team_size: 4,
                max_team_size: 4,
                team_count: 2,
            },
        );
        let info = catalog.lookup("duels", "1v1", 8);
        assert_eq!(info.max_team_size, 4);
    }

    #[test]
    fn falls_back_to_hard_cap_when_family_unknown() {
        let catalog = FamilyVariantCatalog::new();
        let info = catalog.lookup("unknown", "unknown", 8);
        assert_eq!(info.max_team_size, 8);
        assert_eq!(info.team_count, 1);
    }
}
