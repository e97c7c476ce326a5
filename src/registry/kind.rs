use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares the entity enum together with its stable key and default display name
macro_rules! entity_kinds {
    ($($variant:ident => $key:literal, $display:literal;)+) => {
        /// Every business entity that has a spreadsheet counterpart
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum EntityKind {
            $($variant,)+
        }

        impl EntityKind {
            pub const ALL: &'static [EntityKind] = &[$(EntityKind::$variant,)+];

            /// snake_case key used in the registry file and logs
            pub fn key(&self) -> &'static str {
                match self {
                    $(EntityKind::$variant => $key,)+
                }
            }

            pub fn default_display_name(&self) -> &'static str {
                match self {
                    $(EntityKind::$variant => $display,)+
                }
            }
        }
    };
}

entity_kinds! {
    Borrower => "borrower", "Borrowers";
    CreditApplication => "credit_application", "Credit Applications";
    Guarantor => "guarantor", "Guarantors";
    PersonalReference => "personal_reference", "Personal References";
    HomeVisit => "home_visit", "Home Visits";
    School => "school", "Schools";
    Enrollment => "enrollment", "Enrollments";
    AssetTitle => "asset_title", "Asset Titles";
    Payroll => "payroll", "Payroll";
    Promoter => "promoter", "Promoters";
    CommitteeDecision => "committee_decision", "Committee Decisions";
    Disbursement => "disbursement", "Disbursements";
    Payment => "payment", "Payments";
    CollectionVisit => "collection_visit", "Collection Visits";
    DocumentChecklist => "document_checklist", "Document Checklists";
}

impl EntityKind {
    /// kebab-case form used in route prefixes (`/<slug>-migration/...`)
    pub fn slug(&self) -> String {
        self.key().replace('_', "-")
    }

    /// True when `name` refers to this entity by key, slug or display name,
    /// ignoring case, separators and a trailing plural "s"
    pub fn matches_name(&self, name: &str, display_name: &str) -> bool {
        let wanted = normalize_name(name);
        !wanted.is_empty()
            && [self.key(), display_name, self.default_display_name()]
                .iter()
                .any(|candidate| normalize_name(candidate) == wanted)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown entity: {0}")]
pub struct UnknownEntity(pub String);

impl FromStr for EntityKind {
    type Err = UnknownEntity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.matches_name(s, kind.default_display_name()))
            .ok_or_else(|| UnknownEntity(s.to_string()))
    }
}

/// Lowercase alphanumerics only, singular ("Home Visits" → "homevisit")
pub fn normalize_name(name: &str) -> String {
    let mut normalized: String = name
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect();
    if normalized.len() > 1 && normalized.ends_with('s') {
        normalized.pop();
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys_slugs_and_display_names() {
        assert_eq!("credit_application".parse::<EntityKind>().unwrap(), EntityKind::CreditApplication);
        assert_eq!("credit-application".parse::<EntityKind>().unwrap(), EntityKind::CreditApplication);
        assert_eq!("Credit Applications".parse::<EntityKind>().unwrap(), EntityKind::CreditApplication);
        assert_eq!("HOMEVISITS".parse::<EntityKind>().unwrap(), EntityKind::HomeVisit);
        assert_eq!("payroll".parse::<EntityKind>().unwrap(), EntityKind::Payroll);
    }

    #[test]
    fn rejects_unknown_names() {
        assert!("nonexistent".parse::<EntityKind>().is_err());
        assert!("".parse::<EntityKind>().is_err());
        assert!("   ".parse::<EntityKind>().is_err());
    }

    #[test]
    fn slugs_are_kebab_case() {
        assert_eq!(EntityKind::DocumentChecklist.slug(), "document-checklist");
        assert_eq!(EntityKind::Borrower.slug(), "borrower");
    }

    #[test]
    fn keys_are_unique() {
        let mut keys: Vec<_> = EntityKind::ALL.iter().map(|k| k.key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), EntityKind::ALL.len());
    }
}
