//! Reconciles the sovereign codes used by the country reference geometries
//! with the ISO-3 codes used by the indicator tables.

use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Codes that no automatic rule resolves.
pub const MANUAL_OVERRIDES: &[(&str, &str)] = &[("FR1", "FRA"), ("CU1", "CUB")];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryCodeMapping {
    /// Reference code -> data code.
    pub map: BTreeMap<String, String>,
    /// Reference codes with no data counterpart, sorted.
    pub unresolved: Vec<String>,
}

impl CountryCodeMapping {
    /// The data code a reference code stands for. Codes that already agree map
    /// to themselves.
    pub fn resolve<'a>(&'a self, code: &'a str) -> &'a str {
        self.map.get(code).map_or(code, String::as_str)
    }
}

/// Builds the mapping in three passes: codes present on both sides need no
/// entry, manual overrides always apply, and a reference code ending in a
/// digit maps to the only unmatched data code sharing its first two
/// characters. Anything else stays unresolved and is logged.
pub fn reconcile<'a, G, D>(
    reference_codes: G,
    data_codes: D,
    overrides: &[(&str, &str)],
) -> CountryCodeMapping
where
    G: IntoIterator<Item = &'a str>,
    D: IntoIterator<Item = &'a str>,
{
    let reference: BTreeSet<&str> = reference_codes.into_iter().collect();
    let data: BTreeSet<&str> = data_codes.into_iter().collect();
    let unmatched_data: Vec<&str> = data.difference(&reference).copied().collect();

    let mut map: BTreeMap<String, String> = overrides
        .iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();
    let mut unresolved = Vec::new();

    for code in reference.difference(&data) {
        if map.contains_key(*code) {
            continue;
        }
        let ends_in_digit = code.chars().last().is_some_and(|c| c.is_ascii_digit());
        let prefix: String = code.chars().take(2).collect();
        let options: Vec<&str> = if ends_in_digit {
            unmatched_data
                .iter()
                .copied()
                .filter(|candidate| candidate.starts_with(&prefix))
                .collect()
        } else {
            Vec::new()
        };
        match options.as_slice() {
            [only] => {
                info!("Country code {} -> {}", code, only);
                map.insert(code.to_string(), only.to_string());
            }
            _ => {
                if ends_in_digit {
                    warn!("Country code {} is ambiguous: {:?}", code, options);
                }
                unresolved.push(code.to_string());
            }
        }
    }

    if !unresolved.is_empty() {
        warn!("{} country codes have no data counterpart", unresolved.len());
    }
    CountryCodeMapping { map, unresolved }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_and_prefix_inference() {
        let mapping = reconcile(
            ["FR1", "CU1", "ES2"],
            ["FRA", "CUB", "ESP"],
            MANUAL_OVERRIDES,
        );

        let expected: BTreeMap<String, String> = [("FR1", "FRA"), ("CU1", "CUB"), ("ES2", "ESP")]
            .into_iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        assert_eq!(mapping.map, expected);
        assert!(mapping.unresolved.is_empty());
    }

    #[test]
    fn test_matching_codes_map_to_themselves() {
        let mapping = reconcile(["DEU", "ESP"], ["DEU", "ESP"], &[]);
        assert!(mapping.map.is_empty());
        assert_eq!(mapping.resolve("DEU"), "DEU");
    }

    #[test]
    fn test_ambiguous_and_unmatched_codes_are_reported() {
        let mapping = reconcile(["GB1", "KOS", "US1"], ["GBR", "GBX", "USA"], &[]);

        assert_eq!(mapping.resolve("US1"), "USA");
        assert_eq!(mapping.unresolved, vec!["GB1".to_string(), "KOS".to_string()]);
        assert_eq!(mapping.resolve("GB1"), "GB1");
    }
}
