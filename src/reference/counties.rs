//! County → province mapping.
//!
//! Most county names are unique in the country and map to exactly one province. A handful
//! (`grodziski`, `średzki`, `brzeski`, ...) exist in two provinces; those are kept as
//! explicit pairs and reported as ambiguous by [`CountyProvinceMapping::lookup`].

use hashbrown::HashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One canonical (county, province) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountyProvincePair {
    pub county: String,
    pub province: String,
}

/// Result of looking a county up in the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountyLookup<'a> {
    /// The county name belongs to exactly one province
    Unique(&'a str),
    /// The name exists in several provinces
    Ambiguous(&'a [String]),
    /// Not known to the system
    Absent,
}

#[derive(Debug, Clone, Default)]
pub struct CountyProvinceMapping {
    /// county → provinces, in insertion order
    provinces: HashMap<String, Vec<String>>,
}

impl CountyProvinceMapping {
    pub fn from_pairs(pairs: impl IntoIterator<Item = CountyProvincePair>) -> Self {
        let mut mapping = Self::default();
        for pair in pairs {
            mapping.insert(pair);
        }
        mapping
    }

    pub fn insert(&mut self, pair: CountyProvincePair) {
        let county = canonical_county(&pair.county);
        let provinces = self.provinces.entry(county).or_default();
        if !provinces.contains(&pair.province) {
            provinces.push(pair.province);
        }
    }

    pub fn lookup(&self, county: &str) -> CountyLookup<'_> {
        match self.provinces.get(&canonical_county(county)) {
            Some(provinces) if provinces.len() == 1 => CountyLookup::Unique(&provinces[0]),
            Some(provinces) if !provinces.is_empty() => CountyLookup::Ambiguous(provinces),
            _ => CountyLookup::Absent,
        }
    }

    /// The province of a county whose name is unique in the country.
    pub fn province_of(&self, county: &str) -> Option<&str> {
        match self.lookup(county) {
            CountyLookup::Unique(province) => Some(province),
            _ => None,
        }
    }

    pub fn contains(&self, county: &str) -> bool {
        self.provinces.contains_key(&canonical_county(county))
    }

    pub fn contains_pair(&self, county: &str, province: &str) -> bool {
        self.provinces
            .get(&canonical_county(county))
            .is_some_and(|provinces| provinces.iter().any(|p| p == province))
    }

    /// Number of distinct county names.
    pub fn len(&self) -> usize {
        self.provinces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.provinces.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = CountyProvincePair> + '_ {
        self.provinces.iter().flat_map(|(county, provinces)| {
            provinces.iter().map(move |province| CountyProvincePair {
                county: county.clone(),
                province: province.clone(),
            })
        })
    }
}

/// Lowercase, trim and drop the "powiat" prefix or suffix.
pub fn canonical_county(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let stripped = lower
        .strip_prefix("powiat ")
        .or_else(|| lower.strip_suffix(" powiat"))
        .unwrap_or(&lower);
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Seats whose adjectival county name does not follow the suffix rules.
const SPECIAL_SEATS: &[(&str, &str)] = &[
    ("wrocław", "wrocławski"),
    ("warszawa", "warszawski"),
    ("kraków", "krakowski"),
    ("poznań", "poznański"),
    ("gdańsk", "gdański"),
    ("łódź", "łódzki"),
    ("katowice", "katowicki"),
    ("szczecin", "szczeciński"),
    ("bydgoszcz", "bydgoski"),
    ("toruń", "toruński"),
    ("lublin", "lubelski"),
    ("białystok", "białostocki"),
    ("rzeszów", "rzeszowski"),
    ("kielce", "kielecki"),
    ("olsztyn", "olsztyński"),
    ("opole", "opolski"),
    ("gorzów wielkopolski", "gorzowski"),
    ("zielona góra", "zielonogórski"),
];

fn adjectival_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(ski|cki|dzki|ński|wski|ecki|ycki)$").expect("static regex is valid")
    })
}

/// Guess the adjectival county name ("powiat kozienicki") from free text such as a seat
/// name ("Kozienice") by Polish suffix rules.
///
/// The guess is lossy. Callers must prefer an explicit mapping entry and must not use a
/// guessed name to overwrite a province.
pub fn infer_county_name(raw: &str) -> Option<String> {
    let normalized = canonical_county(raw);
    if normalized.is_empty()
        || normalized.starts_with("województwo")
        || normalized.starts_with("woj.")
    {
        return None;
    }

    if let Some((_, county)) = SPECIAL_SEATS.iter().find(|(seat, _)| *seat == normalized) {
        return Some((*county).to_string());
    }

    if adjectival_suffix().is_match(&normalized) {
        return Some(normalized);
    }

    let stem = |n: usize| -> String {
        let mut chars: Vec<char> = normalized.chars().collect();
        chars.truncate(chars.len().saturating_sub(n));
        chars.into_iter().collect()
    };

    let guess = if normalized.ends_with('a') || normalized.ends_with('ą') {
        format!("{}ański", stem(1))
    } else if normalized.ends_with('e') || normalized.ends_with('ę') {
        format!("{}eński", stem(1))
    } else if normalized.ends_with('o') {
        format!("{}owski", stem(1))
    } else if normalized.ends_with("ów") || normalized.ends_with("ow") {
        format!("{}ski", normalized)
    } else if normalized.ends_with('y') {
        format!("{}cki", stem(1))
    } else if normalized.ends_with('c') || normalized.ends_with('ć') {
        format!("{}ki", normalized)
    } else {
        format!("{}ski", normalized)
    };

    Some(guess)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> CountyProvinceMapping {
        CountyProvinceMapping::from_pairs([
            CountyProvincePair {
                county: "kozienicki".into(),
                province: "mazowieckie".into(),
            },
            CountyProvincePair {
                county: "grodziski".into(),
                province: "mazowieckie".into(),
            },
            CountyProvincePair {
                county: "grodziski".into(),
                province: "wielkopolskie".into(),
            },
        ])
    }

    #[test]
    fn test_unique_and_ambiguous_lookup() {
        let m = mapping();
        assert_eq!(m.lookup("kozienicki"), CountyLookup::Unique("mazowieckie"));
        assert_eq!(m.province_of("Powiat Kozienicki"), Some("mazowieckie"));
        assert!(matches!(m.lookup("grodziski"), CountyLookup::Ambiguous(p) if p.len() == 2));
        assert_eq!(m.province_of("grodziski"), None);
        assert_eq!(m.lookup("wrocławski"), CountyLookup::Absent);
    }

    #[test]
    fn test_pairs() {
        let m = mapping();
        assert!(m.contains_pair("grodziski", "wielkopolskie"));
        assert!(!m.contains_pair("kozienicki", "lubelskie"));
        assert_eq!(m.pairs().count(), 3);
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn test_duplicate_pair_is_ignored() {
        let mut m = mapping();
        m.insert(CountyProvincePair {
            county: "kozienicki".into(),
            province: "mazowieckie".into(),
        });
        assert_eq!(m.lookup("kozienicki"), CountyLookup::Unique("mazowieckie"));
    }

    #[test]
    fn test_canonical_county() {
        assert_eq!(canonical_county("  powiat  Kozienicki "), "kozienicki");
        assert_eq!(canonical_county("łódzki wschodni powiat"), "łódzki wschodni");
    }

    #[test]
    fn test_infer_county_name() {
        assert_eq!(infer_county_name("Wrocław").as_deref(), Some("wrocławski"));
        assert_eq!(infer_county_name("powiat kozienicki").as_deref(), Some("kozienicki"));
        assert_eq!(infer_county_name("Kozienice").as_deref(), Some("kozieniceński"));
        assert_eq!(infer_county_name("Mława").as_deref(), Some("mławański"));
        assert_eq!(infer_county_name("Łuków").as_deref(), Some("łukówski"));
        assert_eq!(infer_county_name("województwo lubelskie"), None);
        assert_eq!(infer_county_name(""), None);
    }
}
