//! Text canonicalization for city, province, county and municipality fields.

use hashbrown::HashMap;
use regex::Regex;
use std::sync::OnceLock;

use crate::models::AdminLabel;
use crate::reference::{canonical_county, ReferenceData};

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex is valid"))
}

/// Collapse runs of whitespace and trim.
pub fn collapse_whitespace(text: &str) -> String {
    whitespace().replace_all(text.trim(), " ").into_owned()
}

/// Canonical province name: lowercase, without the `województwo` / `woj.` prefix.
///
/// Returns `None` for empty text and for the registries' "unknown" placeholders.
pub fn canonical_province(raw: &str) -> Option<String> {
    let lower = collapse_whitespace(raw).to_lowercase();
    let name = lower
        .strip_prefix("województwo ")
        .or_else(|| lower.strip_prefix("woj. "))
        .or_else(|| lower.strip_prefix("woj."))
        .unwrap_or(&lower)
        .trim();

    match name {
        "" | "unknown" | "nieznany" | "nieznane" | "nieznana" => None,
        _ => Some(name.to_string()),
    }
}

/// Municipality label from a provider address name, without the `gmina ` prefix.
pub fn municipality_label(raw: Option<&str>) -> AdminLabel {
    let Some(raw) = raw else {
        return AdminLabel::Unknown;
    };
    let name = collapse_whitespace(raw);
    let name = match name.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("gmina ") => &name[6..],
        _ => name.as_str(),
    };
    AdminLabel::from(name.to_string())
}

/// Maps raw city spellings onto dictionary keys.
#[derive(Debug, Clone, Default)]
pub struct NameNormalizer {
    /// Variant (lowercase) -> canonical spelling
    variants: HashMap<String, String>,
}

impl NameNormalizer {
    pub fn new<'a>(variants: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        let variants = variants
            .into_iter()
            .map(|(variant, canonical)| {
                (
                    collapse_whitespace(variant).to_lowercase(),
                    canonical.clone(),
                )
            })
            .collect();
        Self { variants }
    }

    pub fn from_reference(reference: &ReferenceData) -> Self {
        Self::new(reference.variants())
    }

    /// Trimmed, whitespace-collapsed city name with known variants replaced.
    pub fn city(&self, raw: &str) -> String {
        let collapsed = collapse_whitespace(raw);
        match self.variants.get(&collapsed.to_lowercase()) {
            Some(canonical) => canonical.clone(),
            None => collapsed,
        }
    }

    pub fn province(&self, raw: &str) -> Option<String> {
        canonical_province(raw)
    }

    /// Canonical county name, `None` when the text is empty or a placeholder.
    pub fn county(&self, raw: &str) -> Option<String> {
        let county = canonical_county(raw);
        match county.as_str() {
            "" | "unknown" | "nieznany" => None,
            _ => Some(county),
        }
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> NameNormalizer {
        let variants: Vec<(String, String)> = vec![
            ("Kraśnika".to_string(), "Kraśnik".to_string()),
            ("Łysołaje-Kolonia".to_string(), "Łysołaje".to_string()),
        ];
        NameNormalizer::new(variants.iter().map(|(k, v)| (k, v)))
    }

    #[test]
    fn test_city_whitespace_and_variants() {
        let n = normalizer();
        assert_eq!(n.city("  Nowa   Dęba "), "Nowa Dęba");
        assert_eq!(n.city("kraśnika"), "Kraśnik");
        assert_eq!(n.city("Łysołaje-Kolonia"), "Łysołaje");
        assert_eq!(n.city(""), "");
    }

    #[test]
    fn test_province_prefixes() {
        assert_eq!(canonical_province("Województwo Dolnośląskie").as_deref(), Some("dolnośląskie"));
        assert_eq!(canonical_province("woj. mazowieckie").as_deref(), Some("mazowieckie"));
        assert_eq!(canonical_province("woj.lubelskie").as_deref(), Some("lubelskie"));
        assert_eq!(canonical_province(" ŚLĄSKIE ").as_deref(), Some("śląskie"));
        assert_eq!(canonical_province("nieznane"), None);
        assert_eq!(canonical_province(""), None);
    }

    #[test]
    fn test_municipality_label() {
        assert_eq!(municipality_label(Some("gmina Żarów")), AdminLabel::known("Żarów"));
        assert_eq!(municipality_label(Some("Gmina  Kozienice")), AdminLabel::known("Kozienice"));
        assert_eq!(municipality_label(Some("Mrowiny")), AdminLabel::known("Mrowiny"));
        assert_eq!(municipality_label(Some("gminaś")), AdminLabel::known("gminaś"));
        assert_eq!(municipality_label(Some("  ")), AdminLabel::Unknown);
        assert_eq!(municipality_label(Some("nieznana")), AdminLabel::Unknown);
        assert_eq!(municipality_label(None), AdminLabel::Unknown);
    }

    #[test]
    fn test_county() {
        let n = normalizer();
        assert_eq!(n.county("Powiat Kozienicki").as_deref(), Some("kozienicki"));
        assert_eq!(n.county("nieznany"), None);
        assert_eq!(n.county("  "), None);
    }
}
