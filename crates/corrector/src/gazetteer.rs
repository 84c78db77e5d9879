//! Fixed city gazetteer used by the location-coherence rule.
//!
//! The canonical suffixes reproduce the upstream editorial data verbatim,
//! region-code quirks included; changing them would break author lines that
//! are already live.

use once_cell::sync::Lazy;
use regex::Regex;

/// One gazetteer entry: the lowercase needle scanned for inside quotes, and
/// the canonical `City-RegionCode` suffix appended to author lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CityEntry {
    /// Lowercase form matched inside the quote.
    pub needle: &'static str,
    /// Canonical author suffix.
    pub canonical: &'static str,
}

pub(crate) const CITIES: &[CityEntry] = &[
    CityEntry { needle: "são paulo", canonical: "São Paulo-SP" },
    CityEntry { needle: "rio de janeiro", canonical: "Rio de Janeiro-RJ" },
    CityEntry { needle: "belo horizonte", canonical: "Belo Horizonte-MG" },
    CityEntry { needle: "porto alegre", canonical: "Porto Alegre-RS" },
    CityEntry { needle: "porto velho", canonical: "Porto Velho-RO" },
    CityEntry { needle: "salvador", canonical: "Salvador-BR" },
    CityEntry { needle: "curitiba", canonical: "Curitiba-PR" },
    CityEntry { needle: "fortaleza", canonical: "Fortaleza-CE" },
    CityEntry { needle: "recife", canonical: "Recife-PE" },
    CityEntry { needle: "manaus", canonical: "Manaus-AM" },
    CityEntry { needle: "brasília", canonical: "Brasília-DF" },
    CityEntry { needle: "goiânia", canonical: "Goiânia-GO" },
    CityEntry { needle: "campinas", canonical: "Campinas-SP" },
    CityEntry { needle: "florianópolis", canonical: "Florianópolis-SC" },
    CityEntry { needle: "belém", canonical: "Belém-PA" },
];

static CITY_SCAN: Lazy<Regex> = Lazy::new(|| {
    // Longer names first so multi-word cities win over any shared prefix.
    let mut needles: Vec<&str> = CITIES.iter().map(|c| c.needle).collect();
    needles.sort_by_key(|n| std::cmp::Reverse(n.len()));
    let alternation = needles.join("|");
    Regex::new(&format!(r"(?i)\b({alternation})\b")).expect("static gazetteer pattern")
});

/// Scans `quote` case-insensitively for a gazetteer city.
///
/// Returns the first match in scan order (leftmost occurrence). When several
/// cities appear in one quote, later mentions lose, a known heuristic
/// limitation kept deliberately; see the multi-city test.
pub fn find_city(quote: &str) -> Option<&'static CityEntry> {
    let matched = CITY_SCAN.find(quote)?;
    let lowered = matched.as_str().to_lowercase();
    CITIES.iter().find(|c| c.needle == lowered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_are_case_insensitive_and_word_bounded() {
        assert_eq!(
            find_city("voltando pra SALVADOR depois da viagem").unwrap().canonical,
            "Salvador-BR"
        );
        // "recifense" must not match "recife".
        assert!(find_city("um orgulho recifense").is_none());
    }

    #[test]
    fn multi_word_cities_match_whole() {
        assert_eq!(
            find_city("comprei em porto velho mês passado").unwrap().canonical,
            "Porto Velho-RO"
        );
    }

    #[test]
    fn first_mention_wins_on_multi_city_quotes() {
        // Documented limitation: scan order decides, not salience.
        let quote = "levei de Curitiba até Fortaleza sem problema";
        assert_eq!(find_city(quote).unwrap().canonical, "Curitiba-PR");
    }

    #[test]
    fn accented_cities_match() {
        assert_eq!(
            find_city("entrega rápida aqui em brasília").unwrap().canonical,
            "Brasília-DF"
        );
    }
}
