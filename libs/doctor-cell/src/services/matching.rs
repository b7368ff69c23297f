//! Fuzzy lookup of specialties, doctors and locations from free text.

use shared_models::{Doctor, Location, Specialty};
use shared_utils::synonyms::specialty_for;
use shared_utils::text::{fold, tokens};

use crate::models::{DoctorMatch, LocationMatch, SpecialtyMatch};

const MIN_SUBSTRING_CHARS: usize = 3;
const MIN_TOKEN_CHARS: usize = 3;
const STEM_PREFIX_CHARS: usize = 6;

const TITLES: &[&str] = &["dr", "dra", "doutor", "doutora"];

/// Resolves `query` against `specialties`, trying exact name, substring,
/// shared word stems and lay synonyms in that order.
pub fn match_specialty(query: &str, specialties: &[Specialty]) -> SpecialtyMatch {
    let folded = fold(query.trim());
    if folded.is_empty() || specialties.is_empty() {
        return SpecialtyMatch::NoMatch;
    }

    if let Some(exact) = specialties.iter().find(|s| fold(&s.name) == folded) {
        return SpecialtyMatch::Matched(exact.clone());
    }

    if folded.chars().count() >= MIN_SUBSTRING_CHARS {
        let hits: Vec<&Specialty> = specialties
            .iter()
            .filter(|s| {
                let name = fold(&s.name);
                name.contains(&folded) || folded.contains(&name)
            })
            .collect();
        if let Some(result) = pick(hits) {
            return result;
        }
    }

    let query_tokens: Vec<String> = tokens(query)
        .into_iter()
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .collect();
    if !query_tokens.is_empty() {
        let scored: Vec<(usize, &Specialty)> = specialties
            .iter()
            .map(|s| (stem_overlap(&query_tokens, &tokens(&s.name)), s))
            .filter(|(score, _)| *score > 0)
            .collect();
        if let Some(best) = scored.iter().map(|(score, _)| *score).max() {
            let top: Vec<&Specialty> = scored
                .iter()
                .filter(|(score, _)| *score == best)
                .map(|(_, s)| *s)
                .collect();
            if let Some(result) = pick(top) {
                return result;
            }
        }
    }

    if let Some(suggested) = specialty_for(query) {
        let suggested = fold(suggested);
        if let Some(hit) = specialties.iter().find(|s| s.active && fold(&s.name) == suggested) {
            return SpecialtyMatch::Matched(hit.clone());
        }
    }

    SpecialtyMatch::NoMatch
}

fn pick(hits: Vec<&Specialty>) -> Option<SpecialtyMatch> {
    match hits.len() {
        0 => None,
        1 => Some(SpecialtyMatch::Matched(hits[0].clone())),
        _ => Some(SpecialtyMatch::Ambiguous(hits.into_iter().cloned().collect())),
    }
}

fn stem_overlap(query_tokens: &[String], name_tokens: &[String]) -> usize {
    query_tokens
        .iter()
        .filter(|q| name_tokens.iter().any(|n| same_stem(q, n)))
        .count()
}

fn same_stem(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let common = a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count();
    common >= STEM_PREFIX_CHARS
}

/// Resolves "Dra. Ana" style references by name words, ignoring titles.
pub fn match_doctor(reference: &str, doctors: &[Doctor]) -> DoctorMatch {
    let wanted: Vec<String> = tokens(reference)
        .into_iter()
        .filter(|t| !TITLES.contains(&t.as_str()))
        .collect();
    if wanted.is_empty() {
        return DoctorMatch::NoMatch;
    }

    let scored: Vec<(usize, &Doctor)> = doctors
        .iter()
        .map(|d| {
            let name = tokens(&d.name);
            (wanted.iter().filter(|w| name.contains(w)).count(), d)
        })
        .filter(|(score, _)| *score > 0)
        .collect();

    let Some(best) = scored.iter().map(|(score, _)| *score).max() else {
        return DoctorMatch::NoMatch;
    };
    let mut top: Vec<Doctor> = scored
        .into_iter()
        .filter(|(score, _)| *score == best)
        .map(|(_, d)| d.clone())
        .collect();

    if top.len() == 1 {
        DoctorMatch::Matched(top.remove(0))
    } else {
        DoctorMatch::Ambiguous(top)
    }
}

/// Locations whose name, or failing that city, appears in `query`.
pub fn match_location(query: &str, locations: &[Location]) -> LocationMatch {
    let folded = fold(query.trim());
    if folded.chars().count() < MIN_SUBSTRING_CHARS {
        return LocationMatch::NoMatch;
    }

    let mentions = |field: &str| {
        let key = fold(field);
        !key.is_empty() && (folded.contains(&key) || key.contains(&folded))
    };

    let by_name: Vec<&Location> = locations.iter().filter(|l| mentions(&l.name)).collect();
    let hits = if by_name.is_empty() {
        locations
            .iter()
            .filter(|l| l.city.as_deref().map_or(false, |c| mentions(c)))
            .collect()
    } else {
        by_name
    };

    match hits.len() {
        0 => LocationMatch::NoMatch,
        1 => LocationMatch::Matched(hits[0].clone()),
        _ => LocationMatch::Ambiguous(hits.into_iter().cloned().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use shared_utils::test_utils::{doctor, location, specialty};

    fn catalog() -> Vec<Specialty> {
        vec![
            specialty("Cardiologia", false),
            specialty("Dermatologia", false),
            specialty("Cirurgia Geral", false),
            specialty("Cirurgia Plástica", false),
        ]
    }

    #[test]
    fn exact_and_accent_insensitive() {
        let specialties = catalog();
        assert_matches!(match_specialty("cardiologia", &specialties), SpecialtyMatch::Matched(s) if s.name == "Cardiologia");
        assert_matches!(match_specialty("CIRURGIA PLASTICA", &specialties), SpecialtyMatch::Matched(s) if s.name == "Cirurgia Plástica");
    }

    #[test]
    fn substring_and_ambiguity() {
        let specialties = catalog();
        assert_matches!(match_specialty("derma", &specialties), SpecialtyMatch::Matched(s) if s.name == "Dermatologia");
        assert_matches!(match_specialty("cirurgia", &specialties), SpecialtyMatch::Ambiguous(list) if list.len() == 2);
    }

    #[test]
    fn stems_and_synonyms() {
        let specialties = catalog();
        assert_matches!(match_specialty("cardiologista", &specialties), SpecialtyMatch::Matched(s) if s.name == "Cardiologia");
        assert_matches!(match_specialty("dor no coração", &specialties), SpecialtyMatch::Matched(s) if s.name == "Cardiologia");
        assert_eq!(match_specialty("astrologia", &specialties), SpecialtyMatch::NoMatch);
        assert_eq!(match_specialty("", &specialties), SpecialtyMatch::NoMatch);
    }

    #[test]
    fn doctors_by_name_words() {
        let cardio = specialty("Cardiologia", false);
        let doctors = vec![
            doctor("Dra. Ana Souza", &cardio, 1, 30),
            doctor("Dra. Ana Lima", &cardio, 1, 30),
            doctor("Dr. Bruno Costa", &cardio, 1, 30),
        ];
        assert_matches!(match_doctor("Dr. Bruno", &doctors), DoctorMatch::Matched(d) if d.name == "Dr. Bruno Costa");
        assert_matches!(match_doctor("dra ana", &doctors), DoctorMatch::Ambiguous(list) if list.len() == 2);
        assert_matches!(match_doctor("Dra Ana Lima", &doctors), DoctorMatch::Matched(d) if d.name == "Dra. Ana Lima");
        assert_eq!(match_doctor("doutor", &doctors), DoctorMatch::NoMatch);
    }

    #[test]
    fn locations_by_name_then_city() {
        let locations = vec![
            location("Unidade Centro", "Campinas"),
            location("Unidade Norte", "Campinas"),
            location("Clínica Vila Mariana", "São Paulo"),
        ];
        assert_matches!(match_location("na unidade centro", &locations), LocationMatch::Matched(l) if l.name == "Unidade Centro");
        assert_matches!(match_location("vila mariana", &locations), LocationMatch::Matched(l) if l.name == "Clínica Vila Mariana");
        assert_matches!(match_location("Sao Paulo", &locations), LocationMatch::Matched(l) if l.name == "Clínica Vila Mariana");
        assert_matches!(match_location("campinas", &locations), LocationMatch::Ambiguous(list) if list.len() == 2);
        assert_eq!(match_location("Recife", &locations), LocationMatch::NoMatch);
        assert_eq!(match_location("", &locations), LocationMatch::NoMatch);
    }
}
