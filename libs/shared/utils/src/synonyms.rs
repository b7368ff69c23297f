//! Lay words patients use for specialties ("coração" for Cardiologia).

use crate::text::tokens;

/// Folded word prefix -> specialty name.
pub const SPECIALTY_SYNONYMS: &[(&str, &str)] = &[
    ("coracao", "Cardiologia"),
    ("cardio", "Cardiologia"),
    ("pressao", "Cardiologia"),
    ("pele", "Dermatologia"),
    ("mancha", "Dermatologia"),
    ("crianca", "Pediatria"),
    ("filho", "Pediatria"),
    ("bebe", "Pediatria"),
    ("mulher", "Ginecologia"),
    ("gineco", "Ginecologia"),
    ("osso", "Ortopedia"),
    ("joelho", "Ortopedia"),
    ("coluna", "Ortopedia"),
    ("olho", "Oftalmologia"),
    ("visao", "Oftalmologia"),
    ("mental", "Psiquiatria"),
    ("ansiedade", "Psiquiatria"),
    ("depressao", "Psiquiatria"),
    ("neuro", "Neurologia"),
    ("cabeca", "Neurologia"),
];

/// Specialty name suggested by the first lay word found in `text`.
pub fn specialty_for(text: &str) -> Option<&'static str> {
    let words = tokens(text);
    SPECIALTY_SYNONYMS
        .iter()
        .find(|(prefix, _)| words.iter().any(|w| w.starts_with(prefix)))
        .map(|(_, specialty)| *specialty)
}
