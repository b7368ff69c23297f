//! CPF (Cadastro de Pessoas Físicas) normalisation and check digits.

use shared_utils::text::digits;

pub const CPF_LENGTH: usize = 11;

/// Digits of `raw`, or `None` unless exactly eleven are present.
pub fn normalize(raw: &str) -> Option<String> {
    let d = digits(raw);
    (d.len() == CPF_LENGTH).then_some(d)
}

/// Checks length and both verification digits. Repeated-digit numbers such as
/// 111.111.111-11 pass the arithmetic but are not issued, so they are rejected.
pub fn is_valid(raw: &str) -> bool {
    let Some(cpf) = normalize(raw) else {
        return false;
    };
    let nums: Vec<u32> = cpf.chars().filter_map(|c| c.to_digit(10)).collect();

    if nums.iter().all(|&n| n == nums[0]) {
        return false;
    }

    check_digit(&nums[..9]) == nums[9] && check_digit(&nums[..10]) == nums[10]
}

fn check_digit(prefix: &[u32]) -> u32 {
    let weight_start = prefix.len() as u32 + 1;
    let sum: u32 = prefix
        .iter()
        .enumerate()
        .map(|(i, n)| n * (weight_start - i as u32))
        .sum();
    let rest = sum % 11;
    if rest < 2 {
        0
    } else {
        11 - rest
    }
}

/// `52998224725` -> `529.982.247-25`. Input that is not 11 digits is returned unchanged.
pub fn format(cpf: &str) -> String {
    match normalize(cpf) {
        Some(d) => format!("{}.{}.{}-{}", &d[0..3], &d[3..6], &d[6..9], &d[9..11]),
        None => cpf.to_string(),
    }
}

/// Masked form safe for logs: `***.***.*47-25`.
pub fn mask(cpf: &str) -> String {
    match normalize(cpf) {
        Some(d) => format!("***.***.*{}-{}", &d[7..9], &d[9..11]),
        None => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_valid_numbers() {
        assert!(is_valid("52998224725"));
        assert!(is_valid("529.982.247-25"));
        assert!(is_valid("111.444.777-35"));
        assert!(is_valid("12345678909"));
    }

    #[test]
    fn rejects_bad_check_digits_and_lengths() {
        assert!(!is_valid("52998224726"));
        assert!(!is_valid("123"));
        assert!(!is_valid("529982247251"));
        assert!(!is_valid("11111111111"));
        assert!(!is_valid(""));
    }

    #[test]
    fn formatting_and_masking() {
        assert_eq!(format("52998224725"), "529.982.247-25");
        assert_eq!(mask("52998224725"), "***.***.*47-25");
        assert_eq!(mask("12"), "***");
    }
}
