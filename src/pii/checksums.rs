//! Checksum validators for domain-specific identifiers (spec §4.6).
//!
//! An entity is emitted only if its checksum passes: Luhn for credit
//! cards, IBAN modulo-97, weighted-modulo-11 for Polish NIP/REGON, and
//! weighted-modulo-10 for PESEL.

/// Luhn checksum over a digit string (credit cards).
pub fn luhn_valid(digits: &str) -> bool {
    let digits: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 12 {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// IBAN modulo-97 (ISO 7064 MOD 97-10): move the first four characters to
/// the end, convert letters to numbers (A=10..Z=35), and check the whole
/// number mod 97 == 1.
pub fn iban_valid(iban: &str) -> bool {
    let cleaned: String = iban.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.len() < 15 || cleaned.len() > 34 {
        return false;
    }
    if !cleaned.chars().take(2).all(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    let rearranged = format!("{}{}", &cleaned[4..], &cleaned[..4]);

    let mut remainder: u64 = 0;
    for c in rearranged.chars() {
        let value = if c.is_ascii_digit() {
            c.to_digit(10).unwrap() as u64
        } else if c.is_ascii_alphabetic() {
            (c.to_ascii_uppercase() as u64) - ('A' as u64) + 10
        } else {
            return false;
        };
        let digits = if value >= 10 { 2 } else { 1 };
        remainder = (remainder * 10u64.pow(digits) + value) % 97;
    }
    remainder == 1
}

/// Polish NIP (tax ID, 10 digits): weighted modulo-11 with weights
/// `[6,5,7,2,3,4,5,6,7]`, check digit is the last.
pub fn pl_nip_valid(digits: &str) -> bool {
    const WEIGHTS: [u32; 9] = [6, 5, 7, 2, 3, 4, 5, 6, 7];
    let digits: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 10 {
        return false;
    }
    let sum: u32 = digits[..9].iter().zip(WEIGHTS.iter()).map(|(d, w)| d * w).sum();
    sum % 11 == digits[9]
}

/// Polish REGON, 9-digit form: weighted modulo-11 with weights
/// `[8,9,2,3,4,5,6,7]`.
pub fn pl_regon9_valid(digits: &str) -> bool {
    const WEIGHTS: [u32; 8] = [8, 9, 2, 3, 4, 5, 6, 7];
    let digits: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 9 {
        return false;
    }
    let sum: u32 = digits[..8].iter().zip(WEIGHTS.iter()).map(|(d, w)| d * w).sum();
    let check = sum % 11;
    let check = if check == 10 { 0 } else { check };
    check == digits[8]
}

/// Polish REGON, 14-digit form: the first 9 digits must themselves be a
/// valid 9-digit REGON; the last 5 digits append a second weighted
/// modulo-11 check with weights `[2,4,8,5,0,9,7,3,6,1,2,4,8]`.
pub fn pl_regon14_valid(digits: &str) -> bool {
    const WEIGHTS: [u32; 13] = [2, 4, 8, 5, 0, 9, 7, 3, 6, 1, 2, 4, 8];
    let digits: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 14 {
        return false;
    }
    if !pl_regon9_valid(&digits[..9].iter().map(|d| std::char::from_digit(*d, 10).unwrap()).collect::<String>()) {
        return false;
    }
    let sum: u32 = digits[..13].iter().zip(WEIGHTS.iter()).map(|(d, w)| d * w).sum();
    let check = sum % 11;
    let check = if check == 10 { 0 } else { check };
    check == digits[13]
}

/// Polish PESEL (11-digit national ID): weighted modulo-10 with weights
/// `[1,3,7,9,1,3,7,9,1,3]`.
pub fn pl_pesel_valid(digits: &str) -> bool {
    const WEIGHTS: [u32; 10] = [1, 3, 7, 9, 1, 3, 7, 9, 1, 3];
    let digits: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 11 {
        return false;
    }
    let sum: u32 = digits[..10].iter().zip(WEIGHTS.iter()).map(|(d, w)| d * w).sum();
    let check = (10 - (sum % 10)) % 10;
    check == digits[10]
}
