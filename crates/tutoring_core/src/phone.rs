//! crates/tutoring_core/src/phone.rs
//!
//! Phone identity normalization. Stored phone numbers come in several historical
//! formats (`01…`, `+201…`, `201…`), so every lookup goes through here and
//! searches all equivalent spellings at once.

const COUNTRY_CODE: &str = "20";

/// Keeps digits and a single leading `+`.
fn clean(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut cleaned = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        cleaned.push('+');
    }
    cleaned.extend(trimmed.chars().filter(|c| c.is_ascii_digit()));
    cleaned
}

/// Maps any phone string to its canonical local form (`0` + national number).
///
/// The function is total: input that matches none of the known prefixes is
/// returned cleaned but otherwise unchanged.
pub fn normalize(raw: &str) -> String {
    let cleaned = clean(raw);

    if let Some(rest) = cleaned.strip_prefix("+20") {
        return format!("0{}", rest);
    }
    if let Some(rest) = cleaned.strip_prefix('+') {
        return rest.to_string();
    }
    if let Some(rest) = cleaned.strip_prefix(COUNTRY_CODE) {
        return format!("0{}", rest);
    }
    cleaned
}

/// The `+20…` spelling of a phone number.
pub fn to_international(raw: &str) -> String {
    let local = normalize(raw);
    if local.is_empty() {
        return local;
    }
    match local.strip_prefix('0') {
        Some(rest) => format!("+{}{}", COUNTRY_CODE, rest),
        None => format!("+{}{}", COUNTRY_CODE, local),
    }
}

/// Whether `local` is exactly `0` followed by ten digits.
pub fn is_canonical_local(local: &str) -> bool {
    local.len() == 11 && local.starts_with('0') && local.chars().all(|c| c.is_ascii_digit())
}

/// Hides all but the last three characters, for log lines.
pub fn mask(phone: &str) -> String {
    let count = phone.chars().count();
    let visible = count.saturating_sub(3);
    phone
        .chars()
        .enumerate()
        .map(|(i, c)| if i < visible { '*' } else { c })
        .collect()
}

/// The deduplicated, order-preserving set of spellings used to look a student up:
/// raw input, canonical local form, international form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneVariants {
    local: String,
    variants: Vec<String>,
}

impl PhoneVariants {
    pub fn from_input(raw: &str) -> Self {
        let local = normalize(raw);
        let international = to_international(raw);

        let mut variants: Vec<String> = Vec::with_capacity(3);
        for candidate in [raw.to_string(), local.clone(), international] {
            if !candidate.is_empty() && !variants.contains(&candidate) {
                variants.push(candidate);
            }
        }

        if !is_canonical_local(&local) {
            tracing::warn!(phone = %mask(&local), "Phone number is not in canonical local form");
            tracing::debug!(raw, local = %local, "Non-canonical phone number");
        }

        Self { local, variants }
    }

    /// The local form with all but the last three digits hidden.
    pub fn masked(&self) -> String {
        mask(&self.local)
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn as_slice(&self) -> &[String] {
        &self.variants
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "01234567890",
        "+201234567890",
        "201234567890",
        "+20 123 456 7890",
        "(012) 3456-7890",
        "1234567890",
        "+44 20 7946 0958",
        "2020",
        "+",
        "",
        "abc",
        "  +20-100-000-0000  ",
        "00201234567890",
    ];

    #[test]
    fn known_formats_converge_on_local_form() {
        assert_eq!(normalize("01234567890"), "01234567890");
        assert_eq!(normalize("+201234567890"), "01234567890");
        assert_eq!(normalize("201234567890"), "01234567890");
        assert_eq!(normalize("+20 123-456-7890"), "01234567890");
    }

    #[test]
    fn normalize_is_idempotent() {
        for sample in SAMPLES {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "input {:?}", sample);
        }
    }

    #[test]
    fn other_country_codes_lose_only_the_plus() {
        assert_eq!(normalize("+447946000000"), "447946000000");
    }

    #[test]
    fn unrecognized_input_passes_through_cleaned() {
        assert_eq!(normalize("1234567890"), "1234567890");
        assert_eq!(normalize("abc"), "");
        assert_eq!(normalize("0020123"), "0020123");
    }

    #[test]
    fn international_form_replaces_leading_zero() {
        for local in ["01234567890", "01000000000", "0"] {
            assert_eq!(to_international(local), format!("+20{}", &local[1..]));
        }
        assert_eq!(to_international("201234567890"), "+201234567890");
        assert_eq!(to_international("1234"), "+201234");
        assert_eq!(to_international(""), "");
    }

    #[test]
    fn variant_set_is_deduplicated_and_ordered() {
        let variants = PhoneVariants::from_input("01234567890");
        assert_eq!(variants.as_slice(), ["01234567890", "+201234567890"]);
        assert_eq!(variants.local(), "01234567890");

        let variants = PhoneVariants::from_input("201234567890");
        assert_eq!(
            variants.as_slice(),
            ["201234567890", "01234567890", "+201234567890"]
        );
    }

    #[test]
    fn variant_set_drops_empty_values() {
        assert!(PhoneVariants::from_input("").is_empty());
        assert_eq!(PhoneVariants::from_input("abc").as_slice(), ["abc"]);
    }

    #[test]
    fn masked_form_keeps_only_last_digits() {
        assert_eq!(PhoneVariants::from_input("+201234567890").masked(), "********890");
        assert_eq!(mask("12"), "12");
        assert_eq!(mask(""), "");
    }

    #[test]
    fn canonical_local_check() {
        assert!(is_canonical_local("01234567890"));
        assert!(!is_canonical_local("1234567890"));
        assert!(!is_canonical_local("0123456789"));
        assert!(!is_canonical_local("0123456789a"));
    }
}
