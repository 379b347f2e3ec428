use std::sync::LazyLock;

use regex::Regex;

static NON_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\D").unwrap());
static MOBILE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^5\d{8}$").unwrap());

/// Normalize an Israeli mobile number to `+9725XXXXXXXX`.
///
/// Accepts local (`050-123-4567`), international (`+972 50 123 4567`) and
/// `00972` forms. Returns `None` for anything that is not a mobile number.
pub fn normalize_israeli_phone(input: &str) -> Option<String> {
    let digits = NON_DIGITS.replace_all(input, "");
    let mut rest: &str = &digits;
    if let Some(stripped) = rest.strip_prefix("00") {
        rest = stripped;
    }
    if let Some(stripped) = rest.strip_prefix("972") {
        rest = stripped;
    }
    let rest = rest.trim_start_matches('0');

    MOBILE.is_match(rest).then(|| format!("+972{rest}"))
}

/// `+972501234567` → `050-123-4567`; anything else is returned unchanged.
pub fn format_phone_for_display(phone: &str) -> String {
    match normalize_israeli_phone(phone) {
        Some(normalized) => {
            let local = &normalized[4..];
            format!("0{}-{}-{}", &local[..2], &local[2..5], &local[5..])
        }
        None => phone.to_string(),
    }
}
