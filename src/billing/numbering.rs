/// Prefix shared by every generated invoice number.
pub const INVOICE_PREFIX: &str = "INV-";

/// Minimum width of the numeric part; larger sequences simply grow wider.
const SEQUENCE_WIDTH: usize = 3;

/// Extracts the sequence from an `INV-NNN` number.
///
/// Returns `None` for anything that is not the prefix followed by ASCII digits
/// only, including suffixes too large for a `u64`.
pub fn parse_sequence(number: &str) -> Option<u64> {
    let digits = number.strip_prefix(INVOICE_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub fn format_invoice_number(sequence: u64) -> String {
    format!("{INVOICE_PREFIX}{sequence:0width$}", width = SEQUENCE_WIDTH)
}

/// Returns the number following the highest well-formed one in `existing`.
///
/// Gaps are not reused and malformed numbers are ignored. Callers that insert
/// concurrently must hold their store's write lock across this call and the
/// insert.
pub fn next_invoice_number<'a, I>(existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let highest = existing
        .into_iter()
        .filter_map(parse_sequence)
        .max()
        .unwrap_or(0);

    format_invoice_number(highest.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_one() {
        assert_eq!(next_invoice_number(std::iter::empty()), "INV-001");
    }

    #[test]
    fn takes_max_plus_one_ignoring_gaps() {
        assert_eq!(next_invoice_number(["INV-001", "INV-003"]), "INV-004");
        assert_eq!(next_invoice_number(["INV-003", "INV-001"]), "INV-004");
    }

    #[test]
    fn ignores_malformed_numbers() {
        assert_eq!(next_invoice_number(["INV-ABC"]), "INV-001");
        assert_eq!(
            next_invoice_number(["INV-002", "INV-ABC", "INV-", "INV-7x", "2024-0099", "INV- 9"]),
            "INV-003"
        );
        assert_eq!(next_invoice_number(["INV-99999999999999999999999"]), "INV-001");
    }

    #[test]
    fn grows_past_three_digits() {
        assert_eq!(next_invoice_number(["INV-999"]), "INV-1000");
        assert_eq!(next_invoice_number(["INV-0041"]), "INV-042");
    }

    #[test]
    fn parse_requires_prefix() {
        assert_eq!(parse_sequence("INV-012"), Some(12));
        assert_eq!(parse_sequence("inv-012"), None);
        assert_eq!(parse_sequence("INV-+12"), None);
    }
}
