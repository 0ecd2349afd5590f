use rust_decimal::Decimal;

/// Format a decimal as a dollar amount with thousands separators: $1,234.56
pub fn money(val: Decimal) -> String {
    let cents = format!("{:.2}", val.abs());
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let with_commas: String = with_commas.chars().rev().collect();

    if val.is_sign_negative() && !val.is_zero() {
        format!("-${with_commas}.{dec_part}")
    } else {
        format!("${with_commas}.{dec_part}")
    }
}

/// Grid cell text: blank for zero so sparse rows stay readable.
pub fn cell(val: Decimal) -> String {
    if val.is_zero() {
        String::new()
    } else {
        money(val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_money_formatting() {
        assert_eq!(money(d("1234.56")), "$1,234.56");
        assert_eq!(money(d("-500.00")), "-$500.00");
        assert_eq!(money(Decimal::ZERO), "$0.00");
        assert_eq!(money(d("1000000.99")), "$1,000,000.99");
        assert_eq!(money(d("42.1")), "$42.10");
        assert_eq!(money(d("7")), "$7.00");
    }

    #[test]
    fn test_cell_blank_for_zero() {
        assert_eq!(cell(d("0.00")), "");
        assert_eq!(cell(d("-3")), "-$3.00");
    }
}
