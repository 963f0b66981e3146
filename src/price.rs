use lazy_regex::regex;

/// Extract a numeric value from a scraped price string such as `"$1,234.56"`,
/// `"1.234,56 €"` or `"19,99"`.
///
/// Only ASCII digits, `,` and `.` are kept. When both separators are present the
/// right-most one is the decimal point. A lone `,` is a decimal point only when
/// exactly two digits follow it.
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned = regex!(r"[^0-9.,]").replace_all(raw, "");
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => {
            let parts: Vec<&str> = cleaned.split(',').collect();
            if parts.len() == 2 && parts[1].len() == 2 {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        (None, _) => cleaned.into_owned(),
    };

    normalized.parse::<f64>().ok().filter(|p| p.is_finite())
}

/// Signed percentage change from `old` to `new`.
///
/// A zero `old` price reports `100.0` for any positive `new` price and `0.0`
/// otherwise.
pub fn change_percent(old: f64, new: f64) -> f64 {
    if old == 0.0 {
        return if new > 0.0 { 100.0 } else { 0.0 };
    }
    (new - old) / old * 100.0
}
