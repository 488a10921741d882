use chrono::NaiveDate;

const NBSP: char = '\u{a0}';

/// pt-BR percentage with one decimal: `18.75` -> `"18,8%"`.
pub fn format_percent(value: f64) -> String {
    format!("{}%", format_decimal(value, 1))
}

/// BRL currency: `5000.0` -> `"R$ 5.000,00"` (non-breaking space after the symbol).
pub fn format_brl(value: f64) -> String {
    let amount = format_decimal(value.abs(), 2);
    if value < 0.0 {
        format!("-R${}{}", NBSP, amount)
    } else {
        format!("R${}{}", NBSP, amount)
    }
}

/// `2025-01-20` -> `"20/01/25"`.
pub fn format_short_date(date: NaiveDate) -> String {
    date.format("%d/%m/%y").to_string()
}

/// Rounds exact ties away from zero, as pt-BR browser formatting does.
fn format_decimal(value: f64, decimals: usize) -> String {
    let scale = 10f64.powi(decimals as i32);
    let scaled = format!("{:.0}", (value.abs() * scale).round());
    let digits = format!("{:0>width$}", scaled, width = decimals + 1);
    let (int_part, frac_part) = digits.split_at(digits.len() - decimals);
    let sign = if value < 0.0 { "-" } else { "" };

    let mut out = format!("{}{}", sign, group_thousands(int_part));
    if !frac_part.is_empty() {
        out.push(',');
        out.push_str(frac_part);
    }
    out
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    grouped
}
