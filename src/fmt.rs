/// Dollar amount with thousands separators: `-$1,234.56`.
pub fn money(val: f64) -> String {
    let cents = (val.abs() * 100.0).round() as u64;
    let dollars = (cents / 100).to_string();

    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, c) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if val < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

/// One-decimal percentage; missing values render as `-`.
pub fn pct(val: Option<f64>) -> String {
    match val {
        Some(v) => format!("{v:.1}%"),
        None => "-".to_string(),
    }
}

pub fn count_label(n: usize, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {plural}")
    }
}
