use serde::Serialize;

/// Fixed campaign goal in dollars. Defines 100% on the progress bar.
pub const GOAL_AMOUNT: f64 = 2399.0;

/// Bar width in percent, capped at 100.
pub fn percentage(total: f64, goal: f64) -> f64 {
    ((total / goal) * 100.0).min(100.0)
}

/// Dollars still missing, floored at zero once the goal is passed.
pub fn remaining(total: f64, goal: f64) -> f64 {
    (goal - total).max(0.0)
}

/// Dollar label with thousands separators, cents only when present.
pub fn format_usd(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let whole = (cents / 100).abs();
    let frac = (cents % 100).abs();

    let digits = whole.to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if cents < 0 { "-" } else { "" };
    if frac == 0 {
        format!("{}${}", sign, grouped)
    } else {
        format!("{}${}.{:02}", sign, grouped, frac)
    }
}

/// What the landing page renders: bar width, numeric label and the
/// remaining-amount label. Pure function of total and goal, no state.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProgressSnapshot {
    pub total: f64,
    pub goal: f64,
    pub percentage: f64,
    pub remaining: f64,
    pub total_label: String,
    pub remaining_label: String,
}

/// Builds the render model. `preview` is an amount currently typed into the
/// form but not yet submitted: it widens the bar and switches the label to
/// the "$total (+$preview)" form.
pub fn snapshot(total: f64, goal: f64, preview: Option<f64>) -> ProgressSnapshot {
    let preview = preview.filter(|p| *p > 0.0);
    let shown = total + preview.unwrap_or(0.0);

    let total_label = match preview {
        Some(p) => format!("{} (+{})", format_usd(total), format_usd(p)),
        None => format_usd(total),
    };

    ProgressSnapshot {
        total,
        goal,
        percentage: percentage(shown, goal),
        remaining: remaining(total, goal),
        total_label,
        remaining_label: format_usd(remaining(total, goal)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_capped_at_100() {
        assert_eq!(percentage(0.0, GOAL_AMOUNT), 0.0);
        assert_eq!(percentage(GOAL_AMOUNT, GOAL_AMOUNT), 100.0);
        assert_eq!(percentage(GOAL_AMOUNT * 2.0, GOAL_AMOUNT), 100.0);
    }

    #[test]
    fn percentage_is_monotonic_in_total() {
        let mut last = -1.0;
        for total in [0.0, 1.0, 500.0, 1199.5, 2399.0, 3000.0, 1_000_000.0] {
            let p = percentage(total, GOAL_AMOUNT);
            assert!(p >= last, "percentage regressed at total={}", total);
            last = p;
        }
    }

    #[test]
    fn remaining_floors_at_zero() {
        assert_eq!(remaining(1000.0, GOAL_AMOUNT), 1399.0);
        assert_eq!(remaining(GOAL_AMOUNT, GOAL_AMOUNT), 0.0);
        assert_eq!(remaining(5000.0, GOAL_AMOUNT), 0.0);
    }

    #[test]
    fn goal_boundary_renders_full_bar_and_zero_remaining() {
        let snap = snapshot(2399.0, GOAL_AMOUNT, None);
        assert_eq!(snap.percentage, 100.0);
        assert_eq!(snap.remaining, 0.0);
        assert_eq!(snap.remaining_label, "$0");
    }

    #[test]
    fn format_usd_groups_thousands() {
        assert_eq!(format_usd(0.0), "$0");
        assert_eq!(format_usd(999.0), "$999");
        assert_eq!(format_usd(1000.0), "$1,000");
        assert_eq!(format_usd(2399.0), "$2,399");
        assert_eq!(format_usd(1234567.0), "$1,234,567");
        assert_eq!(format_usd(50.5), "$50.50");
    }

    #[test]
    fn preview_widens_bar_and_label() {
        let snap = snapshot(1000.0, GOAL_AMOUNT, Some(50.0));
        assert_eq!(snap.total, 1000.0);
        assert_eq!(snap.total_label, "$1,000 (+$50)");
        assert!(snap.percentage > percentage(1000.0, GOAL_AMOUNT));
        // remaining reflects only what was actually donated
        assert_eq!(snap.remaining, 1399.0);
    }

    #[test]
    fn non_positive_preview_is_ignored() {
        let snap = snapshot(1000.0, GOAL_AMOUNT, Some(0.0));
        assert_eq!(snap.total_label, "$1,000");
        assert_eq!(snap.percentage, percentage(1000.0, GOAL_AMOUNT));
    }
}
