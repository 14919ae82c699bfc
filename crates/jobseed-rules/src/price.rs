use jobseed_core::PriceRange;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::RulesError;

/// Digit runs, possibly joined by commas ("70,100", "1,200,000").
static DIGIT_CLUSTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+(?:,[0-9]+)*").expect("valid digit cluster regex"));

/// Unit and spread policy for price texts.
///
/// Values below `man_yen_threshold` are read as 万円 and multiplied by `man_yen_unit`.
/// `spread_yen` widens a single value into a range; it is applied once, in yen, after
/// unit normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PricePolicy {
    pub man_yen_threshold: i64,
    pub man_yen_unit: i64,
    pub spread_yen: i64,
}

impl Default for PricePolicy {
    fn default() -> Self {
        Self {
            man_yen_threshold: 2000,
            man_yen_unit: 10_000,
            spread_yen: 50_000,
        }
    }
}

/// How a lone value relates to the range it describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeMarker {
    UpTo,
    From,
    Around,
}

impl RangeMarker {
    /// Reads the marker around the first amount: a tilde before it means "up to", a
    /// tilde after it means "from".
    pub fn detect(text: &str) -> Self {
        const TILDES: [char; 3] = ['〜', '~', '～'];
        let (before, after) = match DIGIT_CLUSTER.find(text) {
            Some(m) => (&text[..m.start()], &text[m.end()..]),
            None => (text, ""),
        };
        if before.contains(TILDES) || text.contains("まで") || text.contains("以下") {
            RangeMarker::UpTo
        } else if after.contains(TILDES) || text.contains("以上") || text.contains("から") {
            RangeMarker::From
        } else {
            RangeMarker::Around
        }
    }
}

impl PricePolicy {
    pub(crate) fn validate(&self) -> Result<(), RulesError> {
        if self.man_yen_threshold < 0 || self.man_yen_unit <= 0 || self.spread_yen < 0 {
            return Err(RulesError::invalid(
                "policy.yaml",
                "price threshold, unit and spread must be non-negative (unit positive)",
            ));
        }
        Ok(())
    }

    /// Parses a free-text price into yen bounds; `(0, 0)` when no digits are present.
    pub fn parse(&self, text: &str) -> PriceRange {
        let normalized = normalize_digits(text);
        let values: Vec<i64> = extract_amounts(&normalized)
            .into_iter()
            .map(|v| self.to_yen(v))
            .collect();

        match values.as_slice() {
            [] => PriceRange::default(),
            [single] => {
                let v = *single;
                let (min, max) = match RangeMarker::detect(&normalized) {
                    RangeMarker::UpTo => (v - self.spread_yen, v),
                    RangeMarker::From => (v, v.saturating_add(self.spread_yen)),
                    RangeMarker::Around => (v - self.spread_yen, v.saturating_add(self.spread_yen)),
                };
                PriceRange::new(min.max(0), max)
            }
            [first, second, ..] => PriceRange::new(*first, *second),
        }
    }

    fn to_yen(&self, value: i64) -> i64 {
        if value < self.man_yen_threshold {
            value.saturating_mul(self.man_yen_unit)
        } else {
            value
        }
    }
}

fn normalize_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            '，' => ',',
            _ => c,
        })
        .collect()
}

/// Extracts integer amounts. A comma cluster counts as one thousands-grouped number
/// only when every group after the first has three digits and it either has two or
/// more separators or ends in `000`; otherwise each run is its own amount, so "70,100"
/// reads as 70 and 100 while "1,200,000" and "700,000" read as single values.
fn extract_amounts(text: &str) -> Vec<i64> {
    let mut out = Vec::new();
    for cluster in DIGIT_CLUSTER.find_iter(text) {
        let parts: Vec<&str> = cluster.as_str().split(',').collect();
        if is_thousands_grouped(&parts) {
            if let Ok(v) = parts.concat().parse::<i64>() {
                out.push(v);
            }
        } else {
            out.extend(parts.iter().filter_map(|p| p.parse::<i64>().ok()));
        }
    }
    out
}

fn is_thousands_grouped(parts: &[&str]) -> bool {
    let Some((head, tail)) = parts.split_first() else {
        return false;
    };
    if tail.is_empty() || head.len() > 3 || tail.iter().any(|g| g.len() != 3) {
        return false;
    }
    tail.len() >= 2 || tail.last() == Some(&"000")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> PriceRange {
        PricePolicy::default().parse(text)
    }

    #[test]
    fn two_groups_are_min_and_max_in_man_yen() {
        assert_eq!(parse("70,100"), PriceRange::new(700_000, 1_000_000));
        assert_eq!(parse("60〜80"), PriceRange::new(600_000, 800_000));
        assert_eq!(parse("60万〜80万円/月"), PriceRange::new(600_000, 800_000));
    }

    #[test]
    fn extra_groups_are_ignored() {
        assert_eq!(parse("60〜80（140-180h）"), PriceRange::new(600_000, 800_000));
    }

    #[test]
    fn thousands_separators_are_stripped() {
        assert_eq!(parse("700,000〜900,000円"), PriceRange::new(700_000, 900_000));
        assert_eq!(parse("1,200,000"), PriceRange::new(1_150_000, 1_250_000));
    }

    #[test]
    fn single_value_gets_a_symmetric_spread_in_yen() {
        assert_eq!(parse("75万"), PriceRange::new(700_000, 800_000));
        assert_eq!(parse("3"), PriceRange::new(0, 80_000));
    }

    #[test]
    fn single_value_with_range_markers() {
        assert_eq!(parse("〜80"), PriceRange::new(750_000, 800_000));
        assert_eq!(parse("80万円まで"), PriceRange::new(750_000, 800_000));
        assert_eq!(parse("60〜"), PriceRange::new(600_000, 650_000));
        assert_eq!(parse("60万以上"), PriceRange::new(600_000, 650_000));
    }

    #[test]
    fn tilde_position_decides_the_marker_behind_a_label() {
        assert_eq!(parse("月額〜80万"), PriceRange::new(750_000, 800_000));
        assert_eq!(parse("単価 ~80"), PriceRange::new(750_000, 800_000));
        assert_eq!(parse("月額80万〜"), PriceRange::new(800_000, 850_000));
    }

    #[test]
    fn spread_is_not_scaled_by_the_man_yen_unit() {
        let range = parse("80");
        assert_eq!(range.max - range.min, 2 * PricePolicy::default().spread_yen);
    }

    #[test]
    fn values_at_threshold_are_already_yen() {
        assert_eq!(parse("1999"), PriceRange::new(19_940_000, 20_040_000));
        assert_eq!(parse("2000〜3000"), PriceRange::new(2_000, 3_000));
    }

    #[test]
    fn fullwidth_digits_are_read() {
        assert_eq!(parse("６０〜８０"), PriceRange::new(600_000, 800_000));
    }

    #[test]
    fn no_digits_is_zero() {
        assert_eq!(parse("応相談"), PriceRange::new(0, 0));
        assert_eq!(parse(""), PriceRange::default());
    }

    #[test]
    fn marker_detection() {
        assert_eq!(RangeMarker::detect("~100"), RangeMarker::UpTo);
        assert_eq!(RangeMarker::detect("100~"), RangeMarker::From);
        assert_eq!(RangeMarker::detect("100"), RangeMarker::Around);
        assert_eq!(RangeMarker::detect("上限 ~100"), RangeMarker::UpTo);
    }
}
