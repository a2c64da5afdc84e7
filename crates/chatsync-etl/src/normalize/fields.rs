//! Scalar coercions applied while flattening raw records

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Sentinel stored in integer columns when the source value is unusable
pub const MISSING_INT: i64 = -1;

const ORDER_NUMBER_DIGITS: usize = 15;

/// Runs of Unicode decimal digits (`Nd`), not just ASCII
#[allow(clippy::expect_used)]
fn digit_run_re() -> &'static Regex {
    static DIGIT_RUN_RE: OnceLock<Regex> = OnceLock::new();
    DIGIT_RUN_RE.get_or_init(|| Regex::new(r"\d+").expect("valid digit run regex"))
}

fn is_decimal_digit(c: char) -> bool {
    let mut buf = [0u8; 4];
    digit_run_re().is_match(c.encode_utf8(&mut buf))
}

/// Value of a Unicode decimal digit.
///
/// Decimal digits are encoded in contiguous blocks of ten starting at zero, so the
/// value is the distance back to the start of the block.
fn decimal_value(c: char) -> Option<u32> {
    if let Some(d) = c.to_digit(10) {
        return Some(d);
    }
    if !is_decimal_digit(c) {
        return None;
    }

    let mut offset = 0u32;
    let mut code = c as u32;
    while let Some(prev) = code.checked_sub(1).and_then(char::from_u32) {
        if !is_decimal_digit(prev) {
            break;
        }
        offset += 1;
        code -= 1;
    }
    Some(offset % 10)
}

fn digits_to_int(digits: &str) -> Option<i64> {
    digits.chars().try_fold(0i64, |acc, c| {
        let digit = i64::from(decimal_value(c)?);
        acc.checked_mul(10)?.checked_add(digit)
    })
}

/// Field lookup where an absent key reads as null.
pub fn field(data: &Map<String, Value>, key: &str) -> Value {
    data.get(key).cloned().unwrap_or(Value::Null)
}

/// Drop a trailing `+hh:mm` style UTC offset, keeping the naive timestamp.
pub fn strip_offset(timestamp: &str) -> String {
    timestamp.split('+').next().unwrap_or(timestamp).to_string()
}

/// The integer behind `value` when its text form is all ASCII digits, else -1.
///
/// Accepts JSON integers and digit-only strings. Floats, signs, blanks, booleans,
/// null and anything overflowing `i64` give -1.
pub fn check_int(value: &Value) -> i64 {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return MISSING_INT,
    };

    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return MISSING_INT;
    }
    text.parse().unwrap_or(MISSING_INT)
}

/// Extract an order number from free text.
///
/// Returns the first run of exactly 15 digits that is not part of a longer digit run,
/// or -1 when there is none or `value` is not a string. Later matches are ignored.
/// Any Unicode decimal digit counts, so full-width order numbers are read too.
pub fn check_order_num(value: &Value) -> i64 {
    let Value::String(text) = value else {
        return MISSING_INT;
    };

    digit_run_re()
        .find_iter(text)
        .find(|m| m.as_str().chars().count() == ORDER_NUMBER_DIGITS)
        .and_then(|m| digits_to_int(m.as_str()))
        .unwrap_or(MISSING_INT)
}

/// Keep only the ASCII characters of `text`.
pub fn ascii_only(text: &str) -> String {
    text.chars().filter(char::is_ascii).collect()
}

/// String form of a value for opaque text columns.
///
/// Strings render as their contents, null as `null`, and everything else
/// (numbers, booleans, arrays, objects) as compact JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_int_valid() {
        assert_eq!(check_int(&json!(1)), 1);
        assert_eq!(check_int(&json!("2")), 2);
        assert_eq!(check_int(&json!("1700000000")), 1_700_000_000);
        assert_eq!(check_int(&json!(0)), 0);
    }

    #[test]
    fn test_check_int_invalid() {
        assert_eq!(check_int(&json!(1.5)), -1);
        assert_eq!(check_int(&json!("2.9")), -1);
        assert_eq!(check_int(&json!("Not an number")), -1);
        assert_eq!(check_int(&Value::Null), -1);
        assert_eq!(check_int(&json!(-4)), -1);
        assert_eq!(check_int(&json!("")), -1);
        assert_eq!(check_int(&json!(true)), -1);
        assert_eq!(check_int(&json!("99999999999999999999")), -1);
    }

    #[test]
    fn test_check_order_num() {
        assert_eq!(check_order_num(&json!("Not a number")), -1);
        assert_eq!(check_order_num(&json!("10.1")), -1);
        assert_eq!(check_order_num(&json!("531002571707350")), 531002571707350);
        assert_eq!(
            check_order_num(&json!("Ordered Online | Order# 531002607202011")),
            531002607202011
        );
        assert_eq!(check_order_num(&json!(1983)), -1);
        assert_eq!(check_order_num(&Value::Null), -1);
    }

    #[test]
    fn test_check_order_num_standalone_runs_only() {
        // 16 digits is a different identifier, not an order number
        assert_eq!(check_order_num(&json!("5310025717073501")), -1);
        assert_eq!(check_order_num(&json!("#531002571707350a")), 531002571707350);
        assert_eq!(
            check_order_num(&json!("1234567890123456 then 531002607202011")),
            531002607202011
        );
    }

    #[test]
    fn test_check_order_num_unicode_digits() {
        assert_eq!(
            check_order_num(&json!("Order \u{ff15}\u{ff13}\u{ff11}\u{ff10}\u{ff10}\u{ff12}\u{ff15}\u{ff17}\u{ff11}\u{ff17}\u{ff10}\u{ff17}\u{ff13}\u{ff15}\u{ff10}")),
            531002571707350
        );
        // A trailing Arabic-Indic digit makes the run 16 long
        assert_eq!(check_order_num(&json!("531002571707350\u{663}")), -1);
        assert_eq!(check_order_num(&json!("\u{967}531002571707350")), -1);
    }

    #[test]
    fn test_decimal_value() {
        assert_eq!(decimal_value('7'), Some(7));
        assert_eq!(decimal_value('\u{ff10}'), Some(0));
        assert_eq!(decimal_value('\u{ff19}'), Some(9));
        assert_eq!(decimal_value('\u{663}'), Some(3));
        assert_eq!(decimal_value('\u{1d7d9}'), Some(1));
        assert_eq!(decimal_value('x'), None);
    }

    #[test]
    fn test_check_order_num_first_match_wins() {
        assert_eq!(
            check_order_num(&json!("531002571707350 and 531002607202011")),
            531002571707350
        );
    }

    #[test]
    fn test_strip_offset() {
        assert_eq!(strip_offset("2024-05-01T10:00:00.123+00:00"), "2024-05-01T10:00:00.123");
        assert_eq!(strip_offset("2024-05-01T10:00:00"), "2024-05-01T10:00:00");
    }

    #[test]
    fn test_ascii_only() {
        assert_eq!(ascii_only("caf\u{e9} na\u{ef}ve \u{1f600}ok"), "caf nave ok");
    }

    #[test]
    fn test_render() {
        assert_eq!(render(&json!("4")), "4");
        assert_eq!(render(&Value::Null), "null");
        assert_eq!(render(&json!(5)), "5");
        assert_eq!(render(&json!([{"label": "Yes"}])), r#"[{"label":"Yes"}]"#);
    }

    #[test]
    fn test_render_is_json_not_debug_text() {
        assert_eq!(render(&json!(true)), "true");
        assert_eq!(render(&json!(false)), "false");
        assert_eq!(render(&json!({"forced": true, "next": null})), r#"{"forced":true,"next":null}"#);
        assert_ne!(render(&Value::Null), "None");
    }

    #[test]
    fn test_field_defaults_to_null() {
        let data = json!({"present": 1});
        let map = data.as_object().unwrap();
        assert_eq!(field(map, "present"), json!(1));
        assert_eq!(field(map, "absent"), Value::Null);
    }
}
