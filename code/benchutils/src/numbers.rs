// Numeric fields in the text logs.  Everything comes in as a whitespace-separated token, sometimes
// with a trailing comma or colon that the tools print for humans.

pub fn parse_int(s: &str) -> Option<i64> {
    strip_punct(s).parse::<i64>().ok()
}

pub fn parse_float(s: &str) -> Option<f64> {
    match strip_punct(s).parse::<f64>() {
        Ok(x) if x.is_finite() => Some(x),
        _ => None,
    }
}

/// True for tokens made only of digits with at most one decimal point, ie what a counter or a
/// percentage looks like.  Signs, exponents and "nan" are rejected.

pub fn is_plain_number(s: &str) -> bool {
    let mut digits = 0;
    let mut dots = 0;
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits += 1;
        } else if c == '.' {
            dots += 1;
        } else {
            return false;
        }
    }
    digits > 0 && dots <= 1
}

fn strip_punct(s: &str) -> &str {
    s.trim().trim_end_matches(|c| c == ',' || c == ':' || c == ';')
}

#[test]
fn test_numbers() {
    assert!(parse_int("1234,") == Some(1234));
    assert!(parse_int("-3") == Some(-3));
    assert!(parse_int("3.5") == None);
    assert!(parse_float("0.08,") == Some(0.08));
    assert!(parse_float("1539307779.17295:") == Some(1539307779.17295));
    assert!(parse_float("inf") == None);
    assert!(is_plain_number("12.5"));
    assert!(is_plain_number("12"));
    assert!(!is_plain_number("1.2.3"));
    assert!(!is_plain_number("-1"));
    assert!(!is_plain_number("."));
    assert!(!is_plain_number("<not"));
}
