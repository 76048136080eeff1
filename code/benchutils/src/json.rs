/// Helpers for decoding hand-written JSON objects field by field.  The configuration files are
/// human-generated and change over time, so we use the generic JSON parser followed by explicit
/// decoding and validation rather than a derived strongly-typed parser.
use anyhow::{bail, Result};
use serde_json::{Map, Value};

pub type Fields = Map<String, Value>;

/// Fail if `fields` has a key that is not in `known`.  Keys starting with '#' are comments.

pub fn check_known_fields(fields: &Fields, known: &[&str]) -> Result<()> {
    for k in fields.keys() {
        if !k.starts_with('#') && !known.contains(&k.as_str()) {
            bail!("Unknown field '{k}'");
        }
    }
    Ok(())
}

pub fn grab_string(fields: &Fields, name: &str) -> Result<String> {
    if let Some(s) = grab_string_opt(fields, name)? {
        Ok(s)
    } else {
        bail!("Field '{name}' must be present and have a string value");
    }
}

pub fn grab_string_opt(fields: &Fields, name: &str) -> Result<Option<String>> {
    match fields.get(name) {
        Some(Value::String(s)) => Ok(Some(s.to_string())),
        Some(_) => bail!("Field '{name}' must have a string value"),
        None => Ok(None),
    }
}

pub fn grab_strings_opt(fields: &Fields, name: &str) -> Result<Option<Vec<String>>> {
    match fields.get(name) {
        Some(Value::Array(vals)) => {
            let mut result = vec![];
            for v in vals {
                if let Value::String(s) = v {
                    result.push(s.to_string());
                } else {
                    bail!("Field '{name}' must have string values");
                }
            }
            Ok(Some(result))
        }
        Some(_) => bail!("Field '{name}' must have an array value"),
        None => Ok(None),
    }
}

pub fn grab_bool_opt(fields: &Fields, name: &str) -> Result<Option<bool>> {
    match fields.get(name) {
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => bail!("Field '{name}' must have a boolean value"),
        None => Ok(None),
    }
}

pub fn grab_f64_opt(fields: &Fields, name: &str) -> Result<Option<f64>> {
    match fields.get(name) {
        Some(Value::Number(n)) => match n.as_f64() {
            Some(x) => Ok(Some(x)),
            None => bail!("Field '{name}' must have a numeric value"),
        },
        Some(_) => bail!("Field '{name}' must have a numeric value"),
        None => Ok(None),
    }
}

pub fn grab_usize_opt(fields: &Fields, name: &str) -> Result<Option<usize>> {
    match fields.get(name) {
        Some(Value::Number(n)) => match n.as_u64().map(usize::try_from) {
            Some(Ok(n)) => Ok(Some(n)),
            _ => bail!("Field '{name}' must have unsigned integer value"),
        },
        Some(_) => bail!("Field '{name}' must have unsigned integer value"),
        None => Ok(None),
    }
}

#[test]
fn test_grab() {
    let v: Value = serde_json::from_str(
        r##"{"name": "x", "flag": true, "n": 3, "f": 2.5, "list": ["a", "b"], "#note": 1}"##,
    )
    .unwrap();
    let fields = v.as_object().unwrap();
    assert!(grab_string(fields, "name").unwrap() == "x");
    assert!(grab_string(fields, "flag").is_err());
    assert!(grab_string_opt(fields, "missing").unwrap().is_none());
    assert!(grab_bool_opt(fields, "flag").unwrap() == Some(true));
    assert!(grab_usize_opt(fields, "n").unwrap() == Some(3));
    assert!(grab_usize_opt(fields, "f").is_err());
    assert!(grab_f64_opt(fields, "f").unwrap() == Some(2.5));
    assert!(grab_f64_opt(fields, "n").unwrap() == Some(3.0));
    assert!(grab_strings_opt(fields, "list").unwrap() == Some(vec!["a".to_string(), "b".to_string()]));
    assert!(check_known_fields(fields, &["name", "flag", "n", "f", "list"]).is_ok());
    assert!(check_known_fields(fields, &["name"]).is_err());
}
