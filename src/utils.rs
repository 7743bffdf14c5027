/// Trims surrounding whitespace and upper-cases the input.
///
/// Tickers, currency codes and portfolio codes are all compared in this form.
pub(crate) fn clean_string(s: &str) -> String {
    s.trim().to_uppercase()
}

/// Returns `-1.0`, `0.0` or `1.0` following the sign of `x`.
///
/// Unlike [`f64::signum`], zero maps to zero.
pub(crate) fn sgn(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Turns a code into a column-name friendly token (`"zzb au"` -> `"ZZB_AU"`).
#[cfg(feature = "export")]
pub(crate) fn column_code(code: &str) -> String {
    clean_string(code).replace(' ', "_")
}

#[cfg(test)]
#[test]
fn clean_string_trims_and_uppercases() {
    assert_eq!(clean_string("  zzb au "), "ZZB AU");
    assert_eq!(clean_string("aud"), "AUD");
}

#[cfg(test)]
#[test]
fn sgn_of_zero_is_zero() {
    assert_eq!(sgn(-3.5), -1.0);
    assert_eq!(sgn(0.0), 0.0);
    assert_eq!(sgn(12.0), 1.0);
}

#[cfg(all(test, feature = "export"))]
#[test]
fn column_code_replaces_spaces() {
    assert_eq!(column_code("zzb au"), "ZZB_AU");
}
