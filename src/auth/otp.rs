use rand::{rngs::OsRng, Rng};

pub const OTP_MIN: i32 = 100_000;
pub const OTP_MAX: i32 = 999_999;

/// Six-digit code drawn uniformly from the OS CSPRNG.
pub fn generate() -> i32 {
    OsRng.gen_range(OTP_MIN..=OTP_MAX)
}

/// Accepts `123456`, `"123456"` and `" 123456 "`; anything else is not a code.
pub fn normalize(raw: &serde_json::Value) -> Option<i32> {
    let code = match raw {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    i32::try_from(code).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..10_000 {
            let code = generate();
            assert!((OTP_MIN..=OTP_MAX).contains(&code));
            assert_eq!(code.to_string().len(), 6);
        }
    }

    #[test]
    fn codes_spread_across_the_range() {
        // 9 buckets of 100_000 each; every bucket should see a fair share.
        let mut buckets = [0u32; 9];
        let trials = 90_000;
        for _ in 0..trials {
            buckets[(generate() / 100_000 - 1) as usize] += 1;
        }
        for count in buckets {
            assert!((8_000..12_000).contains(&count), "skewed bucket: {buckets:?}");
        }
    }

    #[test]
    fn consecutive_codes_differ() {
        let codes: std::collections::HashSet<i32> = (0..1_000).map(|_| generate()).collect();
        assert!(codes.len() > 990);
    }

    #[test]
    fn normalizes_numeric_forms() {
        assert_eq!(normalize(&json!(123456)), Some(123456));
        assert_eq!(normalize(&json!("123456")), Some(123456));
        assert_eq!(normalize(&json!(" 654321 ")), Some(654321));
        assert_eq!(normalize(&json!("12ab56")), None);
        assert_eq!(normalize(&json!(12.5)), None);
        assert_eq!(normalize(&json!(null)), None);
        assert_eq!(normalize(&json!(99_999_999_999i64)), None);
    }
}
