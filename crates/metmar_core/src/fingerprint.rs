use sha2::{Digest, Sha256};

/// Content fingerprint of a served body, sent verbatim as the `ETag`.
pub fn fingerprint(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut output = String::with_capacity(64);
    for byte in digest.iter() {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

/// Whether an `If-None-Match` header value designates `fingerprint`.
pub fn matches_validator(if_none_match: Option<&str>, fingerprint: &str) -> bool {
    let Some(header) = if_none_match else {
        return false;
    };
    header.split(',').any(|candidate| {
        let candidate = candidate.trim();
        if candidate == "*" {
            return true;
        }
        let candidate = candidate.strip_prefix("W/").unwrap_or(candidate);
        candidate.trim_matches('"') == fingerprint
    })
}

#[cfg(test)]
mod tests {
    use super::{fingerprint, matches_validator};

    const REPORT: &str = "Bulletin côte\n\n# Aujourd'hui\nOuest 5.\n\n";

    #[test]
    fn fingerprint_is_deterministic_hex() {
        let first = fingerprint(REPORT);
        assert_eq!(first, fingerprint(REPORT));
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[test]
    fn one_character_changes_the_fingerprint() {
        let other = REPORT.replace("Ouest 5.", "Ouest 6.");
        assert_ne!(fingerprint(REPORT), fingerprint(&other));
    }

    #[test]
    fn known_digest_of_empty_body() {
        assert_eq!(
            fingerprint(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn validator_matching_accepts_raw_quoted_and_weak_forms() {
        let value = fingerprint(REPORT);
        assert!(matches_validator(Some(&value), &value));
        assert!(matches_validator(Some(&format!("\"{value}\"")), &value));
        assert!(matches_validator(Some(&format!("W/\"{value}\"")), &value));
        assert!(matches_validator(Some(&format!("\"stale\", {value}")), &value));
        assert!(matches_validator(Some("*"), &value));
    }

    #[test]
    fn validator_mismatch_or_absence_does_not_match() {
        let value = fingerprint(REPORT);
        assert!(!matches_validator(None, &value));
        assert!(!matches_validator(Some(""), &value));
        assert!(!matches_validator(Some(&fingerprint("other")), &value));
    }
}
