//! Password policy: strength rules, bcrypt hashing and reuse checks.

use crate::services::ServiceError;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 12;

/// Validate password strength: at least 8 characters with one uppercase
/// letter, one lowercase letter, one digit and one symbol.
///
/// Enforced here even when the outer request-validation layer has already
/// checked the same rules.
pub fn validate_strength(password: &str) -> Result<(), ServiceError> {
    if password.chars().count() < 8 {
        return Err(ServiceError::WeakPassword(
            "Password must be at least 8 characters",
        ));
    }

    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ServiceError::WeakPassword(
            "Password must contain at least one uppercase letter",
        ));
    }

    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ServiceError::WeakPassword(
            "Password must contain at least one lowercase letter",
        ));
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ServiceError::WeakPassword(
            "Password must contain at least one number",
        ));
    }

    if !password.chars().any(is_symbol) {
        return Err(ServiceError::WeakPassword(
            "Password must contain at least one special character",
        ));
    }

    Ok(())
}

fn is_symbol(c: char) -> bool {
    matches!(
        c,
        '!' | '@'
            | '#'
            | '$'
            | '%'
            | '^'
            | '&'
            | '*'
            | '('
            | ')'
            | '-'
            | '_'
            | '='
            | '+'
            | '['
            | ']'
            | '{'
            | '}'
            | '|'
            | '\\'
            | ';'
            | ':'
            | '\''
            | '"'
            | ','
            | '.'
            | '<'
            | '>'
            | '/'
            | '?'
            | '`'
            | '~'
    )
}

/// Hash a password with bcrypt (cost 12). Salt is generated and embedded in
/// the hash.
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e)))
}

/// Verify a password against a stored hash. bcrypt performs the comparison
/// in constant time; a malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Reject a candidate password that matches the current hash or any of the
/// retained history hashes.
pub fn check_reuse(
    candidate: &str,
    current_hash: Option<&str>,
    history: &[String],
) -> Result<(), ServiceError> {
    if let Some(current) = current_hash {
        if verify_password(candidate, current) {
            return Err(ServiceError::PasswordReused);
        }
    }

    for old_hash in history {
        if verify_password(candidate, old_hash) {
            return Err(ServiceError::PasswordReused);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low-cost hash so the suite stays fast; verification reads the cost
    // from the hash itself.
    fn quick_hash(password: &str) -> String {
        bcrypt::hash(password, 4).expect("hash")
    }

    #[test]
    fn strength_accepts_compliant_passwords() {
        for p in ["Str0ng!Pw", "Aa1!aaaa", "xY9?something", "P4ss,word"] {
            assert!(validate_strength(p).is_ok(), "expected ok: {}", p);
        }
    }

    #[test]
    fn strength_rejects_each_missing_class() {
        let cases = [
            ("Sh0rt!a", "length"),
            ("weak1!aa", "uppercase"),
            ("WEAK1!AA", "lowercase"),
            ("Weakness!", "digit"),
            ("Weakness1", "symbol"),
        ];
        for (p, why) in cases {
            assert!(
                matches!(validate_strength(p), Err(ServiceError::WeakPassword(_))),
                "expected weak ({}): {}",
                why,
                p
            );
        }
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = quick_hash("Str0ng!Pw");
        assert!(hash.starts_with("$2"));
        assert!(verify_password("Str0ng!Pw", &hash));
        assert!(!verify_password("Str0ng!Pw2", &hash));
    }

    #[test]
    fn malformed_hash_is_a_mismatch() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }

    #[test]
    fn reuse_rejects_current_and_history() {
        let current = quick_hash("Current1!");
        let history = vec![quick_hash("Old1!aaa"), quick_hash("Old2!aaa")];

        assert!(matches!(
            check_reuse("Current1!", Some(&current), &history),
            Err(ServiceError::PasswordReused)
        ));
        assert!(matches!(
            check_reuse("Old2!aaa", Some(&current), &history),
            Err(ServiceError::PasswordReused)
        ));
        assert!(check_reuse("Fresh1!aa", Some(&current), &history).is_ok());
        assert!(check_reuse("Fresh1!aa", None, &history).is_ok());
    }
}
