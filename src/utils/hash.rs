// Pseudonymous user identity derived from the session email

use sha2::{Digest, Sha256};

const USER_ID_SALT: &str = "srdt-matomo:";
const USER_ID_LEN: usize = 24;

/// Department code for each allowed prefecture domain
const DOMAIN_TO_DEPARTMENT: &[(&str, &str)] = &[
    ("aisne.gouv.fr", "02"),
    ("bouches-du-rhone.gouv.fr", "13"),
    ("calvados.gouv.fr", "14"),
    ("charente.gouv.fr", "16"),
    ("charente-maritime.gouv.fr", "17"),
    ("correze.gouv.fr", "19"),
    ("creuse.gouv.fr", "23"),
    ("dordogne.gouv.fr", "24"),
    ("eure.gouv.fr", "27"),
    ("gironde.gouv.fr", "33"),
    ("landes.gouv.fr", "40"),
    ("lot-et-garonne.gouv.fr", "47"),
    ("maine-et-loire.gouv.fr", "49"),
    ("manche.gouv.fr", "50"),
    ("nord.gouv.fr", "59"),
    ("oise.gouv.fr", "60"),
    ("orne.gouv.fr", "61"),
    ("pas-de-calais.gouv.fr", "62"),
    ("pyrenees-atlantiques.gouv.fr", "64"),
    ("seine-maritime.gouv.fr", "76"),
    ("deux-sevres.gouv.fr", "79"),
    ("somme.gouv.fr", "80"),
    ("vienne.gouv.fr", "86"),
    ("haute-vienne.gouv.fr", "87"),
];

/// Same identifier as the analytics tracker: salted SHA-256, hex, 24 chars
pub fn hash_email_for_user_id(email: &str) -> String {
    let normalized = email.trim().to_lowercase();
    let digest = Sha256::digest(format!("{}{}", USER_ID_SALT, normalized).as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(USER_ID_LEN);
    id
}

/// Department of the email's domain among `allowed_domains`.
///
/// Allowed domains without a department code (central administration) yield
/// the domain itself. Emails outside the list yield `None`.
pub fn department_for_email(email: &str, allowed_domains: &[String]) -> Option<String> {
    let email = email.trim().to_lowercase();
    let domain = allowed_domains
        .iter()
        .find(|domain| email.ends_with(&format!("@{}", domain)))?;

    let department = DOMAIN_TO_DEPARTMENT
        .iter()
        .find(|(known, _)| known == domain)
        .map(|(_, code)| code.to_string());
    Some(department.unwrap_or_else(|| domain.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains() -> Vec<String> {
        vec!["nord.gouv.fr".to_string(), "travail.gouv.fr".to_string(), "vienne.gouv.fr".to_string()]
    }

    #[test]
    fn test_user_id_is_normalized_and_truncated() {
        let id = hash_email_for_user_id("  Jean.Dupont@Nord.gouv.fr ");
        assert_eq!(id.len(), 24);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, hash_email_for_user_id("jean.dupont@nord.gouv.fr"));
        assert_ne!(id, hash_email_for_user_id("marie.dupont@nord.gouv.fr"));
    }

    #[test]
    fn test_user_id_matches_salted_sha256() {
        let expected = hex::encode(Sha256::digest(b"srdt-matomo:a@b.fr"));
        assert_eq!(hash_email_for_user_id("a@b.fr"), expected[..24]);
    }

    #[test]
    fn test_department_lookup() {
        assert_eq!(department_for_email("agent@nord.gouv.fr", &domains()), Some("59".to_string()));
        assert_eq!(
            department_for_email("agent@travail.gouv.fr", &domains()),
            Some("travail.gouv.fr".to_string())
        );
        assert_eq!(department_for_email("agent@gmail.com", &domains()), None);
    }

    #[test]
    fn test_department_requires_full_domain_match() {
        // haute-vienne must not be taken for vienne
        assert_eq!(department_for_email("agent@haute-vienne.gouv.fr", &domains()), None);
        assert_eq!(department_for_email("agent@vienne.gouv.fr", &domains()), Some("86".to_string()));
    }
}
