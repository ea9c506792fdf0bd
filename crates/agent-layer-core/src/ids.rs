//! Identifier and slug helpers.

use uuid::Uuid;

const TOKEN_LEN: usize = 12;

/// Generate a prefixed random id: `place_calgary_1f3a9c0b7d2e`, `lead_9e0c41aa53b7`.
///
/// The namespace is slugified so ids stay URL-safe.
pub fn generate_id(prefix: &str, namespace: Option<&str>) -> String {
    let token = Uuid::new_v4().simple().to_string();
    let token = &token[..TOKEN_LEN];
    match namespace.map(slugify).filter(|ns| !ns.is_empty()) {
        Some(ns) => format!("{}_{}_{}", prefix, ns, token),
        None => format!("{}_{}", prefix, token),
    }
}

/// Lowercase, collapse every run of non-alphanumeric characters into a
/// single `-`, and trim dashes from both ends.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars().flat_map(|c| c.to_lowercase()) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Launchpad Trampoline Park"), "launchpad-trampoline-park");
        assert_eq!(slugify("Calgary Pump & Compressor"), "calgary-pump-compressor");
    }

    #[test]
    fn test_slugify_trims_dashes() {
        assert_eq!(slugify("  --The Treehouse!! "), "the-treehouse");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id("place", Some("St. Albert"));
        assert!(id.starts_with("place_st-albert_"), "got {}", id);
        assert_eq!(id.len(), "place_st-albert_".len() + TOKEN_LEN);

        let lead = generate_id("lead", None);
        assert!(lead.starts_with("lead_"));
        assert_eq!(lead.len(), 5 + TOKEN_LEN);
        assert_ne!(generate_id("lead", None), lead);
    }
}
