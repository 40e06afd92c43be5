use std::collections::BTreeMap;

/// Reserved metadata key that always reflects the current tenant on write
/// paths that receive one.
pub const TENANT_KEY: &str = "tenant";

/// Account-scoped metadata. A plain `BTreeMap` keeps iteration order
/// deterministic for serialization and tests.
pub type Metadata = BTreeMap<String, String>;

/// Trims keys and values, drops empty keys. Idempotent:
/// `normalize_metadata(normalize_metadata(m)) == normalize_metadata(m)`.
pub fn normalize_metadata(input: &Metadata) -> Metadata {
    input
        .iter()
        .filter_map(|(k, v)| {
            let key = k.trim();
            if key.is_empty() {
                None
            } else {
                Some((key.to_string(), v.trim().to_string()))
            }
        })
        .collect()
}

/// Trims, dedupes, and drops empty tags.
pub fn normalize_tags(input: &[String]) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    for tag in input {
        let tag = tag.trim();
        if tag.is_empty() || !seen.insert(tag.to_string()) {
            continue;
        }
        out.push(tag.to_string());
    }
    out
}

/// Sets the reserved `tenant` key to the given tenant, overwriting any
/// existing value, then normalizes.
pub fn with_tenant(mut input: Metadata, tenant: &str) -> Metadata {
    input.insert(TENANT_KEY.to_string(), tenant.to_string());
    normalize_metadata(&input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_drops_empty_keys() {
        let mut m = Metadata::new();
        m.insert("  name ".to_string(), "  value ".to_string());
        m.insert("   ".to_string(), "dropped".to_string());

        let normalized = normalize_metadata(&m);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized.get("name"), Some(&"value".to_string()));
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut m = Metadata::new();
        m.insert(" a ".to_string(), " b ".to_string());

        let once = normalize_metadata(&m);
        let twice = normalize_metadata(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_metadata_normalizes_to_empty_map() {
        let m = Metadata::new();
        assert!(normalize_metadata(&m).is_empty());
    }

    #[test]
    fn tags_are_trimmed_deduped_and_emptied() {
        let tags = vec![
            " foo ".to_string(),
            "foo".to_string(),
            "".to_string(),
            "  ".to_string(),
            "bar".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["foo".to_string(), "bar".to_string()]);
    }

    #[test]
    fn tenant_key_is_overwritten() {
        let mut m = Metadata::new();
        m.insert(TENANT_KEY.to_string(), "stale".to_string());
        let updated = with_tenant(m, "fresh");
        assert_eq!(updated.get(TENANT_KEY), Some(&"fresh".to_string()));
    }
}
