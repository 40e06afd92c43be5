use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Machine-readable summary of a registered service, exposed verbatim via
/// `GET /system/descriptors`. Immutable once `LifecycleManager::start` has
/// run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, ToSchema)]
pub struct Descriptor {
    pub name: String,
    pub domain: String,
    pub layer: String,
    pub capabilities: Vec<String>,
    pub required_apis: Vec<String>,
    pub version: String,
}

impl Descriptor {
    /// Sort key used by `LifecycleManager::descriptors`: by domain, then name.
    pub fn sort_key(&self) -> (&str, &str) {
        (&self.domain, &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_by_domain_then_name() {
        let mut descriptors = vec![
            Descriptor {
                name: "b".into(),
                domain: "zzz".into(),
                layer: "core".into(),
                capabilities: vec![],
                required_apis: vec![],
                version: "1.0.0".into(),
            },
            Descriptor {
                name: "a".into(),
                domain: "aaa".into(),
                layer: "core".into(),
                capabilities: vec![],
                required_apis: vec![],
                version: "1.0.0".into(),
            },
        ];
        descriptors.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        assert_eq!(descriptors[0].domain, "aaa");
    }
}
