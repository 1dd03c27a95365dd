//! Import-name to installable-package-name translation.

use std::collections::BTreeMap;

/// Well-known modules whose distribution name differs from the import name.
const BUILTIN_PACKAGES: &[(&str, &str)] = &[
    ("attr", "attrs"),
    ("bs4", "beautifulsoup4"),
    ("cv2", "opencv-python"),
    ("dateutil", "python-dateutil"),
    ("dotenv", "python-dotenv"),
    ("jose", "python-jose"),
    ("jwt", "PyJWT"),
    ("multipart", "python-multipart"),
    ("PIL", "pillow"),
    ("serial", "pyserial"),
    ("sklearn", "scikit-learn"),
    ("yaml", "PyYAML"),
];

/// Built-in default table.
pub fn builtin_packages() -> BTreeMap<String, String> {
    BUILTIN_PACKAGES
        .iter()
        .map(|(module, package)| (module.to_string(), package.to_string()))
        .collect()
}

/// Per-handler translation table: shared defaults merged with overrides.
///
/// The merged table is owned by the handler; building it never touches the
/// defaults it was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMap {
    entries: BTreeMap<String, String>,
}

impl PackageMap {
    pub fn merged(defaults: &BTreeMap<String, String>, overrides: &[(String, String)]) -> Self {
        let mut entries = defaults.clone();
        for (module, package) in overrides {
            entries.insert(module.clone(), package.clone());
        }
        Self { entries }
    }

    /// Package to install for `module`; unmapped names pass through.
    pub fn translate<'a>(&'a self, module: &'a str) -> &'a str {
        self.entries.get(module).map(String::as_str).unwrap_or(module)
    }

    pub fn translate_all(&self, modules: &[String]) -> Vec<String> {
        let mut packages: Vec<String> = Vec::new();
        for module in modules {
            let package = self.translate(module);
            if !packages.iter().any(|p| p == package) {
                packages.push(package.to_string());
            }
        }
        packages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_translate_dotenv() {
        let map = PackageMap::merged(&builtin_packages(), &[]);
        assert_eq!(map.translate("dotenv"), "python-dotenv");
    }

    #[test]
    fn unmapped_name_passes_through() {
        let map = PackageMap::merged(&builtin_packages(), &[]);
        assert_eq!(map.translate("sample_pkg"), "sample_pkg");
    }

    #[test]
    fn overrides_shadow_defaults_without_touching_them() {
        let defaults = builtin_packages();
        let map = PackageMap::merged(
            &defaults,
            &[("yaml".to_string(), "ruamel.yaml".to_string())],
        );
        assert_eq!(map.translate("yaml"), "ruamel.yaml");
        assert_eq!(defaults.get("yaml").map(String::as_str), Some("PyYAML"));
        assert_eq!(defaults.len(), BUILTIN_PACKAGES.len());
    }

    #[test]
    fn translate_all_dedups_packages() {
        let map = PackageMap::merged(
            &BTreeMap::new(),
            &[
                ("a".to_string(), "pkg".to_string()),
                ("b".to_string(), "pkg".to_string()),
            ],
        );
        let packages = map.translate_all(&["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(packages, vec!["pkg", "c"]);
    }
}
