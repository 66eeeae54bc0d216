use std::fmt::{self, Display};

/// Compile-time build information, populated by `build.rs`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub build_profile: &'static str,
    pub build_features: &'static str,
    pub build_timestamp: &'static str,
    pub rust_version: &'static str,
    pub version: &'static str,
    pub package_version: &'static str,
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        build_profile: env!("BUILD_PROFILE"),
        build_features: env!("BUILD_FEATURES"),
        build_timestamp: env!("BUILD_TIMESTAMP"),
        rust_version: env!("RUST_VERSION"),
        version: env!("REPO_VERSION"),
        package_version: env!("CARGO_PKG_VERSION"),
    }
}

impl Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "q2q {} ({}) [profile: {}, features: {}, built: {}, {}]",
            self.package_version,
            self.version,
            self.build_profile,
            self.build_features,
            self.build_timestamp,
            self.rust_version
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_build_info_display_names_package_version() {
        let info = build_info();
        assert!(info.to_string().contains(env!("CARGO_PKG_VERSION")));
        assert!(!info.build_profile.is_empty());
    }
}
