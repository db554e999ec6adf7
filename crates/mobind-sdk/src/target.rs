//! Target specification parsing.
//!
//! A target specification names one platform and, optionally, a subset of its
//! architectures: `ios`, `ios/arm64`, `android/arm,android/x86`. A bare platform
//! token selects every architecture the platform supports.

use std::fmt;
use std::str::FromStr;

use crate::types::{Arch, ParseError, Platform};

/// A parsed target specification: one platform and an ordered, duplicate-free
/// list of architectures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    platform: Platform,
    archs: Vec<Arch>,
}

impl TargetSpec {
    /// Parses a comma-separated target specification.
    ///
    /// ```
    /// use mobind_sdk::{Arch, Platform, TargetSpec};
    ///
    /// let spec = TargetSpec::parse("ios/arm64,ios/x86_64").unwrap();
    /// assert_eq!(spec.platform(), Platform::Ios);
    /// assert_eq!(spec.archs(), &[Arch::Arm64, Arch::X86_64]);
    ///
    /// let all = TargetSpec::parse("android").unwrap();
    /// assert_eq!(all.archs().len(), 4);
    /// ```
    pub fn parse(spec: &str) -> Result<TargetSpec, ParseError> {
        if spec.is_empty() {
            return Err(ParseError::EmptySpec);
        }

        let mut platform: Option<Platform> = None;
        let mut all = false;
        let mut names = Vec::new();

        for token in spec.split(',') {
            let (os, arch) = match token.split_once('/') {
                Some((os, arch)) => (os, Some(arch)),
                None => (token, None),
            };
            let parsed = Platform::from_name(os)
                .ok_or_else(|| ParseError::UnsupportedPlatform(os.to_string()))?;

            match platform {
                None => platform = Some(parsed),
                Some(first) if first != parsed => {
                    return Err(ParseError::MixedPlatforms {
                        first,
                        other: parsed,
                    });
                }
                Some(_) => {}
            }

            match arch {
                Some(arch) => names.push(arch),
                None => all = true,
            }
        }

        // The loop ran at least once, so the platform is always set here.
        let Some(platform) = platform else {
            return Err(ParseError::EmptySpec);
        };

        let mut archs = Vec::new();
        for name in names {
            let arch = Arch::from_name(name)
                .filter(|arch| platform.supports(*arch))
                .ok_or_else(|| ParseError::UnsupportedArch {
                    platform,
                    arch: name.to_string(),
                })?;
            if !archs.contains(&arch) {
                archs.push(arch);
            }
        }

        if all {
            archs = platform.supported_archs().to_vec();
        }

        Ok(TargetSpec { platform, archs })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Architectures to build, in build order.
    pub fn archs(&self) -> &[Arch] {
        &self.archs
    }
}

impl FromStr for TargetSpec {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetSpec::parse(s)
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: Vec<String> = self
            .archs
            .iter()
            .map(|arch| format!("{}/{}", self.platform, arch))
            .collect();
        f.write_str(&tokens.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_spec_is_rejected() {
        assert_eq!(TargetSpec::parse(""), Err(ParseError::EmptySpec));
    }

    #[test]
    fn unknown_platform_is_rejected() {
        assert_eq!(
            TargetSpec::parse("windows/arm64"),
            Err(ParseError::UnsupportedPlatform("windows".into()))
        );
        assert_eq!(
            TargetSpec::parse("darwin"),
            Err(ParseError::UnsupportedPlatform("darwin".into()))
        );
    }

    #[test]
    fn mixed_platforms_are_rejected() {
        assert_eq!(
            TargetSpec::parse("android/arm,ios/arm64"),
            Err(ParseError::MixedPlatforms {
                first: Platform::Android,
                other: Platform::Ios,
            })
        );
        assert!(matches!(
            TargetSpec::parse("ios,android"),
            Err(ParseError::MixedPlatforms { .. })
        ));
    }

    #[test]
    fn bare_platform_expands_to_canonical_order() {
        let spec = TargetSpec::parse("ios").unwrap();
        assert_eq!(spec.platform(), Platform::Ios);
        assert_eq!(spec.archs(), &[Arch::Arm, Arch::Arm64, Arch::X86_64]);

        let spec = TargetSpec::parse("android").unwrap();
        assert_eq!(
            spec.archs(),
            &[Arch::Arm, Arch::Arm64, Arch::X86, Arch::X86_64]
        );
    }

    #[test]
    fn duplicates_collapse() {
        let spec = TargetSpec::parse("ios/arm64,ios/arm64").unwrap();
        assert_eq!(spec.archs(), &[Arch::Arm64]);

        // aliases of the same arch also collapse
        let spec = TargetSpec::parse("android/amd64,android/x86_64").unwrap();
        assert_eq!(spec.archs(), &[Arch::X86_64]);
    }

    #[test]
    fn explicit_order_is_preserved() {
        let spec = TargetSpec::parse("android/x86_64,android/arm,android/386").unwrap();
        assert_eq!(spec.archs(), &[Arch::X86_64, Arch::Arm, Arch::X86]);
    }

    #[test]
    fn unsupported_arch_is_rejected() {
        assert_eq!(
            TargetSpec::parse("ios/bogus"),
            Err(ParseError::UnsupportedArch {
                platform: Platform::Ios,
                arch: "bogus".into(),
            })
        );
        // x86 exists but iOS does not support it
        assert_eq!(
            TargetSpec::parse("ios/386"),
            Err(ParseError::UnsupportedArch {
                platform: Platform::Ios,
                arch: "386".into(),
            })
        );
    }

    #[test]
    fn all_marker_still_validates_explicit_archs() {
        assert!(matches!(
            TargetSpec::parse("ios,ios/bogus"),
            Err(ParseError::UnsupportedArch { .. })
        ));

        let spec = TargetSpec::parse("ios/x86_64,ios").unwrap();
        assert_eq!(spec.archs(), &[Arch::Arm, Arch::Arm64, Arch::X86_64]);
    }

    #[test]
    fn parsing_is_deterministic() {
        for input in ["ios", "android/arm64,android/arm", "ios/x86_64,ios/arm64,ios/x86_64"] {
            assert_eq!(TargetSpec::parse(input), TargetSpec::parse(input));
        }
    }

    #[test]
    fn display_round_trips_through_from_str() {
        let spec: TargetSpec = "android/386,android/arm64".parse().unwrap();
        assert_eq!(spec.to_string(), "android/x86,android/arm64");
        assert_eq!(spec.to_string().parse::<TargetSpec>().unwrap(), spec);
    }
}
