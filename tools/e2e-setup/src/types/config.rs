/*!
   Definition for the environment-derived test configuration.
*/

use std::env;

/// Environment variable naming the `simd` image repository.
pub const SIMD_IMAGE_ENV: &str = "SIMD_IMAGE";

/// Environment variable naming the `simd` image tag.
pub const SIMD_TAG_ENV: &str = "SIMD_TAG";

/// Environment variable naming the Go relayer image repository.
pub const RLY_IMAGE_ENV: &str = "RLY_IMAGE";

/// Environment variable naming the Go relayer image tag.
pub const RLY_TAG_ENV: &str = "RLY_TAG";

pub const DEFAULT_SIMD_IMAGE: &str = "ghcr.io/cosmos/ibc-go-simd-e2e";

pub const DEFAULT_SIMD_TAG: &str = "latest";

pub const DEFAULT_RLY_IMAGE: &str = "ghcr.io/cosmos/relayer";

pub const DEFAULT_RLY_TAG: &str = "main";

/**
   The test configuration, populated from environment variables.

   Unset variables fall back to their defaults, so constructing a
   `TestConfig` never fails.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestConfig {
    /// Image repository of the chain binary under test.
    pub simd_image: String,

    /// Image tag of the chain binary under test.
    pub simd_tag: String,

    pub rly_image: String,

    pub rly_tag: String,
}

impl TestConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /**
       Build a [`TestConfig`] from an arbitrary variable lookup, so that
       the defaults can be checked without touching the process
       environment.
    */
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            simd_image: var(SIMD_IMAGE_ENV, DEFAULT_SIMD_IMAGE),
            simd_tag: var(SIMD_TAG_ENV, DEFAULT_SIMD_TAG),
            rly_image: var(RLY_IMAGE_ENV, DEFAULT_RLY_IMAGE),
            rly_tag: var(RLY_TAG_ENV, DEFAULT_RLY_TAG),
        }
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
