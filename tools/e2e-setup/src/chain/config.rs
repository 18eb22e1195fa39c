/*!
   Descriptors of the chains spawned by the setup helpers.
*/

use core::fmt::{self, Display};
use core::time::Duration;

use crate::error::{handle_generic_error, Error};
use crate::types::config::TestConfig;

/**
   A container image that a chain's nodes run.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerImage {
    pub repository: String,
    pub version: String,
}

impl DockerImage {
    pub fn new(repository: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            version: version.into(),
        }
    }
}

impl Display for DockerImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.version)
    }
}

/**
   Describes how to run a chain: which image and binary to use, and the
   parameters that the relayer needs to talk to it.

   A `ChainConfig` is built once per chain and handed to the chain
   factory, which keeps its own copy.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct ChainConfig {
    /// The chain implementation family, e.g. `cosmos`.
    pub chain_type: String,

    /// A human-readable name, used for container names.
    pub name: String,

    pub chain_id: String,

    /**
       The images the chain can run. Nodes run the first one.
    */
    pub images: Vec<DockerImage>,

    /// Name of the chain binary inside the image.
    pub bin: String,

    pub bech32_prefix: String,

    /// The native denomination, used for staking, fees and genesis funds.
    pub denom: String,

    /// Gas price as a decimal amount followed by the denomination.
    pub gas_prices: String,

    pub gas_adjustment: f64,

    /// Trusting period of light clients tracking this chain, e.g. `508h`.
    pub trusting_period: String,

    /**
       Run nodes without bind-mounting their home directories from the
       host. The Docker backend requires host mounts.
    */
    pub no_host_mount: bool,
}

impl ChainConfig {
    /// The image that the chain's nodes run.
    pub fn image(&self) -> Result<&DockerImage, Error> {
        self.images.first().ok_or_else(|| {
            Error::unsupported_config(format!("chain {} has no image", self.chain_id))
        })
    }

    pub fn trusting_period_duration(&self) -> Result<Duration, Error> {
        humantime::parse_duration(&self.trusting_period).map_err(handle_generic_error)
    }
}

/**
   Create a [`ChainConfig`] for a `simd` chain, with the image taken from
   the environment.
*/
pub fn new_simapp_config(name: &str, chain_id: &str, denom: &str) -> ChainConfig {
    new_simapp_config_with(&TestConfig::from_env(), name, chain_id, denom)
}

pub fn new_simapp_config_with(
    test_config: &TestConfig,
    name: &str,
    chain_id: &str,
    denom: &str,
) -> ChainConfig {
    ChainConfig {
        chain_type: "cosmos".to_string(),
        name: name.to_string(),
        chain_id: chain_id.to_string(),
        images: vec![DockerImage::new(
            test_config.simd_image.clone(),
            test_config.simd_tag.clone(),
        )],
        bin: "simd".to_string(),
        bech32_prefix: "cosmos".to_string(),
        denom: denom.to_string(),
        gas_prices: format!("0.01{denom}"),
        gas_adjustment: 1.3,
        trusting_period: "508h".to_string(),
        no_host_mount: false,
    }
}
