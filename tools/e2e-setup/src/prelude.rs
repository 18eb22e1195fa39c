/*!
   Re-export of common constructs that are used by test cases.
*/

pub use crate::bootstrap::init::init_test;
pub use crate::bootstrap::two_chain::{
    standard_two_chain_environment, try_standard_two_chain_environment, with_chain_a_config,
    with_chain_a_denom, with_chain_b_config, with_chain_b_denom, ConfigurationFunc, Options,
    StandardEnvironment, TEST_PATH,
};
pub use crate::chain::config::{new_simapp_config, ChainConfig, DockerImage};
pub use crate::chain::cosmos::CosmosChain;
pub use crate::chain::handle::ChainHandle;
pub use crate::docker::{ContainerRuntime, DockerClient, DockerEngine};
pub use crate::error::Error;
pub use crate::framework::interchain::{Interchain, InterchainBuildOptions, InterchainLink};
pub use crate::infra::{DockerInfrastructure, Infrastructure};
pub use crate::relayer::cosmos_rly::CosmosRelayer;
pub use crate::relayer::reporter::RelayerExecReporter;
pub use crate::relayer::{Relayer, RelayerKind};
pub use crate::types::config::TestConfig;
pub use crate::types::context::{TestContext, TestScope};
pub use crate::util::assert::{FailFast, Require};
