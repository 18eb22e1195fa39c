/*!
   The infrastructure that test environments are created on.

   [`Infrastructure`] bundles the collaborators that the environment
   builder delegates to: provisioning of the container runtime and
   network, and the factories for chains and relayers.
*/

use std::path::Path;
use std::rc::Rc;
use tracing::debug;

use crate::chain::config::{ChainConfig, DockerImage};
use crate::chain::cosmos::CosmosChain;
use crate::chain::handle::ChainHandle;
use crate::docker::{DockerClient, DockerEngine, DockerSetup, NetworkId};
use crate::error::Error;
use crate::relayer::cosmos_rly::CosmosRelayer;
use crate::relayer::{BuiltinRelayerFactory, Relayer, RelayerKind};
use crate::types::config::TestConfig;
use crate::types::context::TestContext;

pub trait Infrastructure {
    /// Handle to the container runtime, shared by chains and relayers.
    type Runtime: Clone;

    type Chain: ChainHandle<Runtime = Self::Runtime>;

    type Relayer: Relayer;

    /**
       Acquire the container runtime and an isolated network for the test.
    */
    fn setup(&self, test: &impl TestContext) -> Result<(Self::Runtime, NetworkId), Error>;

    fn new_chain(
        &self,
        test_name: &str,
        config: ChainConfig,
        num_validators: usize,
        num_full_nodes: usize,
    ) -> Result<Self::Chain, Error>;

    fn new_relayer(
        &self,
        kind: RelayerKind,
        test: &impl TestContext,
        runtime: &Self::Runtime,
        network: &NetworkId,
        home_dir: &Path,
    ) -> Result<Self::Relayer, Error>;
}

/**
   Runs chains and relayers as Docker containers.
*/
#[derive(Clone)]
pub struct DockerInfrastructure {
    pub docker: DockerClient,
    pub relayer_image: DockerImage,
}

impl DockerInfrastructure {
    pub fn new(config: &TestConfig, docker: DockerClient) -> Self {
        Self {
            docker,
            relayer_image: DockerImage::new(config.rly_image.clone(), config.rly_tag.clone()),
        }
    }

    /**
       Docker infrastructure configured from the environment, connected
       to the local Docker daemon.
    */
    pub fn from_env() -> Result<Self, Error> {
        let engine = DockerEngine::connect()?;

        Ok(Self::new(&TestConfig::from_env(), Rc::new(engine)))
    }
}

impl Infrastructure for DockerInfrastructure {
    type Runtime = DockerClient;
    type Chain = CosmosChain;
    type Relayer = CosmosRelayer;

    fn setup(&self, test: &impl TestContext) -> Result<(DockerClient, NetworkId), Error> {
        DockerSetup::new(self.docker.clone()).setup(test)
    }

    fn new_chain(
        &self,
        test_name: &str,
        config: ChainConfig,
        num_validators: usize,
        num_full_nodes: usize,
    ) -> Result<CosmosChain, Error> {
        debug!(
            "creating chain {} for test {} with image {}",
            config.chain_id,
            test_name,
            config.image()?
        );

        Ok(CosmosChain::new(config, num_validators, num_full_nodes))
    }

    fn new_relayer(
        &self,
        kind: RelayerKind,
        test: &impl TestContext,
        runtime: &DockerClient,
        network: &NetworkId,
        home_dir: &Path,
    ) -> Result<CosmosRelayer, Error> {
        Ok(BuiltinRelayerFactory::new(kind, self.relayer_image.clone())
            .build(test, runtime, network, home_dir))
    }
}
