/*!
   Relayer handles and the factory that builds them.
*/

use core::fmt::{self, Display};
use std::path::Path;

use crate::chain::config::{ChainConfig, DockerImage};
use crate::docker::{DockerClient, NetworkId};
use crate::error::Error;
use crate::types::context::TestContext;

pub mod cosmos_rly;
pub mod reporter;

use cosmos_rly::CosmosRelayer;
use reporter::RelayerExecReporter;

/**
   The relayer implementations known to the setup helpers.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayerKind {
    /// The Go relayer, `rly`.
    CosmosRly,
}

impl Display for RelayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CosmosRly => write!(f, "cosmos/relayer"),
        }
    }
}

/**
   What a relayer needs to know to connect to a chain.
*/
#[derive(Debug, Clone)]
pub struct RelayerChainConfig {
    pub chain: ChainConfig,
    pub rpc_address: String,
    pub grpc_address: String,
    pub key_name: String,
}

/**
   A key created by the relayer for signing on one chain.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayerWallet {
    pub chain_id: String,
    pub key_name: String,
    pub address: String,
    pub mnemonic: String,
}

/**
   A relayer that can be configured for chains, link them, and relay
   between them.

   Every command run by the relayer is recorded to the given
   [`RelayerExecReporter`], whether it succeeds or not.
*/
pub trait Relayer: Clone {
    fn add_chain_configuration(
        &self,
        reporter: &mut RelayerExecReporter,
        chain: &RelayerChainConfig,
    ) -> Result<(), Error>;

    fn add_key(
        &self,
        reporter: &mut RelayerExecReporter,
        chain_id: &str,
        key_name: &str,
    ) -> Result<RelayerWallet, Error>;

    fn generate_path(
        &self,
        reporter: &mut RelayerExecReporter,
        src_chain_id: &str,
        dst_chain_id: &str,
        path_name: &str,
    ) -> Result<(), Error>;

    /**
       Create clients, a connection and a channel for the path. The
       clients are created with the given trusting period, in the
       duration syntax of the relayer (e.g. `508h`).
    */
    fn link_path(
        &self,
        reporter: &mut RelayerExecReporter,
        path_name: &str,
        client_trusting_period: &str,
    ) -> Result<(), Error>;

    fn start_relayer(
        &self,
        reporter: &mut RelayerExecReporter,
        path_names: &[&str],
    ) -> Result<(), Error>;

    fn stop_relayer(&self, reporter: &mut RelayerExecReporter) -> Result<(), Error>;
}

/**
   Builds relayers of one [`RelayerKind`] running in Docker.
*/
#[derive(Debug, Clone)]
pub struct BuiltinRelayerFactory {
    pub kind: RelayerKind,
    pub image: DockerImage,
}

impl BuiltinRelayerFactory {
    pub fn new(kind: RelayerKind, image: DockerImage) -> Self {
        Self { kind, image }
    }

    pub fn build(
        &self,
        test: &impl TestContext,
        docker: &DockerClient,
        network: &NetworkId,
        home_dir: &Path,
    ) -> CosmosRelayer {
        match self.kind {
            RelayerKind::CosmosRly => CosmosRelayer::new(
                test.name(),
                docker.clone(),
                network.clone(),
                self.image.clone(),
                home_dir,
            ),
        }
    }
}
