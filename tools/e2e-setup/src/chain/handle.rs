/*!
   The interface through which the topology builder drives a chain.
*/

use std::path::PathBuf;

use crate::chain::config::ChainConfig;
use crate::docker::NetworkId;
use crate::error::Error;

/**
   An account to be funded in the genesis of a chain, typically a key
   created by the relayer.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisWallet {
    pub key_name: String,
    pub address: String,
    pub amount: u128,
    pub denom: String,
}

impl GenesisWallet {
    /// The coins to fund, formatted as `<amount><denom>`.
    pub fn coins(&self) -> String {
        format!("{}{}", self.amount, self.denom)
    }
}

/**
   Where and how a chain should create its nodes.
*/
#[derive(Debug, Clone)]
pub struct ChainInitOptions<Runtime> {
    pub test_name: String,
    pub home_dir: PathBuf,
    pub runtime: Runtime,
    pub network: NetworkId,
}

/**
   A live (or about to be live) test chain consisting of validators and
   full nodes.

   Handles are cheap to clone, and all clones refer to the same set of
   nodes.
*/
pub trait ChainHandle: Clone {
    /// The container runtime the chain creates its nodes in.
    type Runtime: Clone;

    fn config(&self) -> &ChainConfig;

    fn chain_id(&self) -> &str {
        &self.config().chain_id
    }

    /**
       Prepare the nodes of the chain: fetch images and create the node
       home directories. Does not start anything.
    */
    fn initialize(&self, options: &ChainInitOptions<Self::Runtime>) -> Result<(), Error>;

    /**
       Build the genesis, funding the given wallets, then start all nodes
       and wait for the chain to produce blocks.
    */
    fn start(&self, genesis_wallets: &[GenesisWallet]) -> Result<(), Error>;

    /// RPC address of the chain, reachable from inside the test network.
    fn rpc_address(&self) -> Result<String, Error>;

    /// gRPC address of the chain, reachable from inside the test network.
    fn grpc_address(&self) -> Result<String, Error>;

    /// RPC address of the chain, reachable from the host running the test.
    fn host_rpc_address(&self) -> Option<String>;

    /**
       Stop and remove all nodes of the chain. Calling this more than once
       is not an error.
    */
    fn cleanup(&self) -> Result<(), Error>;
}
